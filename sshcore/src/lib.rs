// Copyright 2016 Pierre-Étienne Meunier
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
//! A PuTTY-style SSH client engine: version exchange, SSH-1 and SSH-2
//! transport, authentication, channel multiplexing, forwarders and proxy
//! negotiation, driven entirely by [`backend::SshBackend`]. The crate owns
//! no socket and runs no event loop; every module is fed bytes and returns
//! bytes plus events, so the host program supplies its own I/O and timers.

#[macro_use]
extern crate thiserror;
#[macro_use]
extern crate log;

mod error;

pub mod auth;
pub mod backend;
pub mod bufchain;
pub mod channel;
pub mod cipher;
pub mod compression;
pub mod config;
pub mod forward;
pub mod hostkeys;
pub mod kex;
pub mod mac;
pub mod msg;
pub mod negotiation;
pub mod packet1;
pub mod packet2;
pub mod proxy;
pub mod timer;
pub mod tree234;
pub mod transport;
pub mod version;

pub use error::{Error, Severity};
