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
//! `ssh-agent` protocol codec.
//!
//! Unlike thrussh (which owns a tokio `UnixStream` and drives the
//! request/response dance with `async fn`s), the agent itself is a
//! collaborator out of scope here: handle/pipe wrappers are the host
//! program's job. This module only encodes requests and decodes
//! responses; the channel forwarder (`crate` — see `sshcore::forward::agent`
//! for the *proxied* case) and the auth state machine feed the bytes to
//! whatever transport the host wired up.

pub mod client;
mod msg;

/// Constraints on how keys can be used, attached to `ADD_IDENTITY`-style
/// requests.
#[derive(Debug, PartialEq, Eq)]
pub enum Constraint {
    KeyLifetime { seconds: u32 },
    Confirm,
    Extensions { name: Vec<u8>, details: Vec<u8> },
}
