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
//! Key material for `sshcore`: host-key and user-key types, for both the
//! SSH-1 and SSH-2 wire generations, plus the `ssh-agent` wire protocol and
//! the two on-disk private-key file formats.

#[macro_use]
extern crate thiserror;
#[macro_use]
extern crate log;

pub mod agent;
pub mod encoding;
pub mod format;
pub mod key;
pub mod signature;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Could not read key")]
    CouldNotReadKey,
    #[error("Unsupported key type")]
    UnsupportedKeyType(Vec<u8>),
    #[error("The key is encrypted")]
    KeyIsEncrypted,
    #[error("Index out of bounds")]
    IndexOutOfBounds,
    #[error("Unknown signature type: {sig_type}")]
    UnknownSignatureType { sig_type: String },
    #[error("Agent protocol error")]
    AgentProtocolError,
    #[error("Agent failure")]
    AgentFailure,
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Openssl(#[from] openssl::error::ErrorStack),
    #[error("Base64 decoding error")]
    Decode,
}
