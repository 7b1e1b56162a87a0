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
//! Private-key file formats: the legacy SSH-1 binary blob and the
//! structured-text SSH-2 format.

pub mod ppk;
pub mod ssh1;

pub use ppk::{decode_ppk, encode_ppk};
pub use ssh1::{decode_ssh1_key, encode_ssh1_key};

use crate::key::KeyPair;
use crate::Error;

/// Load a private key file, sniffing which of the two formats it is by its
/// first line (mirrors how a real client identifies an identity file
/// without being told its protocol version up front).
pub fn decode_secret_key(data: &[u8], passphrase: Option<&str>) -> Result<KeyPair, Error> {
    if data.starts_with(b"SSH PRIVATE KEY FILE FORMAT") {
        decode_ssh1_key(data, passphrase)
    } else if data.starts_with(b"PuTTY-User-Key-File-") {
        decode_ppk(data, passphrase)
    } else {
        Err(Error::CouldNotReadKey)
    }
}
