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
//! Cipher registry (component D), shared by both SSH-1 and SSH-2 framers.
//!
//! Unlike thrussh's AEAD-only `chacha20poly1305`/`aes256gcm` ciphers (each
//! a bespoke module with its own tag handling), the cipher model here is
//! the classic non-AEAD one: a keyed block/stream cipher that
//! continues across packets (CBC/CTR chaining spans the whole connection
//! direction) with the MAC computed separately (see `crate::mac`). One
//! `StreamCipher` wrapping `openssl::symm::Crypter` therefore covers every
//! registered algorithm; only the lookup table differs per name.

use crate::Error;
use openssl::symm::{Cipher as OsslCipher, Crypter, Mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Name(pub &'static str);
impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        self.0
    }
}

pub const NONE: Name = Name("none");
pub const AES256_CTR: Name = Name("aes256-ctr");
pub const AES128_CTR: Name = Name("aes128-ctr");
pub const AES256_CBC: Name = Name("aes256-cbc");
pub const THREE_DES_CBC: Name = Name("3des-cbc");
pub const BLOWFISH_CBC: Name = Name("blowfish-cbc");

struct Desc {
    name: Name,
    key_len: usize,
    block_size: usize,
    openssl: fn() -> OsslCipher,
}

const TABLE: &[Desc] = &[
    Desc { name: AES256_CTR, key_len: 32, block_size: 16, openssl: OsslCipher::aes_256_ctr },
    Desc { name: AES128_CTR, key_len: 16, block_size: 16, openssl: OsslCipher::aes_128_ctr },
    Desc { name: AES256_CBC, key_len: 32, block_size: 16, openssl: OsslCipher::aes_256_cbc },
    Desc { name: THREE_DES_CBC, key_len: 24, block_size: 8, openssl: OsslCipher::des_ede3_cbc },
    Desc { name: BLOWFISH_CBC, key_len: 16, block_size: 8, openssl: OsslCipher::bf_cbc },
];

fn lookup(name: &str) -> Option<&'static Desc> {
    TABLE.iter().find(|d| d.name.0 == name)
}

pub fn key_len(name: &str) -> Option<usize> {
    lookup(name).map(|d| d.key_len)
}

pub fn block_size(name: &str) -> usize {
    lookup(name).map(|d| d.block_size).unwrap_or(8)
}

/// One direction's keyed cipher state, continuing across every packet of
/// the connection until the next rekey installs a fresh one.
pub enum CipherState {
    Clear,
    Keyed { crypter: Crypter, block_size: usize },
}

impl CipherState {
    pub fn new_keyed(name: &str, key: &[u8], iv: &[u8], mode: Mode) -> Result<Self, Error> {
        let desc = lookup(name).ok_or(Error::NoCommonCipher)?;
        let mut crypter = Crypter::new((desc.openssl)(), mode, key, Some(iv))?;
        crypter.pad(false);
        Ok(CipherState::Keyed { crypter, block_size: desc.block_size })
    }

    pub fn block_size(&self) -> usize {
        match self {
            CipherState::Clear => 8,
            CipherState::Keyed { block_size, .. } => *block_size,
        }
    }

    /// Apply the cipher in place (same operation for encrypt or decrypt;
    /// the direction was fixed when the `Crypter` was constructed).
    pub fn apply(&mut self, data: &mut [u8]) -> Result<(), Error> {
        match self {
            CipherState::Clear => Ok(()),
            CipherState::Keyed { crypter, block_size } => {
                let mut out = vec![0u8; data.len() + *block_size];
                let n = crypter.update(data, &mut out)?;
                debug_assert!(n >= data.len(), "stream cipher must not buffer partial blocks");
                data.copy_from_slice(&out[..data.len()]);
                Ok(())
            }
        }
    }
}

pub struct CipherPair {
    pub local_to_remote: CipherState,
    pub remote_to_local: CipherState,
}

impl CipherPair {
    pub fn clear() -> Self {
        CipherPair { local_to_remote: CipherState::Clear, remote_to_local: CipherState::Clear }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn aes_ctr_roundtrip() {
        let key = [0x11u8; 32];
        let iv = [0x22u8; 16];
        let mut enc = CipherState::new_keyed(AES256_CTR.0, &key, &iv, Mode::Encrypt).unwrap();
        let mut dec = CipherState::new_keyed(AES256_CTR.0, &key, &iv, Mode::Decrypt).unwrap();
        let mut block = *b"0123456789abcdef";
        enc.apply(&mut block).unwrap();
        assert_ne!(&block, b"0123456789abcdef");
        dec.apply(&mut block).unwrap();
        assert_eq!(&block, b"0123456789abcdef");
    }

    #[test]
    fn lookup_reports_key_len() {
        assert_eq!(key_len("aes256-ctr"), Some(32));
        assert_eq!(key_len("3des-cbc"), Some(24));
        assert_eq!(key_len("unknown"), None);
    }
}
