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
//! MAC registry (component D continued): SSH-2 packets are authenticated
//! separately from encryption (`hmac-sha2-256`/`hmac-sha1`/`hmac-md5`,
//! or `none` before KEX completes), unlike thrussh's AEAD ciphers which
//! fold the tag into the cipher itself.

use crate::Error;
use byteorder::{BigEndian, ByteOrder};
use hmac::{Hmac, Mac as HmacMac};
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;

pub fn len(name: &str) -> usize {
    match name {
        "hmac-sha2-256" => 32,
        "hmac-sha1" => 20,
        "hmac-md5" => 16,
        _ => 0,
    }
}

pub fn key_len(name: &str) -> usize {
    len(name)
}

enum Keyed {
    Sha256(Hmac<Sha256>),
    Sha1(Hmac<Sha1>),
    Md5(Hmac<Md5>),
    None,
}

pub struct MacState {
    inner: Keyed,
}

impl MacState {
    pub fn new(name: &str, key: &[u8]) -> Result<Self, Error> {
        let inner = match name {
            "hmac-sha2-256" => Keyed::Sha256(Hmac::new_from_slice(key).expect("hmac accepts any key length")),
            "hmac-sha1" => Keyed::Sha1(Hmac::new_from_slice(key).expect("hmac accepts any key length")),
            "hmac-md5" => Keyed::Md5(Hmac::new_from_slice(key).expect("hmac accepts any key length")),
            "none" => Keyed::None,
            _ => return Err(Error::NoCommonMac),
        };
        Ok(MacState { inner })
    }

    pub fn len(&self) -> usize {
        match &self.inner {
            Keyed::Sha256(_) => 32,
            Keyed::Sha1(_) => 20,
            Keyed::Md5(_) => 16,
            Keyed::None => 0,
        }
    }

    /// Compute the MAC over `sequence || data`.
    pub fn generate(&self, sequence: u32, data: &[u8]) -> Vec<u8> {
        let mut seq = [0u8; 4];
        BigEndian::write_u32(&mut seq, sequence);
        match &self.inner {
            Keyed::Sha256(m) => {
                let mut m = m.clone();
                m.update(&seq);
                m.update(data);
                m.finalize().into_bytes().to_vec()
            }
            Keyed::Sha1(m) => {
                let mut m = m.clone();
                m.update(&seq);
                m.update(data);
                m.finalize().into_bytes().to_vec()
            }
            Keyed::Md5(m) => {
                let mut m = m.clone();
                m.update(&seq);
                m.update(data);
                m.finalize().into_bytes().to_vec()
            }
            Keyed::None => Vec::new(),
        }
    }

    pub fn verify(&self, sequence: u32, data: &[u8], tag: &[u8]) -> bool {
        let computed = self.generate(sequence, data);
        openssl::memcmp::eq(&computed, tag)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generate_then_verify_succeeds() {
        let mac = MacState::new("hmac-sha2-256", b"sixteen byte key").unwrap();
        let tag = mac.generate(7, b"hello world");
        assert!(mac.verify(7, b"hello world", &tag));
        assert!(!mac.verify(7, b"hello worle", &tag));
        assert!(!mac.verify(8, b"hello world", &tag));
    }

    #[test]
    fn none_mac_is_empty() {
        let mac = MacState::new("none", b"").unwrap();
        assert_eq!(mac.generate(0, b"x"), Vec::<u8>::new());
    }
}
