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
//! Algorithm registries (component D): static tables of the ciphers,
//! MACs, compressors, KEX methods and host-key algorithms a session can
//! negotiate, plus the "first of ours that's also in theirs" selection
//! rule shared by cipher/host-key/MAC/compression negotiation.

use crate::cipher;
use crate::Error;
use cryptovec::CryptoVec;
use rand::RngCore;
use sshcore_keys::encoding::{Encoding, Reader};
use sshcore_keys::key;

/// A DH key-exchange method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KexName(pub &'static str);
impl AsRef<str> for KexName {
    fn as_ref(&self) -> &str {
        self.0
    }
}

pub const DH_GROUP1_SHA1: KexName = KexName("diffie-hellman-group1-sha1");
pub const DH_GROUP14_SHA1: KexName = KexName("diffie-hellman-group14-sha1");
pub const DH_GEX_SHA1: KexName = KexName("diffie-hellman-group-exchange-sha1");

#[derive(Debug, Clone, Copy)]
pub struct Preferred {
    pub kex: &'static [KexName],
    pub key: &'static [key::Name],
    pub cipher: &'static [cipher::Name],
    pub mac: &'static [&'static str],
    pub compression: &'static [&'static str],
}

impl Preferred {
    pub const DEFAULT: Preferred = Preferred {
        kex: &[DH_GEX_SHA1, DH_GROUP14_SHA1, DH_GROUP1_SHA1],
        key: &[key::ED25519, key::RSA_SHA2_256, key::SSH_RSA, key::SSH_DSS],
        cipher: &[cipher::AES256_CTR, cipher::AES128_CTR, cipher::THREE_DES_CBC, cipher::BLOWFISH_CBC],
        mac: &["hmac-sha2-256", "hmac-sha1", "hmac-md5"],
        compression: &["none", "zlib@openssh.com", "zlib"],
    };

    /// The `ssh2_hmac_bug` substitute list: some 2.0-2.3 servers
    /// mis-specify the MAC and only (mis)understand `hmac-md5` or no MAC
    /// at all.
    pub const BUGGY_MAC: &'static [&'static str] = &["hmac-md5", "none"];
}

impl Default for Preferred {
    fn default() -> Self {
        Preferred::DEFAULT
    }
}

#[derive(Debug)]
pub struct Names {
    pub kex: KexName,
    pub key: key::Name,
    pub cipher: cipher::Name,
    pub mac: &'static str,
    pub client_compression: &'static str,
    pub server_compression: &'static str,
    pub ignore_guessed: bool,
}

/// The "first of ours that's also in theirs" selector: scan our preferred
/// list in order and return the first entry also present in the peer's
/// comma-separated list.
pub fn select<S: AsRef<str> + Copy>(ours: &[S], theirs: &[u8]) -> Option<(bool, S)> {
    let mut first = true;
    for &o in ours {
        for t in theirs.split(|&b| b == b',') {
            if t == o.as_ref().as_bytes() {
                return Some((first, o));
            }
            first = false;
        }
    }
    None
}

/// Parse a peer `KEXINIT` payload (starting just after the 16-byte
/// cookie) against our preferences.
pub fn read_kex(buffer: &[u8], pref: &Preferred, buggy_mac: bool) -> Result<Names, Error> {
    let mut r = buffer.reader(17);
    let kex_str = r.read_string()?;
    let (kex_first, kex) = select(pref.kex, kex_str).ok_or(Error::NoCommonKexAlgo)?;

    let key_str = r.read_string()?;
    let (key_first, key) = select(pref.key, key_str).ok_or(Error::NoCommonKeyAlgo)?;

    let cipher_cs = r.read_string()?;
    let (_, cipher) = select(pref.cipher, cipher_cs).ok_or(Error::NoCommonCipher)?;
    r.read_string()?; // cipher server-to-client; we use the same list both ways.

    let mac_list: &[&str] = if buggy_mac { Preferred::BUGGY_MAC } else { pref.mac };
    let mac_cs = r.read_string()?;
    let (_, mac) = select(mac_list, mac_cs).ok_or(Error::NoCommonMac)?;
    r.read_string()?; // mac server-to-client

    let (_, client_compression) =
        select(pref.compression, r.read_string()?).ok_or(Error::NoCommonCompression)?;
    let (_, server_compression) =
        select(pref.compression, r.read_string()?).ok_or(Error::NoCommonCompression)?;

    r.read_string()?; // languages client-to-server
    r.read_string()?; // languages server-to-client
    let follows = r.read_byte()? != 0;

    Ok(Names {
        kex,
        key,
        cipher,
        mac,
        client_compression,
        server_compression,
        ignore_guessed: follows && !(kex_first && key_first),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn select_picks_first_of_ours_present_in_theirs() {
        let ours = [DH_GEX_SHA1, DH_GROUP14_SHA1, DH_GROUP1_SHA1];
        let theirs = b"diffie-hellman-group1-sha1,diffie-hellman-group14-sha1";
        let (first, picked) = select(&ours, theirs).unwrap();
        assert_eq!(picked, DH_GROUP14_SHA1);
        assert!(!first, "group14 is not the first entry in our list");
    }

    #[test]
    fn select_returns_none_with_no_overlap() {
        let ours = [DH_GEX_SHA1];
        let theirs = b"diffie-hellman-group14-sha1";
        assert!(select(&ours, theirs).is_none());
    }

    #[test]
    fn read_kex_rejects_unsupported_cipher() {
        let mut buf = CryptoVec::new();
        buf.extend(&[0u8; 17]); // msg type + 16-byte cookie
        buf.extend_ssh_string(DH_GROUP14_SHA1.0.as_bytes());
        buf.extend_ssh_string(key::ED25519.0.as_bytes());
        buf.extend_ssh_string(b"some-unknown-cipher");
        buf.extend_ssh_string(b"some-unknown-cipher");
        buf.extend_ssh_string(b"hmac-sha2-256");
        buf.extend_ssh_string(b"hmac-sha2-256");
        buf.extend_ssh_string(b"none");
        buf.extend_ssh_string(b"none");
        buf.extend_ssh_string(b"");
        buf.extend_ssh_string(b"");
        buf.push(0);
        buf.extend(&[0, 0, 0, 0]);

        let err = read_kex(&buf, &Preferred::DEFAULT, false).unwrap_err();
        assert!(matches!(err, Error::NoCommonCipher));
    }
}

/// Build and append a `KEXINIT` payload.
pub fn write_kex(pref: &Preferred, buf: &mut CryptoVec) {
    buf.push(crate::msg::ssh2::KEXINIT);
    let mut cookie = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut cookie);
    buf.extend(&cookie);
    buf.extend_list(pref.kex.iter());
    buf.extend_list(pref.key.iter());
    buf.extend_list(pref.cipher.iter());
    buf.extend_list(pref.cipher.iter());
    buf.extend_list(pref.mac.iter());
    buf.extend_list(pref.mac.iter());
    buf.extend_list(pref.compression.iter());
    buf.extend_list(pref.compression.iter());
    buf.write_empty_list();
    buf.write_empty_list();
    buf.push(0); // first_kex_packet_follows = false: we never guess.
    buf.extend(&[0, 0, 0, 0]);
}
