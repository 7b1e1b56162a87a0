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
//! Host-key and user-key types, for both wire generations.
//!
//! SSH-1 only ever speaks RSA (`Ssh1RsaPublic`/`Ssh1RsaPrivate`); SSH-2
//! host/user keys are `ssh-rsa`, `ssh-dss` or `ssh-ed25519`, matching
//! thrussh's `PublicKey`/`KeyPair` split but widened to cover the older
//! algorithms a client speaking both protocol generations needs.

use crate::encoding::{push_ssh1_mpint, Encoding};
use crate::Error;
use cryptovec::CryptoVec;
use md5::{Digest, Md5};
use num_bigint::BigUint;
use openssl::dsa::Dsa;
use openssl::hash::MessageDigest;
use openssl::pkey::{Id, PKey, Private, Public};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Name(pub &'static str);
impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        self.0
    }
}

pub const SSH_RSA: Name = Name("ssh-rsa");
pub const SSH_DSS: Name = Name("ssh-dss");
pub const ED25519: Name = Name("ssh-ed25519");
pub const RSA_SHA2_256: Name = Name("rsa-sha2-256");
pub const RSA_SHA2_512: Name = Name("rsa-sha2-512");

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum SignatureHash {
    Sha1,
    Sha256,
    Sha512,
}

impl SignatureHash {
    pub fn name(&self) -> Name {
        match *self {
            SignatureHash::Sha1 => SSH_RSA,
            SignatureHash::Sha256 => RSA_SHA2_256,
            SignatureHash::Sha512 => RSA_SHA2_512,
        }
    }

    fn to_message_digest(self) -> MessageDigest {
        match self {
            SignatureHash::Sha1 => MessageDigest::sha1(),
            SignatureHash::Sha256 => MessageDigest::sha256(),
            SignatureHash::Sha512 => MessageDigest::sha512(),
        }
    }
}

/// An SSH-1 RSA public key: just the modulus and public exponent (no
/// algorithm-name prefix on the wire, unlike SSH-2 blobs).
#[derive(Clone, Debug)]
pub struct Ssh1RsaPublic {
    pub e: BigUint,
    pub n: BigUint,
}

impl Ssh1RsaPublic {
    pub fn bits(&self) -> u32 {
        self.n.bits() as u32
    }

    /// `MD5(host_key_n || server_key_n)`-style session-id inputs require
    /// the raw modulus bytes, not the SSH-1 mpint encoding.
    pub fn modulus_bytes(&self) -> Vec<u8> {
        self.n.to_bytes_be()
    }

    pub fn push_ssh1(&self, buf: &mut CryptoVec) {
        buf.extend(&self.bits().to_be_bytes()[2..]); // uint16 bits, big-endian
        push_ssh1_mpint(buf, &self.e.to_bytes_be());
        push_ssh1_mpint(buf, &self.n.to_bytes_be());
    }
}

#[derive(Clone)]
pub enum PublicKey {
    Rsa { key: PKey<Public>, hash: SignatureHash },
    Dsa { key: PKey<Public> },
    Ed25519 { key: PKey<Public> },
    Ssh1Rsa(Ssh1RsaPublic),
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}
impl Eq for PublicKey {}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.name())
    }
}

pub enum KeyPair {
    Rsa { key: PKey<Private>, hash: SignatureHash },
    Dsa { key: PKey<Private> },
    Ed25519 { key: PKey<Private> },
    Ssh1Rsa { e: BigUint, n: BigUint, d: BigUint, p: BigUint, q: BigUint },
}

impl KeyPair {
    pub fn generate_ed25519() -> Result<Self, Error> {
        let key = PKey::generate_ed25519()?;
        Ok(KeyPair::Ed25519 { key })
    }

    pub fn name(&self) -> &'static str {
        match self {
            KeyPair::Rsa { hash, .. } => hash.name().0,
            KeyPair::Dsa { .. } => SSH_DSS.0,
            KeyPair::Ed25519 { .. } => ED25519.0,
            KeyPair::Ssh1Rsa { .. } => SSH_RSA.0,
        }
    }

    pub fn clone_public_key(&self) -> Result<PublicKey, Error> {
        Ok(match self {
            KeyPair::Rsa { key, hash } => PublicKey::Rsa {
                key: PKey::public_key_from_der(&key.public_key_to_der()?)?,
                hash: *hash,
            },
            KeyPair::Dsa { key } => PublicKey::Dsa {
                key: PKey::public_key_from_der(&key.public_key_to_der()?)?,
            },
            KeyPair::Ed25519 { key } => PublicKey::Ed25519 {
                key: PKey::public_key_from_der(&key.public_key_to_der()?)?,
            },
            KeyPair::Ssh1Rsa { e, n, .. } => {
                PublicKey::Ssh1Rsa(Ssh1RsaPublic { e: e.clone(), n: n.clone() })
            }
        })
    }

    /// Sign `to_sign` with this key, producing an SSH-2 signature blob:
    /// `string algo_name; string signature`.
    pub fn sign_ssh2(&self, to_sign: &[u8]) -> Result<CryptoVec, Error> {
        let (name, digest, pkey): (&str, MessageDigest, &PKey<Private>) = match self {
            KeyPair::Rsa { key, hash } => (hash.name().0, hash.to_message_digest(), key),
            KeyPair::Dsa { key } => (SSH_DSS.0, MessageDigest::sha1(), key),
            KeyPair::Ed25519 { key } => (ED25519.0, MessageDigest::null(), key),
            KeyPair::Ssh1Rsa { .. } => return Err(Error::UnsupportedKeyType(b"ssh-rsa(v1)".to_vec())),
        };
        let raw_sig = if let KeyPair::Ed25519 { key } = self {
            let mut signer = Signer::new_without_digest(key)?;
            signer.sign_oneshot_to_vec(to_sign)?
        } else {
            let mut signer = Signer::new(digest, pkey)?;
            signer.update(to_sign)?;
            signer.sign_to_vec()?
        };
        let mut out = CryptoVec::new();
        out.extend_ssh_string(name.as_bytes());
        out.extend_ssh_string(&raw_sig);
        Ok(out)
    }

    /// Produce the raw 16-byte MD5(challenge) response SSH-1
    /// `CMSG_AUTH_RSA_RESPONSE` expects: decrypt an RSA-encrypted challenge
    /// with the private key and hash the result.
    pub fn ssh1_decrypt_challenge(&self, encrypted_challenge: &[u8]) -> Result<[u8; 16], Error> {
        match self {
            KeyPair::Ssh1Rsa { e, n, d, .. } => {
                let decrypted = rsa_raw_decrypt(encrypted_challenge, n, d, &e.clone());
                let mut hasher = Md5::new();
                hasher.update(&decrypted);
                let digest = hasher.finalize();
                let mut out = [0u8; 16];
                out.copy_from_slice(&digest);
                Ok(out)
            }
            _ => Err(Error::UnsupportedKeyType(b"ssh-rsa(v1)".to_vec())),
        }
    }
}

/// Textbook RSA decryption `c^d mod n`, used only for the SSH-1 challenge
/// response (not a general-purpose padding-aware decrypt).
fn rsa_raw_decrypt(c: &[u8], n: &BigUint, d: &BigUint, _e: &BigUint) -> Vec<u8> {
    let c = BigUint::from_bytes_be(c);
    let m = c.modpow(d, n);
    m.to_bytes_be()
}

pub trait PubKey {
    /// Append the SSH-2 public key blob (`string algo; ...`) to `buffer`.
    fn push_to(&self, buffer: &mut CryptoVec);
    fn name(&self) -> &'static str;
    fn fingerprint(&self) -> String;
    fn verify(&self, data: &[u8], sig: &[u8]) -> bool;
}

impl PubKey for PublicKey {
    fn push_to(&self, buffer: &mut CryptoVec) {
        match self {
            PublicKey::Ed25519 { key } => {
                let raw = key.raw_public_key().unwrap_or_default();
                buffer.extend_ssh_string(ED25519.0.as_bytes());
                buffer.extend_ssh_string(&raw);
            }
            PublicKey::Rsa { key, .. } => {
                let rsa = key.rsa().expect("rsa key");
                let e = rsa.e().to_vec();
                let n = rsa.n().to_vec();
                buffer.extend_ssh_string(SSH_RSA.0.as_bytes());
                buffer.extend_ssh_mpint(&e);
                buffer.extend_ssh_mpint(&n);
            }
            PublicKey::Dsa { key } => {
                let dsa = key.dsa().expect("dsa key");
                buffer.extend_ssh_string(SSH_DSS.0.as_bytes());
                buffer.extend_ssh_mpint(&dsa.p().to_vec());
                buffer.extend_ssh_mpint(&dsa.q().to_vec());
                buffer.extend_ssh_mpint(&dsa.g().to_vec());
                buffer.extend_ssh_mpint(&dsa.pub_key().to_vec());
            }
            PublicKey::Ssh1Rsa(k) => k.push_ssh1(buffer),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            PublicKey::Ed25519 { .. } => ED25519.0,
            PublicKey::Rsa { hash, .. } => hash.name().0,
            PublicKey::Dsa { .. } => SSH_DSS.0,
            PublicKey::Ssh1Rsa(_) => SSH_RSA.0,
        }
    }

    /// OpenSSH-style `MD5:aa:bb:..` fingerprint over the SSH-2 blob (or,
    /// for SSH-1, over `modulus || exponent`, matching `ssh-keygen -l`
    /// behaviour against `.pub` files of that era).
    fn fingerprint(&self) -> String {
        let mut buf = CryptoVec::new();
        match self {
            PublicKey::Ssh1Rsa(k) => {
                buf.extend(&k.n.to_bytes_be());
                buf.extend(&k.e.to_bytes_be());
            }
            _ => self.push_to(&mut buf),
        }
        let mut hasher = Md5::new();
        hasher.update(&buf[..]);
        let digest = hasher.finalize();
        let mut s = String::from("MD5:");
        for (i, b) in digest.iter().enumerate() {
            if i > 0 {
                s.push(':');
            }
            s.push_str(&format!("{:02x}", b));
        }
        s
    }

    fn verify(&self, data: &[u8], sig: &[u8]) -> bool {
        match self {
            PublicKey::Ed25519 { key } => {
                Verifier::new_without_digest(key)
                    .and_then(|mut v| v.verify_oneshot(sig, data))
                    .unwrap_or(false)
            }
            PublicKey::Rsa { key, hash } => Verifier::new(hash.to_message_digest(), key)
                .and_then(|mut v| {
                    v.update(data)?;
                    v.verify(sig)
                })
                .unwrap_or(false),
            PublicKey::Dsa { key } => Verifier::new(MessageDigest::sha1(), key)
                .and_then(|mut v| {
                    v.update(data)?;
                    v.verify(sig)
                })
                .unwrap_or(false),
            PublicKey::Ssh1Rsa(_) => false, // SSH-1 never verifies a host signature this way.
        }
    }
}

impl PublicKey {
    pub fn from_rsa_components(e: &[u8], n: &[u8], hash: SignatureHash) -> Result<Self, Error> {
        let rsa = Rsa::from_public_components(
            openssl::bn::BigNum::from_slice(n)?,
            openssl::bn::BigNum::from_slice(e)?,
        )?;
        Ok(PublicKey::Rsa { key: PKey::from_rsa(rsa)?, hash })
    }

    pub fn from_dsa_components(p: &[u8], q: &[u8], g: &[u8], y: &[u8]) -> Result<Self, Error> {
        let dsa = Dsa::from_public_components(
            openssl::bn::BigNum::from_slice(p)?,
            openssl::bn::BigNum::from_slice(q)?,
            openssl::bn::BigNum::from_slice(g)?,
            openssl::bn::BigNum::from_slice(y)?,
        )?;
        Ok(PublicKey::Dsa { key: PKey::from_dsa(dsa)? })
    }
}

impl PubKey for KeyPair {
    fn push_to(&self, buffer: &mut CryptoVec) {
        // Cheap: derive the public half and reuse its encoding.
        let public = self.clone_public_key().expect("public half always derivable");
        public.push_to(buffer)
    }
    fn name(&self) -> &'static str {
        KeyPair::name(self)
    }
    fn fingerprint(&self) -> String {
        self.clone_public_key().expect("public half always derivable").fingerprint()
    }
    fn verify(&self, _data: &[u8], _sig: &[u8]) -> bool {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ed25519_roundtrip_sign_verify() {
        let pair = KeyPair::generate_ed25519().unwrap();
        let public = pair.clone_public_key().unwrap();
        let sig = pair.sign_ssh2(b"hello world").unwrap();
        // sig = string "ssh-ed25519"; string raw_sig
        use crate::encoding::Reader;
        let mut r = sig.reader(0);
        let algo = r.read_string().unwrap();
        assert_eq!(algo, ED25519.0.as_bytes());
        let raw_sig = r.read_string().unwrap();
        assert!(public.verify(b"hello world", raw_sig));
        assert!(!public.verify(b"tampered", raw_sig));
    }
}
