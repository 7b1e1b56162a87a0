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
//! The SSH-2 signature blob format (`string algo_name; string sig_bytes`),
//! used both for `USERAUTH_REQUEST` publickey signatures and agent
//! `SIGN_RESPONSE` payloads.

use crate::encoding::{Encoding, Reader};
use crate::key::SignatureHash;
use crate::Error;
use cryptovec::CryptoVec;

#[derive(Clone, Debug)]
pub enum Signature {
    Ed25519(Vec<u8>),
    Rsa { hash: SignatureHash, bytes: Vec<u8> },
    Dsa(Vec<u8>),
}

impl Signature {
    pub fn to_blob(&self) -> CryptoVec {
        let (name, bytes): (&str, &[u8]) = match self {
            Signature::Ed25519(b) => ("ssh-ed25519", b),
            Signature::Rsa { hash, bytes } => (hash.name().0, bytes),
            Signature::Dsa(b) => ("ssh-dss", b),
        };
        let mut out = CryptoVec::new();
        out.extend_ssh_string(name.as_bytes());
        out.extend_ssh_string(bytes);
        out
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self, Error> {
        let mut r = blob.reader(0);
        let typ = r.read_string()?;
        let bytes = r.read_string()?.to_vec();
        match typ {
            b"ssh-ed25519" => Ok(Signature::Ed25519(bytes)),
            b"rsa-sha2-256" => Ok(Signature::Rsa { hash: SignatureHash::Sha256, bytes }),
            b"rsa-sha2-512" => Ok(Signature::Rsa { hash: SignatureHash::Sha512, bytes }),
            b"ssh-rsa" => Ok(Signature::Rsa { hash: SignatureHash::Sha1, bytes }),
            b"ssh-dss" => Ok(Signature::Dsa(bytes)),
            other => Err(Error::UnknownSignatureType {
                sig_type: String::from_utf8_lossy(other).into_owned(),
            }),
        }
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        match self {
            Signature::Ed25519(b) | Signature::Dsa(b) => b,
            Signature::Rsa { bytes, .. } => bytes,
        }
    }
}
