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
use super::msg;
use crate::encoding::{Encoding, Reader};
use crate::key::PublicKey;
use crate::signature::Signature;
use crate::Error;
use cryptovec::CryptoVec;

/// Frame a message body with its 4-byte big-endian length prefix, the
/// same framing the channel-level agent forwarder uses.
pub fn frame(msg_type: u8, body: impl FnOnce(&mut CryptoVec)) -> CryptoVec {
    let mut buf = CryptoVec::new();
    buf.extend(&[0, 0, 0, 0]);
    buf.push(msg_type);
    body(&mut buf);
    let len = (buf.len() - 4) as u32;
    buf[0..4].copy_from_slice(&len.to_be_bytes());
    buf
}

pub fn request_identities() -> CryptoVec {
    frame(msg::REQUEST_IDENTITIES, |_| {})
}

pub fn legacy_request_identities() -> CryptoVec {
    frame(msg::LEGACY_REQUEST_RSA_IDENTITIES, |_| {})
}

/// `SSH2_AGENTC_SIGN_REQUEST`: sign `data` with the key whose public blob
/// is `key_blob`.
pub fn sign_request(key: &PublicKey, data: &[u8]) -> CryptoVec {
    use crate::key::PubKey;
    let mut blob = CryptoVec::new();
    key.push_to(&mut blob);
    frame(msg::SIGN_REQUEST, |buf| {
        buf.extend_ssh_string(&blob);
        buf.extend_ssh_string(data);
        buf.extend(&[0, 0, 0, 0]); // flags
    })
}

#[derive(Debug)]
pub enum Response {
    Failure,
    Success,
    Identities(Vec<(PublicKey, String)>),
    Signature(Signature),
}

/// Parse one complete, de-framed agent response body (the 4-byte length
/// prefix must already have been consumed by the caller's transport).
pub fn parse_response(body: &[u8]) -> Result<Response, Error> {
    if body.is_empty() {
        return Err(Error::AgentProtocolError);
    }
    match body[0] {
        msg::FAILURE => Ok(Response::Failure),
        msg::SUCCESS => Ok(Response::Success),
        msg::SIGN_RESPONSE => {
            let mut r = body.reader(1);
            let sig_blob = r.read_string()?;
            Ok(Response::Signature(Signature::from_blob(sig_blob)?))
        }
        msg::IDENTITIES_ANSWER => {
            let mut r = body.reader(1);
            let n = r.read_u32()?;
            let mut out = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let blob = r.read_string()?;
                let comment = r.read_string()?;
                if let Ok(key) = parse_public_key_blob(blob) {
                    out.push((key, String::from_utf8_lossy(comment).into_owned()));
                }
            }
            Ok(Response::Identities(out))
        }
        _ => Err(Error::AgentProtocolError),
    }
}

fn parse_public_key_blob(blob: &[u8]) -> Result<PublicKey, Error> {
    let mut r = blob.reader(0);
    let algo = r.read_string()?;
    match algo {
        b"ssh-ed25519" => {
            let raw = r.read_string()?;
            let key =
                openssl::pkey::PKey::public_key_from_raw_bytes(raw, openssl::pkey::Id::ED25519)?;
            Ok(PublicKey::Ed25519 { key })
        }
        b"ssh-rsa" => {
            let e = r.read_mpint()?;
            let n = r.read_mpint()?;
            PublicKey::from_rsa_components(e, n, crate::key::SignatureHash::Sha1)
        }
        b"ssh-dss" => {
            let p = r.read_mpint()?;
            let q = r.read_mpint()?;
            let g = r.read_mpint()?;
            let y = r.read_mpint()?;
            PublicKey::from_dsa_components(p, q, g, y)
        }
        other => Err(Error::UnsupportedKeyType(other.to_vec())),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_identities_frames_correctly() {
        let frame = request_identities();
        assert_eq!(frame.len(), 5);
        assert_eq!(&frame[0..4], &[0, 0, 0, 1]);
        assert_eq!(frame[4], msg::REQUEST_IDENTITIES);
    }

    #[test]
    fn parse_failure_and_success() {
        assert!(matches!(parse_response(&[msg::FAILURE]).unwrap(), Response::Failure));
        assert!(matches!(parse_response(&[msg::SUCCESS]).unwrap(), Response::Success));
    }
}
