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
//! Authentication state machines (component H): SSH-2 `USERAUTH_REQUEST`
//! (none-probe, password, publickey via file or agent) and SSH-1's
//! `CMSG_AUTH_*` exchange.

use crate::msg::ssh2 as msg;
use crate::Error;
use cryptovec::CryptoVec;
use rand::RngCore;
use sshcore_keys::encoding::{Encoding, Reader};
use sshcore_keys::key::{KeyPair, PubKey, PublicKey};
use sshcore_keys::signature::Signature;

#[derive(Debug, Clone)]
pub enum Method {
    None,
    Password(String),
    PublicKeyFile,
    PublicKeyAgent,
}

pub enum Ssh2AuthState {
    /// Probing for the method list with `none`: always start with a
    /// none-probe so we learn the server's acceptable list even when it
    /// would have accepted a guessed method.
    Probing,
    /// Waiting for the signature-less `PK_OK` acknowledgement before
    /// sending the real, signed request.
    AwaitingPkOk { key: PublicKey, keypair: Option<KeyPairSource> },
    AwaitingResult { method: Method },
    Done,
    Exhausted,
}

/// Where the private half of a publickey attempt comes from; kept
/// abstract so the agent case never touches the raw key.
pub enum KeyPairSource {
    Local(std::sync::Arc<KeyPair>),
    Agent,
}

pub struct Ssh2Auth {
    state: Ssh2AuthState,
    user: String,
    session_id: [u8; 20],
    remaining_methods: Vec<String>,
}

impl Ssh2Auth {
    pub fn new(user: &str, session_id: [u8; 20]) -> Self {
        Ssh2Auth {
            state: Ssh2AuthState::Probing,
            user: user.to_string(),
            session_id,
            remaining_methods: Vec::new(),
        }
    }

    pub fn start(&mut self) -> Vec<u8> {
        self.state = Ssh2AuthState::AwaitingResult { method: Method::None };
        self.request(Method::None, None)
    }

    fn request(&self, method: Method, sig: Option<(&PublicKey, Option<&Signature>)>) -> Vec<u8> {
        let mut p = CryptoVec::new();
        p.push(msg::USERAUTH_REQUEST);
        p.extend_ssh_string(self.user.as_bytes());
        p.extend_ssh_string(b"ssh-connection");
        match method {
            Method::None => p.extend_ssh_string(b"none"),
            Method::Password(ref pw) => {
                p.extend_ssh_string(b"password");
                p.push(0);
                p.extend_ssh_string(pw.as_bytes());
            }
            Method::PublicKeyFile | Method::PublicKeyAgent => {
                p.extend_ssh_string(b"publickey");
                let (key, signature) = sig.expect("publickey request always carries a key");
                p.push(if signature.is_some() { 1 } else { 0 });
                p.extend_ssh_string(key.name().as_bytes());
                let mut blob = CryptoVec::new();
                key.push_to(&mut blob);
                p.extend_ssh_string(&blob);
                if let Some(sig) = signature {
                    p.extend_ssh_string(&sig.to_blob());
                }
            }
        }
        p.to_vec()
    }

    /// Build the "to-be-signed" blob for a publickey attempt: `string
    /// session_id; byte SSH_MSG_USERAUTH_REQUEST; ...` (RFC 4252 §7).
    fn to_sign(&self, key: &PublicKey) -> CryptoVec {
        let mut out = CryptoVec::new();
        out.extend_ssh_string(&self.session_id);
        out.push(msg::USERAUTH_REQUEST);
        out.extend_ssh_string(self.user.as_bytes());
        out.extend_ssh_string(b"ssh-connection");
        out.extend_ssh_string(b"publickey");
        out.push(1);
        out.extend_ssh_string(key.name().as_bytes());
        let mut blob = CryptoVec::new();
        key.push_to(&mut blob);
        out.extend_ssh_string(&blob);
        out
    }

    /// Offer a password attempt, sent only after `none` has told us the
    /// server still wants authentication and lists `password`. Returns the
    /// request alongside a companion `IGNORE` packet the caller must
    /// defer-send in the same flush, so the password's length is hidden
    /// behind a padded write.
    pub fn try_password(&mut self, password: &str) -> (Vec<u8>, Vec<u8>) {
        let method = Method::Password(password.to_string());
        self.state = Ssh2AuthState::AwaitingResult { method: method.clone() };
        let request = self.request(method, None);
        let ignore = password_padding_packet(request.len());
        (request, ignore)
    }

    /// Probe a local key: sent without a signature first so an
    /// unacceptable key never needs the private half touched.
    pub fn try_publickey_probe(&mut self, key: PublicKey, source: KeyPairSource) -> Vec<u8> {
        let probe = self.request(Method::PublicKeyFile, Some((&key, None)));
        self.state = Ssh2AuthState::AwaitingPkOk { key, keypair: Some(source) };
        probe
    }

    /// Called once `PK_OK` confirms the probed key is acceptable: produces
    /// the signed request. The caller supplies the signature (computed
    /// locally or fetched from an agent) over the blob from `signing_input`.
    pub fn signing_input(&self) -> Option<CryptoVec> {
        match &self.state {
            Ssh2AuthState::AwaitingPkOk { key, .. } => Some(self.to_sign(key)),
            _ => None,
        }
    }

    pub fn complete_publickey(&mut self, signature: Signature) -> Result<Vec<u8>, Error> {
        let key = match &self.state {
            Ssh2AuthState::AwaitingPkOk { key, .. } => key.clone(),
            _ => return Err(Error::Inconsistent),
        };
        let out = self.request(Method::PublicKeyFile, Some((&key, Some(&signature))));
        self.state = Ssh2AuthState::AwaitingResult { method: Method::PublicKeyFile };
        Ok(out)
    }

    /// Feed a `USERAUTH_FAILURE`/`USERAUTH_SUCCESS`/`USERAUTH_PK_OK`
    /// payload. Returns `Ok(true)` once authentication has succeeded.
    pub fn on_payload(&mut self, payload: &[u8]) -> Result<bool, Error> {
        if payload.is_empty() {
            return Err(Error::Inconsistent);
        }
        match payload[0] {
            msg::USERAUTH_SUCCESS => {
                self.state = Ssh2AuthState::Done;
                Ok(true)
            }
            msg::USERAUTH_FAILURE => {
                let mut r = payload.reader(1);
                let methods = r.read_string()?;
                self.remaining_methods = String::from_utf8_lossy(methods)
                    .split(',')
                    .map(|s| s.to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                debug!("server offers auth methods: {:?}", self.remaining_methods);
                if self.remaining_methods.is_empty() {
                    self.state = Ssh2AuthState::Exhausted;
                    return Err(Error::NoAuthMethod);
                }
                Ok(false)
            }
            msg::USERAUTH_PK_OK => Ok(false),
            msg::USERAUTH_BANNER => Ok(false),
            other => Err(Error::UnexpectedPacket(other)),
        }
    }

    pub fn remaining_methods(&self) -> &[String] {
        &self.remaining_methods
    }

    pub fn supports(&self, method: &str) -> bool {
        self.remaining_methods.iter().any(|m| m == method)
    }
}

/// The bucket size a password-carrying write is padded up to, so the
/// packet-length field leaks only which 256-byte bucket the password falls
/// in rather than its exact length (`ssh2_pkt_defer`'s `SSH2_MSG_IGNORE`
/// padding in `ssh.c` does the same with a 256-byte block).
const PASSWORD_PAD_BLOCK: usize = 256;

/// Build the `IGNORE` packet to defer-send alongside a password request so
/// the combined write lands on a `PASSWORD_PAD_BLOCK` boundary.
fn password_padding_packet(real_packet_len: usize) -> Vec<u8> {
    let target = ((real_packet_len / PASSWORD_PAD_BLOCK) + 1) * PASSWORD_PAD_BLOCK;
    let pad_len = target - real_packet_len;
    let mut padding = vec![0u8; pad_len];
    rand::thread_rng().fill_bytes(&mut padding);
    let mut p = CryptoVec::new();
    p.push(msg::IGNORE);
    p.extend_ssh_string(&padding);
    p.to_vec()
}

/// SSH-1's simpler, single-round auth exchange:
/// `CMSG_AUTH_PASSWORD`, or RSA challenge-response via
/// `CMSG_AUTH_RSA`/`SMSG_AUTH_RSA_CHALLENGE`/`CMSG_AUTH_RSA_RESPONSE`.
pub mod ssh1 {
    use crate::msg::ssh1 as msg;
    use crate::Error;
    use rand::RngCore;
    use sshcore_keys::encoding::{push_ssh1_mpint, Encoding, Reader};
    use sshcore_keys::key::{KeyPair, Ssh1RsaPublic};

    pub fn password_request(password: &str) -> (u8, Vec<u8>) {
        let mut p = cryptovec::CryptoVec::new();
        p.extend_ssh_string(password.as_bytes());
        (msg::CMSG_AUTH_PASSWORD, p.to_vec())
    }

    pub fn rsa_offer(public: &Ssh1RsaPublic) -> (u8, Vec<u8>) {
        let mut p = cryptovec::CryptoVec::new();
        push_ssh1_mpint(&mut p, &public.n.to_bytes_be());
        (msg::CMSG_AUTH_RSA, p.to_vec())
    }

    /// Decode `SMSG_AUTH_RSA_CHALLENGE`'s single mpint and answer it by
    /// decrypting with the matching private key.
    pub fn rsa_response(payload: &[u8], key: &KeyPair) -> Result<(u8, Vec<u8>), Error> {
        let mut r = payload.reader(0);
        let challenge = r.read_ssh1_mpint()?;
        let digest = key.ssh1_decrypt_challenge(challenge)?;
        let mut p = cryptovec::CryptoVec::new();
        p.extend(&digest);
        Ok((msg::CMSG_AUTH_RSA_RESPONSE, p.to_vec()))
    }

    pub fn is_success(msg_type: u8) -> bool {
        msg_type == msg::SMSG_SUCCESS
    }

    const PASSWORD_PAD_BLOCK: usize = 256;

    /// Random filler for a same-flush `MSG_IGNORE`, sized so the combined
    /// write lands on a block boundary.
    fn ignore_padding(real_packet_len: usize) -> Vec<u8> {
        let target = ((real_packet_len / PASSWORD_PAD_BLOCK) + 1) * PASSWORD_PAD_BLOCK;
        let mut padding = vec![0u8; target - real_packet_len];
        rand::thread_rng().fill_bytes(&mut padding);
        padding
    }

    /// Embed NUL padding inside the password string itself, used instead of
    /// a companion `MSG_IGNORE` against servers flagged
    /// `chokes_on_ssh1_ignore`: their C-string handling tolerates trailing
    /// NULs but not an `IGNORE` packet before authentication completes.
    fn password_request_nul_padded(password: &str) -> (u8, Vec<u8>) {
        let mut padded = password.as_bytes().to_vec();
        padded.push(0);
        while padded.len() < PASSWORD_PAD_BLOCK {
            padded.push(0);
        }
        let mut p = cryptovec::CryptoVec::new();
        p.extend_ssh_string(&padded);
        (msg::CMSG_AUTH_PASSWORD, p.to_vec())
    }

    /// The steps in a CMSG_USER-driven login, surfaced one at a time as the
    /// server's replies arrive.
    enum State {
        AwaitingUserReply,
        AwaitingAuthReply,
        Done,
    }

    /// Drives SSH-1's login from `CMSG_USER` through whichever
    /// authentication method the server's `SMSG_PUBLIC_KEY` auth mask and
    /// our credentials agree on. Local-key RSA and password are supported;
    /// rhosts, TIS and CryptoCard auth and agent-forwarded RSA are not
    /// offered to the server.
    pub struct Ssh1Auth {
        user: String,
        supported_auths: u32,
        state: State,
    }

    fn auth_bit(auth_type: u32) -> u32 {
        1 << (auth_type - 1)
    }

    impl Ssh1Auth {
        pub fn new(user: &str, supported_auths: u32) -> Self {
            Ssh1Auth { user: user.to_string(), supported_auths, state: State::AwaitingUserReply }
        }

        pub fn start(&self) -> (u8, Vec<u8>) {
            let mut p = cryptovec::CryptoVec::new();
            p.extend_ssh_string(self.user.as_bytes());
            (msg::CMSG_USER, p.to_vec())
        }

        pub fn supports_rsa(&self) -> bool {
            self.supported_auths & auth_bit(msg::AUTH_RSA) != 0
        }

        pub fn supports_password(&self) -> bool {
            self.supported_auths & auth_bit(msg::AUTH_PASSWORD) != 0
        }

        pub fn try_rsa(&mut self, public: &Ssh1RsaPublic) -> (u8, Vec<u8>) {
            self.state = State::AwaitingAuthReply;
            rsa_offer(public)
        }

        pub fn answer_challenge(&mut self, payload: &[u8], key: &KeyPair) -> Result<(u8, Vec<u8>), Error> {
            rsa_response(payload, key)
        }

        /// Offer a password, returning the request alongside the masking
        /// packet (a companion `MSG_IGNORE`, or `None` when the padding was
        /// folded into the request itself) to defer-send in one flush.
        pub fn try_password(&mut self, password: &str, chokes_on_ignore: bool) -> ((u8, Vec<u8>), Option<(u8, Vec<u8>)>) {
            self.state = State::AwaitingAuthReply;
            if chokes_on_ignore {
                (password_request_nul_padded(password), None)
            } else {
                let (ty, data) = password_request(password);
                let ignore = ignore_padding(data.len());
                ((ty, data), Some((msg::MSG_IGNORE, ignore)))
            }
        }

        /// Feed `SMSG_SUCCESS`/`SMSG_FAILURE` in reply to `CMSG_USER` or an
        /// auth attempt. `Ok(true)` once the server has admitted us.
        pub fn on_payload(&mut self, msg_type: u8) -> Result<bool, Error> {
            match msg_type {
                t if t == msg::SMSG_SUCCESS => {
                    self.state = State::Done;
                    Ok(true)
                }
                t if t == msg::SMSG_FAILURE => {
                    if matches!(self.state, State::AwaitingUserReply) {
                        self.state = State::AwaitingAuthReply;
                    }
                    Ok(false)
                }
                other => Err(Error::UnexpectedPacket(other)),
            }
        }
    }

    #[cfg(test)]
    mod test {
        use super::*;

        #[test]
        fn rsa_and_password_bits_read_from_the_auth_mask() {
            let rsa_only = Ssh1Auth::new("alice", auth_bit(msg::AUTH_RSA));
            assert!(rsa_only.supports_rsa());
            assert!(!rsa_only.supports_password());

            let password_only = Ssh1Auth::new("alice", auth_bit(msg::AUTH_PASSWORD));
            assert!(!password_only.supports_rsa());
            assert!(password_only.supports_password());
        }

        #[test]
        fn password_attempt_without_the_ignore_bug_is_masked() {
            let mut auth = Ssh1Auth::new("alice", auth_bit(msg::AUTH_PASSWORD));
            let ((_, request), ignore) = auth.try_password("hunter2", false);
            let (ignore_ty, ignore_data) = ignore.expect("masking packet expected");
            assert_eq!(ignore_ty, msg::MSG_IGNORE);
            assert_eq!((request.len() + ignore_data.len()) % PASSWORD_PAD_BLOCK, 0);
        }

        #[test]
        fn password_attempt_with_the_ignore_bug_pads_in_place() {
            let mut auth = Ssh1Auth::new("alice", auth_bit(msg::AUTH_PASSWORD));
            let ((_, request), ignore) = auth.try_password("hunter2", true);
            assert!(ignore.is_none());
            assert!(request.len() >= PASSWORD_PAD_BLOCK);
        }

        #[test]
        fn success_after_cmsg_user_short_circuits() {
            let mut auth = Ssh1Auth::new("alice", 0);
            assert!(auth.on_payload(msg::SMSG_SUCCESS).unwrap());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn none_probe_then_failure_lists_methods() {
        let mut auth = Ssh2Auth::new("alice", [0u8; 20]);
        let _ = auth.start();
        let mut failure = CryptoVec::new();
        failure.push(msg::USERAUTH_FAILURE);
        failure.extend_ssh_string(b"password,publickey");
        failure.push(0);
        let done = auth.on_payload(&failure).unwrap();
        assert!(!done);
        assert!(auth.supports("password"));
        assert!(auth.supports("publickey"));
        assert!(!auth.supports("keyboard-interactive"));
    }

    #[test]
    fn success_short_circuits() {
        let mut auth = Ssh2Auth::new("alice", [1u8; 20]);
        let done = auth.on_payload(&[msg::USERAUTH_SUCCESS]).unwrap();
        assert!(done);
    }

    #[test]
    fn exhausted_methods_is_an_error() {
        let mut auth = Ssh2Auth::new("alice", [2u8; 20]);
        let mut failure = CryptoVec::new();
        failure.push(msg::USERAUTH_FAILURE);
        failure.extend_ssh_string(b"");
        failure.push(0);
        assert!(auth.on_payload(&failure).is_err());
    }
}
