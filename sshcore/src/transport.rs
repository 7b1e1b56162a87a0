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
//! The SSH-2 transport layer (component G): version exchange, KEXINIT
//! negotiation, Diffie-Hellman key exchange and rekeying. Modeled as an
//! explicit state machine fed bytes and producing output bytes plus
//! higher-level events, rather than owning a socket or an event loop
//! (those live in the host program, on the far side of the backend
//! façade).

use crate::cipher::{self, CipherPair, CipherState};
use crate::compression::{Compress, Compression, Decompress};
use crate::kex::{self, DhKeys};
use crate::mac::MacState;
use crate::msg::ssh1 as msg1;
use crate::msg::ssh2 as msg;
use crate::negotiation::{self, Names, Preferred};
use crate::packet1::{Ssh1Reader, Ssh1Writer};
use crate::packet2::{Ssh2Reader, Ssh2Writer};
use crate::version::{self, BugCompat, ProtoVersion};
use crate::Error;
use md5::{Digest, Md5};
use num_bigint::BigUint;
use openssl::symm::Mode;
use sshcore_keys::encoding::{push_ssh1_mpint, Encoding, Reader};
use sshcore_keys::key::{PubKey, PublicKey, Ssh1RsaPublic};

/// A decoded event the host program needs to act on.
pub enum Event {
    /// The server's host key, offered for the one-time trust decision
    /// against the `known_hosts`-style cache.
    HostKey(PublicKey),
    /// Key exchange (first one or a rekey) completed successfully.
    KexDone,
    /// A fully decoded, post-KEX payload ready for the auth/channel layer.
    Payload(Vec<u8>),
    Disconnect { reason: u32, message: String },
    Ignore,
    Debug(String),
}

enum KexState {
    /// Waiting for our own `KEXINIT` to be sent and the peer's to arrive.
    AwaitingPeerInit { our_kexinit: Vec<u8> },
    /// Negotiated; waiting on our encrypted DH reply.
    Dh { our_kexinit: Vec<u8>, peer_kexinit: Vec<u8>, names: Names, dh: DhKeys },
    /// `NEWKEYS` sent; waiting for the peer's before installing read keys.
    WaitNewKeys { pending: Box<PendingKeys> },
    Done,
}

struct PendingKeys {
    session_id: [u8; 20],
    names: Names,
    keys: kex::Keys,
}

pub struct Transport {
    pub bugs: BugCompat,
    our_version: String,
    peer_version: Option<String>,
    pref: Preferred,
    kex: KexState,
    session_id: Option<[u8; 20]>,
    cipher: CipherPair,
    mac_c_to_s: Option<MacState>,
    mac_s_to_c: Option<MacState>,
    compress: Compress,
    decompress: Decompress,
    reader: Ssh2Reader,
    writer: Ssh2Writer,
    bytes_since_rekey: u64,
    rekey_after_bytes: u64,
    /// Packets framed via [`Transport::defer`] but not yet handed to the
    /// caller, so several can reach the wire in one write (`ssh2_pkt_defer`
    /// / `ssh_pkt_defersend` in `ssh.c`) — used to hide a password's length
    /// behind a same-flush `IGNORE` packet.
    deferred: Vec<u8>,
}

/// Rekey after 1 GiB either direction, matching the RFC 4253 recommended
/// ceiling for the weakest negotiable cipher.
const DEFAULT_REKEY_BYTES: u64 = 1 << 30;

impl Transport {
    pub fn new(pref: Preferred) -> Self {
        Transport {
            bugs: BugCompat::default(),
            our_version: version::CLIENT_BANNER_SSH2.to_string(),
            peer_version: None,
            pref,
            kex: KexState::Done,
            session_id: None,
            cipher: CipherPair::clear(),
            mac_c_to_s: None,
            mac_s_to_c: None,
            compress: Compress::None,
            decompress: Decompress::None,
            reader: Ssh2Reader::new(),
            writer: Ssh2Writer::new(),
            bytes_since_rekey: 0,
            rekey_after_bytes: DEFAULT_REKEY_BYTES,
            deferred: Vec::new(),
        }
    }

    pub fn our_banner_line(&self) -> Vec<u8> {
        let mut v = self.our_version.as_bytes().to_vec();
        v.extend(b"\r\n");
        v
    }

    /// Record the peer's version banner (read by the caller, one line at
    /// a time, until the `SSH-` prefix is seen) and, for SSH-2 peers, kick
    /// off key exchange. An SSH-1 banner is reported back with no output:
    /// the caller switches to driving an [`Ssh1Transport`] instead, since
    /// SSH-1's key exchange is not KEXINIT-shaped.
    pub fn on_peer_banner(&mut self, line: &str) -> Result<(ProtoVersion, Vec<u8>), Error> {
        let (proto, _comment) = version::parse_banner(line)?;
        self.bugs = version::detect_bugs(line);
        self.peer_version = Some(line.trim_end().to_string());
        let out = match proto {
            ProtoVersion::Ssh2 => self.start_kex(),
            ProtoVersion::Ssh1 => Vec::new(),
        };
        Ok((proto, out))
    }

    fn start_kex(&mut self) -> Vec<u8> {
        let mut payload = cryptovec::CryptoVec::new();
        negotiation::write_kex(&self.pref, &mut payload);
        let framed = self
            .writer
            .write_packet(&payload, &mut self.cipher.local_to_remote, self.mac_c_to_s.as_ref())
            .expect("clear or freshly-keyed cipher never fails to frame");
        self.kex = KexState::AwaitingPeerInit { our_kexinit: payload.to_vec() };
        framed
    }

    /// Request a rekey proactively, triggered by byte thresholds, elapsed
    /// time, or an explicit host-program request.
    pub fn request_rekey(&mut self) -> Vec<u8> {
        debug!("starting rekey ({} bytes since last kex)", self.bytes_since_rekey);
        self.start_kex()
    }

    pub fn rekey_due(&self) -> bool {
        self.bytes_since_rekey >= self.rekey_after_bytes
    }

    /// The session id, frozen at the first key exchange; `None` until
    /// that first `KEXDH_REPLY`/`KEX_DH_GEX_REPLY` lands.
    pub fn session_id(&self) -> Option<[u8; 20]> {
        self.session_id
    }

    /// Feed freshly-arrived bytes; returns any events decoded along the
    /// way and any bytes that must be written back to the peer.
    pub fn feed(&mut self, data: &[u8]) -> Result<(Vec<Event>, Vec<u8>), Error> {
        self.bytes_since_rekey += data.len() as u64;
        let mut events = Vec::new();
        let mut out = Vec::new();
        let mut first = true;
        loop {
            let chunk = if first { data } else { &[][..] };
            first = false;
            let maybe = self.reader.feed(chunk, &mut self.cipher.remote_to_local, self.mac_s_to_c.as_ref())?;
            match maybe {
                None => break,
                Some(payload) => {
                    let (mut ev, mut wr) = self.on_payload(payload)?;
                    events.append(&mut ev);
                    out.append(&mut wr);
                }
            }
        }
        Ok((events, out))
    }

    fn on_payload(&mut self, payload: Vec<u8>) -> Result<(Vec<Event>, Vec<u8>), Error> {
        let mut out = Vec::new();
        let mut events = Vec::new();
        if payload.is_empty() {
            return Err(Error::Inconsistent);
        }
        match payload[0] {
            msg::DISCONNECT => {
                let mut r = payload.reader(1);
                let reason = r.read_u32().unwrap_or(0);
                let message = r.read_string().ok().and_then(|s| std::str::from_utf8(s).ok()).unwrap_or("").to_string();
                events.push(Event::Disconnect { reason, message });
            }
            msg::IGNORE => events.push(Event::Ignore),
            msg::DEBUG => {
                let mut r = payload.reader(2);
                let text = r.read_string().ok().and_then(|s| std::str::from_utf8(s).ok()).unwrap_or("").to_string();
                events.push(Event::Debug(text));
            }
            msg::UNIMPLEMENTED => {}
            msg::KEXINIT => {
                let mut w = self.handle_kexinit(&payload)?;
                out.append(&mut w);
            }
            msg::KEXDH_REPLY | msg::KEX_DH_GEX_GROUP | msg::KEX_DH_GEX_REPLY => {
                let (mut ev, mut w) = self.handle_dh_message(payload[0], &payload)?;
                events.append(&mut ev);
                out.append(&mut w);
            }
            msg::NEWKEYS => {
                self.handle_newkeys()?;
                events.push(Event::KexDone);
            }
            _ => events.push(Event::Payload(payload)),
        }
        Ok((events, out))
    }

    fn handle_kexinit(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let our_kexinit = match &self.kex {
            KexState::AwaitingPeerInit { our_kexinit } => our_kexinit.clone(),
            KexState::Done => self.start_kex_silently(),
            _ => return Err(Error::KexInit),
        };
        let names = negotiation::read_kex(payload, &self.pref, self.bugs.ssh2_hmac_bug)?;
        // Only `diffie-hellman-group-exchange-sha1` needs a request round
        // trip; the fixed groups can send their public value immediately.
        let out = if names.kex.0 == negotiation::DH_GEX_SHA1.0 {
            let mut req = cryptovec::CryptoVec::new();
            req.push(msg::KEX_DH_GEX_REQUEST);
            req.extend(&1024u32.to_be_bytes());
            req.extend(&2048u32.to_be_bytes());
            req.extend(&8192u32.to_be_bytes());
            self.writer.write_packet(&req, &mut self.cipher.local_to_remote, self.mac_c_to_s.as_ref())?
        } else {
            let dh = DhKeys::generate(if names.kex.0 == negotiation::DH_GROUP1_SHA1.0 {
                kex::group1()
            } else {
                kex::group14()
            });
            let mut init = cryptovec::CryptoVec::new();
            init.push(msg::KEXDH_INIT);
            init.extend_ssh_mpint(&dh.e.to_bytes_be());
            let framed =
                self.writer.write_packet(&init, &mut self.cipher.local_to_remote, self.mac_c_to_s.as_ref())?;
            self.kex = KexState::Dh { our_kexinit, peer_kexinit: payload.to_vec(), names, dh };
            return Ok(framed);
        };
        self.kex = KexState::Dh {
            our_kexinit,
            peer_kexinit: payload.to_vec(),
            names,
            dh: DhKeys::generate(kex::group1()), // placeholder until KEX_DH_GEX_GROUP arrives
        };
        Ok(out)
    }

    fn start_kex_silently(&mut self) -> Vec<u8> {
        let mut payload = cryptovec::CryptoVec::new();
        negotiation::write_kex(&self.pref, &mut payload);
        payload.to_vec()
    }

    fn handle_dh_message(&mut self, tag: u8, payload: &[u8]) -> Result<(Vec<Event>, Vec<u8>), Error> {
        let (our_kexinit, peer_kexinit, names, dh) = match std::mem::replace(&mut self.kex, KexState::Done) {
            KexState::Dh { our_kexinit, peer_kexinit, names, dh } => (our_kexinit, peer_kexinit, names, dh),
            other => {
                self.kex = other;
                return Err(Error::Kex);
            }
        };

        if tag == msg::KEX_DH_GEX_GROUP {
            let mut r = payload.reader(1);
            let p = BigUint::from_bytes_be(r.read_mpint()?);
            let g = BigUint::from_bytes_be(r.read_mpint()?);
            let dh = DhKeys::generate(kex::Group { p, g });
            let mut init = cryptovec::CryptoVec::new();
            init.push(msg::KEX_DH_GEX_INIT);
            init.extend_ssh_mpint(&dh.e.to_bytes_be());
            let framed =
                self.writer.write_packet(&init, &mut self.cipher.local_to_remote, self.mac_c_to_s.as_ref())?;
            self.kex = KexState::Dh { our_kexinit, peer_kexinit, names, dh };
            return Ok((Vec::new(), framed));
        }

        // KEXDH_REPLY or KEX_DH_GEX_REPLY: string host_key; mpint f; string sig
        let mut r = payload.reader(1);
        let host_key_blob = r.read_string()?;
        let f = BigUint::from_bytes_be(r.read_mpint()?);
        let sig_blob = r.read_string()?;

        let shared_secret = dh.shared_secret(&f);
        let host_key = parse_host_key_blob(host_key_blob)?;

        let h = if names.kex.0 == negotiation::DH_GEX_SHA1.0 {
            kex::exchange_hash_gex(
                self.our_version.as_bytes(),
                self.peer_version.as_deref().unwrap_or("").as_bytes(),
                &our_kexinit,
                &peer_kexinit,
                host_key_blob,
                1024,
                2048,
                8192,
                &dh.group.p,
                &dh.group.g,
                &dh.e,
                &f,
                &shared_secret,
            )
        } else {
            kex::exchange_hash_group(
                self.our_version.as_bytes(),
                self.peer_version.as_deref().unwrap_or("").as_bytes(),
                &our_kexinit,
                &peer_kexinit,
                host_key_blob,
                &dh.e,
                &f,
                &shared_secret,
            )
        };

        let mut sig_r = sig_blob.reader(0);
        let _sig_algo = sig_r.read_string()?;
        let raw_sig = sig_r.read_string()?;
        if !host_key.verify(&h, raw_sig) {
            return Err(Error::WrongServerSig);
        }

        // The session id never changes across rekeys.
        let session_id = *self.session_id.get_or_insert(h);

        let key_len = cipher::key_len(names.cipher.0).unwrap_or(16);
        let iv_len = cipher::block_size(names.cipher.0);
        let mac_len = crate::mac::len(names.mac);
        let keys = kex::derive_keys(&shared_secret, &h, &session_id, iv_len, key_len, mac_len);

        let newkeys =
            self.writer.write_packet(&[msg::NEWKEYS], &mut self.cipher.local_to_remote, self.mac_c_to_s.as_ref())?;

        self.kex = KexState::WaitNewKeys { pending: Box::new(PendingKeys { session_id, names, keys }) };
        Ok((vec![Event::HostKey(host_key)], newkeys))
    }

    fn handle_newkeys(&mut self) -> Result<(), Error> {
        let pending = match std::mem::replace(&mut self.kex, KexState::Done) {
            KexState::WaitNewKeys { pending } => pending,
            other => {
                self.kex = other;
                return Err(Error::Kex);
            }
        };
        let PendingKeys { names, keys, .. } = *pending;

        self.cipher.local_to_remote =
            CipherState::new_keyed(names.cipher.0, &keys.key_c_to_s, &keys.iv_c_to_s, Mode::Encrypt)?;
        self.cipher.remote_to_local =
            CipherState::new_keyed(names.cipher.0, &keys.key_s_to_c, &keys.iv_s_to_c, Mode::Decrypt)?;
        self.mac_c_to_s = Some(MacState::new(names.mac, &keys.mac_c_to_s)?);
        self.mac_s_to_c = Some(MacState::new(names.mac, &keys.mac_s_to_c)?);
        Compression::from_string(names.client_compression.as_bytes()).init_compress(&mut self.compress);
        Compression::from_string(names.server_compression.as_bytes()).init_decompress(&mut self.decompress);
        self.bytes_since_rekey = 0;
        Ok(())
    }

    /// Frame and encrypt an already-authenticated payload (used by the
    /// auth/channel layers once `KexDone` has fired at least once).
    pub fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let mut scratch = cryptovec::CryptoVec::new();
        let compressed = self.compress.compress(payload, &mut scratch)?;
        self.writer.write_packet(compressed, &mut self.cipher.local_to_remote, self.mac_c_to_s.as_ref())
    }

    /// Frame a payload but hold its bytes back instead of returning them,
    /// so a later [`Transport::flush_deferred`] can put several packets in
    /// one socket write.
    pub fn defer(&mut self, payload: &[u8]) -> Result<(), Error> {
        let framed = self.send(payload)?;
        self.deferred.extend(framed);
        Ok(())
    }

    /// Take the bytes accumulated by [`Transport::defer`], ready for one
    /// write to the socket.
    pub fn flush_deferred(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.deferred)
    }
}

/// The cipher a `CMSG_SESSION_KEY` may name, in preference order, matched
/// against the server's `supported_ciphers` bitmask from `SMSG_PUBLIC_KEY`
/// (`ssh.c`'s `SSH_CIPHER_*` constants; IDEA and plain DES are intentionally
/// left unoffered since `openssl::symm` exposes neither).
const SSH1_CIPHER_PREFERENCE: &[(u32, u8, &str)] =
    &[(msg1::CIPHER_3DES, 3, "3des-cbc"), (msg1::CIPHER_BLOWFISH, 6, "blowfish-cbc")];

/// SSH-1's session establishment and per-packet framing: one
/// `SMSG_PUBLIC_KEY` from the server, answered with `CMSG_SESSION_KEY`,
/// after which every packet in both directions runs
/// through the negotiated cipher. There is no rekey and no separate MAC;
/// the packet framer's CRC32 is the only integrity check (`crate::packet1`).
pub struct Ssh1Transport {
    reader: Ssh1Reader,
    writer: Ssh1Writer,
    enc: CipherState,
    dec: CipherState,
    pub bugs: BugCompat,
    /// The server's `SMSG_PUBLIC_KEY` auth-method bitmask, recorded so the
    /// caller can build an [`crate::auth::ssh1::Ssh1Auth`] once the host key
    /// is accepted.
    pub supported_auths: u32,
    /// Packets framed via [`Ssh1Transport::defer`] but not yet flushed,
    /// mirroring [`Transport::defer`]'s password-length masking.
    deferred: Vec<u8>,
}

pub enum Ssh1Event {
    /// The server's host key, offered for the same one-time trust decision
    /// as the SSH-2 path.
    HostKey(PublicKey),
    /// A post-session-key packet ready for the auth/session layer.
    Payload(u8, Vec<u8>),
}

impl Ssh1Transport {
    pub fn new() -> Self {
        Ssh1Transport {
            reader: Ssh1Reader::new(),
            writer: Ssh1Writer::new(),
            enc: CipherState::Clear,
            dec: CipherState::Clear,
            bugs: BugCompat::default(),
            supported_auths: 0,
            deferred: Vec::new(),
        }
    }

    pub fn our_banner_line() -> Vec<u8> {
        let mut v = version::CLIENT_BANNER_SSH1.as_bytes().to_vec();
        v.extend(b"\r\n");
        v
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<(u8, Vec<u8>)>, Error> {
        let mut packets = Vec::new();
        let mut first = true;
        loop {
            let chunk = if first { data } else { &[][..] };
            first = false;
            match self.reader.feed(chunk, &mut self.dec)? {
                None => break,
                Some(pkt) => packets.push(pkt),
            }
        }
        Ok(packets)
    }

    pub fn send(&mut self, msg_type: u8, payload: &[u8]) -> Result<Vec<u8>, Error> {
        self.writer.write_packet(msg_type, payload, &mut self.enc)
    }

    /// Frame a packet but hold its bytes back for [`Ssh1Transport::flush_deferred`]
    /// to bundle with others in one write, the SSH-1 side of password-length masking.
    pub fn defer(&mut self, msg_type: u8, payload: &[u8]) -> Result<(), Error> {
        let framed = self.send(msg_type, payload)?;
        self.deferred.extend(framed);
        Ok(())
    }

    pub fn flush_deferred(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.deferred)
    }

    /// Handle `SMSG_PUBLIC_KEY`: pick a cipher the server also offers,
    /// generate and RSA-wrap a fresh session key, and key both directions'
    /// ciphers (SSH-1 starts encrypting immediately, with no `NEWKEYS`
    /// round trip). Returns the host key to verify and the framed
    /// `CMSG_SESSION_KEY` reply.
    pub fn handle_public_key(&mut self, payload: &[u8]) -> Result<(PublicKey, Vec<u8>), Error> {
        let mut r = payload.reader(0);
        let cookie = r.read_bytes(8)?.to_vec();
        let server_bits = r.read_u32()?;
        let server_e = r.read_ssh1_mpint()?.to_vec();
        let server_n = r.read_ssh1_mpint()?.to_vec();
        let host_bits = r.read_u32()?;
        let host_e = r.read_ssh1_mpint()?.to_vec();
        let host_n = r.read_ssh1_mpint()?.to_vec();
        let _protocol_flags = r.read_u32()?;
        let supported_ciphers = r.read_u32()?;
        self.supported_auths = r.read_u32()?;
        let _ = (server_bits, host_bits);

        let server_key = Ssh1RsaPublic { e: BigUint::from_bytes_be(&server_e), n: BigUint::from_bytes_be(&server_n) };
        let host_key = Ssh1RsaPublic { e: BigUint::from_bytes_be(&host_e), n: BigUint::from_bytes_be(&host_n) };

        let (cipher_mask, cipher_id, cipher_name) = SSH1_CIPHER_PREFERENCE
            .iter()
            .copied()
            .find(|(mask, ..)| supported_ciphers & mask != 0)
            .ok_or(Error::NoCommonCipher)?;
        let _ = cipher_mask;

        let mut session_id_input = Vec::new();
        session_id_input.extend(host_key.modulus_bytes());
        session_id_input.extend(server_key.modulus_bytes());
        session_id_input.extend(&cookie);
        let mut hasher = Md5::new();
        hasher.update(&session_id_input);
        let session_id: [u8; 16] = hasher.finalize().into();

        let mut session_key = kex::ssh1_generate_session_key();
        for i in 0..16 {
            session_key[i] ^= session_id[i];
        }

        // The smaller-modulus key encrypts first, matching `ssh.c`'s
        // `rsaencrypt` ordering so either key arrangement interoperates.
        let (inner, outer) =
            if server_key.n < host_key.n { (&server_key, &host_key) } else { (&host_key, &server_key) };
        let once = kex::rsa_encrypt_ssh1(&session_key, &inner.e, &inner.n);
        let twice = kex::rsa_encrypt_ssh1(&once, &outer.e, &outer.n);

        let mut reply = cryptovec::CryptoVec::new();
        reply.push(cipher_id);
        reply.extend(&cookie);
        push_ssh1_mpint(&mut reply, &twice);
        reply.extend(&0u32.to_be_bytes()); // protocol_flags we request: none.

        self.enc = CipherState::new_keyed(cipher_name, &session_key[..cipher::key_len(cipher_name).unwrap_or(16)], &[0u8; 8], Mode::Encrypt)?;
        self.dec = CipherState::new_keyed(cipher_name, &session_key[..cipher::key_len(cipher_name).unwrap_or(16)], &[0u8; 8], Mode::Decrypt)?;

        let framed = self.writer.write_packet(msg1::CMSG_SESSION_KEY, &reply, &mut CipherState::Clear)?;
        Ok((PublicKey::Ssh1Rsa(host_key), framed))
    }
}

impl Default for Ssh1Transport {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_host_key_blob(blob: &[u8]) -> Result<PublicKey, Error> {
    let mut r = blob.reader(0);
    let algo = r.read_string()?;
    match algo {
        b"ssh-ed25519" => {
            let raw = r.read_string()?;
            let key = openssl::pkey::PKey::public_key_from_raw_bytes(raw, openssl::pkey::Id::ED25519)?;
            Ok(PublicKey::Ed25519 { key })
        }
        b"ssh-rsa" => {
            let e = r.read_mpint()?;
            let n = r.read_mpint()?;
            Ok(PublicKey::from_rsa_components(e, n, sshcore_keys::key::SignatureHash::Sha1)?)
        }
        b"ssh-dss" => {
            let p = r.read_mpint()?;
            let q = r.read_mpint()?;
            let g = r.read_mpint()?;
            let y = r.read_mpint()?;
            Ok(PublicKey::from_dsa_components(p, q, g, y)?)
        }
        other => Err(Error::Disconnect(format!(
            "unsupported host key algorithm {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn banner_and_kexinit_round_trip() {
        let mut t = Transport::new(Preferred::DEFAULT);
        let (proto, out) = t.on_peer_banner("SSH-2.0-OpenSSH_9.2\r\n").unwrap();
        assert_eq!(proto, ProtoVersion::Ssh2);
        assert!(!out.is_empty());
        assert_eq!(out[5], msg::KEXINIT);
    }

    fn ssh1_smsg_public_key(supported_auths: u32) -> Vec<u8> {
        // Moduli only need to be large enough for `rsa_encrypt_ssh1`'s
        // padding to fit a 32-byte session key; their primality is
        // irrelevant since this test never decrypts the result.
        let server_n = BigUint::from_bytes_be(&[0xAAu8; 48]);
        let host_n = BigUint::from_bytes_be(&[0xBBu8; 64]);
        let e = BigUint::from(65537u32);

        let mut p = cryptovec::CryptoVec::new();
        p.extend(&[7u8; 8]); // cookie
        p.extend(&(server_n.bits() as u32).to_be_bytes());
        push_ssh1_mpint(&mut p, &e.to_bytes_be());
        push_ssh1_mpint(&mut p, &server_n.to_bytes_be());
        p.extend(&(host_n.bits() as u32).to_be_bytes());
        push_ssh1_mpint(&mut p, &e.to_bytes_be());
        push_ssh1_mpint(&mut p, &host_n.to_bytes_be());
        p.extend(&0u32.to_be_bytes()); // protocol_flags
        p.extend(&msg1::CIPHER_3DES.to_be_bytes()); // supported_ciphers
        p.extend(&supported_auths.to_be_bytes());
        p.to_vec()
    }

    #[test]
    fn ssh1_public_key_keys_both_directions_and_frames_session_key() {
        let mut t = Ssh1Transport::new();
        let payload = ssh1_smsg_public_key(msg1::AUTH_PASSWORD);
        let (host_key, framed) = t.handle_public_key(&payload).unwrap();

        assert!(matches!(host_key, PublicKey::Ssh1Rsa(_)));
        assert_eq!(t.supported_auths, msg1::AUTH_PASSWORD);
        assert!(matches!(t.enc, CipherState::Keyed { .. }));
        assert!(matches!(t.dec, CipherState::Keyed { .. }));

        let mut reader = Ssh1Reader::new();
        let (msg_type, _) = reader.feed(&framed, &mut CipherState::Clear).unwrap().unwrap();
        assert_eq!(msg_type, msg1::CMSG_SESSION_KEY);
    }

    #[test]
    fn ssh1_defer_holds_bytes_until_flushed() {
        let mut t = Ssh1Transport::new();
        t.defer(msg1::CMSG_STDIN_DATA, b"hello").unwrap();
        t.defer(msg1::MSG_IGNORE, b"padding").unwrap();
        let flushed = t.flush_deferred();
        assert!(!flushed.is_empty());
        assert!(t.flush_deferred().is_empty()); // a second flush drains nothing.
    }
}
