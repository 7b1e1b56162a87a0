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
//! SSH-2 channel multiplexing (component I): per-channel flow control,
//! half-close tracking and the local-id table backing it, built on the
//! [`crate::tree234`] ordered container.

use crate::msg::ssh2 as msg;
use crate::tree234::Tree234;
use crate::Error;
use cryptovec::CryptoVec;
use sshcore_keys::encoding::Encoding;

/// The main session channel's advertised window and max packet size,
/// matching `do_ssh2_setup_channel`'s `0x8000`/`0x4000` literals exactly.
pub const INITIAL_WINDOW_SIZE: u32 = 0x8000;
pub const MAX_PACKET_SIZE: u32 = 0x4000;

/// `SSH_OPEN_ADMINISTRATIVELY_PROHIBITED`, used to reject a server-initiated
/// `CHANNEL_OPEN` for a forwarding type we have not enabled.
const OPEN_ADMINISTRATIVELY_PROHIBITED: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Session,
    DirectTcpip,
    ForwardedTcpip,
    X11,
    AuthAgent,
}

impl ChannelType {
    pub fn name(self) -> &'static str {
        match self {
            ChannelType::Session => "session",
            ChannelType::DirectTcpip => "direct-tcpip",
            ChannelType::ForwardedTcpip => "forwarded-tcpip",
            ChannelType::X11 => "x11",
            ChannelType::AuthAgent => "auth-agent@openssh.com",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// `CHANNEL_OPEN` sent, waiting for confirmation or failure.
    Opening,
    Open,
    /// We sent `CHANNEL_EOF`; the peer may still send us data.
    SentEof,
    /// The peer sent `CHANNEL_EOF`; we may still send.
    ReceivedEof,
    /// Both directions EOF'd or one side closed outright; waiting for
    /// `CHANNEL_CLOSE` to be acknowledged both ways.
    Closing,
    Closed,
}

pub struct Channel {
    pub local_id: u32,
    pub remote_id: Option<u32>,
    pub ty: ChannelType,
    pub state: ChannelState,
    pub local_window: u32,
    pub remote_window: u32,
    pub remote_max_packet: u32,
    pub sent_close: bool,
    pub received_close: bool,
}

impl Channel {
    fn new(local_id: u32, ty: ChannelType) -> Self {
        Channel {
            local_id,
            remote_id: None,
            ty,
            state: ChannelState::Opening,
            local_window: INITIAL_WINDOW_SIZE,
            remote_window: 0,
            remote_max_packet: 0,
            sent_close: false,
            received_close: false,
        }
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.local_id == other.local_id
    }
}
impl Eq for Channel {}
impl PartialOrd for Channel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Channel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.local_id.cmp(&other.local_id)
    }
}

/// A decoded channel-layer event for the host program.
pub enum Event {
    OpenConfirmed { local_id: u32 },
    OpenFailed { local_id: u32, reason: u32, description: String },
    Data { local_id: u32, data: Vec<u8> },
    ExtendedData { local_id: u32, data: Vec<u8> },
    Eof { local_id: u32 },
    Closed { local_id: u32 },
    Request { local_id: u32, name: String, want_reply: bool, data: Vec<u8> },
    ExitStatus { local_id: u32, code: u32 },
    WindowAdjust { local_id: u32 },
    /// The server opened a channel towards us, already confirmed or
    /// rejected by the time this is raised.
    OpenRequested { local_id: u32, ty: ChannelType },
}

pub struct ChannelTable {
    channels: Tree234<Channel>,
    /// Whether to accept server-initiated `auth-agent@openssh.com` opens.
    pub agent_forwarding_enabled: bool,
    /// Whether to accept server-initiated `x11` opens.
    pub x11_forwarding_enabled: bool,
    /// Whether to accept server-initiated `forwarded-tcpip` opens (remote
    /// port forwarding we previously requested via `tcpip-forward`).
    pub remote_forward_enabled: bool,
}

impl ChannelTable {
    pub fn new() -> Self {
        ChannelTable {
            channels: Tree234::new(),
            agent_forwarding_enabled: false,
            x11_forwarding_enabled: false,
            remote_forward_enabled: false,
        }
    }

    fn find_by_local(&self, local_id: u32) -> Option<&Channel> {
        self.channels.find_by(|c| c.local_id.cmp(&local_id))
    }

    pub fn remote_id_of(&self, local_id: u32) -> Option<u32> {
        self.find_by_local(local_id).and_then(|c| c.remote_id)
    }

    /// The smallest nonnegative integer not already in use as a local
    /// channel id, scanning the sorted tree and stopping at the first gap
    /// the way `ssh.c`'s X11/agent-open handlers do.
    fn first_unused_id(&self) -> u32 {
        let mut candidate = 0u32;
        for channel in self.channels.iter() {
            if channel.local_id > candidate {
                break;
            }
            candidate = channel.local_id + 1;
        }
        candidate
    }

    /// Allocate a new channel and build its `CHANNEL_OPEN` payload.
    pub fn open(&mut self, ty: ChannelType, extra: impl FnOnce(&mut CryptoVec)) -> (u32, Vec<u8>) {
        let local_id = self.first_unused_id();
        let channel = Channel::new(local_id, ty);
        self.channels.add(channel);

        let mut p = CryptoVec::new();
        p.push(msg::CHANNEL_OPEN);
        p.extend_ssh_string(ty.name().as_bytes());
        p.extend(&local_id.to_be_bytes());
        p.extend(&INITIAL_WINDOW_SIZE.to_be_bytes());
        p.extend(&MAX_PACKET_SIZE.to_be_bytes());
        extra(&mut p);
        (local_id, p.to_vec())
    }

    /// Queue outbound data, splitting it into `CHANNEL_DATA` packets no
    /// larger than the remote's advertised window/packet-size limits.
    /// Returns the framed payloads to send and how many bytes were
    /// actually consumed from `data` (the rest must be buffered by the
    /// caller until a `WINDOW_ADJUST` arrives).
    pub fn send_data(&mut self, local_id: u32, data: &[u8]) -> Result<(Vec<Vec<u8>>, usize), Error> {
        let remote_id;
        let mut budget;
        let max_packet;
        {
            let channel = self.channels.find_by(|c| c.local_id.cmp(&local_id)).ok_or(Error::WrongChannel)?;
            remote_id = channel.remote_id.ok_or(Error::WrongChannel)?;
            budget = channel.remote_window as usize;
            max_packet = channel.remote_max_packet.max(1) as usize;
        }

        let mut packets = Vec::new();
        let mut consumed = 0;
        while consumed < data.len() && budget > 0 {
            let chunk_len = (data.len() - consumed).min(max_packet).min(budget);
            if chunk_len == 0 {
                break;
            }
            let chunk = &data[consumed..consumed + chunk_len];
            let mut p = CryptoVec::new();
            p.push(msg::CHANNEL_DATA);
            p.extend(&remote_id.to_be_bytes());
            p.extend_ssh_string(chunk);
            packets.push(p.to_vec());
            consumed += chunk_len;
            budget -= chunk_len;
        }
        if let Some(channel) = self.channels.find_by_mut(|c| c.local_id.cmp(&local_id)) {
            channel.remote_window = budget as u32;
        }
        Ok((packets, consumed))
    }

    pub fn close(&mut self, local_id: u32) -> Result<Vec<u8>, Error> {
        let channel = self.channels.find_by_mut(|c| c.local_id.cmp(&local_id)).ok_or(Error::WrongChannel)?;
        if channel.sent_close {
            return Err(Error::WrongChannel);
        }
        channel.sent_close = true;
        let remote_id = channel.remote_id.ok_or(Error::WrongChannel)?;
        if channel.received_close {
            channel.state = ChannelState::Closed;
        } else {
            channel.state = ChannelState::Closing;
        }
        let mut p = CryptoVec::new();
        p.push(msg::CHANNEL_CLOSE);
        p.extend(&remote_id.to_be_bytes());
        Ok(p.to_vec())
    }

    pub fn send_eof(&mut self, local_id: u32) -> Result<Vec<u8>, Error> {
        let channel = self.channels.find_by_mut(|c| c.local_id.cmp(&local_id)).ok_or(Error::WrongChannel)?;
        let remote_id = channel.remote_id.ok_or(Error::WrongChannel)?;
        channel.state = match channel.state {
            ChannelState::ReceivedEof => ChannelState::Closing,
            _ => ChannelState::SentEof,
        };
        let mut p = CryptoVec::new();
        p.push(msg::CHANNEL_EOF);
        p.extend(&remote_id.to_be_bytes());
        Ok(p.to_vec())
    }

    /// Acknowledge bytes the host program has consumed out of its receive
    /// buffer, replenishing our advertised window.
    pub fn window_adjust(&mut self, local_id: u32, bytes_consumed: u32) -> Result<Option<Vec<u8>>, Error> {
        let channel = self.channels.find_by_mut(|c| c.local_id.cmp(&local_id)).ok_or(Error::WrongChannel)?;
        channel.local_window += bytes_consumed;
        let mut p = CryptoVec::new();
        p.push(msg::CHANNEL_WINDOW_ADJUST);
        p.extend(&channel.remote_id.ok_or(Error::WrongChannel)?.to_be_bytes());
        p.extend(&bytes_consumed.to_be_bytes());
        Ok(Some(p.to_vec()))
    }

    pub fn on_payload(&mut self, payload: &[u8]) -> Result<(Vec<Event>, Vec<Vec<u8>>), Error> {
        use sshcore_keys::encoding::Reader;
        if payload.is_empty() {
            return Err(Error::Inconsistent);
        }
        let mut r = payload.reader(1);
        let mut events = Vec::new();
        let mut out = Vec::new();
        match payload[0] {
            msg::CHANNEL_OPEN => {
                let channel_type = String::from_utf8_lossy(r.read_string()?).into_owned();
                let remote_id = r.read_u32()?;
                let remote_window = r.read_u32()?;
                let remote_max_packet = r.read_u32()?;
                let ty = match channel_type.as_str() {
                    "forwarded-tcpip" if self.remote_forward_enabled => Some(ChannelType::ForwardedTcpip),
                    "auth-agent@openssh.com" if self.agent_forwarding_enabled => Some(ChannelType::AuthAgent),
                    "x11" if self.x11_forwarding_enabled => Some(ChannelType::X11),
                    _ => None,
                };
                match ty {
                    Some(ty) => {
                        let local_id = self.first_unused_id();
                        let mut channel = Channel::new(local_id, ty);
                        channel.remote_id = Some(remote_id);
                        channel.remote_window = remote_window;
                        channel.remote_max_packet = remote_max_packet;
                        channel.state = ChannelState::Open;
                        self.channels.add(channel);

                        let mut p = CryptoVec::new();
                        p.push(msg::CHANNEL_OPEN_CONFIRMATION);
                        p.extend(&remote_id.to_be_bytes());
                        p.extend(&local_id.to_be_bytes());
                        p.extend(&INITIAL_WINDOW_SIZE.to_be_bytes());
                        p.extend(&MAX_PACKET_SIZE.to_be_bytes());
                        out.push(p.to_vec());
                        events.push(Event::OpenRequested { local_id, ty });
                    }
                    None => {
                        let mut p = CryptoVec::new();
                        p.push(msg::CHANNEL_OPEN_FAILURE);
                        p.extend(&remote_id.to_be_bytes());
                        p.extend(&OPEN_ADMINISTRATIVELY_PROHIBITED.to_be_bytes());
                        p.extend_ssh_string(b"forwarding not enabled");
                        p.extend_ssh_string(b"");
                        out.push(p.to_vec());
                    }
                }
            }
            msg::CHANNEL_OPEN_CONFIRMATION => {
                let local_id = r.read_u32()?;
                let remote_id = r.read_u32()?;
                let remote_window = r.read_u32()?;
                let remote_max_packet = r.read_u32()?;
                let channel =
                    self.channels.find_by_mut(|c| c.local_id.cmp(&local_id)).ok_or(Error::WrongChannel)?;
                channel.remote_id = Some(remote_id);
                channel.remote_window = remote_window;
                channel.remote_max_packet = remote_max_packet;
                channel.state = ChannelState::Open;
                events.push(Event::OpenConfirmed { local_id });
            }
            msg::CHANNEL_OPEN_FAILURE => {
                let local_id = r.read_u32()?;
                let reason = r.read_u32()?;
                let description = String::from_utf8_lossy(r.read_string()?).into_owned();
                self.channels.del_by(|c| c.local_id.cmp(&local_id));
                events.push(Event::OpenFailed { local_id, reason, description });
            }
            msg::CHANNEL_DATA => {
                let local_id = r.read_u32()?;
                let data = r.read_string()?.to_vec();
                let channel =
                    self.channels.find_by_mut(|c| c.local_id.cmp(&local_id)).ok_or(Error::WrongChannel)?;
                channel.local_window = channel.local_window.saturating_sub(data.len() as u32);
                events.push(Event::Data { local_id, data });
            }
            msg::CHANNEL_EXTENDED_DATA => {
                let local_id = r.read_u32()?;
                let _code = r.read_u32()?;
                let data = r.read_string()?.to_vec();
                events.push(Event::ExtendedData { local_id, data });
            }
            msg::CHANNEL_EOF => {
                let local_id = r.read_u32()?;
                if let Some(channel) = self.channels.find_by_mut(|c| c.local_id.cmp(&local_id)) {
                    channel.state = match channel.state {
                        ChannelState::SentEof => ChannelState::Closing,
                        _ => ChannelState::ReceivedEof,
                    };
                }
                events.push(Event::Eof { local_id });
            }
            msg::CHANNEL_CLOSE => {
                let local_id = r.read_u32()?;
                let needs_close_back = {
                    let channel =
                        self.channels.find_by_mut(|c| c.local_id.cmp(&local_id)).ok_or(Error::WrongChannel)?;
                    channel.received_close = true;
                    !channel.sent_close
                };
                if needs_close_back {
                    out.push(self.close(local_id)?);
                }
                self.channels.del_by(|c| c.local_id.cmp(&local_id));
                events.push(Event::Closed { local_id });
            }
            msg::CHANNEL_REQUEST => {
                let local_id = r.read_u32()?;
                let name = String::from_utf8_lossy(r.read_string()?).into_owned();
                let want_reply = r.read_byte()? != 0;
                if name == "exit-status" {
                    let code = r.read_u32()?;
                    events.push(Event::ExitStatus { local_id, code });
                } else {
                    events.push(Event::Request { local_id, name, want_reply, data: r.remaining().to_vec() });
                }
            }
            msg::CHANNEL_WINDOW_ADJUST => {
                let local_id = r.read_u32()?;
                let add = r.read_u32()?;
                if let Some(channel) = self.channels.find_by_mut(|c| c.local_id.cmp(&local_id)) {
                    channel.remote_window = channel.remote_window.saturating_add(add);
                }
                events.push(Event::WindowAdjust { local_id });
            }
            msg::CHANNEL_SUCCESS | msg::CHANNEL_FAILURE => {}
            other => return Err(Error::UnexpectedPacket(other)),
        }
        Ok((events, out))
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn open_allocates_sequential_ids() {
        let mut table = ChannelTable::new();
        let (id0, _) = table.open(ChannelType::Session, |_| {});
        let (id1, _) = table.open(ChannelType::Session, |_| {});
        assert_eq!(id0, 0);
        assert_eq!(id1, 1);
    }

    #[test]
    fn open_confirmation_transitions_state() {
        let mut table = ChannelTable::new();
        let (id, _) = table.open(ChannelType::Session, |_| {});
        let mut p = CryptoVec::new();
        p.push(msg::CHANNEL_OPEN_CONFIRMATION);
        p.extend(&id.to_be_bytes());
        p.extend(&42u32.to_be_bytes());
        p.extend(&INITIAL_WINDOW_SIZE.to_be_bytes());
        p.extend(&MAX_PACKET_SIZE.to_be_bytes());
        let (events, _) = table.on_payload(&p).unwrap();
        assert!(matches!(events[0], Event::OpenConfirmed { local_id } if local_id == id));
        assert_eq!(table.find_by_local(id).unwrap().state, ChannelState::Open);
    }

    #[test]
    fn two_phase_close_acks_if_needed() {
        let mut table = ChannelTable::new();
        let (id, _) = table.open(ChannelType::Session, |_| {});
        let mut confirm = CryptoVec::new();
        confirm.push(msg::CHANNEL_OPEN_CONFIRMATION);
        confirm.extend(&id.to_be_bytes());
        confirm.extend(&7u32.to_be_bytes());
        confirm.extend(&INITIAL_WINDOW_SIZE.to_be_bytes());
        confirm.extend(&MAX_PACKET_SIZE.to_be_bytes());
        table.on_payload(&confirm).unwrap();

        let mut close = CryptoVec::new();
        close.push(msg::CHANNEL_CLOSE);
        close.extend(&id.to_be_bytes());
        let (events, out) = table.on_payload(&close).unwrap();
        assert!(matches!(events[0], Event::Closed { .. }));
        assert_eq!(out.len(), 1); // we hadn't closed yet, so we must ack.
    }

    fn channel_open_payload(channel_type: &str, remote_id: u32) -> Vec<u8> {
        let mut p = CryptoVec::new();
        p.push(msg::CHANNEL_OPEN);
        p.extend_ssh_string(channel_type.as_bytes());
        p.extend(&remote_id.to_be_bytes());
        p.extend(&INITIAL_WINDOW_SIZE.to_be_bytes());
        p.extend(&MAX_PACKET_SIZE.to_be_bytes());
        p.to_vec()
    }

    #[test]
    fn channel_open_rejected_when_forwarding_disabled() {
        let mut table = ChannelTable::new();
        let payload = channel_open_payload("forwarded-tcpip", 9);
        let (events, out) = table.on_payload(&payload).unwrap();
        assert!(events.is_empty());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0][0], msg::CHANNEL_OPEN_FAILURE);
        assert_eq!(&out[0][1..5], &9u32.to_be_bytes());
        assert_eq!(&out[0][5..9], &OPEN_ADMINISTRATIVELY_PROHIBITED.to_be_bytes());
    }

    #[test]
    fn channel_open_accepted_when_forwarding_enabled() {
        let mut table = ChannelTable::new();
        table.x11_forwarding_enabled = true;
        let payload = channel_open_payload("x11", 3);
        let (events, out) = table.on_payload(&payload).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0][0], msg::CHANNEL_OPEN_CONFIRMATION);
        assert!(matches!(
            events[0],
            Event::OpenRequested { local_id: 0, ty: ChannelType::X11 }
        ));
        assert_eq!(table.find_by_local(0).unwrap().state, ChannelState::Open);
    }

    #[test]
    fn closed_channel_id_is_reused() {
        let mut table = ChannelTable::new();
        let (id0, _) = table.open(ChannelType::Session, |_| {});
        let (id1, _) = table.open(ChannelType::Session, |_| {});
        assert_eq!((id0, id1), (0, 1));

        let mut confirm = CryptoVec::new();
        confirm.push(msg::CHANNEL_OPEN_CONFIRMATION);
        confirm.extend(&id0.to_be_bytes());
        confirm.extend(&5u32.to_be_bytes());
        confirm.extend(&INITIAL_WINDOW_SIZE.to_be_bytes());
        confirm.extend(&MAX_PACKET_SIZE.to_be_bytes());
        table.on_payload(&confirm).unwrap();

        table.close(id0).unwrap();
        let mut close = CryptoVec::new();
        close.push(msg::CHANNEL_CLOSE);
        close.extend(&id0.to_be_bytes());
        table.on_payload(&close).unwrap();
        assert!(table.find_by_local(id0).is_none());

        let (id2, _) = table.open(ChannelType::Session, |_| {});
        assert_eq!(id2, 0); // the gap left by id0 is reused before a fresh id.
    }
}
