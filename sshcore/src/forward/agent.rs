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
//! Agent-forwarding channel (component J): each `auth-agent@openssh.com`
//! channel the server opens is a raw byte pipe to the local agent, framed
//! the same way the agent's own Unix-socket protocol is (a 4-byte
//! big-endian length prefix per message). This module only
//! tracks how many bytes of the next message are still missing; it never
//! touches the agent socket itself (out of scope, left to the host
//! program, same boundary as `sshcore_keys::agent`).

/// Splits a byte stream arriving on an agent-forwarding channel into
/// complete, length-prefixed messages.
pub struct MessageSplitter {
    buf: Vec<u8>,
}

impl MessageSplitter {
    pub fn new() -> Self {
        MessageSplitter { buf: Vec::new() }
    }

    /// Feed newly-arrived channel bytes; returns every complete message
    /// (length prefix included) now available.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();
        loop {
            if self.buf.len() < 4 {
                break;
            }
            let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
            if self.buf.len() < 4 + len {
                break;
            }
            out.push(self.buf[..4 + len].to_vec());
            self.buf.drain(..4 + len);
        }
        out
    }
}

impl Default for MessageSplitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_messages_arriving_in_fragments() {
        let mut splitter = MessageSplitter::new();
        let mut msg = vec![0, 0, 0, 3];
        msg.extend(b"abc");
        assert!(splitter.feed(&msg[..3]).is_empty());
        let out = splitter.feed(&msg[3..]);
        assert_eq!(out, vec![msg]);
    }

    #[test]
    fn splits_two_back_to_back_messages() {
        let mut splitter = MessageSplitter::new();
        let mut data = vec![0, 0, 0, 1, b'x'];
        data.extend(vec![0, 0, 0, 2, b'y', b'z']);
        let out = splitter.feed(&data);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], vec![0, 0, 0, 1, b'x']);
        assert_eq!(out[1], vec![0, 0, 0, 2, b'y', b'z']);
    }
}
