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
//! SSH wire encoding helpers, shared by both protocol versions.
//!
//! SSH-2 strings/mpints are length-prefixed with a `u32`; SSH-1 mpints are
//! instead prefixed with a 16-bit *bit count*.
//! Both share the "minimal big-endian, no sign ambiguity" representation
//! for positive integers.

use crate::Error;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use cryptovec::CryptoVec;

#[doc(hidden)]
pub trait Bytes {
    fn bytes(&self) -> &[u8];
}

impl<A: AsRef<str>> Bytes for A {
    fn bytes(&self) -> &[u8] {
        self.as_ref().as_bytes()
    }
}

/// Encode in the SSH-2 format (RFC 4251 §5).
pub trait Encoding {
    fn extend_ssh_string(&mut self, s: &[u8]);
    fn extend_ssh_string_blank(&mut self, len: usize) -> &mut [u8];
    /// SSH-2 mpint: `uint32 length; bytes` unsigned big-endian, with a
    /// leading zero byte iff the high bit of the first byte is set.
    fn extend_ssh_mpint(&mut self, s: &[u8]);
    fn extend_list<A: Bytes, I: Iterator<Item = A>>(&mut self, list: I);
    fn write_empty_list(&mut self);
}

/// Encoding length of the given SSH-2 mpint.
pub fn mpint_len(s: &[u8]) -> usize {
    let mut i = 0;
    while i < s.len() && s[i] == 0 {
        i += 1
    }
    if i == s.len() {
        return 4;
    }
    (if s[i] & 0x80 != 0 { 5 } else { 4 }) + s.len() - i
}

/// Number of significant bits in a big-endian unsigned integer (SSH-1
/// mpint bit count).
pub fn mpint_bitcount(s: &[u8]) -> u16 {
    let mut i = 0;
    while i < s.len() && s[i] == 0 {
        i += 1
    }
    if i == s.len() {
        return 0;
    }
    let top_bits = 8 - s[i].leading_zeros() as u16;
    ((s.len() - i - 1) as u16) * 8 + top_bits
}

macro_rules! impl_encoding {
    ($t:ty, $push:ident, $push_u32:ident, $resize:ident) => {
        impl Encoding for $t {
            fn extend_ssh_string(&mut self, s: &[u8]) {
                self.$push_u32(s.len() as u32);
                self.extend(s);
            }
            fn extend_ssh_string_blank(&mut self, len: usize) -> &mut [u8] {
                self.$push_u32(len as u32);
                let current = self.len();
                self.$resize(current + len);
                &mut self[current..]
            }
            fn extend_ssh_mpint(&mut self, s: &[u8]) {
                let mut i = 0;
                while i < s.len() && s[i] == 0 {
                    i += 1
                }
                if i == s.len() {
                    self.$push_u32(0);
                    return;
                }
                if s[i] & 0x80 != 0 {
                    self.$push_u32((s.len() - i + 1) as u32);
                    self.$push(0);
                } else {
                    self.$push_u32((s.len() - i) as u32);
                }
                self.extend(&s[i..]);
            }
            fn extend_list<A: Bytes, I: Iterator<Item = A>>(&mut self, list: I) {
                let len0 = self.len();
                self.extend(&[0, 0, 0, 0]);
                let mut first = true;
                for i in list {
                    if !first {
                        self.push(b',')
                    } else {
                        first = false;
                    }
                    self.extend(i.bytes())
                }
                let len = (self.len() - len0 - 4) as u32;
                BigEndian::write_u32(&mut self[len0..], len);
            }
            fn write_empty_list(&mut self) {
                self.extend(&[0, 0, 0, 0]);
            }
        }
    };
}

trait PushByte {
    fn push(&mut self, b: u8);
    fn push_u32(&mut self, n: u32);
}

impl PushByte for Vec<u8> {
    fn push(&mut self, b: u8) {
        Vec::push(self, b)
    }
    fn push_u32(&mut self, n: u32) {
        self.write_u32::<BigEndian>(n).unwrap();
    }
}

impl PushByte for CryptoVec {
    fn push(&mut self, b: u8) {
        CryptoVec::push(self, b)
    }
    fn push_u32(&mut self, n: u32) {
        self.push_u32_be(n);
    }
}

trait ResizeTo {
    fn resize_to(&mut self, len: usize);
}
impl ResizeTo for Vec<u8> {
    fn resize_to(&mut self, len: usize) {
        self.resize(len, 0u8)
    }
}
impl ResizeTo for CryptoVec {
    fn resize_to(&mut self, len: usize) {
        self.resize(len)
    }
}

impl_encoding!(Vec<u8>, push, push_u32, resize_to);
impl_encoding!(CryptoVec, push, push_u32, resize_to);

/// Encode an SSH-1 mpint: `uint16 bitcount; bytes[ceil(bitcount/8)]`.
pub fn push_ssh1_mpint(buf: &mut CryptoVec, s: &[u8]) {
    let mut i = 0;
    while i < s.len() && s[i] == 0 {
        i += 1
    }
    let bits = mpint_bitcount(&s[i..]);
    buf.push((bits >> 8) as u8);
    buf.push((bits & 0xff) as u8);
    buf.extend(&s[i..]);
}

/// A cursor-like trait to read SSH-encoded values.
pub trait Reader {
    fn reader(&self, starting_at: usize) -> Position<'_>;
}

impl Reader for CryptoVec {
    fn reader(&self, starting_at: usize) -> Position<'_> {
        Position { s: self, position: starting_at }
    }
}

impl Reader for [u8] {
    fn reader(&self, starting_at: usize) -> Position<'_> {
        Position { s: self, position: starting_at }
    }
}

/// A cursor-like type to read SSH-encoded values.
#[derive(Debug)]
pub struct Position<'a> {
    s: &'a [u8],
    #[doc(hidden)]
    pub position: usize,
}

impl<'a> Position<'a> {
    pub fn read_string(&mut self) -> Result<&'a [u8], Error> {
        let len = self.read_u32()? as usize;
        if self.position + len <= self.s.len() {
            let result = &self.s[self.position..(self.position + len)];
            self.position += len;
            Ok(result)
        } else {
            Err(Error::IndexOutOfBounds)
        }
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        if self.position + 4 <= self.s.len() {
            let u = BigEndian::read_u32(&self.s[self.position..]);
            self.position += 4;
            Ok(u)
        } else {
            Err(Error::IndexOutOfBounds)
        }
    }

    pub fn read_byte(&mut self) -> Result<u8, Error> {
        if self.position + 1 <= self.s.len() {
            let u = self.s[self.position];
            self.position += 1;
            Ok(u)
        } else {
            Err(Error::IndexOutOfBounds)
        }
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.position + n <= self.s.len() {
            let result = &self.s[self.position..self.position + n];
            self.position += n;
            Ok(result)
        } else {
            Err(Error::IndexOutOfBounds)
        }
    }

    /// SSH-2 mpint: length-prefixed.
    pub fn read_mpint(&mut self) -> Result<&'a [u8], Error> {
        self.read_string()
    }

    /// SSH-1 mpint: `uint16 bitcount` followed by `ceil(bitcount/8)` bytes.
    pub fn read_ssh1_mpint(&mut self) -> Result<&'a [u8], Error> {
        if self.position + 2 > self.s.len() {
            return Err(Error::IndexOutOfBounds);
        }
        let bits = (self.s[self.position] as usize) << 8 | self.s[self.position + 1] as usize;
        self.position += 2;
        let nbytes = (bits + 7) / 8;
        self.read_bytes(nbytes)
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.s[self.position..]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mpint_roundtrip_ssh2() {
        let mut buf = CryptoVec::new();
        buf.extend_ssh_mpint(&[0x00, 0x80, 0x01]);
        let mut r = buf.reader(0);
        let back = r.read_mpint().unwrap();
        // Leading zero re-added because 0x80 has the high bit set.
        assert_eq!(back, &[0x00, 0x80, 0x01]);
    }

    #[test]
    fn mpint_zero_ssh2() {
        let mut buf = CryptoVec::new();
        buf.extend_ssh_mpint(&[0x00]);
        assert_eq!(&buf[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn bitcount_matches_putty_examples() {
        // From RFC 4251's precursor / PuTTY's ssh1 mpint doc comments:
        // 0 has bitcount 0; 0x80 has bitcount 8; 0x7f has bitcount 7.
        assert_eq!(mpint_bitcount(&[0x00]), 0);
        assert_eq!(mpint_bitcount(&[0x80]), 8);
        assert_eq!(mpint_bitcount(&[0x7f]), 7);
        assert_eq!(mpint_bitcount(&[0x01, 0x00]), 9);
    }

    #[test]
    fn ssh1_mpint_roundtrip() {
        let mut buf = CryptoVec::new();
        push_ssh1_mpint(&mut buf, &[0x01, 0x00]);
        let mut r = buf.reader(0);
        let back = r.read_ssh1_mpint().unwrap();
        assert_eq!(back, &[0x01, 0x00]);
    }
}
