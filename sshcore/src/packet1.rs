//! SSH-1 packet framer (component E): `uint32 packet_length; byte
//! padding[8 - (packet_length % 8)]; byte type; byte data[]; uint32 crc`.
//! `packet_length` covers `type + data + crc` but not the padding or
//! itself; padding and everything after it is encrypted once a cipher has
//! been keyed, and authenticated with a CRC32 rather than a keyed MAC
//! (SSH-1 predates HMAC negotiation).

use crate::cipher::CipherState;
use crate::Error;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use rand::RngCore;

pub struct Ssh1Writer;

impl Ssh1Writer {
    pub fn new() -> Self {
        Ssh1Writer
    }

    /// Frame a `(type, data)` pair ready for the wire.
    pub fn write_packet(
        &mut self,
        msg_type: u8,
        data: &[u8],
        cipher: &mut CipherState,
    ) -> Result<Vec<u8>, Error> {
        let packet_length = 1 + data.len() + 4;
        let padding_length = {
            let p = 8 - (packet_length % 8);
            if p == 0 {
                8
            } else {
                p
            }
        };

        let mut body = vec![0u8; padding_length];
        rand::thread_rng().fill_bytes(&mut body);
        body.push(msg_type);
        body.extend_from_slice(data);

        let mut crc = crc32fast::Hasher::new();
        crc.update(&body);
        let crc = crc.finalize();
        body.write_u32::<BigEndian>(crc).unwrap();

        cipher.apply(&mut body)?;

        let mut out = Vec::with_capacity(4 + body.len());
        out.write_u32::<BigEndian>(packet_length as u32).unwrap();
        out.extend_from_slice(&body);
        Ok(out)
    }
}

impl Default for Ssh1Writer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Ssh1Reader {
    buf: Vec<u8>,
}

impl Ssh1Reader {
    pub fn new() -> Self {
        Ssh1Reader { buf: Vec::new() }
    }

    /// Append newly-arrived bytes and attempt to complete one packet,
    /// returning `(msg_type, data)` on success.
    pub fn feed(
        &mut self,
        data: &[u8],
        cipher: &mut CipherState,
    ) -> Result<Option<(u8, Vec<u8>)>, Error> {
        self.buf.extend_from_slice(data);
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let packet_length = BigEndian::read_u32(&self.buf[..4]) as usize;
        let padding_length = {
            let p = 8 - (packet_length % 8);
            if p == 0 {
                8
            } else {
                p
            }
        };
        let body_len = padding_length + packet_length;
        if self.buf.len() < 4 + body_len {
            return Ok(None);
        }

        let mut body = self.buf[4..4 + body_len].to_vec();
        cipher.apply(&mut body)?;

        let crc_offset = body_len - 4;
        let expected_crc = BigEndian::read_u32(&body[crc_offset..]);
        let mut crc = crc32fast::Hasher::new();
        crc.update(&body[..crc_offset]);
        if crc.finalize() != expected_crc {
            return Err(Error::PacketCrc);
        }

        let msg_type = body[padding_length];
        let payload = body[padding_length + 1..crc_offset].to_vec();

        self.buf.drain(..4 + body_len);
        Ok(Some((msg_type, payload)))
    }
}

impl Default for Ssh1Reader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use openssl::symm::Mode;

    #[test]
    fn roundtrip_clear() {
        let mut writer = Ssh1Writer::new();
        let mut reader = Ssh1Reader::new();
        let mut enc = CipherState::Clear;
        let mut dec = CipherState::Clear;
        let framed = writer.write_packet(14, b"ok", &mut enc).unwrap();
        let (ty, data) = reader.feed(&framed, &mut dec).unwrap().unwrap();
        assert_eq!(ty, 14);
        assert_eq!(data, b"ok");
    }

    #[test]
    fn roundtrip_3des_keyed() {
        let key = [0x33u8; 24];
        let iv = [0u8; 8];
        let mut enc = CipherState::new_keyed("3des-cbc", &key, &iv, Mode::Encrypt).unwrap();
        let mut dec = CipherState::new_keyed("3des-cbc", &key, &iv, Mode::Decrypt).unwrap();
        let mut writer = Ssh1Writer::new();
        let mut reader = Ssh1Reader::new();
        let framed = writer.write_packet(17, b"stdout chunk", &mut enc).unwrap();
        let (ty, data) = reader.feed(&framed, &mut dec).unwrap().unwrap();
        assert_eq!(ty, 17);
        assert_eq!(data, b"stdout chunk");
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let mut writer = Ssh1Writer::new();
        let mut reader = Ssh1Reader::new();
        let mut enc = CipherState::Clear;
        let mut dec = CipherState::Clear;
        let mut framed = writer.write_packet(4, b"debug", &mut enc).unwrap();
        let last = framed.len() - 1;
        framed[last] ^= 0xff;
        assert!(matches!(reader.feed(&framed, &mut dec), Err(Error::PacketCrc)));
    }
}
