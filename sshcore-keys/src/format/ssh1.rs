//! The legacy SSH-1 private key file: a small binary blob, optionally
//! wrapped in 3DES-CBC under a passphrase-derived key. Unlike the SSH-2
//! `.ppk` format there is no textual header/body
//! split: everything after the magic string is raw bytes.

use crate::encoding::{mpint_bitcount, push_ssh1_mpint, Reader};
use crate::key::{KeyPair, PublicKey, Ssh1RsaPublic};
use crate::Error;
use cryptovec::CryptoVec;
use md5::{Digest, Md5};
use num_bigint::BigUint;
use openssl::symm::{Cipher, Crypter, Mode};
use rand::RngCore;

const MAGIC: &[u8] = b"SSH PRIVATE KEY FILE FORMAT 1.1\n";
const CIPHER_NONE: u8 = 0;
const CIPHER_3DES: u8 = 3;

/// Two MD5 hashes chained together give the 24 bytes `des-ede3-cbc` wants:
/// `key1 = MD5(passphrase)`, `key2 = MD5(key1 || passphrase)`.
fn derive_3des_key(passphrase: &str) -> [u8; 24] {
    let mut h1 = Md5::new();
    h1.update(passphrase.as_bytes());
    let key1 = h1.finalize();
    let mut h2 = Md5::new();
    h2.update(&key1);
    h2.update(passphrase.as_bytes());
    let key2 = h2.finalize();
    let mut key = [0u8; 24];
    key[..16].copy_from_slice(&key1);
    key[16..].copy_from_slice(&key2[..8]);
    key
}

fn crypt(key: &[u8; 24], data: &[u8], mode: Mode) -> Result<Vec<u8>, Error> {
    let cipher = Cipher::des_ede3_cbc();
    let iv = [0u8; 8];
    let mut crypter = Crypter::new(cipher, mode, key, Some(&iv))?;
    crypter.pad(false);
    let mut out = vec![0u8; data.len() + cipher.block_size()];
    let count = crypter.update(data, &mut out)?;
    let rest = crypter.finalize(&mut out[count..])?;
    out.truncate(count + rest);
    Ok(out)
}

pub fn decode_ssh1_key(data: &[u8], passphrase: Option<&str>) -> Result<KeyPair, Error> {
    if !data.starts_with(MAGIC) {
        return Err(Error::CouldNotReadKey);
    }
    let mut r = data.reader(MAGIC.len());
    let _nul = r.read_byte()?;
    let cipher_type = r.read_byte()?;
    let _reserved = r.read_bytes(4)?;
    let _bits = r.read_u32()?;
    let n = BigUint::from_bytes_be(r.read_ssh1_mpint()?);
    let e = BigUint::from_bytes_be(r.read_ssh1_mpint()?);
    let _comment = r.read_string()?;

    let encrypted = r.remaining();
    let plain = match cipher_type {
        CIPHER_NONE => encrypted.to_vec(),
        CIPHER_3DES => {
            let passphrase = passphrase.ok_or(Error::KeyIsEncrypted)?;
            let key = derive_3des_key(passphrase);
            crypt(&key, encrypted, Mode::Decrypt)?
        }
        other => return Err(Error::UnsupportedKeyType(vec![other])),
    };

    let mut pr = plain.reader(0);
    let check0 = pr.read_byte()?;
    let check1 = pr.read_byte()?;
    let check0b = pr.read_byte()?;
    let check1b = pr.read_byte()?;
    if check0 != check0b || check1 != check1b {
        return Err(Error::KeyIsEncrypted);
    }
    let d = BigUint::from_bytes_be(pr.read_ssh1_mpint()?);
    let iqmp = BigUint::from_bytes_be(pr.read_ssh1_mpint()?);
    let q = BigUint::from_bytes_be(pr.read_ssh1_mpint()?);
    let p = BigUint::from_bytes_be(pr.read_ssh1_mpint()?);
    let _ = iqmp; // recomputed on demand by callers that need CRT form; kept here only for round-trip fidelity

    Ok(KeyPair::Ssh1Rsa { e, n, d, p, q })
}

pub fn encode_ssh1_key(
    key: &KeyPair,
    comment: &str,
    passphrase: Option<&str>,
) -> Result<Vec<u8>, Error> {
    let (e, n, d, p, q) = match key {
        KeyPair::Ssh1Rsa { e, n, d, p, q } => (e, n, d, p, q),
        _ => return Err(Error::UnsupportedKeyType(b"ssh-rsa(v1)".to_vec())),
    };

    let mut out = CryptoVec::new();
    out.extend(MAGIC);
    out.push(0);
    out.push(if passphrase.is_some() { CIPHER_3DES } else { CIPHER_NONE });
    out.extend(&[0u8; 4]);
    out.extend(&(mpint_bitcount(&n.to_bytes_be()) as u32).to_be_bytes());
    push_ssh1_mpint(&mut out, &n.to_bytes_be());
    push_ssh1_mpint(&mut out, &e.to_bytes_be());
    let comment = comment.as_bytes();
    out.extend(&(comment.len() as u32).to_be_bytes());
    out.extend(comment);

    let mut plain = CryptoVec::new();
    let mut check = [0u8; 2];
    rand::thread_rng().fill_bytes(&mut check);
    plain.extend(&check);
    plain.extend(&check);
    let iqmp = crate::format::ppk::modinv(q, p).ok_or(Error::CouldNotReadKey)?;
    push_ssh1_mpint(&mut plain, &d.to_bytes_be());
    push_ssh1_mpint(&mut plain, &iqmp.to_bytes_be());
    push_ssh1_mpint(&mut plain, &q.to_bytes_be());
    push_ssh1_mpint(&mut plain, &p.to_bytes_be());
    while plain.len() % 8 != 0 {
        plain.push(0);
    }

    match passphrase {
        None => out.extend(&plain[..]),
        Some(passphrase) => {
            let cipher_key = derive_3des_key(passphrase);
            let encrypted = crypt(&cipher_key, &plain[..], Mode::Encrypt)?;
            out.extend(&encrypted);
        }
    }

    Ok(out[..].to_vec())
}

/// Build the bare `(modulus, exponent)` public half from a decoded key,
/// for callers that only need to print or cache the host key.
pub fn public_half(key: &Ssh1RsaPublic) -> PublicKey {
    PublicKey::Ssh1Rsa(key.clone())
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_key() -> KeyPair {
        // Small, deliberately insecure values; large enough to exercise
        // the mpint bit-count/padding logic without slow bignum math.
        KeyPair::Ssh1Rsa {
            e: BigUint::from(65537u32),
            n: BigUint::from(3233u32),
            d: BigUint::from(413u32),
            p: BigUint::from(61u32),
            q: BigUint::from(53u32),
        }
    }

    #[test]
    fn roundtrip_unencrypted() {
        let key = sample_key();
        let blob = encode_ssh1_key(&key, "test comment", None).unwrap();
        let decoded = decode_ssh1_key(&blob, None).unwrap();
        match decoded {
            KeyPair::Ssh1Rsa { e, n, d, p, q } => {
                assert_eq!(e, BigUint::from(65537u32));
                assert_eq!(n, BigUint::from(3233u32));
                assert_eq!(d, BigUint::from(413u32));
                assert_eq!(p, BigUint::from(61u32));
                assert_eq!(q, BigUint::from(53u32));
            }
            _ => panic!("wrong key type"),
        }
    }

    #[test]
    fn roundtrip_encrypted() {
        let key = sample_key();
        let blob = encode_ssh1_key(&key, "test comment", Some("hunter2")).unwrap();
        assert!(decode_ssh1_key(&blob, None).is_err());
        let decoded = decode_ssh1_key(&blob, Some("hunter2")).unwrap();
        match decoded {
            KeyPair::Ssh1Rsa { d, .. } => assert_eq!(d, BigUint::from(413u32)),
            _ => panic!("wrong key type"),
        }
    }
}
