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
//! Compressor registry (component D continued): `zlib`/`zlib@openssh.com`
//! or `none`, negotiated independently per direction.

use crate::Error;
use cryptovec::CryptoVec;

#[derive(Debug, Clone, Copy)]
pub enum Compression {
    None,
    Zlib,
}

impl Compression {
    pub fn from_string(s: &[u8]) -> Self {
        if s == b"zlib" || s == b"zlib@openssh.com" {
            Compression::Zlib
        } else {
            Compression::None
        }
    }

    pub fn init_compress(&self, comp: &mut Compress) {
        if let Compression::Zlib = *self {
            if let Compress::Zlib(ref mut c) = *comp {
                c.reset()
            } else {
                *comp = Compress::Zlib(flate2::Compress::new(flate2::Compression::fast(), true))
            }
        } else {
            *comp = Compress::None
        }
    }

    pub fn init_decompress(&self, comp: &mut Decompress) {
        if let Compression::Zlib = *self {
            if let Decompress::Zlib(ref mut c) = *comp {
                c.reset(true)
            } else {
                *comp = Decompress::Zlib(flate2::Decompress::new(true))
            }
        } else {
            *comp = Decompress::None
        }
    }
}

pub enum Compress {
    None,
    Zlib(flate2::Compress),
}

pub enum Decompress {
    None,
    Zlib(flate2::Decompress),
}

impl Compress {
    pub fn compress<'a>(&mut self, input: &'a [u8], output: &'a mut CryptoVec) -> Result<&'a [u8], Error> {
        match *self {
            Compress::None => Ok(input),
            Compress::Zlib(ref mut z) => {
                output.clear();
                let n_in = z.total_in() as usize;
                let n_out = z.total_out() as usize;
                output.resize(input.len() + 10);
                let flush = flate2::FlushCompress::Partial;
                loop {
                    let n_in_ = z.total_in() as usize - n_in;
                    let n_out_ = z.total_out() as usize - n_out;
                    let c = z.compress(&input[n_in_..], &mut output[n_out_..], flush)?;
                    match c {
                        flate2::Status::BufError => output.resize(output.len() * 2),
                        _ => break,
                    }
                }
                let n_out_ = z.total_out() as usize - n_out;
                Ok(&output[..n_out_])
            }
        }
    }
}

impl Decompress {
    pub fn decompress<'a>(
        &mut self,
        input: &'a [u8],
        output: &'a mut CryptoVec,
    ) -> Result<&'a [u8], Error> {
        match *self {
            Decompress::None => Ok(input),
            Decompress::Zlib(ref mut z) => {
                output.clear();
                let n_in = z.total_in() as usize;
                let n_out = z.total_out() as usize;
                output.resize(input.len().max(64));
                let flush = flate2::FlushDecompress::None;
                loop {
                    let n_in_ = z.total_in() as usize - n_in;
                    let n_out_ = z.total_out() as usize - n_out;
                    let d = z.decompress(&input[n_in_..], &mut output[n_out_..], flush)?;
                    match d {
                        flate2::Status::Ok => output.resize(output.len() * 2),
                        _ => break,
                    }
                }
                let n_out_ = z.total_out() as usize - n_out;
                Ok(&output[..n_out_])
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zlib_roundtrip() {
        let mut compress = Compress::Zlib(flate2::Compress::new(flate2::Compression::fast(), true));
        let mut decompress = Decompress::Zlib(flate2::Decompress::new(true));
        let mut comp_out = CryptoVec::new();
        let mut decomp_out = CryptoVec::new();
        let payload = b"the quick brown fox jumps over the lazy dog, repeatedly, repeatedly";
        let compressed = compress.compress(payload, &mut comp_out).unwrap().to_vec();
        let decompressed = decompress.decompress(&compressed, &mut decomp_out).unwrap();
        assert_eq!(decompressed, payload);
    }
}
