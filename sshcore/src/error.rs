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
//! The crate's error type and the severity classification that tells the
//! backend façade how to surface a failure to the host program.

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid SSH version string")]
    Version,
    #[error("No common key exchange algorithm")]
    NoCommonKexAlgo,
    #[error("No common host key algorithm")]
    NoCommonKeyAlgo,
    #[error("No common cipher")]
    NoCommonCipher,
    #[error("No common MAC algorithm")]
    NoCommonMac,
    #[error("No common compression algorithm")]
    NoCommonCompression,
    #[error("Key exchange init failed")]
    KexInit,
    #[error("Key exchange failed")]
    Kex,
    #[error("Wrong packet authentication code")]
    PacketAuth,
    #[error("CRC mismatch in SSH-1 packet")]
    PacketCrc,
    #[error("Unexpected packet type {0}")]
    UnexpectedPacket(u8),
    #[error("Inconsistent state of the protocol")]
    Inconsistent,
    #[error("Not yet authenticated")]
    NotAuthenticated,
    #[error("Authentication methods exhausted")]
    NoAuthMethod,
    #[error("Index out of bounds")]
    IndexOutOfBounds,
    #[error("Unknown or unacceptable host key")]
    UnknownKey,
    #[error("Host key verification refused by the user")]
    HostKeyRefused,
    #[error("Wrong server signature")]
    WrongServerSig,
    #[error("Channel not open")]
    WrongChannel,
    #[error("Disconnected: {0}")]
    Disconnect(String),
    #[error("Connection closed by the remote side")]
    Hup,
    #[error("Proxy negotiation failed: {0}")]
    Proxy(String),
    #[error(transparent)]
    Keys(#[from] sshcore_keys::Error),
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Compress(#[from] flate2::CompressError),
    #[error(transparent)]
    Decompress(#[from] flate2::DecompressError),
    #[error(transparent)]
    Openssl(#[from] openssl::error::ErrorStack),
}

/// Classification of §7's four error kinds, consumed by the backend façade
/// to decide whether to just log or to tear the session down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Framing/MAC/CRC/decompression failure, disconnect received,
    /// unexpected packet, host key refused, signature verification failed.
    TransportFatal,
    /// Authentication exhausted, server refused shell/command.
    ProtocolFatal,
    /// `USERAUTH_FAILURE`, `OPEN_FAILURE` on an optional channel, refused
    /// optional request: log it, turn the feature off, keep going.
    Recoverable,
}

impl Error {
    pub fn severity(&self) -> Severity {
        match self {
            Error::NoAuthMethod => Severity::ProtocolFatal,
            Error::Disconnect(_) | Error::Hup => Severity::ProtocolFatal,
            _ => Severity::TransportFatal,
        }
    }
}
