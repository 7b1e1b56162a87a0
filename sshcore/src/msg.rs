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
//! Message-number constants for both protocol generations.

/// SSH-2 (RFC 4250-era numbering).
pub mod ssh2 {
    pub const DISCONNECT: u8 = 1;
    pub const IGNORE: u8 = 2;
    pub const UNIMPLEMENTED: u8 = 3;
    pub const DEBUG: u8 = 4;
    pub const SERVICE_REQUEST: u8 = 5;
    pub const SERVICE_ACCEPT: u8 = 6;
    pub const KEXINIT: u8 = 20;
    pub const NEWKEYS: u8 = 21;

    pub const KEXDH_INIT: u8 = 30;
    pub const KEXDH_REPLY: u8 = 31;
    pub const KEX_DH_GEX_REQUEST: u8 = 30;
    pub const KEX_DH_GEX_GROUP: u8 = 31;
    pub const KEX_DH_GEX_INIT: u8 = 32;
    pub const KEX_DH_GEX_REPLY: u8 = 33;

    pub const USERAUTH_REQUEST: u8 = 50;
    pub const USERAUTH_FAILURE: u8 = 51;
    pub const USERAUTH_SUCCESS: u8 = 52;
    pub const USERAUTH_BANNER: u8 = 53;
    pub const USERAUTH_PK_OK: u8 = 60;
    pub const USERAUTH_INFO_REQUEST: u8 = 60;
    pub const USERAUTH_INFO_RESPONSE: u8 = 61;

    pub const GLOBAL_REQUEST: u8 = 80;
    pub const REQUEST_SUCCESS: u8 = 81;
    pub const REQUEST_FAILURE: u8 = 82;

    pub const CHANNEL_OPEN: u8 = 90;
    pub const CHANNEL_OPEN_CONFIRMATION: u8 = 91;
    pub const CHANNEL_OPEN_FAILURE: u8 = 92;
    pub const CHANNEL_WINDOW_ADJUST: u8 = 93;
    pub const CHANNEL_DATA: u8 = 94;
    pub const CHANNEL_EXTENDED_DATA: u8 = 95;
    pub const CHANNEL_EOF: u8 = 96;
    pub const CHANNEL_CLOSE: u8 = 97;
    pub const CHANNEL_REQUEST: u8 = 98;
    pub const CHANNEL_SUCCESS: u8 = 99;
    pub const CHANNEL_FAILURE: u8 = 100;

    // Disconnect reason codes.
    pub const DISCONNECT_HOST_NOT_ALLOWED_TO_CONNECT: u32 = 1;
    pub const DISCONNECT_PROTOCOL_ERROR: u32 = 2;
    pub const DISCONNECT_KEY_EXCHANGE_FAILED: u32 = 3;
    pub const DISCONNECT_MAC_ERROR: u32 = 4;
    pub const DISCONNECT_COMPRESSION_ERROR: u32 = 5;
    pub const DISCONNECT_SERVICE_NOT_AVAILABLE: u32 = 6;
    pub const DISCONNECT_PROTOCOL_VERSION_NOT_SUPPORTED: u32 = 7;
    pub const DISCONNECT_HOST_KEY_NOT_VERIFIABLE: u32 = 8;
    pub const DISCONNECT_CONNECTION_LOST: u32 = 9;
    pub const DISCONNECT_APPLICATION: u32 = 11;
    pub const DISCONNECT_NO_MORE_AUTH_METHODS_AVAILABLE: u32 = 14;
    pub const DISCONNECT_ILLEGAL_USER_NAME: u32 = 15;

    pub const EXTENDED_DATA_STDERR: u32 = 1;
}

/// SSH-1 (1.5-era, including the extensions used by 1.2.x servers).
pub mod ssh1 {
    pub const MSG_DISCONNECT: u8 = 1;
    pub const SMSG_PUBLIC_KEY: u8 = 2;
    pub const CMSG_SESSION_KEY: u8 = 3;
    pub const CMSG_USER: u8 = 4;
    pub const CMSG_AUTH_RHOSTS: u8 = 5;
    pub const CMSG_AUTH_RSA: u8 = 6;
    pub const SMSG_AUTH_RSA_CHALLENGE: u8 = 7;
    pub const CMSG_AUTH_RSA_RESPONSE: u8 = 8;
    pub const CMSG_AUTH_PASSWORD: u8 = 9;
    pub const CMSG_REQUEST_PTY: u8 = 10;
    pub const CMSG_WINDOW_SIZE: u8 = 11;
    pub const CMSG_EXEC_SHELL: u8 = 12;
    pub const CMSG_EXEC_CMD: u8 = 13;
    pub const SMSG_SUCCESS: u8 = 14;
    pub const SMSG_FAILURE: u8 = 15;
    pub const CMSG_STDIN_DATA: u8 = 16;
    pub const SMSG_STDOUT_DATA: u8 = 17;
    pub const SMSG_STDERR_DATA: u8 = 18;
    pub const CMSG_EOF: u8 = 19;
    pub const SMSG_EXIT_STATUS: u8 = 20;
    pub const MSG_CHANNEL_OPEN_CONFIRMATION: u8 = 21;
    pub const MSG_CHANNEL_OPEN_FAILURE: u8 = 22;
    pub const MSG_CHANNEL_DATA: u8 = 23;
    pub const MSG_CHANNEL_CLOSE: u8 = 24;
    pub const MSG_CHANNEL_CLOSE_CONFIRMATION: u8 = 25;
    pub const SMSG_X11_OPEN: u8 = 27;
    pub const CMSG_PORT_FORWARD_REQUEST: u8 = 28;
    pub const MSG_PORT_OPEN: u8 = 29;
    pub const CMSG_AGENT_REQUEST_FORWARDING: u8 = 30;
    pub const SMSG_AGENT_OPEN: u8 = 31;
    pub const MSG_IGNORE: u8 = 32;
    pub const CMSG_EXIT_CONFIRMATION: u8 = 33;
    pub const CMSG_X11_REQUEST_FORWARDING: u8 = 34;
    pub const CMSG_AUTH_TIS: u8 = 39;
    pub const SMSG_AUTH_TIS_CHALLENGE: u8 = 40;
    pub const CMSG_AUTH_TIS_RESPONSE: u8 = 41;
    pub const CMSG_AUTH_CCARD: u8 = 70;
    pub const SMSG_AUTH_CCARD_CHALLENGE: u8 = 71;
    pub const CMSG_AUTH_CCARD_RESPONSE: u8 = 72;
    pub const MSG_DEBUG: u8 = 36;

    /// Bitmask values for `SMSG_PUBLIC_KEY`'s "supported auths" field.
    pub const AUTH_RHOSTS: u32 = 1;
    pub const AUTH_RSA: u32 = 2;
    pub const AUTH_PASSWORD: u32 = 3;
    pub const AUTH_RHOSTS_RSA: u32 = 4;
    pub const AUTH_TIS: u32 = 5;
    pub const AUTH_CCARD: u32 = 16;

    /// Bitmask values for `SMSG_PUBLIC_KEY`'s "supported ciphers" field.
    pub const CIPHER_NONE: u32 = 0;
    pub const CIPHER_IDEA: u32 = 1;
    pub const CIPHER_DES: u32 = 2;
    pub const CIPHER_3DES: u32 = 3;
    pub const CIPHER_BLOWFISH: u32 = 6;
}
