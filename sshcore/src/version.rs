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
//! Version-string exchange and the bug-compatibility table it feeds.
//! Servers identify themselves with a free-text comment after the
//! protocol version, and a handful of
//! old/broken servers need specific workarounds keyed off that string,
//! the same way PuTTY's `ssh_detect_bugs` does.

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoVersion {
    Ssh1,
    Ssh2,
}

#[derive(Debug, Clone, Default)]
pub struct BugCompat {
    /// Old SSH-1 servers choke if `MSG_IGNORE` is sent before authentication.
    pub chokes_on_ssh1_ignore: bool,
    /// 2.0.x-2.3.x servers that advertise HMAC incorrectly and only
    /// understand `hmac-md5`/`none`.
    pub ssh2_hmac_bug: bool,
    /// Old servers that mis-implement the RSA padding in a way that
    /// requires an unpadded, non-random-padded challenge response.
    pub ssh1_rsa_padding_bug: bool,
}

/// Recognise a handful of comment substrings the way PuTTY's bug table
/// does.
pub fn detect_bugs(banner: &str) -> BugCompat {
    let mut bugs = BugCompat::default();
    if banner.contains("Cisco-1.25") {
        bugs.chokes_on_ssh1_ignore = true;
        bugs.ssh1_rsa_padding_bug = true;
    }
    if banner.contains("OpenSSH_2.0") || banner.contains("OpenSSH_2.1") || banner.contains("OpenSSH_2.2")
        || banner.contains("OpenSSH_2.3")
    {
        bugs.ssh2_hmac_bug = true;
    }
    bugs
}

/// Parse a `SSH-1.99-...`/`SSH-2.0-...`/`SSH-1.5-...` banner line (without
/// trailing CR/LF), returning the highest protocol version both we and
/// the peer can speak plus the full line (needed verbatim in `I_S`/`V_S`
/// for the SSH-2 exchange hash).
pub fn parse_banner(line: &str) -> Result<(ProtoVersion, &str), Error> {
    let rest = line.strip_prefix("SSH-").ok_or(Error::Version)?;
    if let Some(r) = rest.strip_prefix("2.0-") {
        Ok((ProtoVersion::Ssh2, r))
    } else if let Some(r) = rest.strip_prefix("1.99-") {
        // 1.99 means "I speak both"; we always prefer SSH-2 when offered.
        Ok((ProtoVersion::Ssh2, r))
    } else if let Some(r) = rest.strip_prefix("1.5-") {
        Ok((ProtoVersion::Ssh1, r))
    } else {
        Err(Error::Version)
    }
}

pub const CLIENT_BANNER_SSH2: &str = "SSH-2.0-sshcore_0.1";
pub const CLIENT_BANNER_SSH1: &str = "SSH-1.5-sshcore_0.1";

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_ssh2_banner() {
        let (v, comment) = parse_banner("SSH-2.0-OpenSSH_9.2").unwrap();
        assert_eq!(v, ProtoVersion::Ssh2);
        assert_eq!(comment, "OpenSSH_9.2");
    }

    #[test]
    fn parses_compat_1_99_as_ssh2() {
        let (v, _) = parse_banner("SSH-1.99-Sun_SSH_1.1").unwrap();
        assert_eq!(v, ProtoVersion::Ssh2);
    }

    #[test]
    fn detects_buggy_hmac_servers() {
        let bugs = detect_bugs("SSH-2.0-OpenSSH_2.3.0");
        assert!(bugs.ssh2_hmac_bug);
    }

    #[test]
    fn rejects_garbage_banner() {
        assert!(parse_banner("not a banner").is_err());
    }
}
