//! The `known_hosts`-style host key cache: a line-oriented file, one
//! `<keytype>@<port>:<hostname> <key-data>` record per line.
//! Lookup is strict equality on the record prefix; mutation is
//! atomic-by-rename so a crash mid-write never corrupts the file.

use crate::Error;
use data_encoding::BASE64;
use std::fs;
use std::path::{Path, PathBuf};

/// The result of comparing a freshly-received host key against the cache.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// No record for this `keytype@port:hostname`; a new-host prompt.
    Unknown,
    /// Record found and byte-identical to what was received.
    Match,
    /// Record found but the key differs: a possible MITM prompt.
    Mismatch,
}

fn record_prefix(keytype: &str, port: u16, hostname: &str) -> String {
    format!("{}@{}:{}", keytype, port, hostname)
}

pub struct HostKeyCache {
    path: PathBuf,
}

impl HostKeyCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        HostKeyCache { path: path.into() }
    }

    fn read_lines(&self) -> Result<Vec<String>, Error> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents.lines().map(|l| l.to_string()).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::IO(e)),
        }
    }

    /// Check a received key blob against the cache.
    pub fn check(&self, keytype: &str, port: u16, hostname: &str, key_blob: &[u8]) -> Result<Verdict, Error> {
        let prefix = record_prefix(keytype, port, hostname);
        let encoded = BASE64.encode(key_blob);
        for line in self.read_lines()? {
            if let Some((p, data)) = line.split_once(' ') {
                if p == prefix {
                    return Ok(if data == encoded { Verdict::Match } else { Verdict::Mismatch });
                }
            }
        }
        Ok(Verdict::Unknown)
    }

    /// Record (or replace) the key for `keytype@port:hostname`, atomically.
    pub fn store(&self, keytype: &str, port: u16, hostname: &str, key_blob: &[u8]) -> Result<(), Error> {
        let prefix = record_prefix(keytype, port, hostname);
        let encoded = BASE64.encode(key_blob);
        let mut lines: Vec<String> =
            self.read_lines()?.into_iter().filter(|l| !l.starts_with(&format!("{} ", prefix))).collect();
        lines.push(format!("{} {}", prefix, encoded));

        let tmp_path = tmp_path_for(&self.path);
        let mut contents = lines.join("\n");
        contents.push('\n');
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, &self.path)?;
        debug!("stored host key record {} in {:?}", prefix, self.path);
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_host_reports_unknown() {
        let dir = std::env::temp_dir().join(format!("sshcore-hostkeys-test-{}", std::process::id()));
        let cache = HostKeyCache::new(dir.join("unknown_host"));
        let verdict = cache.check("ssh-ed25519", 22, "example.com", b"blob").unwrap();
        assert_eq!(verdict, Verdict::Unknown);
    }

    #[test]
    fn store_then_check_matches_and_detects_mismatch() {
        let dir = std::env::temp_dir().join(format!("sshcore-hostkeys-test2-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("known_hosts");
        let cache = HostKeyCache::new(&path);

        cache.store("ssh-ed25519", 22, "example.com", b"first-key").unwrap();
        assert_eq!(cache.check("ssh-ed25519", 22, "example.com", b"first-key").unwrap(), Verdict::Match);
        assert_eq!(cache.check("ssh-ed25519", 22, "example.com", b"other-key").unwrap(), Verdict::Mismatch);

        cache.store("ssh-ed25519", 22, "example.com", b"second-key").unwrap();
        assert_eq!(cache.check("ssh-ed25519", 22, "example.com", b"second-key").unwrap(), Verdict::Match);

        let lines = fs::read_to_string(&path).unwrap();
        assert_eq!(lines.lines().count(), 1, "replacement must not duplicate the record");

        fs::remove_dir_all(&dir).ok();
    }
}
