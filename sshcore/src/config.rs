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
//! Client-side connection configuration, owned by the host program and
//! handed to [`crate::backend::SshBackend::init`]. There is no server
//! configuration and no persistence beyond the host-key cache file and
//! private-key files (no GUI settings dialog is in scope).

use crate::negotiation::Preferred;
use std::path::PathBuf;

pub struct Config {
    /// Negotiation preference order for kex/host-key/cipher/mac/compression.
    pub preferred: Preferred,
    /// Rekey once this many bytes have been sent+received since the last
    /// key exchange, in either direction.
    pub rekey_data_limit: u64,
    /// Rekey once this many seconds have elapsed since the last key
    /// exchange, regardless of traffic volume.
    pub rekey_time_secs: u32,
    /// Interval between keepalive pings (`SSH_MSG_GLOBAL_REQUEST
    /// "keepalive@openssh.com"` for SSH-2, `SSH_MSG_IGNORE` for SSH-1).
    /// `None` disables keepalives.
    pub keepalive_interval_secs: Option<u32>,
    /// How long to wait for the initial connection/version exchange
    /// before giving up. `None` means wait indefinitely.
    pub connection_timeout_secs: Option<u32>,
    /// Path to the `known_hosts`-style host key cache file.
    /// `None` disables the cache: every host key is treated as unknown.
    pub host_key_cache_path: Option<PathBuf>,
    /// Username offered during authentication.
    pub user: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            preferred: Preferred::default(),
            rekey_data_limit: 1 << 30,
            rekey_time_secs: 3600,
            keepalive_interval_secs: Some(60),
            connection_timeout_secs: Some(30),
            host_key_cache_path: None,
            user: String::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_enable_keepalive_and_rekey_by_default() {
        let config = Config::default();
        assert_eq!(config.rekey_data_limit, 1 << 30);
        assert_eq!(config.rekey_time_secs, 3600);
        assert_eq!(config.keepalive_interval_secs, Some(60));
        assert!(config.host_key_cache_path.is_none());
    }
}
