/*
 * config.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Gemello, a Gemini protocol client.
 *
 * Gemello is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Gemello is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Gemello.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Client configuration: redirect limit, read chunk size, optional I/O timeout, and what to do
//! with a pinned fingerprint when a host presents a different certificate.
//! Also the default location of the known-hosts file (~/.gemello/known_hosts).

use std::path::PathBuf;
use std::time::Duration;

/// Default Gemini port when the URL carries none.
pub const DEFAULT_PORT: u16 = 1965;

/// Redirect hops followed within one fetch before giving up.
pub const DEFAULT_MAX_REDIRECTS: u8 = 5;

/// Bytes requested from the transport per receive.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// What happens to the stored fingerprint when a host presents a different certificate.
/// The attempt fails with `CertificateMismatch` either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Keep the pinned fingerprint; the user must reset it out of band.
    #[default]
    KeepPinned,
    /// Delete the pinned fingerprint so the next connection re-pins on first contact.
    ForgetStale,
}

/// Settings for a [`crate::client::GeminiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub max_redirects: u8,
    pub chunk_size: usize,
    /// Bound on connect+handshake and on each send/receive. `None` waits forever.
    pub io_timeout: Option<Duration>,
    pub mismatch_policy: MismatchPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            io_timeout: None,
            mismatch_policy: MismatchPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.mismatch_policy = policy;
        self
    }

    pub fn with_max_redirects(mut self, max: u8) -> Self {
        self.max_redirects = max;
        self
    }

    /// Chunk size is clamped to at least one byte.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }
}

/// Default config directory: ~/.gemello.
pub fn default_config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from).map(|h| h.join(".gemello"))
}

/// Default known-hosts path for [`crate::trust::FileTrustStore`]: ~/.gemello/known_hosts.
pub fn default_trust_path() -> Option<PathBuf> {
    default_config_dir().map(|d| d.join("known_hosts"))
}
