/*
 * error.rs
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

//! Fetch and trust store errors.

use std::io;

/// Errors from the trust store backends (file, keychain, memory).
#[derive(Debug, thiserror::Error)]
pub enum TrustStoreError {
    /// Backend could not be reached or refused the operation.
    #[error("trust store unavailable: {0}")]
    Unavailable(String),
    /// Reading or writing the known-hosts file failed.
    #[error("trust store i/o: {0}")]
    Io(#[from] io::Error),
}

impl TrustStoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Errors surfaced by [`crate::client::GeminiClient::get`].
///
/// Nothing is retried; whatever went wrong in the attempt is reported as-is.
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    /// Wrong scheme, missing host, or a request line that cannot be encoded.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// Response header line was malformed or not UTF-8.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Redirect meta did not resolve to an absolute gemini URL.
    #[error("invalid redirect URL: {0}")]
    InvalidRedirectUrl(String),
    /// The redirect chain went past the configured limit.
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(u8),
    /// Peer closed the connection before the header line was complete.
    #[error("connection closed")]
    ConnectionClosed,
    /// Host presented a certificate other than the pinned one.
    #[error("certificate for {host} does not match the trusted fingerprint")]
    CertificateMismatch { host: String },
    /// Trust store failed during the handshake; the handshake was rejected.
    #[error(transparent)]
    TrustStore(#[from] TrustStoreError),
    /// Socket or TLS failure.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("{0}")]
    Custom(String),
}

impl GeminiError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GeminiError>;
