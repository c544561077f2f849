/*
 * lib.rs
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

//! Gemello core: a Gemini protocol client.
//!
//! One request line over a fresh TLS connection, one `<status> <meta>` header back, then a body
//! until the server closes (Success), a redirect to follow (at most five hops), or nothing.
//! Servers are trusted on first use: the leaf certificate's SHA-256 fingerprint is pinned per
//! host in a [`trust::TrustStore`] and later connections must present the same certificate.

pub mod buffer;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod net;
pub mod redirect;
pub mod tofu;
pub mod trust;

pub use client::{CancelToken, Fetched, GeminiClient, Response};
pub use codec::StatusCategory;
pub use config::{ClientConfig, MismatchPolicy};
pub use error::{GeminiError, TrustStoreError};
pub use trust::{FileTrustStore, KeyringTrustStore, MemoryTrustStore, TrustStore};
