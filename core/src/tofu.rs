/*
 * tofu.rs
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

//! Trust-on-first-use certificate verification.
//!
//! [`decide`] is the whole policy: fingerprint the leaf certificate, compare it with the
//! pinned record, pin on first contact. [`TofuVerifier`] plugs it into the rustls handshake.
//! Chain, name and expiry checks are not performed; the pinned leaf is the only trust anchor.
//! Any trust store failure rejects the handshake.

use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{CertificateError, DigitallySignedStruct, Error as TlsError, SignatureScheme};

use crate::config::MismatchPolicy;
use crate::error::{GeminiError, TrustStoreError};
use crate::trust::TrustStore;

/// base64(SHA-256(der)), standard alphabet with padding.
pub fn fingerprint(der: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(der))
}

/// Accepted handshake outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustDecision {
    /// Host was unknown; its fingerprint is now pinned.
    FirstContact,
    /// Presented certificate matches the pinned fingerprint.
    Trusted,
}

/// Rejected handshake outcome.
#[derive(Debug, thiserror::Error)]
pub enum TrustRejection {
    #[error("certificate for {host} does not match the trusted fingerprint")]
    Mismatch { host: String },
    #[error(transparent)]
    Store(#[from] TrustStoreError),
}

impl From<TrustRejection> for GeminiError {
    fn from(r: TrustRejection) -> Self {
        match r {
            TrustRejection::Mismatch { host } => GeminiError::CertificateMismatch { host },
            TrustRejection::Store(e) => GeminiError::TrustStore(e),
        }
    }
}

/// Decide whether to accept `leaf_der` for `host`.
pub fn decide(
    host: &str,
    leaf_der: &[u8],
    store: &dyn TrustStore,
    policy: MismatchPolicy,
) -> Result<TrustDecision, TrustRejection> {
    let presented = fingerprint(leaf_der);
    match store.get(host)? {
        None => {
            store.save(host, &presented)?;
            log::info!("pinned certificate for {} on first contact: {}", host, presented);
            Ok(TrustDecision::FirstContact)
        }
        Some(stored) if stored == presented => {
            log::debug!("certificate for {} matches pinned fingerprint", host);
            Ok(TrustDecision::Trusted)
        }
        Some(stored) => {
            log::warn!(
                "certificate mismatch for {}: pinned {}, presented {}",
                host,
                stored,
                presented
            );
            if policy == MismatchPolicy::ForgetStale {
                store.delete(host).map_err(|e| {
                    log::warn!("could not forget stale fingerprint for {}: {}", host, e);
                    TrustRejection::Store(e)
                })?;
                log::info!("forgot stale fingerprint for {}", host);
            }
            Err(TrustRejection::Mismatch { host: host.to_string() })
        }
    }
}

/// rustls verifier for one connection. Signatures are still checked against the presented
/// certificate's key; only chain building is replaced by [`decide`].
///
/// The rejection reason is kept so the caller can report it instead of the generic TLS error.
pub struct TofuVerifier {
    host: String,
    store: Arc<dyn TrustStore>,
    policy: MismatchPolicy,
    provider: Arc<CryptoProvider>,
    rejection: Mutex<Option<TrustRejection>>,
}

impl std::fmt::Debug for TofuVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TofuVerifier")
            .field("host", &self.host)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TofuVerifier {
    pub fn new(
        host: impl Into<String>,
        store: Arc<dyn TrustStore>,
        policy: MismatchPolicy,
        provider: Arc<CryptoProvider>,
    ) -> Self {
        Self {
            host: host.into(),
            store,
            policy,
            provider,
            rejection: Mutex::new(None),
        }
    }

    /// Reason the last handshake was rejected, if it was.
    pub fn take_rejection(&self) -> Option<TrustRejection> {
        self.rejection.lock().ok().and_then(|mut r| r.take())
    }
}

impl ServerCertVerifier for TofuVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        match decide(&self.host, end_entity.as_ref(), self.store.as_ref(), self.policy) {
            Ok(_) => Ok(ServerCertVerified::assertion()),
            Err(rejection) => {
                let tls_err = match &rejection {
                    TrustRejection::Mismatch { .. } => {
                        TlsError::InvalidCertificate(CertificateError::ApplicationVerificationFailure)
                    }
                    TrustRejection::Store(e) => TlsError::General(e.to_string()),
                };
                if let Ok(mut slot) = self.rejection.lock() {
                    *slot = Some(rejection);
                }
                Err(tls_err)
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
