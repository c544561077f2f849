/*
 * net.rs
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

//! TLS connections for one request/response exchange each.
//!
//! A [`Connection`] is opened with implicit TLS (1.2 or 1.3) and trust-on-first-use
//! verification, carries one request and one response, and is then closed. It is never reused.
//!
//! The connection state lives behind one mutex ([`StateHandle`]) shared with whoever may
//! cancel the exchange. Only transitions in the table are applied. Closed, Failed and Cancelled
//! are terminal, so a failure noticed after a cancel is dropped and cancel always wins.

use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::crypto::CryptoProvider;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::version::{TLS12, TLS13};
use tokio_rustls::rustls::ClientConfig as TlsClientConfig;
use tokio_rustls::TlsConnector;

use crate::buffer::ChunkSource;
use crate::config::{ClientConfig, MismatchPolicy};
use crate::error::{GeminiError, Result};
use crate::tofu::TofuVerifier;
use crate::trust::TrustStore;

/// Lifecycle of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Ready,
    Sending,
    AwaitingHeader,
    StreamingBody,
    Redirecting,
    Closed,
    Failed(String),
    Cancelled,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed(_) | Self::Cancelled)
    }

    /// Transition table. Any live state may close, fail or be cancelled; terminal states
    /// go nowhere.
    pub fn can_transition_to(&self, next: &ConnectionState) -> bool {
        use ConnectionState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Closed) | (_, Failed(_)) | (_, Cancelled) => true,
            (Idle, Connecting) => true,
            (Connecting, Ready) => true,
            (Ready, Sending) => true,
            (Sending, AwaitingHeader) => true,
            (AwaitingHeader, StreamingBody) | (AwaitingHeader, Redirecting) => true,
            _ => false,
        }
    }
}

/// Shared, authoritative state of one connection.
#[derive(Debug, Clone)]
pub struct StateHandle(Arc<Mutex<ConnectionState>>);

impl Default for StateHandle {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(ConnectionState::Idle)))
    }
}

impl StateHandle {
    pub fn get(&self) -> ConnectionState {
        self.0
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Apply `next` if the table allows it. Returns whether it was applied.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if state.can_transition_to(&next) {
            *state = next;
            true
        } else {
            log::debug!("ignoring transition {:?} -> {:?}", *state, next);
            false
        }
    }

    /// Record a failure. Returns false if the connection had already ended (including by
    /// cancellation), in which case the failure is not reported.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.transition(ConnectionState::Failed(reason.into()))
    }

    pub fn cancel(&self) -> bool {
        self.transition(ConnectionState::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.get() == ConnectionState::Cancelled
    }
}

/// Builds TLS connections that verify peers against a trust store.
#[derive(Clone)]
pub struct Connector {
    store: Arc<dyn TrustStore>,
    provider: Arc<CryptoProvider>,
    policy: MismatchPolicy,
    io_timeout: Option<Duration>,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("policy", &self.policy)
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}

impl Connector {
    pub fn new(store: Arc<dyn TrustStore>, config: &ClientConfig) -> Self {
        Self {
            store,
            provider: Arc::new(tokio_rustls::rustls::crypto::ring::default_provider()),
            policy: config.mismatch_policy,
            io_timeout: config.io_timeout,
        }
    }

    /// Per-connection TLS config: the verifier carries the host it pins against.
    fn tls_config(&self, verifier: Arc<TofuVerifier>) -> Result<TlsClientConfig> {
        let config = TlsClientConfig::builder_with_provider(self.provider.clone())
            .with_protocol_versions(&[&TLS13, &TLS12])
            .map_err(|e| GeminiError::Transport(io::Error::new(io::ErrorKind::Other, e)))?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();
        Ok(config)
    }

    /// Open a connection to `host:port`: TCP connect, then TLS handshake with TOFU.
    pub async fn open(&self, host: &str, port: u16) -> Result<Connection> {
        let mut conn = Connection::new(host, port, self.io_timeout);
        conn.open(self).await?;
        Ok(conn)
    }
}

async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        None => fut.await,
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "operation timed out"))?,
    }
}

/// One TLS connection, one exchange.
pub struct Connection {
    host: String,
    port: u16,
    stream: Option<TlsStream<TcpStream>>,
    state: StateHandle,
    io_timeout: Option<Duration>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state.get())
            .finish()
    }
}

impl Connection {
    /// Idle connection; nothing is opened until [`Connection::open`].
    pub fn new(host: impl Into<String>, port: u16, io_timeout: Option<Duration>) -> Self {
        Self {
            host: host.into(),
            port,
            stream: None,
            state: StateHandle::default(),
            io_timeout,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Handle for cancelling from outside an in-flight operation.
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    /// Advance to `next`; an illegal transition (for example after cancel) is an error.
    pub fn advance(&self, next: ConnectionState) -> Result<()> {
        if self.state.transition(next.clone()) {
            Ok(())
        } else {
            Err(self.not_live(&format!("cannot enter {:?}", next)))
        }
    }

    fn not_live(&self, what: &str) -> GeminiError {
        match self.state.get() {
            ConnectionState::Cancelled => GeminiError::custom("connection cancelled"),
            ConnectionState::Closed => GeminiError::ConnectionClosed,
            state => GeminiError::custom(format!("{}: connection is {:?}", what, state)),
        }
    }

    /// Record `err` as the failure reason unless the connection already ended.
    fn failed(&self, err: GeminiError) -> GeminiError {
        if !self.state.fail(err.to_string()) {
            log::debug!("{}:{}: suppressed failure after end: {}", self.host, self.port, err);
        }
        err
    }

    /// TCP connect and TLS handshake. Idle -> Connecting -> Ready.
    pub async fn open(&mut self, connector: &Connector) -> Result<()> {
        self.advance(ConnectionState::Connecting)?;
        let server_name = match ServerName::try_from(self.host.clone()) {
            Ok(name) => name,
            Err(_) => {
                return Err(self.failed(GeminiError::InvalidUrl(format!(
                    "invalid host name {:?}",
                    self.host
                ))))
            }
        };
        let verifier = Arc::new(TofuVerifier::new(
            self.host.clone(),
            connector.store.clone(),
            connector.policy,
            connector.provider.clone(),
        ));
        let tls = TlsConnector::from(Arc::new(connector.tls_config(verifier.clone())?));
        log::debug!("connecting to {}:{}", self.host, self.port);
        let (host, port) = (self.host.as_str(), self.port);
        let handshake = async {
            let tcp = TcpStream::connect((host, port)).await?;
            tls.connect(server_name, tcp).await
        };
        match with_timeout(self.io_timeout, handshake).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.advance(ConnectionState::Ready)?;
                log::debug!("connected to {}:{}", self.host, self.port);
                Ok(())
            }
            Err(e) => {
                let err = match verifier.take_rejection() {
                    Some(rejection) => rejection.into(),
                    None => GeminiError::Transport(e),
                };
                Err(self.failed(err))
            }
        }
    }

    /// Write the whole request. Ready -> Sending -> AwaitingHeader.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.advance(ConnectionState::Sending)?;
        let limit = self.io_timeout;
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return Err(self.failed(GeminiError::ConnectionClosed)),
        };
        let write = async {
            stream.write_all(bytes).await?;
            stream.flush().await
        };
        if let Err(e) = with_timeout(limit, write).await {
            return Err(self.failed(e.into()));
        }
        self.advance(ConnectionState::AwaitingHeader)
    }

    /// Read up to `max` bytes. `Ok(None)` once the peer has closed.
    pub async fn receive(&mut self, max: usize) -> Result<Option<Bytes>> {
        if self.state.get().is_terminal() {
            return Err(self.not_live("receive"));
        }
        let limit = self.io_timeout;
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return Err(self.failed(GeminiError::ConnectionClosed)),
        };
        let mut buf = vec![0u8; max.max(1)];
        match with_timeout(limit, stream.read(&mut buf)).await {
            Ok(0) => Ok(None),
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
            // Peer dropped the socket without close_notify; the stream has still ended.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                log::debug!("{}:{}: closed without close_notify", self.host, self.port);
                Ok(None)
            }
            Err(e) => Err(self.failed(e.into())),
        }
    }

    /// Shut down the TLS stream. Safe to call any number of times.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            match with_timeout(self.io_timeout, stream.shutdown()).await {
                Ok(()) => log::debug!("closed connection to {}:{}", self.host, self.port),
                Err(e) => log::debug!("{}:{}: shutdown failed on close: {}", self.host, self.port, e),
            }
        }
        self.state.transition(ConnectionState::Closed);
    }

    /// Mark the connection cancelled. Idempotent; later failures are not reported.
    pub fn cancel(&self) {
        if self.state.cancel() {
            log::debug!("cancelled connection to {}:{}", self.host, self.port);
        }
    }
}

impl ChunkSource for Connection {
    async fn receive(&mut self, max: usize) -> Result<Option<Bytes>> {
        Connection::receive(self, max).await
    }
}
