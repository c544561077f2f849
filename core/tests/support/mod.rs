/*
 * mod.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Loopback Gemini server for integration tests. Serves TLS with one of two fixture
 * certificates and answers each request line with whatever the test's handler returns.
 */

#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gemello_core::error::TrustStoreError;
use gemello_core::trust::{MemoryTrustStore, TrustStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

/// Which fixture certificate the server presents.
#[derive(Debug, Clone, Copy)]
pub enum Cert {
    First,
    Second,
}

impl Cert {
    fn pem(self) -> (&'static [u8], &'static [u8]) {
        match self {
            Cert::First => (
                include_bytes!("../certs/first/cert.pem"),
                include_bytes!("../certs/first/key.pem"),
            ),
            Cert::Second => (
                include_bytes!("../certs/second/cert.pem"),
                include_bytes!("../certs/second/key.pem"),
            ),
        }
    }

    /// DER of the leaf certificate, for computing the expected fingerprint.
    pub fn der(self) -> Vec<u8> {
        let (_, cert) = pem_rfc7468::decode_vec(self.pem().0).unwrap();
        cert
    }
}

fn server_config(cert: Cert) -> ServerConfig {
    let (cert_pem, key_pem) = cert.pem();
    let (_, cert) = pem_rfc7468::decode_vec(cert_pem).unwrap();
    let (label, key) = pem_rfc7468::decode_vec(key_pem).unwrap();
    let key = match label {
        "PRIVATE KEY" => PrivateKeyDer::Pkcs8(key.into()),
        "EC PRIVATE KEY" => PrivateKeyDer::Sec1(key.into()),
        _ => panic!("unknown key type {}", label),
    };
    ServerConfig::builder_with_provider(Arc::new(
        tokio_rustls::rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![CertificateDer::from(cert)], key)
    .unwrap()
}

/// What the server does after reading the request line.
pub enum Reply {
    /// Write the bytes in one go, then close with close_notify.
    Close(Vec<u8>),
    /// Write the bytes, then drop the socket without close_notify.
    Abrupt(Vec<u8>),
    /// Say nothing and keep the connection open.
    Hang,
}

impl Reply {
    pub fn text(s: &str) -> Self {
        Reply::Close(s.as_bytes().to_vec())
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self, path: &str) -> String {
        format!("gemini://127.0.0.1:{}{}", self.port(), path)
    }

    /// Request lines received so far, CRLF stripped. One per connection.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

pub async fn serve<F>(cert: Cert, handler: F) -> TestServer
where
    F: Fn(&str) -> Reply + Send + Sync + 'static,
{
    init_logging();
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(server_config(cert)));
    let handler = Arc::new(handler);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let handler = handler.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                // The client rejects the handshake when it does not trust us.
                let mut tls = match acceptor.accept(tcp).await {
                    Ok(s) => s,
                    Err(_) => return,
                };
                let mut line = Vec::new();
                let mut byte = [0u8; 1];
                loop {
                    match tls.read(&mut byte).await {
                        Ok(1) if byte[0] == b'\n' => break,
                        Ok(1) => line.push(byte[0]),
                        _ => return,
                    }
                }
                let request = String::from_utf8_lossy(&line).trim_end().to_string();
                seen.lock().unwrap().push(request.clone());
                match handler(&request) {
                    Reply::Close(bytes) => {
                        let _ = tls.write_all(&bytes).await;
                        let _ = tls.shutdown().await;
                    }
                    Reply::Abrupt(bytes) => {
                        let _ = tls.write_all(&bytes).await;
                        let _ = tls.flush().await;
                        drop(tls);
                    }
                    Reply::Hang => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
            });
        }
    });

    TestServer { addr, requests }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Memory store that counts writes.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryTrustStore,
    saves: Mutex<usize>,
    deletes: Mutex<usize>,
}

impl CountingStore {
    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    pub fn deletes(&self) -> usize {
        *self.deletes.lock().unwrap()
    }
}

impl TrustStore for CountingStore {
    fn get(&self, host: &str) -> Result<Option<String>, TrustStoreError> {
        self.inner.get(host)
    }

    fn save(&self, host: &str, fingerprint: &str) -> Result<(), TrustStoreError> {
        *self.saves.lock().unwrap() += 1;
        self.inner.save(host, fingerprint)
    }

    fn delete(&self, host: &str) -> Result<(), TrustStoreError> {
        *self.deletes.lock().unwrap() += 1;
        self.inner.delete(host)
    }
}

/// Store that is never reachable.
pub struct UnavailableStore;

impl TrustStore for UnavailableStore {
    fn get(&self, _host: &str) -> Result<Option<String>, TrustStoreError> {
        Err(TrustStoreError::unavailable("keychain locked"))
    }

    fn save(&self, _host: &str, _fingerprint: &str) -> Result<(), TrustStoreError> {
        Err(TrustStoreError::unavailable("keychain locked"))
    }

    fn delete(&self, _host: &str) -> Result<(), TrustStoreError> {
        Err(TrustStoreError::unavailable("keychain locked"))
    }
}
