/*
 * client.rs
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

//! Gemini client: `get(url)` opens a fresh TLS connection per attempt, sends the request line,
//! reads the header, and either follows a redirect, streams the body until close, or returns
//! the status with an empty body.
//!
//! Each attempt's connection is closed before the next attempt starts or the result is
//! returned, whatever the outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::buffer::StreamBuffer;
use crate::codec::{self, StatusCategory};
use crate::config::ClientConfig;
use crate::error::{GeminiError, Result};
use crate::net::{Connection, ConnectionState, Connector};
use crate::redirect::RequestContext;
use crate::trust::TrustStore;

/// Final response of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub meta: String,
    /// Only ever non-empty for Success.
    pub body: Vec<u8>,
}

impl Response {
    pub fn category(&self) -> StatusCategory {
        codec::classify(self.status)
    }

    pub fn is_success(&self) -> bool {
        self.category() == StatusCategory::Success
    }

    /// MIME type without parameters, for Success responses.
    pub fn mime_type(&self) -> Option<&str> {
        if !self.is_success() {
            return None;
        }
        self.meta.split(';').next().map(str::trim).filter(|m| !m.is_empty())
    }

    /// Body decoded as UTF-8, invalid sequences replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Outcome of a cancellable fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Response(Response),
    /// Caller cancelled; any transport error that raced the cancel is discarded.
    Cancelled,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancels an in-flight fetch. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<CancelInner>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn cancel(&self) {
        if !self.0.cancelled.swap(true, Ordering::SeqCst) {
            self.0.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let notified = self.0.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

enum Attempt {
    Done(Response),
    Redirect(String),
    Cancelled,
}

/// Gemini client. Holds no connections between calls; every `get` is independent.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: ClientConfig,
    connector: Connector,
}

impl GeminiClient {
    pub fn new(store: Arc<dyn TrustStore>) -> Self {
        Self::with_config(store, ClientConfig::default())
    }

    pub fn with_config(store: Arc<dyn TrustStore>, config: ClientConfig) -> Self {
        let connector = Connector::new(store, &config);
        Self { config, connector }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch `url`, following up to `max_redirects` redirects.
    pub async fn get(&self, url: &str) -> Result<Response> {
        match self.get_cancellable(url, &CancelToken::new()).await? {
            Fetched::Response(response) => Ok(response),
            // Nobody else holds the token.
            Fetched::Cancelled => Err(GeminiError::custom("fetch cancelled")),
        }
    }

    /// Like [`GeminiClient::get`], stopping early when `cancel` fires.
    pub async fn get_cancellable(&self, url: &str, cancel: &CancelToken) -> Result<Fetched> {
        let mut ctx = RequestContext::parse(url)?;
        loop {
            if cancel.is_cancelled() {
                return Ok(Fetched::Cancelled);
            }
            match self.attempt(&ctx, cancel).await? {
                Attempt::Done(response) => return Ok(Fetched::Response(response)),
                Attempt::Cancelled => return Ok(Fetched::Cancelled),
                Attempt::Redirect(meta) => {
                    let next = ctx.redirect(&meta, self.config.max_redirects)?;
                    log::info!(
                        "redirect {}/{}: {} -> {}",
                        next.redirects(),
                        self.config.max_redirects,
                        ctx.url(),
                        next.url()
                    );
                    ctx = next;
                }
            }
        }
    }

    /// One connection, one exchange. The connection is closed on every path out.
    async fn attempt(&self, ctx: &RequestContext, cancel: &CancelToken) -> Result<Attempt> {
        let mut conn = Connection::new(ctx.host(), ctx.port(), self.config.io_timeout);
        let state = conn.state_handle();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                state.cancel();
                Ok(Attempt::Cancelled)
            }
            r = self.exchange(&mut conn, ctx) => r,
        };
        if let Err(e) = &result {
            state.fail(e.to_string());
        }
        conn.close().await;
        match result {
            Err(e) if state.is_cancelled() || cancel.is_cancelled() => {
                log::debug!("{}: discarding error after cancel: {}", ctx.url(), e);
                Ok(Attempt::Cancelled)
            }
            other => other,
        }
    }

    async fn exchange(&self, conn: &mut Connection, ctx: &RequestContext) -> Result<Attempt> {
        let request = codec::build_request_line(ctx.url())?;
        conn.open(&self.connector).await?;
        conn.send(&request).await?;

        let mut buffer = StreamBuffer::new(self.config.chunk_size);
        let line = buffer.read_line(conn).await?;
        let (status, meta) = codec::parse_header(&line)?;
        let category = codec::classify(status);
        log::debug!("{}: {} {} ({})", ctx.url(), status, meta, category);

        match category {
            StatusCategory::Redirect => {
                conn.advance(ConnectionState::Redirecting)?;
                Ok(Attempt::Redirect(meta))
            }
            StatusCategory::Success => {
                conn.advance(ConnectionState::StreamingBody)?;
                let body = buffer.read_body_until_close(conn).await?;
                log::debug!("{}: {} body bytes", ctx.url(), body.len());
                Ok(Attempt::Done(Response { status, meta, body }))
            }
            // No body is defined for the other categories; trailing bytes are ignored.
            _ => Ok(Attempt::Done(Response {
                status,
                meta,
                body: Vec::new(),
            })),
        }
    }
}
