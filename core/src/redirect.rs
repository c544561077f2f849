/*
 * redirect.rs
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

//! Request context for one logical fetch and redirect resolution.
//!
//! The redirect count belongs to the fetch, not to a URL: each hop produces a new context
//! with the resolved URL and the count incremented.

use url::{Host, Url};

use crate::config::DEFAULT_PORT;
use crate::error::{GeminiError, Result};

/// URL scheme this client speaks.
pub const SCHEME: &str = "gemini";

/// Target of one attempt plus the redirects already followed to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    url: Url,
    redirects: u8,
}

impl RequestContext {
    /// Parse and validate an absolute gemini URL. Nothing touches the network.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input.trim())
            .map_err(|e| GeminiError::InvalidUrl(format!("{}: {}", input, e)))?;
        Self::new(url)
    }

    /// Validate `url`: scheme must be `gemini` and a host must be present.
    pub fn new(url: Url) -> Result<Self> {
        if url.scheme() != SCHEME {
            return Err(GeminiError::InvalidUrl(format!(
                "unsupported scheme {:?} in {}",
                url.scheme(),
                url
            )));
        }
        if url.host().is_none() {
            return Err(GeminiError::InvalidUrl(format!("no host in {}", url)));
        }
        Ok(Self { url, redirects: 0 })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Redirect hops followed so far.
    pub fn redirects(&self) -> u8 {
        self.redirects
    }

    /// Host without IPv6 brackets; also the trust store key.
    pub fn host(&self) -> String {
        match self.url.host() {
            Some(Host::Domain(d)) => d.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => String::new(),
        }
    }

    pub fn port(&self) -> u16 {
        self.url.port().unwrap_or(DEFAULT_PORT)
    }

    /// Context for the next hop: `meta` resolved against this URL, count incremented.
    /// The target is validated first; then the hop is refused once `max` have been followed.
    pub fn redirect(&self, meta: &str, max: u8) -> Result<Self> {
        let target = self
            .url
            .join(meta.trim())
            .map_err(|e| GeminiError::InvalidRedirectUrl(format!("{}: {}", meta, e)))?;
        if target.scheme() != SCHEME {
            return Err(GeminiError::InvalidRedirectUrl(format!(
                "cannot follow redirect to {} scheme: {}",
                target.scheme(),
                target
            )));
        }
        if target.host().is_none() {
            return Err(GeminiError::InvalidRedirectUrl(format!("no host in {}", target)));
        }
        if self.redirects >= max {
            return Err(GeminiError::TooManyRedirects(max));
        }
        Ok(Self {
            url: target,
            redirects: self.redirects + 1,
        })
    }
}
