/*
 * codec.rs
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

//! Gemini wire codec: request line out, `<status> <meta>` header line in.

use std::fmt;

use url::Url;

use crate::error::{GeminiError, Result};

/// Longest request URL accepted on the wire, in bytes, excluding CRLF.
pub const MAX_REQUEST_LEN: usize = 1024;

/// Coarse class of a status code, by its tens digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    InputExpected,
    Success,
    Redirect,
    TemporaryFailure,
    PermanentFailure,
    ClientCertificateRequired,
    Other,
}

impl StatusCategory {
    /// 10-19 input, 20-29 success, ... 60-69 client certificate; anything else is Other.
    pub fn from_status(status: u16) -> Self {
        match status {
            10..=19 => Self::InputExpected,
            20..=29 => Self::Success,
            30..=39 => Self::Redirect,
            40..=49 => Self::TemporaryFailure,
            50..=59 => Self::PermanentFailure,
            60..=69 => Self::ClientCertificateRequired,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InputExpected => "input expected",
            Self::Success => "success",
            Self::Redirect => "redirect",
            Self::TemporaryFailure => "temporary failure",
            Self::PermanentFailure => "permanent failure",
            Self::ClientCertificateRequired => "client certificate required",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Classify a status code.
pub fn classify(status: u16) -> StatusCategory {
    StatusCategory::from_status(status)
}

/// `"<absolute-url>\r\n"` as UTF-8 bytes.
pub fn build_request_line(url: &Url) -> Result<Vec<u8>> {
    let s = url.as_str();
    if s.len() > MAX_REQUEST_LEN {
        return Err(GeminiError::InvalidUrl(format!(
            "request URL is {} bytes, limit is {}",
            s.len(),
            MAX_REQUEST_LEN
        )));
    }
    if s.contains(['\r', '\n']) {
        return Err(GeminiError::InvalidUrl("URL contains a line break".to_string()));
    }
    let mut line = Vec::with_capacity(s.len() + 2);
    line.extend_from_slice(s.as_bytes());
    line.extend_from_slice(b"\r\n");
    Ok(line)
}

/// Parse a header line (without its line feed) into status and meta.
///
/// Tokens are separated by runs of spaces; the status token must be an integer and at least one
/// meta token must follow. Meta tokens are rejoined with single spaces.
pub fn parse_header(line: &[u8]) -> Result<(u16, String)> {
    let text = std::str::from_utf8(line)
        .map_err(|e| GeminiError::InvalidResponse(format!("header is not UTF-8: {}", e)))?;
    let text = text.trim_end();
    let mut tokens = text.split(' ').filter(|t| !t.is_empty());
    let status_token = tokens
        .next()
        .ok_or_else(|| GeminiError::InvalidResponse("empty header".to_string()))?;
    let meta: Vec<&str> = tokens.collect();
    if meta.is_empty() {
        return Err(GeminiError::InvalidResponse(format!("header has no meta: {:?}", text)));
    }
    let status: u16 = status_token
        .parse()
        .map_err(|_| GeminiError::InvalidResponse(format!("bad status code {:?}", status_token)))?;
    Ok((status, meta.join(" ").trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_tens_digit() {
        assert_eq!(classify(10), StatusCategory::InputExpected);
        assert_eq!(classify(11), StatusCategory::InputExpected);
        assert_eq!(classify(20), StatusCategory::Success);
        assert_eq!(classify(31), StatusCategory::Redirect);
        assert_eq!(classify(44), StatusCategory::TemporaryFailure);
        assert_eq!(classify(51), StatusCategory::PermanentFailure);
        assert_eq!(classify(69), StatusCategory::ClientCertificateRequired);
        assert_eq!(classify(9), StatusCategory::Other);
        assert_eq!(classify(70), StatusCategory::Other);
        assert_eq!(classify(200), StatusCategory::Other);
    }

    #[test]
    fn request_line_is_url_plus_crlf() {
        let url = Url::parse("gemini://example.org/a?b=c").unwrap();
        assert_eq!(build_request_line(&url).unwrap(), b"gemini://example.org/a?b=c\r\n");
    }

    #[test]
    fn request_line_too_long() {
        let url = Url::parse(&format!("gemini://example.org/{}", "a".repeat(1100))).unwrap();
        assert!(matches!(build_request_line(&url), Err(GeminiError::InvalidUrl(_))));
    }

    #[test]
    fn parse_success_header() {
        let (status, meta) = parse_header(b"20 text/gemini\r").unwrap();
        assert_eq!(status, 20);
        assert_eq!(meta, "text/gemini");
    }

    #[test]
    fn parse_collapses_separators() {
        let (status, meta) = parse_header(b"20  text/gemini;   lang=en  \r").unwrap();
        assert_eq!(status, 20);
        assert_eq!(meta, "text/gemini; lang=en");
    }

    #[test]
    fn parse_redirect_meta() {
        let (status, meta) = parse_header(b"31 gemini://other.example/").unwrap();
        assert_eq!(status, 31);
        assert_eq!(meta, "gemini://other.example/");
    }

    #[test]
    fn parse_rejects_missing_meta() {
        assert!(matches!(parse_header(b"20\r"), Err(GeminiError::InvalidResponse(_))));
        assert!(matches!(parse_header(b"20   \r"), Err(GeminiError::InvalidResponse(_))));
        assert!(matches!(parse_header(b""), Err(GeminiError::InvalidResponse(_))));
    }

    #[test]
    fn parse_rejects_non_integer_status() {
        assert!(matches!(parse_header(b"OK fine"), Err(GeminiError::InvalidResponse(_))));
        assert!(matches!(parse_header(b"-1 no"), Err(GeminiError::InvalidResponse(_))));
    }

    #[test]
    fn parse_rejects_invalid_utf8() {
        assert!(matches!(parse_header(b"20 \xff\xfe"), Err(GeminiError::InvalidResponse(_))));
    }

    #[test]
    fn parse_keeps_unusual_status() {
        let (status, _) = parse_header(b"99 whatever").unwrap();
        assert_eq!(classify(status), StatusCategory::Other);
    }
}
