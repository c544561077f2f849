/*
 * buffer.rs
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

//! Buffered reading over a chunked transport: one header line, then the body until close.
//!
//! Bytes received past the header's line feed are kept as carry-over and handed to the body
//! reader before the transport is read again, so nothing is lost or duplicated at the boundary.

use bytes::{Bytes, BytesMut};

use crate::error::{GeminiError, Result};

/// Chunked receive side of a transport.
#[allow(async_fn_in_trait)]
pub trait ChunkSource {
    /// Up to `max` bytes. `Ok(None)` is end of stream; an empty chunk means the transport is
    /// still open but produced nothing.
    async fn receive(&mut self, max: usize) -> Result<Option<Bytes>>;
}

/// Carry-over buffer plus the line and body readers that drain it.
#[derive(Debug)]
pub struct StreamBuffer {
    carry: BytesMut,
    chunk_size: usize,
}

impl StreamBuffer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            carry: BytesMut::new(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Bytes received but not yet consumed.
    pub fn carry_over(&self) -> &[u8] {
        &self.carry
    }

    /// Read up to the first line feed. Returns the bytes before it; the line feed is consumed
    /// and anything after it stays in the carry-over.
    pub async fn read_line<S: ChunkSource>(&mut self, source: &mut S) -> Result<Bytes> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.carry[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + pos;
                let mut line = self.carry.split_to(end + 1);
                line.truncate(end);
                return Ok(line.freeze());
            }
            scanned = self.carry.len();
            match source.receive(self.chunk_size).await? {
                None => return Err(GeminiError::ConnectionClosed),
                Some(chunk) if chunk.is_empty() => {
                    return Err(GeminiError::custom("no data received"))
                }
                Some(chunk) => self.carry.extend_from_slice(&chunk),
            }
        }
    }

    /// Drain the carry-over, then read until the transport reports end of stream.
    /// There is no length field: closure is the only terminator.
    pub async fn read_body_until_close<S: ChunkSource>(&mut self, source: &mut S) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(self.carry.len().max(self.chunk_size));
        body.extend_from_slice(&self.carry);
        self.carry.clear();
        loop {
            match source.receive(self.chunk_size).await? {
                None => break,
                Some(chunk) if chunk.is_empty() => {
                    return Err(GeminiError::custom("no data received"))
                }
                Some(chunk) => body.extend_from_slice(&chunk),
            }
        }
        Ok(body)
    }
}
