/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use crate::filters::{Filter, FilterChain};

use super::{Result, Stream, StreamError, Whence, BLOCK_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

/// Attaches a filter pipeline to an inner stream.
///
/// On read, bytes pulled from the inner stream pass through the chain
/// in insertion order; on write, bytes pass through the chain before
/// reaching the inner stream. The chain is flushed exactly once, at
/// inner EOS on the read side or on `close` on the write side. A single
/// instance filters in one direction at a time.
pub struct FilterStream {
    inner: Box<dyn Stream>,
    chain: FilterChain,
    pending: Vec<u8>,
    pending_pos: usize,
    pos: u64,
    completed: bool,
    direction: Option<Direction>,
}

impl FilterStream {
    pub fn new(inner: Box<dyn Stream>) -> Self {
        FilterStream {
            inner,
            chain: FilterChain::new(),
            pending: Vec::new(),
            pending_pos: 0,
            pos: 0,
            completed: false,
            direction: None,
        }
    }

    pub fn with_chain(inner: Box<dyn Stream>, chain: FilterChain) -> Self {
        FilterStream {
            chain,
            ..FilterStream::new(inner)
        }
    }

    pub fn add(&mut self, filter: Box<dyn Filter>) -> &mut Self {
        self.chain.add(filter);
        self
    }

    pub fn into_inner(self) -> Box<dyn Stream> {
        self.inner
    }

    fn fill_pending(&mut self) -> Result<()> {
        let mut chunk = [0u8; BLOCK_SIZE];
        while self.pending_pos >= self.pending.len() && !self.completed {
            let read = self.inner.read(&mut chunk)?;
            self.pending = if read == 0 {
                self.completed = true;
                self.chain.complete(b"")
            } else {
                self.chain.filter(&chunk[..read])
            };
            self.pending_pos = 0;
        }
        Ok(())
    }
}

impl Stream for FilterStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.direction == Some(Direction::Write) {
            return Err(StreamError::BadDescriptor);
        }
        self.direction = Some(Direction::Read);

        self.fill_pending()?;
        let available = self.pending.len() - self.pending_pos;
        if available == 0 {
            return Ok(0);
        }
        let take = buf.len().min(available);
        buf[..take].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + take]);
        self.pending_pos += take;
        self.pos += take as u64;
        Ok(take)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.direction == Some(Direction::Read) {
            return Err(StreamError::BadDescriptor);
        }
        self.direction = Some(Direction::Write);

        let out = self.chain.filter_write(buf);
        self.inner.write_all(&out)?;
        self.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn close(&mut self) -> Result<()> {
        if self.direction == Some(Direction::Write) && !self.completed {
            self.completed = true;
            let out = self.chain.complete_write(b"");
            if !out.is_empty() {
                self.inner.write_all(&out)?;
            }
            self.inner.flush()?;
        }
        self.inner.close()
    }

    fn is_eos(&self) -> bool {
        self.completed && self.pending_pos >= self.pending.len()
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()?;
        self.chain.reset();
        self.pending.clear();
        self.pending_pos = 0;
        self.pos = 0;
        self.completed = false;
        self.direction = None;
        Ok(())
    }

    fn seek(&mut self, _offset: i64, _whence: Whence) -> Result<u64> {
        Err(StreamError::NotSeekable)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn length(&self) -> Option<u64> {
        None
    }

    fn bounds(&self) -> (u64, Option<u64>) {
        (0, None)
    }

    fn set_bounds(&mut self, _start: u64, _end: Option<u64>) -> Result<()> {
        Err(StreamError::NotSeekable)
    }
}
