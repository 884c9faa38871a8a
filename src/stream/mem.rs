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

use std::{cell::RefCell, rc::Rc};

use super::{clamp_seek, Result, Stream, StreamError, Whence};

/// Growable in-memory stream. Substreams share the backing buffer, so
/// the buffer lives until the last handle drops.
pub struct MemStream {
    buf: Rc<RefCell<Vec<u8>>>,
    pos: u64,
    start: u64,
    end: Option<u64>,
}

impl Default for MemStream {
    fn default() -> Self {
        MemStream::new()
    }
}

impl MemStream {
    pub fn new() -> Self {
        MemStream::from_vec(Vec::new())
    }

    pub fn from_vec(buf: Vec<u8>) -> Self {
        MemStream {
            buf: Rc::new(RefCell::new(buf)),
            pos: 0,
            start: 0,
            end: None,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        MemStream::from_vec(bytes.to_vec())
    }

    /// A copy of the bytes within the stream window.
    pub fn contents(&self) -> Vec<u8> {
        let buf = self.buf.borrow();
        let end = self.effective_end(buf.len());
        buf.get(self.start as usize..end as usize)
            .map(|bytes| bytes.to_vec())
            .unwrap_or_default()
    }

    #[inline]
    fn effective_end(&self, len: usize) -> u64 {
        match self.end {
            Some(end) => end.min(len as u64),
            None => len as u64,
        }
    }
}

impl Stream for MemStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let data = self.buf.borrow();
        let end = self.effective_end(data.len());
        if self.pos >= end {
            return Ok(0);
        }
        let take = buf.len().min((end - self.pos) as usize);
        buf[..take].copy_from_slice(&data[self.pos as usize..self.pos as usize + take]);
        self.pos += take as u64;
        Ok(take)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let take = match self.end {
            Some(end) => {
                if self.pos >= end {
                    return Ok(0);
                }
                buf.len().min((end - self.pos) as usize)
            }
            None => buf.len(),
        };
        let mut data = self.buf.borrow_mut();
        let write_end = self.pos as usize + take;
        if data.len() < write_end {
            data.resize(write_end, 0);
        }
        data[self.pos as usize..write_end].copy_from_slice(&buf[..take]);
        self.pos += take as u64;
        Ok(take)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_eos(&self) -> bool {
        self.pos >= self.effective_end(self.buf.borrow().len())
    }

    fn reset(&mut self) -> Result<()> {
        self.pos = self.start;
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let len = self.buf.borrow().len();
        let end = self.effective_end(len);
        let target = match whence {
            Whence::Set => offset,
            Whence::Cur => self.pos as i64 + offset,
            Whence::End => end as i64 + offset,
        };
        self.pos = clamp_seek(target, self.start, end)?;
        Ok(self.pos)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn length(&self) -> Option<u64> {
        let end = self.effective_end(self.buf.borrow().len());
        Some(end.saturating_sub(self.start))
    }

    fn bounds(&self) -> (u64, Option<u64>) {
        (self.start, self.end)
    }

    fn set_bounds(&mut self, start: u64, end: Option<u64>) -> Result<()> {
        if let Some(end) = end {
            if end < start {
                return Err(StreamError::InvalidSeek);
            }
        }
        self.start = start;
        self.end = end;
        self.pos = self.pos.max(start);
        Ok(())
    }

    fn substream(&self, start: u64, end: Option<u64>) -> Result<Box<dyn Stream>> {
        // The window may not escape the parent's window.
        let start = start.max(self.start);
        let end = match (end, self.end) {
            (Some(end), Some(parent)) => Some(end.min(parent)),
            (Some(end), None) => Some(end),
            (None, parent) => parent,
        };
        Ok(Box::new(MemStream {
            buf: self.buf.clone(),
            pos: start,
            start,
            end,
        }))
    }
}
