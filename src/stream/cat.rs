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

use super::{Result, Stream, StreamError, Whence};

/// Virtual concatenation of a sequence of streams.
///
/// Reads drain each child in order; `reset` requires every child to be
/// resettable and fails with `NotSeekable` otherwise, leaving already
/// reset children reset.
pub struct CatStream {
    children: Vec<Box<dyn Stream>>,
    index: usize,
    pos: u64,
}

impl CatStream {
    pub fn new(children: Vec<Box<dyn Stream>>) -> Self {
        CatStream {
            children,
            index: 0,
            pos: 0,
        }
    }

    pub fn push(&mut self, child: Box<dyn Stream>) {
        self.children.push(child);
    }
}

impl Stream for CatStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        while self.index < self.children.len() {
            let read = self.children[self.index].read(buf)?;
            if read > 0 {
                self.pos += read as u64;
                return Ok(read);
            }
            self.index += 1;
        }
        Ok(0)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        while self.index < self.children.len() {
            let written = self.children[self.index].write(buf)?;
            if written > 0 {
                self.pos += written as u64;
                return Ok(written);
            }
            self.index += 1;
        }
        Ok(0)
    }

    fn flush(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.close()?;
        }
        Ok(())
    }

    fn is_eos(&self) -> bool {
        self.children[self.index..]
            .iter()
            .all(|child| child.is_eos())
    }

    fn reset(&mut self) -> Result<()> {
        for child in &mut self.children {
            child
                .reset()
                .map_err(|_| StreamError::NotSeekable)?;
        }
        self.index = 0;
        self.pos = 0;
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let target = match whence {
            Whence::Set => offset,
            Whence::Cur => self.pos as i64 + offset,
            Whence::End => match self.length() {
                Some(len) => len as i64 + offset,
                None => return Err(StreamError::InvalidSeek),
            },
        };
        if target < 0 {
            return Err(StreamError::InvalidSeek);
        }

        // Walk the child table from the start.
        self.reset()?;
        let mut remaining = target as u64;
        let mut scratch = [0u8; 4096];
        while remaining > 0 {
            let take = scratch.len().min(remaining as usize);
            let read = self.read(&mut scratch[..take])?;
            if read == 0 {
                break;
            }
            remaining -= read as u64;
        }
        Ok(self.pos)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn length(&self) -> Option<u64> {
        let mut total = 0;
        for child in &self.children {
            total += child.length()?;
        }
        Some(total)
    }

    fn bounds(&self) -> (u64, Option<u64>) {
        (0, self.length())
    }

    fn set_bounds(&mut self, _start: u64, _end: Option<u64>) -> Result<()> {
        Err(StreamError::NotSeekable)
    }
}
