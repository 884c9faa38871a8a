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

use super::{Result, Stream, Whence, BLOCK_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    BlockRead,
    BlockWrite,
}

/// Block-buffers an inner stream: reads are served from a read-ahead
/// block, writes accumulate until a block fills.
pub struct BufferStream {
    inner: Box<dyn Stream>,
    mode: BufferMode,
    buf: Vec<u8>,
    buf_pos: usize,
}

impl BufferStream {
    pub fn new(inner: Box<dyn Stream>, mode: BufferMode) -> Self {
        BufferStream {
            inner,
            mode,
            buf: Vec::with_capacity(BLOCK_SIZE),
            buf_pos: 0,
        }
    }

    fn flush_write_buf(&mut self) -> Result<()> {
        if self.mode == BufferMode::BlockWrite && !self.buf.is_empty() {
            let buf = std::mem::take(&mut self.buf);
            self.inner.write_all(&buf)?;
            self.buf = buf;
            self.buf.clear();
        }
        Ok(())
    }

    fn drop_read_buf(&mut self) {
        self.buf.clear();
        self.buf_pos = 0;
    }
}

impl Stream for BufferStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.mode != BufferMode::BlockRead {
            return self.inner.read(buf);
        }

        if self.buf_pos >= self.buf.len() {
            self.buf.resize(BLOCK_SIZE, 0);
            let read = self.inner.read(&mut self.buf)?;
            self.buf.truncate(read);
            self.buf_pos = 0;
            if read == 0 {
                return Ok(0);
            }
        }

        let take = buf.len().min(self.buf.len() - self.buf_pos);
        buf[..take].copy_from_slice(&self.buf[self.buf_pos..self.buf_pos + take]);
        self.buf_pos += take;
        Ok(take)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.mode != BufferMode::BlockWrite {
            return self.inner.write(buf);
        }

        self.buf.extend_from_slice(buf);
        if self.buf.len() >= BLOCK_SIZE {
            self.flush_write_buf()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_write_buf()?;
        self.inner.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.flush_write_buf()?;
        self.inner.close()
    }

    fn is_eos(&self) -> bool {
        match self.mode {
            BufferMode::BlockRead => self.buf_pos >= self.buf.len() && self.inner.is_eos(),
            BufferMode::BlockWrite => self.inner.is_eos(),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.flush_write_buf()?;
        self.drop_read_buf();
        self.inner.reset()
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.flush_write_buf()?;
        self.drop_read_buf();
        self.inner.seek(offset, whence)
    }

    fn tell(&self) -> u64 {
        match self.mode {
            BufferMode::BlockRead => {
                self.inner.tell() - (self.buf.len() - self.buf_pos) as u64
            }
            BufferMode::BlockWrite => self.inner.tell() + self.buf.len() as u64,
        }
    }

    fn length(&self) -> Option<u64> {
        self.inner.length()
    }

    fn bounds(&self) -> (u64, Option<u64>) {
        self.inner.bounds()
    }

    fn set_bounds(&mut self, start: u64, end: Option<u64>) -> Result<()> {
        self.inner.set_bounds(start, end)
    }
}
