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

use super::{clamp_seek, Result, Stream, Whence};

/// Sink that discards writes while counting them, useful for measuring
/// the size of serialized output.
#[derive(Debug, Default)]
pub struct NullStream {
    pos: u64,
    written: u64,
}

impl NullStream {
    pub fn new() -> Self {
        NullStream::default()
    }

    /// High-water mark of bytes written.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Stream for NullStream {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.pos += buf.len() as u64;
        self.written = self.written.max(self.pos);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_eos(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let target = match whence {
            Whence::Set => offset,
            Whence::Cur => self.pos as i64 + offset,
            Whence::End => self.written as i64 + offset,
        };
        self.pos = clamp_seek(target, 0, self.written)?;
        Ok(self.pos)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn length(&self) -> Option<u64> {
        Some(self.written)
    }

    fn bounds(&self) -> (u64, Option<u64>) {
        (0, None)
    }

    fn set_bounds(&mut self, _start: u64, _end: Option<u64>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_counts_bytes() {
        let mut stream = NullStream::new();
        stream.write_all(b"discarded entirely").unwrap();
        assert_eq!(stream.written(), 18);
        assert_eq!(stream.length(), Some(18));
        assert_eq!(stream.read(&mut [0u8; 8]).unwrap(), 0);

        stream.reset().unwrap();
        stream.write_all(b"less").unwrap();
        assert_eq!(stream.written(), 18);
    }
}
