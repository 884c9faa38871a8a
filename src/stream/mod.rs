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

pub mod buffer;
pub mod cat;
pub mod file;
pub mod filter;
pub mod mem;
pub mod mmap;
pub mod null;
pub mod pipe;

pub use buffer::{BufferMode, BufferStream};
pub use cat::CatStream;
pub use file::FileStream;
pub use filter::FilterStream;
pub use mem::MemStream;
pub use mmap::MmapStream;
pub use null::NullStream;
pub use pipe::PipeStream;

use std::fmt;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("bad descriptor")]
    BadDescriptor,
    #[error("invalid seek")]
    InvalidSeek,
    #[error("stream is not seekable")]
    NotSeekable,
    #[error("operation would block")]
    WouldBlock,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// Copy granularity for [`Stream::write_to`] and the buffered stream.
pub(crate) const BLOCK_SIZE: usize = 4096;

/// A positioned byte stream with a `[bound_start, bound_end)` window.
///
/// Positions are absolute offsets into the backing store; a stream never
/// reads past `bound_end` and `reset` returns to `bound_start`. An
/// unbounded stream reports `None` for its end bound and, where the
/// backing store allows it, grows on write.
pub trait Stream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
    fn flush(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;

    /// Whether the next `read` is guaranteed to return 0 bytes.
    fn is_eos(&self) -> bool;

    /// Seeks back to `bound_start`.
    fn reset(&mut self) -> Result<()>;

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64>;
    fn tell(&self) -> u64;

    /// Number of readable bytes in the window, when known.
    fn length(&self) -> Option<u64>;

    fn bounds(&self) -> (u64, Option<u64>);
    fn set_bounds(&mut self, start: u64, end: Option<u64>) -> Result<()>;

    /// A new stream sharing this stream's backing store, restricted to
    /// `[start, end)`. Only backed streams support this.
    fn substream(&self, _start: u64, _end: Option<u64>) -> Result<Box<dyn Stream>> {
        Err(StreamError::NotSeekable)
    }

    fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let written = self.write(buf)?;
            if written == 0 {
                return Err(StreamError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "stream bound reached",
                )));
            }
            buf = &buf[written..];
        }
        Ok(())
    }

    fn write_str(&mut self, text: &str) -> Result<()> {
        self.write_all(text.as_bytes())
    }

    fn write_fmt(&mut self, args: fmt::Arguments) -> Result<()> {
        self.write_all(args.to_string().as_bytes())
    }

    /// Writes each buffer in order, returning the total byte count.
    fn writev(&mut self, bufs: &[&[u8]]) -> Result<u64> {
        let mut total = 0;
        for buf in bufs {
            self.write_all(buf)?;
            total += buf.len() as u64;
        }
        Ok(total)
    }

    /// Copies the remainder of this stream into `other`, returning the
    /// number of bytes moved.
    fn write_to(&mut self, other: &mut dyn Stream) -> Result<u64> {
        let mut chunk = [0u8; BLOCK_SIZE];
        let mut total = 0;
        loop {
            let read = self.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            other.write_all(&chunk[..read])?;
            total += read as u64;
        }
        other.flush()?;
        Ok(total)
    }

    /// Reads the remainder of this stream into `out`.
    fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut chunk = [0u8; BLOCK_SIZE];
        let mut total = 0;
        loop {
            let read = self.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..read]);
            total += read;
        }
        Ok(total)
    }
}

/// Clamps a seek target into `[start, end]`, rejecting targets that
/// underflow the address space.
pub(crate) fn clamp_seek(target: i64, start: u64, end: u64) -> Result<u64> {
    if target < 0 {
        return Err(StreamError::InvalidSeek);
    }
    Ok((target as u64).clamp(start, end.max(start)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_to_copies_window() {
        let mut src = MemStream::from_vec(b"0123456789".to_vec());
        src.set_bounds(2, Some(8)).unwrap();
        src.reset().unwrap();

        let mut dst = MemStream::new();
        let copied = src.write_to(&mut dst).unwrap();

        assert_eq!(copied, 6);
        assert_eq!(dst.contents(), b"234567");
    }

    #[test]
    fn writev_and_fmt() {
        let mut stream = MemStream::new();
        let total = stream.writev(&[b"one ", b"two ", b"three"]).unwrap();
        assert_eq!(total, 13);
        stream.write_fmt(format_args!(" and {}", 4)).unwrap();
        assert_eq!(stream.contents(), b"one two three and 4");
    }
}
