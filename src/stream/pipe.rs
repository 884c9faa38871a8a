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

use std::io::{Read, Write};

use super::{Result, Stream, StreamError, Whence};

/// Stream over a non-seekable descriptor pair such as a pipe or socket.
/// `seek` and `reset` always fail, the length is unknown until EOS.
pub struct PipeStream {
    reader: Option<Box<dyn Read>>,
    writer: Option<Box<dyn Write>>,
    pos: u64,
    eos: bool,
}

impl PipeStream {
    pub fn reader(reader: impl Read + 'static) -> Self {
        PipeStream {
            reader: Some(Box::new(reader)),
            writer: None,
            pos: 0,
            eos: false,
        }
    }

    pub fn writer(writer: impl Write + 'static) -> Self {
        PipeStream {
            reader: None,
            writer: Some(Box::new(writer)),
            pos: 0,
            eos: false,
        }
    }

    pub fn new(reader: impl Read + 'static, writer: impl Write + 'static) -> Self {
        PipeStream {
            reader: Some(Box::new(reader)),
            writer: Some(Box::new(writer)),
            pos: 0,
            eos: false,
        }
    }
}

impl Stream for PipeStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let reader = self.reader.as_mut().ok_or(StreamError::BadDescriptor)?;
        loop {
            match reader.read(buf) {
                Ok(0) => {
                    self.eos = true;
                    return Ok(0);
                }
                Ok(read) => {
                    self.pos += read as u64;
                    return Ok(read);
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    return Err(StreamError::WouldBlock)
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let writer = self.writer.as_mut().ok_or(StreamError::BadDescriptor)?;
        loop {
            match writer.write(buf) {
                Ok(written) => {
                    self.pos += written as u64;
                    return Ok(written);
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    return Err(StreamError::WouldBlock)
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.reader = None;
        self.writer = None;
        Ok(())
    }

    fn is_eos(&self) -> bool {
        self.eos
    }

    fn reset(&mut self) -> Result<()> {
        Err(StreamError::NotSeekable)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_reads_until_eos() {
        let mut stream = PipeStream::reader(&b"piped data"[..]);
        let mut text = Vec::new();
        stream.read_to_end(&mut text).unwrap();
        assert_eq!(text, b"piped data");
        assert!(stream.is_eos());
        assert!(matches!(stream.seek(0, Whence::Set), Err(StreamError::NotSeekable)));
        assert!(matches!(stream.reset(), Err(StreamError::NotSeekable)));
        assert_eq!(stream.length(), None);
    }

    #[test]
    fn pipe_write_only() {
        let mut stream = PipeStream::writer(Vec::new());
        stream.write_all(b"out").unwrap();
        assert_eq!(stream.tell(), 3);
        assert!(matches!(
            stream.read(&mut [0u8; 4]),
            Err(StreamError::BadDescriptor)
        ));
    }
}
