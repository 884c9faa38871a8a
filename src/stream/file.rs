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

use std::{
    cell::RefCell,
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    rc::Rc,
};

use super::{clamp_seek, Result, Stream, StreamError, Whence};

/// Stream over a file descriptor. Substreams share the descriptor and
/// re-seek before every I/O operation, so only one handle may be mid
/// operation at a time.
pub struct FileStream {
    file: Rc<RefCell<File>>,
    pos: u64,
    start: u64,
    end: Option<u64>,
    owner: bool,
    closed: bool,
}

impl FileStream {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(FileStream::from_file(File::open(path)?, true))
    }

    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(FileStream::from_file(
            File::options()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
            true,
        ))
    }

    /// Wraps an already open file. When `owner` is false, `close`
    /// leaves the descriptor usable for the caller.
    pub fn from_file(file: File, owner: bool) -> Self {
        FileStream {
            file: Rc::new(RefCell::new(file)),
            pos: 0,
            start: 0,
            end: None,
            owner,
            closed: false,
        }
    }

    fn backend_length(&self) -> Option<u64> {
        self.file.borrow().metadata().map(|meta| meta.len()).ok()
    }

    #[inline]
    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(StreamError::BadDescriptor)
        } else {
            Ok(())
        }
    }
}

impl Stream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        let take = match self.end {
            Some(end) => {
                if self.pos >= end {
                    return Ok(0);
                }
                buf.len().min((end - self.pos) as usize)
            }
            None => buf.len(),
        };

        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(self.pos))?;
        loop {
            match file.read(&mut buf[..take]) {
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
        self.check_open()?;
        let take = match self.end {
            Some(end) => {
                if self.pos >= end {
                    return Ok(0);
                }
                buf.len().min((end - self.pos) as usize)
            }
            None => buf.len(),
        };

        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(self.pos))?;
        loop {
            match file.write(&buf[..take]) {
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
        self.check_open()?;
        self.file.borrow_mut().flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            if self.owner {
                self.file.borrow_mut().flush()?;
            }
            self.closed = true;
        }
        Ok(())
    }

    fn is_eos(&self) -> bool {
        let end = match (self.end, self.backend_length()) {
            (Some(end), Some(len)) => end.min(len),
            (Some(end), None) => end,
            (None, Some(len)) => len,
            (None, None) => return false,
        };
        self.pos >= end
    }

    fn reset(&mut self) -> Result<()> {
        self.check_open()?;
        self.pos = self.start;
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.check_open()?;
        let end = match self.end {
            Some(end) => end,
            // Size not known up front, probe the backend.
            None => self.backend_length().ok_or(StreamError::InvalidSeek)?,
        };
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
        let end = match self.end {
            Some(end) => end,
            None => self.backend_length()?,
        };
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
        self.check_open()?;
        let start = start.max(self.start);
        let end = match (end, self.end) {
            (Some(end), Some(parent)) => Some(end.min(parent)),
            (Some(end), None) => Some(end),
            (None, parent) => parent,
        };
        Ok(Box::new(FileStream {
            file: self.file.clone(),
            pos: start,
            start,
            end,
            owner: false,
            closed: false,
        }))
    }
}
