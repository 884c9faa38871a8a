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

use std::{cell::RefCell, fs::File, rc::Rc};

use memmap2::MmapMut;

use super::{clamp_seek, Result, Stream, StreamError, Whence};

/// Stream over a writable memory map. Reads and writes are plain
/// copies; `flush` syncs the map back to the file. The map cannot grow,
/// so writes past its end return 0.
pub struct MmapStream {
    map: Rc<RefCell<MmapMut>>,
    pos: u64,
    start: u64,
    end: Option<u64>,
}

impl MmapStream {
    pub fn from_file(file: &File) -> Result<Self> {
        // Safety: the map is private to this stream and its substreams,
        // which share it within a single thread.
        let map = unsafe { MmapMut::map_mut(file)? };
        Ok(MmapStream {
            map: Rc::new(RefCell::new(map)),
            pos: 0,
            start: 0,
            end: None,
        })
    }

    #[inline]
    fn effective_end(&self, len: usize) -> u64 {
        match self.end {
            Some(end) => end.min(len as u64),
            None => len as u64,
        }
    }
}

impl Stream for MmapStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let map = self.map.borrow();
        let end = self.effective_end(map.len());
        if self.pos >= end {
            return Ok(0);
        }
        let take = buf.len().min((end - self.pos) as usize);
        buf[..take].copy_from_slice(&map[self.pos as usize..self.pos as usize + take]);
        self.pos += take as u64;
        Ok(take)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut map = self.map.borrow_mut();
        let end = self.effective_end(map.len());
        if self.pos >= end {
            return Ok(0);
        }
        let take = buf.len().min((end - self.pos) as usize);
        map[self.pos as usize..self.pos as usize + take].copy_from_slice(&buf[..take]);
        self.pos += take as u64;
        Ok(take)
    }

    fn flush(&mut self) -> Result<()> {
        self.map.borrow().flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()
    }

    fn is_eos(&self) -> bool {
        self.pos >= self.effective_end(self.map.borrow().len())
    }

    fn reset(&mut self) -> Result<()> {
        self.pos = self.start;
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let end = self.effective_end(self.map.borrow().len());
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
        Some(
            self.effective_end(self.map.borrow().len())
                .saturating_sub(self.start),
        )
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
        let start = start.max(self.start);
        let end = match (end, self.end) {
            (Some(end), Some(parent)) => Some(end.min(parent)),
            (Some(end), None) => Some(end),
            (None, parent) => parent,
        };
        Ok(Box::new(MmapStream {
            map: self.map.clone(),
            pos: start,
            start,
            end,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn mmap_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.bin");
        {
            let mut file = File::create(&path).unwrap();
            file.write_all(b"0123456789").unwrap();
        }

        let file = File::options().read(true).write(true).open(&path).unwrap();
        let mut stream = MmapStream::from_file(&file).unwrap();
        assert_eq!(stream.length(), Some(10));

        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");

        stream.write_all(b"xy").unwrap();
        stream.flush().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"0123xy6789");

        // Writes cannot extend the map.
        stream.seek(0, Whence::End).unwrap();
        assert_eq!(stream.write(b"zz").unwrap(), 0);
    }
}
