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

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use super::Filter;

const GZIP_ID1: u8 = 31;
const GZIP_ID2: u8 = 139;
const GZIP_DEFLATE: u8 = 8;
const GZIP_OS_UNKNOWN: u8 = 0xff;

const FLAG_FHCRC: u8 = 1 << 1;
const FLAG_FEXTRA: u8 = 1 << 2;
const FLAG_FNAME: u8 = 1 << 3;
const FLAG_FCOMMENT: u8 = 1 << 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GzipMode {
    Zip,
    Unzip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Id1,
    Id2,
    Method,
    Flags,
    Skip(u8),
    ExtraLen(u8, u16),
    Extra(u16),
    Name,
    Comment,
    Hcrc(u8),
    Body,
    Trailer(u8),
    Done,
}

/// Gzip compression and decompression.
///
/// Encoding emits the fixed 10-byte header (no FNAME, FCOMMENT or
/// FHCRC), a raw deflate stream flushed per chunk, and the little
/// endian CRC32 and ISIZE trailer. Decoding tolerates the optional
/// header fields and treats buffer stalls as a request for more input.
pub struct GzipFilter {
    mode: GzipMode,
    level: u32,
    compress: Compress,
    decompress: Decompress,
    state: DecodeState,
    flags: u8,
    header_written: bool,
    crc: crc32fast::Hasher,
    size: u32,
    trailer: [u8; 8],
    out: Vec<u8>,
}

impl GzipFilter {
    pub fn new(mode: GzipMode, level: u32) -> Self {
        GzipFilter {
            mode,
            level,
            compress: Compress::new(Compression::new(level), false),
            decompress: Decompress::new(false),
            state: DecodeState::Id1,
            flags: 0,
            header_written: false,
            crc: crc32fast::Hasher::new(),
            size: 0,
            trailer: [0u8; 8],
            out: Vec::new(),
        }
    }

    fn write_header(&mut self) {
        let xfl = match self.level {
            9 => 2,
            1 => 4,
            _ => 0,
        };
        self.out.extend_from_slice(&[
            GZIP_ID1,
            GZIP_ID2,
            GZIP_DEFLATE,
            0,
            0,
            0,
            0,
            0,
            xfl,
            GZIP_OS_UNKNOWN,
        ]);
        self.header_written = true;
    }

    fn deflate(&mut self, input: &[u8], flush: FlushCompress) {
        let mut input = input;
        let mut chunk = [0u8; 4096];
        loop {
            let before_in = self.compress.total_in();
            let before_out = self.compress.total_out();
            let status = match self.compress.compress(input, &mut chunk, flush) {
                Ok(status) => status,
                Err(_) => return,
            };
            let consumed = (self.compress.total_in() - before_in) as usize;
            let produced = (self.compress.total_out() - before_out) as usize;
            self.out.extend_from_slice(&chunk[..produced]);
            input = &input[consumed..];

            match status {
                Status::StreamEnd => return,
                Status::Ok | Status::BufError => {
                    if input.is_empty() && produced == 0 {
                        return;
                    }
                }
            }
        }
    }

    fn inflate(&mut self, input: &[u8]) {
        let mut input = input;
        let mut chunk = [0u8; 4096];
        while self.state == DecodeState::Body {
            let before_in = self.decompress.total_in();
            let before_out = self.decompress.total_out();
            let status =
                match self
                    .decompress
                    .decompress(input, &mut chunk, FlushDecompress::None)
                {
                    Ok(status) => status,
                    Err(_) => {
                        self.state = DecodeState::Done;
                        return;
                    }
                };
            let consumed = (self.decompress.total_in() - before_in) as usize;
            let produced = (self.decompress.total_out() - before_out) as usize;
            self.out.extend_from_slice(&chunk[..produced]);
            input = &input[consumed..];

            match status {
                Status::StreamEnd => {
                    self.state = DecodeState::Trailer(0);
                    self.header_bytes(input);
                    return;
                }
                // A buffer stall with no pending input just means the
                // next chunk has not arrived yet.
                Status::Ok | Status::BufError => {
                    if input.is_empty() && produced == 0 {
                        return;
                    }
                }
            }
        }
    }

    fn header_bytes(&mut self, input: &[u8]) {
        let mut iter = input.iter();
        while let Some(&ch) = iter.next() {
            self.state = match self.state {
                DecodeState::Id1 if ch == GZIP_ID1 => DecodeState::Id2,
                DecodeState::Id2 if ch == GZIP_ID2 => DecodeState::Method,
                DecodeState::Method if ch == GZIP_DEFLATE => DecodeState::Flags,
                DecodeState::Id1 | DecodeState::Id2 | DecodeState::Method => DecodeState::Done,
                DecodeState::Flags => {
                    self.flags = ch;
                    // mtime(4) + xfl + os
                    DecodeState::Skip(6)
                }
                DecodeState::Skip(n) => {
                    if n > 1 {
                        DecodeState::Skip(n - 1)
                    } else if self.flags & FLAG_FEXTRA != 0 {
                        DecodeState::ExtraLen(0, 0)
                    } else if self.flags & FLAG_FNAME != 0 {
                        DecodeState::Name
                    } else if self.flags & FLAG_FCOMMENT != 0 {
                        DecodeState::Comment
                    } else if self.flags & FLAG_FHCRC != 0 {
                        DecodeState::Hcrc(2)
                    } else {
                        DecodeState::Body
                    }
                }
                DecodeState::ExtraLen(n, len) => {
                    let len = len | (ch as u16) << (n * 8);
                    if n == 0 {
                        DecodeState::ExtraLen(1, len)
                    } else if len > 0 {
                        DecodeState::Extra(len)
                    } else {
                        self.after_extra()
                    }
                }
                DecodeState::Extra(len) => {
                    if len > 1 {
                        DecodeState::Extra(len - 1)
                    } else {
                        self.after_extra()
                    }
                }
                DecodeState::Name => {
                    if ch == 0 {
                        if self.flags & FLAG_FCOMMENT != 0 {
                            DecodeState::Comment
                        } else if self.flags & FLAG_FHCRC != 0 {
                            DecodeState::Hcrc(2)
                        } else {
                            DecodeState::Body
                        }
                    } else {
                        DecodeState::Name
                    }
                }
                DecodeState::Comment => {
                    if ch == 0 {
                        if self.flags & FLAG_FHCRC != 0 {
                            DecodeState::Hcrc(2)
                        } else {
                            DecodeState::Body
                        }
                    } else {
                        DecodeState::Comment
                    }
                }
                DecodeState::Hcrc(n) => {
                    if n > 1 {
                        DecodeState::Hcrc(n - 1)
                    } else {
                        DecodeState::Body
                    }
                }
                DecodeState::Trailer(n) => {
                    self.trailer[n as usize] = ch;
                    if n < 7 {
                        DecodeState::Trailer(n + 1)
                    } else {
                        DecodeState::Done
                    }
                }
                DecodeState::Body | DecodeState::Done => {
                    break;
                }
            };
            if self.state == DecodeState::Body {
                let rest = iter.as_slice();
                self.inflate(rest);
                return;
            }
        }
    }

    fn after_extra(&self) -> DecodeState {
        if self.flags & FLAG_FNAME != 0 {
            DecodeState::Name
        } else if self.flags & FLAG_FCOMMENT != 0 {
            DecodeState::Comment
        } else if self.flags & FLAG_FHCRC != 0 {
            DecodeState::Hcrc(2)
        } else {
            DecodeState::Body
        }
    }

    /// CRC32 of the decompressed payload in the gzip trailer, once seen.
    pub fn trailer_crc32(&self) -> Option<u32> {
        if self.state == DecodeState::Done {
            Some(u32::from_le_bytes([
                self.trailer[0],
                self.trailer[1],
                self.trailer[2],
                self.trailer[3],
            ]))
        } else {
            None
        }
    }

    /// ISIZE field of the gzip trailer, once seen.
    pub fn trailer_size(&self) -> Option<u32> {
        if self.state == DecodeState::Done {
            Some(u32::from_le_bytes([
                self.trailer[4],
                self.trailer[5],
                self.trailer[6],
                self.trailer[7],
            ]))
        } else {
            None
        }
    }
}

impl Filter for GzipFilter {
    fn filter(&mut self, input: &[u8]) -> &[u8] {
        self.out.clear();
        match self.mode {
            GzipMode::Zip => {
                if !self.header_written {
                    self.write_header();
                }
                self.crc.update(input);
                self.size = self.size.wrapping_add(input.len() as u32);
                self.deflate(input, FlushCompress::Sync);
            }
            GzipMode::Unzip => {
                if self.state == DecodeState::Body {
                    self.inflate(input);
                } else {
                    self.header_bytes(input);
                }
            }
        }
        &self.out
    }

    fn complete(&mut self, input: &[u8]) -> &[u8] {
        self.out.clear();
        match self.mode {
            GzipMode::Zip => {
                if !self.header_written {
                    self.write_header();
                }
                self.crc.update(input);
                self.size = self.size.wrapping_add(input.len() as u32);
                self.deflate(input, FlushCompress::Finish);

                let crc = std::mem::replace(&mut self.crc, crc32fast::Hasher::new()).finalize();
                self.out.extend_from_slice(&crc.to_le_bytes());
                self.out.extend_from_slice(&self.size.to_le_bytes());
            }
            GzipMode::Unzip => {
                if self.state == DecodeState::Body {
                    self.inflate(input);
                } else {
                    self.header_bytes(input);
                }
            }
        }
        &self.out
    }

    fn reset(&mut self) {
        self.compress = Compress::new(Compression::new(self.level), false);
        self.decompress = Decompress::new(false);
        self.state = DecodeState::Id1;
        self.flags = 0;
        self.header_written = false;
        self.crc = crc32fast::Hasher::new();
        self.size = 0;
        self.out.clear();
    }

    fn copy(&self) -> Box<dyn Filter> {
        Box::new(GzipFilter::new(self.mode, self.level))
    }
}
