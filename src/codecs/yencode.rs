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

use crc32fast::Hasher;

/// The decoder is at the beginning of a line.
pub const YDECODE_STATE_EOLN: u16 = 1 << 8;
/// An `=` escape was seen and the next byte is shifted by 64.
pub const YDECODE_STATE_ESCAPE: u16 = 1 << 9;
/// The `=ybegin` line has been consumed.
pub const YDECODE_STATE_BEGIN: u16 = 1 << 12;
/// The `=ypart` line has been consumed (multipart posts only).
pub const YDECODE_STATE_PART: u16 = 1 << 13;
/// Body bytes are being decoded.
pub const YDECODE_STATE_DECODE: u16 = 1 << 14;
/// The `=yend` line has been consumed.
pub const YDECODE_STATE_END: u16 = 1 << 15;

pub const YDECODE_STATE_INIT: u16 = YDECODE_STATE_EOLN;

/// Output bytes per encoded line.
const LINE_LENGTH: usize = 128;

/// Maximum number of bytes `encode_step` may produce for `len` input bytes.
#[inline(always)]
pub fn yencode_len(len: usize) -> usize {
    2 * len + len / LINE_LENGTH * 4 + 64
}

/// Streaming yEnc encoder. `encode_close` emits the `=yend` trailer with
/// `size`, `crc32` and, for multipart posts, `pcrc32`.
#[derive(Clone)]
pub struct YEncoder {
    name: String,
    size: usize,
    part: Option<(u32, usize, usize)>,
    begun: bool,
    col: usize,
    written: usize,
    crc: Hasher,
    pcrc: Hasher,
}

impl YEncoder {
    /// A single-part encoder for a blob of `size` bytes named `name`.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        YEncoder {
            name: name.into(),
            size,
            part: None,
            begun: false,
            col: 0,
            written: 0,
            crc: Hasher::new(),
            pcrc: Hasher::new(),
        }
    }

    /// A multipart encoder; `begin`/`end` are 1-based inclusive byte
    /// offsets of this part within the complete file.
    pub fn new_part(name: impl Into<String>, size: usize, part: u32, begin: usize, end: usize) -> Self {
        YEncoder {
            part: Some((part, begin, end)),
            ..YEncoder::new(name, size)
        }
    }

    fn emit_headers(&mut self, out: &mut Vec<u8>) {
        match self.part {
            Some((part, begin, end)) => {
                out.extend_from_slice(
                    format!(
                        "=ybegin part={} line={} size={} name={}\r\n",
                        part, LINE_LENGTH, self.size, self.name
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(
                    format!("=ypart begin={} end={}\r\n", begin, end).as_bytes(),
                );
            }
            None => {
                out.extend_from_slice(
                    format!(
                        "=ybegin line={} size={} name={}\r\n",
                        LINE_LENGTH, self.size, self.name
                    )
                    .as_bytes(),
                );
            }
        }
        self.begun = true;
    }

    #[inline(always)]
    fn is_critical(&self, ch: u8) -> bool {
        match ch {
            b'=' | b'\0' | b'\n' | b'\r' => true,
            b'\t' | b' ' => self.col == 0 || self.col >= LINE_LENGTH - 1,
            _ => false,
        }
    }

    pub fn encode_step(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.reserve(yencode_len(input.len()));
        if !self.begun {
            self.emit_headers(out);
        }

        self.crc.update(input);
        self.pcrc.update(input);
        self.written += input.len();

        for &ch in input {
            let enc = ch.wrapping_add(42);
            if self.is_critical(enc) {
                out.push(b'=');
                out.push(enc.wrapping_add(64));
                self.col += 2;
            } else {
                out.push(enc);
                self.col += 1;
            }
            if self.col >= LINE_LENGTH {
                out.extend_from_slice(b"\r\n");
                self.col = 0;
            }
        }
    }

    pub fn encode_close(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.encode_step(input, out);
        if self.col > 0 {
            out.extend_from_slice(b"\r\n");
            self.col = 0;
        }

        let crc = std::mem::replace(&mut self.crc, Hasher::new()).finalize();
        let pcrc = std::mem::replace(&mut self.pcrc, Hasher::new()).finalize();
        match self.part {
            Some((part, _, _)) => {
                out.extend_from_slice(
                    format!(
                        "=yend size={} part={} pcrc32={:08x} crc32={:08x}\r\n",
                        self.written, part, pcrc, crc
                    )
                    .as_bytes(),
                );
            }
            None => {
                out.extend_from_slice(
                    format!("=yend size={} crc32={:08x}\r\n", self.written, crc).as_bytes(),
                );
            }
        }
    }

    pub fn reset(&mut self) {
        self.begun = false;
        self.col = 0;
        self.written = 0;
        self.crc = Hasher::new();
        self.pcrc = Hasher::new();
    }
}

/// Streaming yEnc decoder.
///
/// Consumes `=ybegin`, `=ypart` and `=yend` framing lines, unescapes
/// `=`-shifted bytes and maintains a running CRC32 of the whole blob
/// plus a per-part CRC32.
#[derive(Clone)]
pub struct YDecoder {
    state: u16,
    line: Vec<u8>,
    crc: Hasher,
    pcrc: Hasher,
    part: Option<u32>,
    size: Option<usize>,
    name: Option<String>,
    expected_crc: Option<u32>,
    expected_pcrc: Option<u32>,
}

impl Default for YDecoder {
    fn default() -> Self {
        YDecoder::new()
    }
}

impl YDecoder {
    pub fn new() -> Self {
        YDecoder {
            state: YDECODE_STATE_INIT,
            line: Vec::new(),
            crc: Hasher::new(),
            pcrc: Hasher::new(),
            part: None,
            size: None,
            name: None,
            expected_crc: None,
            expected_pcrc: None,
        }
    }

    pub fn state(&self) -> u16 {
        self.state
    }

    /// CRC32 of all decoded bytes so far.
    pub fn crc(&self) -> u32 {
        self.crc.clone().finalize()
    }

    /// CRC32 of the decoded bytes of the current part.
    pub fn pcrc(&self) -> u32 {
        self.pcrc.clone().finalize()
    }

    pub fn part(&self) -> Option<u32> {
        self.part
    }

    pub fn size(&self) -> Option<usize> {
        self.size
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The `crc32` attribute of the `=yend` line, once seen.
    pub fn expected_crc(&self) -> Option<u32> {
        self.expected_crc
    }

    /// The `pcrc32` attribute of the `=yend` line, once seen.
    pub fn expected_pcrc(&self) -> Option<u32> {
        self.expected_pcrc
    }

    fn attribute<'y>(line: &'y [u8], name: &str) -> Option<&'y [u8]> {
        let mut iter = line.split(|&ch| ch == b' ');
        iter.find_map(|token| {
            token
                .strip_prefix(name.as_bytes())
                .and_then(|rest| rest.strip_prefix(b"="))
        })
    }

    fn parse_usize(value: &[u8]) -> Option<usize> {
        std::str::from_utf8(value).ok()?.trim().parse().ok()
    }

    fn parse_crc(value: &[u8]) -> Option<u32> {
        u32::from_str_radix(std::str::from_utf8(value).ok()?.trim(), 16).ok()
    }

    fn header_line(&mut self, line: &[u8]) -> bool {
        if self.state & YDECODE_STATE_BEGIN == 0 {
            if let Some(rest) = line.strip_prefix(b"=ybegin ") {
                self.state |= YDECODE_STATE_BEGIN;
                self.size = Self::attribute(rest, "size").and_then(Self::parse_usize);
                self.name = Self::attribute(rest, "name")
                    .map(|name| String::from_utf8_lossy(name).into_owned());
                let part = Self::attribute(rest, "part")
                    .and_then(Self::parse_usize)
                    .map(|p| p as u32);
                if part.is_some() {
                    // A =ypart line follows before body data.
                    self.part = part;
                } else {
                    self.state |= YDECODE_STATE_DECODE;
                }
                return true;
            }
            return true; // Not yet in a yEnc block, skip the line.
        }
        if self.state & YDECODE_STATE_DECODE == 0 && self.state & YDECODE_STATE_PART == 0 {
            if let Some(rest) = line.strip_prefix(b"=ypart ") {
                let _ = rest;
                self.state |= YDECODE_STATE_PART | YDECODE_STATE_DECODE;
                self.pcrc = Hasher::new();
                return true;
            }
        }
        if let Some(rest) = line.strip_prefix(b"=yend ") {
            self.state |= YDECODE_STATE_END;
            self.state &= !YDECODE_STATE_DECODE;
            self.expected_crc = Self::attribute(rest, "crc32").and_then(Self::parse_crc);
            self.expected_pcrc = Self::attribute(rest, "pcrc32").and_then(Self::parse_crc);
            return true;
        }
        false
    }

    pub fn decode_step(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.reserve(input.len());

        for &ch in input {
            if ch == b'\n' {
                if !self.line.is_empty() {
                    let line = std::mem::take(&mut self.line);
                    let mut trimmed = &line[..];
                    if let [head @ .., b'\r'] = trimmed {
                        trimmed = head;
                    }
                    if !self.header_line(trimmed) {
                        self.decode_data(trimmed, out);
                    }
                    self.line = line;
                    self.line.clear();
                }
                self.state |= YDECODE_STATE_EOLN;
                self.state &= !YDECODE_STATE_ESCAPE;
                continue;
            }

            // Framing lines start with `=y` at the beginning of a line;
            // buffer any line that might be one.
            if self.state & YDECODE_STATE_EOLN != 0 && (ch == b'=' || !self.line.is_empty()) {
                self.line.push(ch);
                if self.line.len() == 2 && self.line != b"=y" {
                    let line = std::mem::take(&mut self.line);
                    self.state &= !YDECODE_STATE_EOLN;
                    self.decode_data(&line, out);
                    self.line = line;
                    self.line.clear();
                }
                continue;
            }

            self.state &= !YDECODE_STATE_EOLN;
            self.decode_data(&[ch], out);
        }
    }

    fn decode_data(&mut self, bytes: &[u8], out: &mut Vec<u8>) {
        if self.state & YDECODE_STATE_DECODE == 0 || self.state & YDECODE_STATE_END != 0 {
            return;
        }
        let start = out.len();
        for &ch in bytes {
            match ch {
                b'\r' | b'\n' => (),
                b'=' if self.state & YDECODE_STATE_ESCAPE == 0 => {
                    self.state |= YDECODE_STATE_ESCAPE;
                }
                _ => {
                    if self.state & YDECODE_STATE_ESCAPE != 0 {
                        self.state &= !YDECODE_STATE_ESCAPE;
                        out.push(ch.wrapping_sub(64).wrapping_sub(42));
                    } else {
                        out.push(ch.wrapping_sub(42));
                    }
                }
            }
        }
        self.crc.update(&out[start..]);
        self.pcrc.update(&out[start..]);
    }

    pub fn decode_close(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.decode_step(input, out);
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            if !self.header_line(&line) {
                self.decode_data(&line, out);
            }
        }
    }

    pub fn reset(&mut self) {
        *self = YDecoder::new();
    }
}

/// Encodes `bytes` as a single-part yEnc blob in one shot.
pub fn yencode(name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut encoder = YEncoder::new(name, bytes.len());
    let mut buf = Vec::with_capacity(yencode_len(bytes.len()));
    encoder.encode_close(bytes, &mut buf);
    buf
}

/// Decodes a yEnc blob in one shot.
pub fn ydecode(bytes: &[u8]) -> Vec<u8> {
    let mut decoder = YDecoder::new();
    let mut buf = Vec::with_capacity(bytes.len());
    decoder.decode_close(bytes, &mut buf);
    buf
}
