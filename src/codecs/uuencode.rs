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

/// Decoder has not seen the `begin` line yet.
pub const UU_STATE_INIT: u8 = 0;
/// The `begin MODE NAME` line has been consumed, either by the decoder
/// or by the caller before handing over the body.
pub const UU_STATE_BEGIN: u8 = 1 << 0;
/// A zero-length line was seen, the next line is expected to be `end`.
pub const UU_STATE_END: u8 = 1 << 1;

/// Input bytes per encoded line.
const BYTES_PER_LINE: usize = 45;

/// Maximum number of bytes `encode_step` may produce for `len` input
/// bytes: 62 output bytes per full 45-byte line, plus begin/end framing.
#[inline(always)]
pub fn uuencode_len(len: usize) -> usize {
    (len + 2) / BYTES_PER_LINE * 62 + 64
}

#[inline(always)]
fn uu_char(ch: u8) -> u8 {
    if ch & 0x3f != 0 {
        (ch & 0x3f) + b' '
    } else {
        b'`'
    }
}

/// Streaming uuencoder. The `begin MODE NAME` line is emitted before the
/// first data line, `encode_close` writes the terminating backtick line
/// and `end`.
#[derive(Debug, Clone)]
pub struct UuEncoder {
    mode: u32,
    name: String,
    begun: bool,
    saved: Vec<u8>,
}

impl UuEncoder {
    pub fn new(mode: u32, name: impl Into<String>) -> Self {
        UuEncoder {
            mode,
            name: name.into(),
            begun: false,
            saved: Vec::with_capacity(BYTES_PER_LINE),
        }
    }

    fn encode_line(line: &[u8], out: &mut Vec<u8>) {
        out.push(uu_char(line.len() as u8));
        for chunk in line.chunks(3) {
            let b0 = chunk[0];
            let b1 = chunk.get(1).copied().unwrap_or(0);
            let b2 = chunk.get(2).copied().unwrap_or(0);
            out.push(uu_char(b0 >> 2));
            out.push(uu_char((b0 << 4) | (b1 >> 4)));
            out.push(uu_char((b1 << 2) | (b2 >> 6)));
            out.push(uu_char(b2));
        }
        out.push(b'\n');
    }

    pub fn encode_step(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.reserve(uuencode_len(input.len()));

        if !self.begun {
            out.extend_from_slice(format!("begin {:o} {}\n", self.mode, self.name).as_bytes());
            self.begun = true;
        }

        let mut input = input;
        if !self.saved.is_empty() {
            let take = (BYTES_PER_LINE - self.saved.len()).min(input.len());
            self.saved.extend_from_slice(&input[..take]);
            input = &input[take..];
            if self.saved.len() == BYTES_PER_LINE {
                let line = std::mem::take(&mut self.saved);
                Self::encode_line(&line, out);
                self.saved = line;
                self.saved.clear();
            } else {
                return;
            }
        }

        let mut chunks = input.chunks_exact(BYTES_PER_LINE);
        for line in chunks.by_ref() {
            Self::encode_line(line, out);
        }
        self.saved.extend_from_slice(chunks.remainder());
    }

    pub fn encode_close(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.encode_step(input, out);
        if !self.begun {
            out.extend_from_slice(format!("begin {:o} {}\n", self.mode, self.name).as_bytes());
            self.begun = true;
        }
        if !self.saved.is_empty() {
            let line = std::mem::take(&mut self.saved);
            Self::encode_line(&line, out);
        }
        out.extend_from_slice(b"`\nend\n");
    }

    pub fn reset(&mut self) {
        self.begun = false;
        self.saved.clear();
    }
}

/// Streaming uudecoder.
///
/// Each line's first character encodes the number of decoded bytes it
/// carries; a zero-length line sets [`UU_STATE_END`] and the trailing
/// `end` line is consumed without producing output. When the caller has
/// already consumed the `begin` line, construct with
/// `begin_consumed = true` so the decoder does not skip data looking
/// for it.
#[derive(Debug, Clone)]
pub struct UuDecoder {
    state: u8,
    line: Vec<u8>,
}

impl UuDecoder {
    pub fn new(begin_consumed: bool) -> Self {
        UuDecoder {
            state: if begin_consumed {
                UU_STATE_BEGIN
            } else {
                UU_STATE_INIT
            },
            line: Vec::new(),
        }
    }

    pub fn state(&self) -> u8 {
        self.state
    }

    fn decode_line(&mut self, out: &mut Vec<u8>) {
        let line = std::mem::take(&mut self.line);
        let mut line = &line[..];
        if let [head @ .., b'\r'] = line {
            line = head;
        }

        if self.state & UU_STATE_BEGIN == 0 {
            if line.starts_with(b"begin ") {
                self.state |= UU_STATE_BEGIN;
            }
            return;
        }
        if self.state & UU_STATE_END != 0 || line.is_empty() {
            return;
        }

        let len = line[0].wrapping_sub(b' ') as usize & 0x3f;
        if len == 0 {
            self.state |= UU_STATE_END;
            return;
        }
        if line.starts_with(b"end") {
            self.state |= UU_STATE_END;
            return;
        }

        let mut remaining = len;
        for chunk in line[1..].chunks(4) {
            if remaining == 0 || chunk.len() < 2 {
                break;
            }
            let c0 = chunk[0].wrapping_sub(b' ') & 0x3f;
            let c1 = chunk[1].wrapping_sub(b' ') & 0x3f;
            let c2 = chunk.get(2).map_or(0, |&ch| ch.wrapping_sub(b' ') & 0x3f);
            let c3 = chunk.get(3).map_or(0, |&ch| ch.wrapping_sub(b' ') & 0x3f);

            let bytes = [(c0 << 2) | (c1 >> 4), (c1 << 4) | (c2 >> 2), (c2 << 6) | c3];
            let take = remaining.min(3);
            out.extend_from_slice(&bytes[..take]);
            remaining -= take;
        }
    }

    pub fn decode_step(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &ch in input {
            if ch == b'\n' {
                self.decode_line(out);
            } else {
                self.line.push(ch);
            }
        }
    }

    pub fn decode_close(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.decode_step(input, out);
        if !self.line.is_empty() {
            self.decode_line(out);
        }
    }

    pub fn reset(&mut self) {
        self.state = UU_STATE_INIT;
        self.line.clear();
    }
}

/// Encodes `bytes` in one shot with full begin/end framing.
pub fn uuencode(mode: u32, name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut encoder = UuEncoder::new(mode, name);
    let mut buf = Vec::with_capacity(uuencode_len(bytes.len()));
    encoder.encode_close(bytes, &mut buf);
    buf
}

/// Decodes a uuencoded `bytes` blob in one shot.
pub fn uudecode(bytes: &[u8]) -> Vec<u8> {
    let mut decoder = UuDecoder::new(false);
    let mut buf = Vec::with_capacity(bytes.len() / 4 * 3);
    decoder.decode_close(bytes, &mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_uu() {
        let encoded = uuencode(0o644, "cat.txt", b"Cat");
        assert_eq!(
            std::str::from_utf8(&encoded).unwrap(),
            "begin 644 cat.txt\n#0V%T\n`\nend\n"
        );
    }

    #[test]
    fn decode_uu() {
        for (input, expected) in [
            ("begin 644 cat.txt\n#0V%T\n`\nend\n", &b"Cat"[..]),
            ("begin 644 cat.txt\r\n#0V%T\r\n`\r\nend\r\n", b"Cat"),
            ("begin 644 a\n#0V%T\n`\n", b"Cat"),
            ("noise\nbegin 644 a\n#0V%T\n`\nend\n", b"Cat"),
            ("begin 644 a\n`\nend\n", b""),
        ] {
            assert_eq!(uudecode(input.as_bytes()), expected, "failed for {input:?}");
        }
    }

    #[test]
    fn decode_uu_begin_consumed() {
        let mut decoder = UuDecoder::new(true);
        let mut buf = Vec::new();
        decoder.decode_close(b"#0V%T\n`\nend\n", &mut buf);
        assert_eq!(buf, b"Cat");
        assert_ne!(decoder.state() & UU_STATE_END, 0);
    }

    #[test]
    fn uu_round_trip() {
        for len in [0usize, 1, 2, 3, 44, 45, 46, 90, 300] {
            let input = (0..len).map(|i| (i * 7) as u8).collect::<Vec<_>>();
            let encoded = uuencode(0o644, "data.bin", &input);
            assert_eq!(uudecode(&encoded), input, "len {len}");
        }
    }

    #[test]
    fn uu_split_input() {
        let input = (0..100).map(|i| (i * 13) as u8).collect::<Vec<_>>();
        let encoded = uuencode(0o600, "blob", &input);
        for split in 1..encoded.len() - 1 {
            let mut decoder = UuDecoder::new(false);
            let mut buf = Vec::new();
            decoder.decode_step(&encoded[..split], &mut buf);
            decoder.decode_close(&encoded[split..], &mut buf);
            assert_eq!(buf, input, "split at {split}");
        }
    }
}
