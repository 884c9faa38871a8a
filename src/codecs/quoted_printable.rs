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

use crate::util::tables::{is_qpsafe, HEX_CHARS, HEX_MAP};

/// Soft line breaks keep encoded lines at or below 76 columns.
const MAX_LINE: usize = 74;

/// Maximum number of bytes `encode_step` may produce for `len` input bytes.
#[inline(always)]
pub fn quoted_printable_encode_len(len: usize) -> usize {
    3 * len + len / 24 + 2
}

/// Maximum number of bytes `decode_step` may produce for `len` input bytes.
#[inline(always)]
pub fn quoted_printable_decode_len(len: usize) -> usize {
    len + 1
}

#[inline(always)]
fn hex_char(nibble: u8) -> u8 {
    HEX_CHARS[(nibble & 0x0f) as usize]
}

/// Streaming quoted-printable encoder.
///
/// Trailing whitespace before a hard line break is `=20`/`=09` encoded,
/// the line-break style of the input is preserved, and soft breaks keep
/// lines within 76 columns.
///
/// Whitespace and a bare CR are held back until the following byte
/// decides whether they end a line. A held CR always follows any held
/// whitespace in input order.
#[derive(Debug, Default, Clone)]
pub struct QuotedPrintableEncoder {
    col: usize,
    pending_ws: Vec<u8>,
    saw_cr: bool,
}

impl QuotedPrintableEncoder {
    pub fn new() -> Self {
        QuotedPrintableEncoder::default()
    }

    #[inline(always)]
    fn emit(&mut self, bytes: &[u8], out: &mut Vec<u8>) {
        if self.col + bytes.len() > MAX_LINE {
            out.extend_from_slice(b"=\r\n");
            self.col = 0;
        }
        out.extend_from_slice(bytes);
        self.col += bytes.len();
    }

    #[inline(always)]
    fn emit_encoded(&mut self, ch: u8, out: &mut Vec<u8>) {
        self.emit(&[b'=', hex_char(ch >> 4), hex_char(ch)], out);
    }

    fn flush_ws_literal(&mut self, out: &mut Vec<u8>) {
        let pending = std::mem::take(&mut self.pending_ws);
        for ch in pending {
            self.emit(&[ch], out);
        }
    }

    fn flush_ws_encoded(&mut self, out: &mut Vec<u8>) {
        let pending = std::mem::take(&mut self.pending_ws);
        for ch in pending {
            self.emit_encoded(ch, out);
        }
    }

    pub fn encode_step(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.reserve(quoted_printable_encode_len(input.len()));

        for &ch in input {
            match ch {
                b'\r' => {
                    if self.saw_cr {
                        self.flush_ws_literal(out);
                        self.emit_encoded(b'\r', out);
                    }
                    self.saw_cr = true;
                }
                b'\n' => {
                    self.flush_ws_encoded(out);
                    if self.saw_cr {
                        out.extend_from_slice(b"\r\n");
                        self.saw_cr = false;
                    } else {
                        out.push(b'\n');
                    }
                    self.col = 0;
                }
                b' ' | b'\t' => {
                    if self.saw_cr {
                        self.flush_ws_literal(out);
                        self.emit_encoded(b'\r', out);
                        self.saw_cr = false;
                    }
                    self.pending_ws.push(ch);
                }
                _ => {
                    self.flush_ws_literal(out);
                    if self.saw_cr {
                        self.emit_encoded(b'\r', out);
                        self.saw_cr = false;
                    }
                    if is_qpsafe(ch) {
                        self.emit(&[ch], out);
                    } else {
                        self.emit_encoded(ch, out);
                    }
                }
            }
        }
    }

    pub fn encode_close(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.encode_step(input, out);
        self.flush_ws_encoded(out);
        if self.saw_cr {
            self.emit_encoded(b'\r', out);
            self.saw_cr = false;
        }
        self.col = 0;
    }

    pub fn reset(&mut self) {
        *self = QuotedPrintableEncoder::default();
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
enum QpState {
    #[default]
    None,
    Eq,
    EqCr,
    Hex1(u8),
}

/// Streaming quoted-printable decoder.
///
/// `=HH` becomes a byte, `=\r?\n` disappears, a bare `=` followed by
/// anything else passes through unchanged, and transport padding
/// (literal whitespace before a hard line break) is dropped.
#[derive(Debug, Default, Clone)]
pub struct QuotedPrintableDecoder {
    state: QpState,
    pending_ws: Vec<u8>,
    saw_cr: bool,
}

impl QuotedPrintableDecoder {
    pub fn new() -> Self {
        QuotedPrintableDecoder::default()
    }

    // Held whitespace always predates a held CR.
    #[inline(always)]
    fn flush_pending(&mut self, out: &mut Vec<u8>) {
        if !self.pending_ws.is_empty() {
            out.append(&mut self.pending_ws);
        }
        if self.saw_cr {
            out.push(b'\r');
            self.saw_cr = false;
        }
    }

    fn decode_byte(&mut self, ch: u8, out: &mut Vec<u8>) {
        match std::mem::take(&mut self.state) {
            QpState::None => match ch {
                b'=' => {
                    self.flush_pending(out);
                    self.state = QpState::Eq;
                }
                b'\r' => {
                    if self.saw_cr {
                        self.flush_pending(out);
                    }
                    self.saw_cr = true;
                }
                b'\n' => {
                    self.pending_ws.clear();
                    if self.saw_cr {
                        out.extend_from_slice(b"\r\n");
                        self.saw_cr = false;
                    } else {
                        out.push(b'\n');
                    }
                }
                b' ' | b'\t' => {
                    if self.saw_cr {
                        self.flush_pending(out);
                    }
                    self.pending_ws.push(ch);
                }
                _ => {
                    self.flush_pending(out);
                    out.push(ch);
                }
            },
            QpState::Eq => match ch {
                b'\n' => (),
                b'\r' => {
                    self.state = QpState::EqCr;
                }
                _ => {
                    let hex1 = HEX_MAP[ch as usize];
                    if hex1 != -1 {
                        self.state = QpState::Hex1(ch);
                    } else {
                        // Invalid sequence, pass the `=` through.
                        out.push(b'=');
                        self.decode_byte(ch, out);
                    }
                }
            },
            QpState::EqCr => {
                if ch == b'\n' {
                    // Soft break.
                } else {
                    out.extend_from_slice(b"=\r");
                    self.decode_byte(ch, out);
                }
            }
            QpState::Hex1(hex1_raw) => {
                let hex1 = HEX_MAP[hex1_raw as usize];
                let hex2 = HEX_MAP[ch as usize];
                if hex2 != -1 {
                    out.push(((hex1 as u8) << 4) | hex2 as u8);
                } else {
                    out.push(b'=');
                    out.push(hex1_raw);
                    self.decode_byte(ch, out);
                }
            }
        }
    }

    pub fn decode_step(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.reserve(quoted_printable_decode_len(input.len()));
        for &ch in input {
            self.decode_byte(ch, out);
        }
    }

    pub fn decode_close(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.decode_step(input, out);
        match std::mem::take(&mut self.state) {
            QpState::Eq => out.push(b'='),
            QpState::EqCr => out.extend_from_slice(b"=\r"),
            QpState::Hex1(hex1_raw) => {
                out.push(b'=');
                out.push(hex1_raw);
            }
            QpState::None => (),
        }
        self.flush_pending(out);
    }

    pub fn reset(&mut self) {
        *self = QuotedPrintableDecoder::default();
    }
}

/// Encodes `bytes` in one shot.
pub fn quoted_printable_encode(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = QuotedPrintableEncoder::new();
    let mut buf = Vec::with_capacity(quoted_printable_encode_len(bytes.len()));
    encoder.encode_close(bytes, &mut buf);
    buf
}

/// Decodes `bytes` in one shot.
pub fn quoted_printable_decode(bytes: &[u8]) -> Vec<u8> {
    let mut decoder = QuotedPrintableDecoder::new();
    let mut buf = Vec::with_capacity(quoted_printable_decode_len(bytes.len()));
    decoder.decode_close(bytes, &mut buf);
    buf
}
