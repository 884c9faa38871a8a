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

use super::Filter;

/// Converts between LF and CRLF line endings, optionally handling SMTP
/// dot-stuffing: on encode a `.` at the beginning of a line becomes
/// `..`, on decode a leading `..` collapses back to `.`.
pub struct CrlfFilter {
    encode: bool,
    dots: bool,
    saw_cr: bool,
    saw_lf: bool,
    saw_dot: bool,
    out: Vec<u8>,
}

impl CrlfFilter {
    pub fn encoder(dots: bool) -> Self {
        CrlfFilter::new(true, dots)
    }

    pub fn decoder(dots: bool) -> Self {
        CrlfFilter::new(false, dots)
    }

    fn new(encode: bool, dots: bool) -> Self {
        CrlfFilter {
            encode,
            dots,
            saw_cr: false,
            saw_lf: true,
            saw_dot: false,
            out: Vec::new(),
        }
    }

    fn encode_chunk(&mut self, input: &[u8]) {
        self.out.reserve(input.len() * 2);
        for &ch in input {
            match ch {
                b'\r' => {
                    self.saw_cr = true;
                }
                b'\n' => {
                    self.saw_lf = true;
                    if !self.saw_cr {
                        self.out.push(b'\r');
                    }
                    self.saw_cr = false;
                }
                _ => {
                    if self.dots && ch == b'.' && self.saw_lf {
                        self.out.push(b'.');
                    }
                    self.saw_cr = false;
                    self.saw_lf = false;
                }
            }
            self.out.push(ch);
        }
    }

    fn decode_chunk(&mut self, input: &[u8]) {
        self.out.reserve(input.len() + 1);
        for &ch in input {
            if ch == b'\r' {
                self.saw_dot = false;
                self.saw_cr = true;
                self.saw_lf = false;
                continue;
            }

            if self.saw_cr {
                self.saw_cr = false;
                if ch == b'\n' {
                    self.saw_lf = true;
                    self.out.push(ch);
                    self.update_dot(ch);
                    continue;
                }
                self.out.push(b'\r');
            }

            if !(self.dots && self.saw_dot && ch == b'.') {
                self.out.push(ch);
            }
            self.update_dot(ch);
            self.saw_lf = ch == b'\n';
        }
    }

    fn update_dot(&mut self, ch: u8) {
        if self.dots && ch == b'.' {
            if self.saw_lf {
                self.saw_dot = true;
            } else if self.saw_dot {
                self.saw_dot = false;
            }
        }
    }
}

impl Filter for CrlfFilter {
    fn filter(&mut self, input: &[u8]) -> &[u8] {
        self.out.clear();
        if self.encode {
            self.encode_chunk(input);
        } else {
            self.decode_chunk(input);
        }
        &self.out
    }

    fn complete(&mut self, input: &[u8]) -> &[u8] {
        self.filter(input)
    }

    fn reset(&mut self) {
        self.saw_cr = false;
        self.saw_lf = true;
        self.saw_dot = false;
        self.out.clear();
    }

    fn copy(&self) -> Box<dyn Filter> {
        Box::new(CrlfFilter::new(self.encode, self.dots))
    }
}
