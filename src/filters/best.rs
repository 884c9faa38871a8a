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

use crate::charsets::bitset;
use crate::codecs::Encoding;

use super::Filter;

/// RFC 5322 line length limit used for the 7bit/8bit decision.
const MAX_LINE: usize = 998;

/// The strictest encoding the transport allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingConstraint {
    SevenBit,
    EightBit,
    Binary,
}

/// Pass-through filter that collects byte-class statistics to pick the
/// best charset and transfer encoding for the data seen.
pub struct BestFilter {
    total: u64,
    count8bit: u64,
    nuls: u64,
    line_len: usize,
    longest_line: usize,
    cr_lines: u64,
    long_lines: u64,
    saw_cr: bool,
    mask: u32,
    cp_mask: u32,
    utf8_valid: bool,
    utf8_need: u8,
    utf8_cp: u32,
    out: Vec<u8>,
}

impl Default for BestFilter {
    fn default() -> Self {
        BestFilter::new()
    }
}

impl BestFilter {
    pub fn new() -> Self {
        BestFilter {
            total: 0,
            count8bit: 0,
            nuls: 0,
            line_len: 0,
            longest_line: 0,
            cr_lines: 0,
            long_lines: 0,
            saw_cr: false,
            mask: bitset::SINGLE_BYTE_MASK,
            cp_mask: bitset::FULL_MASK,
            utf8_valid: true,
            utf8_need: 0,
            utf8_cp: 0,
            out: Vec::new(),
        }
    }

    fn observe(&mut self, input: &[u8]) {
        for &ch in input {
            self.total += 1;
            match ch {
                0 => self.nuls += 1,
                b'\n' => {
                    if self.saw_cr {
                        self.cr_lines += 1;
                    }
                    if self.line_len > MAX_LINE {
                        self.long_lines += 1;
                    }
                    self.longest_line = self.longest_line.max(self.line_len);
                    self.line_len = 0;
                }
                _ => {
                    self.line_len += 1;
                    if ch >= 0x80 {
                        self.count8bit += 1;
                        self.mask &= bitset::byte_mask(ch);
                    }
                }
            }
            self.saw_cr = ch == b'\r';

            // Incremental UTF-8 validation, accumulating code points
            // for the per-code-point charset masks.
            if self.utf8_valid {
                if self.utf8_need > 0 {
                    if ch & 0xc0 == 0x80 {
                        self.utf8_cp = (self.utf8_cp << 6) | (ch & 0x3f) as u32;
                        self.utf8_need -= 1;
                        if self.utf8_need == 0 {
                            self.cp_mask &= bitset::codepoint_mask(self.utf8_cp);
                        }
                    } else {
                        self.utf8_valid = false;
                    }
                } else if ch >= 0x80 {
                    self.utf8_need = match ch {
                        0xc2..=0xdf => {
                            self.utf8_cp = (ch & 0x1f) as u32;
                            1
                        }
                        0xe0..=0xef => {
                            self.utf8_cp = (ch & 0x0f) as u32;
                            2
                        }
                        0xf0..=0xf4 => {
                            self.utf8_cp = (ch & 0x07) as u32;
                            3
                        }
                        _ => {
                            self.utf8_valid = false;
                            0
                        }
                    };
                }
            }
        }
    }

    /// Number of lines terminated with CRLF rather than a bare LF.
    pub fn crlf_lines(&self) -> u64 {
        self.cr_lines
    }

    /// Length of the longest line seen so far.
    pub fn longest_line(&self) -> usize {
        self.longest_line.max(self.line_len)
    }

    /// The best charset for the bytes seen: us-ascii when no byte was
    /// 8-bit, otherwise the highest-priority charset whose bit is still
    /// set, single-byte entries before multi-byte ones. Valid UTF-8
    /// samples are judged per code point so a multi-byte charset can
    /// win; the defaults are utf-8 and then iso-8859-1.
    pub fn charset(&self) -> &'static str {
        if self.count8bit == 0 {
            return "us-ascii";
        }
        let mask = if self.utf8_valid && self.utf8_need == 0 {
            self.cp_mask
        } else {
            self.mask
        };
        match bitset::best_charset(mask) {
            Some(charset) => charset,
            None if self.utf8_valid && self.utf8_need == 0 => "utf-8",
            None => "iso-8859-1",
        }
    }

    /// The best transfer encoding under the given transport constraint.
    pub fn encoding(&self, constraint: EncodingConstraint) -> Encoding {
        let longest = self.longest_line.max(self.line_len);
        let clean_lines = self.nuls == 0 && longest <= MAX_LINE;

        match constraint {
            EncodingConstraint::Binary => {
                if self.count8bit == 0 && clean_lines {
                    Encoding::SevenBit
                } else if clean_lines {
                    Encoding::EightBit
                } else {
                    Encoding::Binary
                }
            }
            EncodingConstraint::EightBit => {
                if self.count8bit == 0 && clean_lines {
                    Encoding::SevenBit
                } else if clean_lines {
                    Encoding::EightBit
                } else {
                    self.dense_encoding()
                }
            }
            EncodingConstraint::SevenBit => {
                if self.count8bit == 0 && clean_lines {
                    Encoding::SevenBit
                } else {
                    self.dense_encoding()
                }
            }
        }
    }

    fn dense_encoding(&self) -> Encoding {
        if self.nuls == 0 && self.count8bit + self.long_lines < self.total / 17 {
            Encoding::QuotedPrintable
        } else {
            Encoding::Base64
        }
    }
}

impl Filter for BestFilter {
    fn filter(&mut self, input: &[u8]) -> &[u8] {
        self.observe(input);
        self.out.clear();
        self.out.extend_from_slice(input);
        &self.out
    }

    fn complete(&mut self, input: &[u8]) -> &[u8] {
        self.filter(input)
    }

    fn reset(&mut self) {
        *self = BestFilter::new();
    }

    fn copy(&self) -> Box<dyn Filter> {
        Box::new(BestFilter::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_of(input: &[u8]) -> BestFilter {
        let mut filter = BestFilter::new();
        filter.complete(input);
        filter
    }

    #[test]
    fn ascii_text_is_7bit() {
        let best = stats_of(b"plain old text\r\nwith two lines\r\n");
        assert_eq!(best.encoding(EncodingConstraint::SevenBit), Encoding::SevenBit);
        assert_eq!(best.encoding(EncodingConstraint::Binary), Encoding::SevenBit);
        assert_eq!(best.charset(), "us-ascii");
        assert_eq!(best.crlf_lines(), 2);
        assert_eq!(best.longest_line(), 15);
    }

    #[test]
    fn sparse_8bit_prefers_quoted_printable() {
        let mut text = b"mostly ascii text with an occasional accent: caf\xc3\xa9.\n".to_vec();
        text.extend(std::iter::repeat(b'a').take(500));
        text.push(b'\n');
        let best = stats_of(&text);
        assert_eq!(
            best.encoding(EncodingConstraint::SevenBit),
            Encoding::QuotedPrintable
        );
        assert_eq!(best.encoding(EncodingConstraint::Binary), Encoding::EightBit);
        // The accent fits in a single-byte charset, which outranks utf-8.
        assert_eq!(best.charset(), "iso-8859-1");
    }

    #[test]
    fn dense_8bit_prefers_base64() {
        let input = (0..512u32).map(|i| 0x80 | (i % 64) as u8).collect::<Vec<_>>();
        let best = stats_of(&input);
        assert_eq!(best.encoding(EncodingConstraint::SevenBit), Encoding::Base64);
    }

    #[test]
    fn nuls_force_binary_or_base64() {
        let best = stats_of(b"data with \x00 nul");
        assert_eq!(best.encoding(EncodingConstraint::Binary), Encoding::Binary);
        assert_eq!(best.encoding(EncodingConstraint::SevenBit), Encoding::Base64);
        assert_eq!(best.encoding(EncodingConstraint::EightBit), Encoding::Base64);
    }

    #[test]
    fn latin1_charset_inferred() {
        let best = stats_of(b"caf\xe9 cr\xe8me\n");
        assert_eq!(best.charset(), "iso-8859-1");
    }

    #[test]
    fn multi_byte_charsets_inferred() {
        // CJK text has no single-byte candidate; the multi-byte table
        // entries are judged per code point.
        let best = stats_of("日本語のテスト\n".as_bytes());
        assert_eq!(best.charset(), "iso-2022-jp");

        let best = stats_of("안녕하세요 세계\n".as_bytes());
        assert_eq!(best.charset(), "euc-kr");
    }

    #[test]
    fn utf8_is_the_fallback_charset() {
        // Emoji are representable by nothing in the table.
        let best = stats_of("snap \u{1f980} snap\n".as_bytes());
        assert_eq!(best.charset(), "utf-8");
    }

    #[test]
    fn split_code_points_accumulate() {
        let text = "日本語".as_bytes();
        let mut filter = BestFilter::new();
        filter.filter(&text[..2]);
        filter.complete(&text[2..]);
        assert_eq!(filter.charset(), "iso-2022-jp");
    }

    #[test]
    fn long_lines_are_not_8bit_safe() {
        let mut input = vec![b'x'; 1200];
        input.push(b'\n');
        let best = stats_of(&input);
        assert_eq!(best.encoding(EncodingConstraint::Binary), Encoding::Binary);
        assert_eq!(
            best.encoding(EncodingConstraint::SevenBit),
            Encoding::QuotedPrintable
        );
    }
}
