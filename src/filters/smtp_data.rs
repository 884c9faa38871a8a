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

/// Byte-stuffs lines beginning with `.` to `..` for the SMTP DATA
/// command. Line endings pass through untouched.
pub struct SmtpDataFilter {
    bol: bool,
    out: Vec<u8>,
}

impl Default for SmtpDataFilter {
    fn default() -> Self {
        SmtpDataFilter::new()
    }
}

impl SmtpDataFilter {
    pub fn new() -> Self {
        SmtpDataFilter {
            bol: true,
            out: Vec::new(),
        }
    }
}

impl Filter for SmtpDataFilter {
    fn filter(&mut self, input: &[u8]) -> &[u8] {
        self.out.clear();
        self.out.reserve(input.len() + input.len() / 80 + 1);
        for &ch in input {
            if self.bol && ch == b'.' {
                self.out.push(b'.');
            }
            self.bol = ch == b'\n';
            self.out.push(ch);
        }
        &self.out
    }

    fn complete(&mut self, input: &[u8]) -> &[u8] {
        self.filter(input)
    }

    fn reset(&mut self) {
        self.bol = true;
        self.out.clear();
    }

    fn copy(&self) -> Box<dyn Filter> {
        Box::new(SmtpDataFilter::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stuffs_leading_dots() {
        let mut filter = SmtpDataFilter::new();
        let out = filter.filter(b".first\r\nsecond .dot\r\n.\r\n").to_vec();
        assert_eq!(out, b"..first\r\nsecond .dot\r\n..\r\n");
    }

    #[test]
    fn split_at_line_start() {
        let input = b"line\r\n.dot\r\n";
        for split in 0..input.len() {
            let mut filter = SmtpDataFilter::new();
            let mut out = filter.filter(&input[..split]).to_vec();
            out.extend(filter.complete(&input[split..]));
            assert_eq!(out, b"line\r\n..dot\r\n", "split at {split}");
        }
    }
}
