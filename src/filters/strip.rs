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

use crate::util::packed::PackedByteArray;

use super::Filter;

/// Removes trailing spaces and tabs from every line.
///
/// A run of whitespace is held in a packed run-length buffer until the
/// next byte shows whether the line continues (emit the run) or ends
/// (drop it).
pub struct StripFilter {
    pending: PackedByteArray,
    out: Vec<u8>,
}

impl Default for StripFilter {
    fn default() -> Self {
        StripFilter::new()
    }
}

impl StripFilter {
    pub fn new() -> Self {
        StripFilter {
            pending: PackedByteArray::new(),
            out: Vec::new(),
        }
    }

    fn step(&mut self, input: &[u8], flush: bool) {
        self.out.clear();
        self.out.reserve(input.len());
        for &ch in input {
            match ch {
                b' ' | b'\t' => self.pending.push(ch),
                b'\n' => {
                    self.pending.clear();
                    self.out.push(b'\n');
                }
                b'\r' => {
                    self.pending.clear();
                    self.out.push(b'\r');
                }
                _ => {
                    self.pending.unpack_into(&mut self.out);
                    self.out.push(ch);
                }
            }
        }
        if flush {
            self.pending.clear();
        }
    }
}

impl Filter for StripFilter {
    fn filter(&mut self, input: &[u8]) -> &[u8] {
        self.step(input, false);
        &self.out
    }

    fn complete(&mut self, input: &[u8]) -> &[u8] {
        self.step(input, true);
        &self.out
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.out.clear();
    }

    fn copy(&self) -> Box<dyn Filter> {
        Box::new(StripFilter::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(input: &[u8]) -> Vec<u8> {
        let mut filter = StripFilter::new();
        let mut out = filter.filter(input).to_vec();
        out.extend(filter.complete(b""));
        out
    }

    #[test]
    fn strips_trailing_whitespace() {
        for (input, expected) in [
            (&b"text   \nmore\t\t\r\nend"[..], &b"text\nmore\r\nend"[..]),
            (b"inner  space kept\n", b"inner  space kept\n"),
            (b"all ws line\n   \t \nnext", b"all ws line\n\nnext"),
            (b"trailing at eos   ", b"trailing at eos"),
        ] {
            assert_eq!(strip(input), expected, "failed for {input:?}");
        }
    }

    #[test]
    fn split_inside_whitespace_run() {
        let input = b"word   \nnext  tail";
        let expected = strip(input);
        for split in 0..input.len() {
            let mut filter = StripFilter::new();
            let mut out = filter.filter(&input[..split]).to_vec();
            out.extend(filter.complete(&input[split..]));
            assert_eq!(out, expected, "split at {split}");
        }
    }
}
