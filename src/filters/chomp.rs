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

/// Removes trailing whitespace at end of stream.
///
/// Any whitespace run that reaches the end of a chunk is backed up
/// since it might extend to EOS; on `complete` a single canonical CRLF
/// or LF is restored if the run began with one.
pub struct ChompFilter {
    out: Vec<u8>,
    backed_up: usize,
}

impl Default for ChompFilter {
    fn default() -> Self {
        ChompFilter::new()
    }
}

impl ChompFilter {
    pub fn new() -> Self {
        ChompFilter {
            out: Vec::new(),
            backed_up: 0,
        }
    }

    fn trailing_ws(input: &[u8]) -> usize {
        input.len()
            - input
                .iter()
                .rposition(|ch| !ch.is_ascii_whitespace())
                .map(|pos| pos + 1)
                .unwrap_or(0)
    }
}

impl Filter for ChompFilter {
    fn filter(&mut self, input: &[u8]) -> &[u8] {
        let keep = Self::trailing_ws(input);
        self.backed_up = keep;
        self.out.clear();
        self.out.extend_from_slice(&input[..input.len() - keep]);
        &self.out
    }

    fn complete(&mut self, input: &[u8]) -> &[u8] {
        let run = Self::trailing_ws(input);
        self.backed_up = 0;
        self.out.clear();
        self.out.extend_from_slice(&input[..input.len() - run]);

        let tail = &input[input.len() - run..];
        if tail.starts_with(b"\r\n") {
            self.out.extend_from_slice(b"\r\n");
        } else if tail.starts_with(b"\n") {
            self.out.push(b'\n');
        }
        &self.out
    }

    fn reset(&mut self) {
        self.out.clear();
        self.backed_up = 0;
    }

    fn backed_up(&self) -> usize {
        self.backed_up
    }

    fn copy(&self) -> Box<dyn Filter> {
        Box::new(ChompFilter::new())
    }
}
