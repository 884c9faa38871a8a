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

pub mod basic;
pub mod best;
pub mod chomp;
pub mod crlf;
pub mod gzip;
pub mod html;
pub mod md5;
pub mod openpgp;
pub mod smtp_data;
pub mod strip;

pub use basic::{DecodeFilter, EncodeFilter, YDecodeFilter, YEncodeFilter};
pub use best::{BestFilter, EncodingConstraint};
pub use chomp::ChompFilter;
pub use crlf::CrlfFilter;
pub use gzip::{GzipFilter, GzipMode};
pub use html::{HtmlFilter, HTML_CITATION, HTML_CONVERT_NL, HTML_CONVERT_SPACES, HTML_CONVERT_URLS, HTML_ESCAPE_8BIT};
pub use md5::Md5Filter;
pub use openpgp::{OpenPgpDataType, OpenPgpFilter};
pub use smtp_data::SmtpDataFilter;
pub use strip::StripFilter;

/// A stateful byte transformer.
///
/// `filter` consumes a chunk and returns the transformed output;
/// `complete` does the same for the final chunk at end of stream and is
/// called exactly once. A filter may decline to consume a trailing
/// suffix of its input by reporting it through `backed_up`; the caller
/// re-presents those bytes prepended to the next chunk. The returned
/// slice borrows the filter's output buffer and is valid until the next
/// call on the same filter.
pub trait Filter {
    fn filter(&mut self, input: &[u8]) -> &[u8];
    fn complete(&mut self, input: &[u8]) -> &[u8];
    fn reset(&mut self);

    /// Number of trailing input bytes the last `filter` call declined.
    fn backed_up(&self) -> usize {
        0
    }

    /// A new filter of the same kind in its initial state.
    fn copy(&self) -> Box<dyn Filter>;
}

/// An ordered pipeline of filters with per-filter back-up buffers.
///
/// On each step the chain prepends a filter's backed-up bytes to the
/// fresh input, runs the filter, stores the new backed-up suffix, and
/// feeds the produced bytes to the next filter. `complete` flushes
/// every filter in order, exactly once.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Entry>,
}

struct Entry {
    filter: Box<dyn Filter>,
    backup: Vec<u8>,
}

impl FilterChain {
    pub fn new() -> Self {
        FilterChain::default()
    }

    pub fn add(&mut self, filter: Box<dyn Filter>) -> &mut Self {
        self.filters.push(Entry {
            filter,
            backup: Vec::new(),
        });
        self
    }

    pub fn with(mut self, filter: Box<dyn Filter>) -> Self {
        self.add(filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    fn run(&mut self, input: &[u8], complete: bool, reverse: bool) -> Vec<u8> {
        let mut data = input.to_vec();
        let count = self.filters.len();
        for step in 0..count {
            let entry = &mut self.filters[if reverse { count - 1 - step } else { step }];
            let augmented = if entry.backup.is_empty() {
                data
            } else {
                let mut augmented = std::mem::take(&mut entry.backup);
                augmented.extend_from_slice(&data);
                augmented
            };

            let produced = if complete {
                entry.filter.complete(&augmented).to_vec()
            } else {
                entry.filter.filter(&augmented).to_vec()
            };

            let kept = if complete {
                0
            } else {
                entry.filter.backed_up().min(augmented.len())
            };
            if kept > 0 {
                entry
                    .backup
                    .extend_from_slice(&augmented[augmented.len() - kept..]);
            }
            data = produced;
        }
        data
    }

    /// Pipes `input` through every filter in insertion order, the read
    /// direction.
    pub fn filter(&mut self, input: &[u8]) -> Vec<u8> {
        self.run(input, false, false)
    }

    /// Flushes the pipeline at end of stream.
    pub fn complete(&mut self, input: &[u8]) -> Vec<u8> {
        self.run(input, true, false)
    }

    /// Pipes `input` through the filters in reverse insertion order,
    /// the write direction.
    pub fn filter_write(&mut self, input: &[u8]) -> Vec<u8> {
        self.run(input, false, true)
    }

    /// Flushes the pipeline in reverse insertion order.
    pub fn complete_write(&mut self, input: &[u8]) -> Vec<u8> {
        self.run(input, true, true)
    }

    /// Resets every filter and clears the back-up buffers.
    pub fn reset(&mut self) {
        for entry in &mut self.filters {
            entry.filter.reset();
            entry.backup.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Passes bytes through but refuses to consume a trailing
    /// incomplete `<...>` token until it sees the closing `>`.
    struct TokenFilter {
        out: Vec<u8>,
        backed_up: usize,
    }

    impl TokenFilter {
        fn new() -> Self {
            TokenFilter {
                out: Vec::new(),
                backed_up: 0,
            }
        }
    }

    impl Filter for TokenFilter {
        fn filter(&mut self, input: &[u8]) -> &[u8] {
            let keep = match input.iter().rposition(|&ch| ch == b'<') {
                Some(start) if !input[start..].contains(&b'>') => input.len() - start,
                _ => 0,
            };
            self.backed_up = keep;
            self.out.clear();
            self.out
                .extend(input[..input.len() - keep].iter().map(u8::to_ascii_uppercase));
            &self.out
        }

        fn complete(&mut self, input: &[u8]) -> &[u8] {
            self.backed_up = 0;
            self.out.clear();
            self.out
                .extend(input.iter().map(u8::to_ascii_uppercase));
            &self.out
        }

        fn reset(&mut self) {
            self.backed_up = 0;
            self.out.clear();
        }

        fn backed_up(&self) -> usize {
            self.backed_up
        }

        fn copy(&self) -> Box<dyn Filter> {
            Box::new(TokenFilter::new())
        }
    }

    #[test]
    fn backup_bytes_are_represented() {
        let mut chain = FilterChain::new();
        chain.add(Box::new(TokenFilter::new()));

        let mut out = chain.filter(b"abc <to");
        assert_eq!(out, b"ABC ");
        out.extend(chain.filter(b"ken> def"));
        assert_eq!(out, b"ABC <TOKEN> DEF");
        out.extend(chain.complete(b" <tail"));
        assert_eq!(out, b"ABC <TOKEN> DEF <TAIL");
    }

    #[test]
    fn split_invariance() {
        let input = b"abc <token> def <second> tail";
        let whole = {
            let mut chain = FilterChain::new();
            chain.add(Box::new(TokenFilter::new()));
            let mut out = chain.filter(input);
            out.extend(chain.complete(b""));
            out
        };

        for split in 0..input.len() {
            let mut chain = FilterChain::new();
            chain.add(Box::new(TokenFilter::new()));
            let mut out = chain.filter(&input[..split]);
            out.extend(chain.filter(&input[split..]));
            out.extend(chain.complete(b""));
            assert_eq!(out, whole, "split at {split}");
        }
    }

    #[test]
    fn copy_starts_fresh() {
        let mut original = TokenFilter::new();
        original.filter(b"seed <partial");
        let mut copied = original.copy();
        assert_eq!(copied.backed_up(), 0);
        assert_eq!(copied.complete(b"clean <a>"), b"CLEAN <A>");
    }

    #[test]
    fn reset_clears_backup() {
        let mut chain = FilterChain::new();
        chain.add(Box::new(TokenFilter::new()));
        assert_eq!(chain.filter(b"x <unfinished"), b"X ");
        chain.reset();
        assert_eq!(chain.filter(b"clean"), b"CLEAN");
        assert_eq!(chain.complete(b""), b"");
    }
}
