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

use std::borrow::Cow;

use crate::{util::tables::is_field_name, Header, MessageParser, Warning};

use super::MessageStream;

/// How a header block ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderBlockEnd {
    /// The empty line separating headers from content was found; the
    /// stream is positioned at the first content byte.
    BlankLine,
    /// A line violating the field-name grammar was found; the stream is
    /// positioned at its first byte, which starts the content.
    InvalidName,
    /// The input ended before an empty line.
    Eos,
}

impl<'x> MessageStream<'x> {
    /// Parses a header block up to and including the empty separator
    /// line, folding continuation lines into their header's raw value.
    pub fn parse_header_block(
        &mut self,
        parser: &MessageParser,
        headers: &mut Vec<Header<'x>>,
    ) -> HeaderBlockEnd {
        loop {
            match self.peek() {
                None => return HeaderBlockEnd::Eos,
                Some(&b'\n') => {
                    self.pos += 1;
                    return HeaderBlockEnd::BlankLine;
                }
                Some(&b'\r') => {
                    if self.data.get(self.pos + 1) == Some(&b'\n') {
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                    }
                    return HeaderBlockEnd::BlankLine;
                }
                _ => (),
            }

            let offset_field = self.pos;

            // Field name: one or more `ftext` bytes followed by `:`.
            let mut name_end = self.pos;
            while let Some(&ch) = self.data.get(name_end) {
                if is_field_name(ch) {
                    name_end += 1;
                } else {
                    break;
                }
            }
            // The colon must follow the name immediately.
            if name_end == offset_field || self.data.get(name_end) != Some(&b':') {
                parser.warn(
                    offset_field,
                    Warning::InvalidHeaderName,
                    self.data.get(offset_field..name_end),
                );
                return HeaderBlockEnd::InvalidName;
            }
            self.pos = name_end + 1;

            // Skip leading blanks of the value.
            while matches!(self.peek(), Some(&b' ') | Some(&b'\t')) {
                self.pos += 1;
            }
            let value_start = self.pos;
            let mut value_end = self.pos;
            let mut has_8bit = false;

            loop {
                match self.next() {
                    Some(&b'\n') => {
                        // Folded if the next line starts with whitespace.
                        if matches!(self.peek(), Some(&b' ') | Some(&b'\t')) {
                            value_end = self.pos - 1;
                        } else {
                            break;
                        }
                    }
                    Some(&ch) => {
                        if ch != b'\r' {
                            value_end = self.pos;
                        }
                        if ch >= 0x80 {
                            has_8bit = true;
                        }
                    }
                    None => break,
                }
            }

            let raw_name = self.string(offset_field, name_end);
            let canonical_name = if raw_name.bytes().any(|ch| ch.is_ascii_uppercase()) {
                Cow::Owned(parser.canonical_name(raw_name.as_ref()))
            } else {
                raw_name.clone()
            };

            if has_8bit {
                parser.warn(value_start, Warning::Unencoded8BitHeader, None);
            }

            headers.push(Header {
                name: raw_name,
                canonical_name,
                value: Cow::Borrowed(self.bytes(value_start, value_end)),
                offset: offset_field,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    fn parse(input: &[u8]) -> (Vec<Header>, HeaderBlockEnd, usize) {
        let parser = MessageParser::new();
        let mut stream = MessageStream::new(input);
        let mut headers = Vec::new();
        let end = stream.parse_header_block(&parser, &mut headers);
        (headers, end, stream.offset())
    }

    #[test]
    fn parse_simple_headers() {
        let (headers, end, pos) = parse(b"From: a@example.com\r\nSubject: hello\r\n\r\nbody");
        assert_eq!(end, HeaderBlockEnd::BlankLine);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].name(), "From");
        assert_eq!(headers[0].canonical_name(), "from");
        assert_eq!(headers[0].value(), b"a@example.com");
        assert_eq!(headers[0].offset(), 0);
        assert_eq!(headers[1].canonical_name(), "subject");
        assert_eq!(headers[1].value(), b"hello");
        assert_eq!(pos, 39);
    }

    #[test]
    fn folded_value_keeps_raw_bytes() {
        let (headers, _, _) = parse(b"Subject: first\r\n second\r\n\tthird\r\n\r\n");
        assert_eq!(headers[0].value(), b"first\r\n second\r\n\tthird");
    }

    #[test]
    fn header_name_casing() {
        let (headers, _, _) = parse(b"x-custom-header: v\n\n");
        assert_eq!(headers[0].name(), "x-custom-header");
        assert_eq!(headers[0].canonical_name(), "x-custom-header");
    }

    #[test]
    fn invalid_name_ends_block() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let log = warnings.clone();
        let parser = MessageParser::new()
            .with_warning_fn(move |offset, warning, _| log.borrow_mut().push((offset, warning)));

        let input = b"Good: one\nbad header line\nrest";
        let mut stream = MessageStream::new(input);
        let mut headers = Vec::new();
        let end = stream.parse_header_block(&parser, &mut headers);

        assert_eq!(end, HeaderBlockEnd::InvalidName);
        assert_eq!(headers.len(), 1);
        // The offending line becomes the first byte of the body.
        assert_eq!(&input[stream.offset()..], b"bad header line\nrest");
        assert_eq!(&*warnings.borrow(), &[(10, Warning::InvalidHeaderName)]);
    }

    #[test]
    fn space_before_colon_is_invalid() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let log = warnings.clone();
        let parser = MessageParser::new()
            .with_warning_fn(move |offset, warning, _| log.borrow_mut().push((offset, warning)));

        let input = b"Subject : v\n\nbody";
        let mut stream = MessageStream::new(input);
        let mut headers = Vec::new();
        let end = stream.parse_header_block(&parser, &mut headers);

        assert_eq!(end, HeaderBlockEnd::InvalidName);
        assert!(headers.is_empty());
        assert_eq!(stream.offset(), 0);
        assert_eq!(&*warnings.borrow(), &[(0, Warning::InvalidHeaderName)]);
    }

    #[test]
    fn eight_bit_value_warns() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let log = warnings.clone();
        let parser = MessageParser::new()
            .with_warning_fn(move |_, warning, _| log.borrow_mut().push(warning));

        let mut stream = MessageStream::new(b"Subject: caf\xe9\n\n");
        let mut headers = Vec::new();
        stream.parse_header_block(&parser, &mut headers);
        assert_eq!(&*warnings.borrow(), &[Warning::Unencoded8BitHeader]);
    }

    #[test]
    fn truncated_headers_reach_eos() {
        let (headers, end, _) = parse(b"Subject: no terminator");
        assert_eq!(end, HeaderBlockEnd::Eos);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].value(), b"no terminator");
    }
}
