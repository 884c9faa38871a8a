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

use crate::{
    parsers::fields::{content_type::parse_content_type, id::parse_id},
    Body, ContentType, Encoding, Entity, Header, MessageParser, Warning,
};

use super::{header::HeaderBlockEnd, MessageStream};

/// Content headers that may appear at most once per part.
static UNIQUE_HEADERS: &[&str] = &[
    "content-type",
    "content-transfer-encoding",
    "content-disposition",
    "content-id",
];

/// A matched boundary delimiter line.
#[derive(Debug, Clone, Copy)]
struct BoundaryHit {
    /// Index into the boundary stack; an index below the top closes
    /// every multipart above it implicitly.
    level: usize,
    is_close: bool,
    /// First byte of the delimiter line; content ends here.
    content_end: usize,
    /// First byte after the delimiter line.
    next_pos: usize,
}

/// How a content scan ended.
#[derive(Debug, Clone, Copy)]
enum ScopeEnd {
    Eos { content_end: usize },
    Boundary(BoundaryHit),
}

impl ScopeEnd {
    fn content_end(&self) -> usize {
        match self {
            ScopeEnd::Eos { content_end } => *content_end,
            ScopeEnd::Boundary(hit) => hit.content_end,
        }
    }
}

struct ParseContext<'p, 'x> {
    parser: &'p MessageParser,
    stream: MessageStream<'x>,
    boundaries: Vec<Vec<u8>>,
    last_end: ScopeEnd,
}

impl MessageParser {
    /// Parses a raw RFC 5322 message, skipping an mbox `From ` envelope
    /// when present. Returns `None` when the input holds neither
    /// headers nor content.
    pub fn parse<'x>(&self, raw_message: &'x [u8]) -> Option<Entity<'x>> {
        let mut stream = MessageStream::new(raw_message);
        if raw_message.starts_with(b"From ") {
            stream.skip_line();
        }
        self.parse_at(stream)
    }

    /// Parses a MIME part without envelope handling.
    pub fn parse_part<'x>(&self, raw_part: &'x [u8]) -> Option<Entity<'x>> {
        self.parse_at(MessageStream::new(raw_part))
    }

    fn parse_at<'x>(&self, stream: MessageStream<'x>) -> Option<Entity<'x>> {
        if stream.is_eof() {
            return None;
        }
        let start = stream.offset();
        let mut context = ParseContext {
            parser: self,
            stream,
            boundaries: Vec::new(),
            last_end: ScopeEnd::Eos { content_end: 0 },
        };
        let entity = context.parse_entity(0);

        if entity.headers.is_empty() {
            let has_content = entity.offset_end > entity.offset_body;
            if !has_content {
                return None;
            }
            self.warn(start, Warning::MalformedMessage, None);
        }
        Some(entity)
    }
}

impl<'p, 'x> ParseContext<'p, 'x> {
    fn parse_entity(&mut self, depth: usize) -> Entity<'x> {
        let offset_header = self.stream.offset();

        // A delimiter right away means an empty part.
        if !self.boundaries.is_empty() {
            if let Some(hit) = self.match_delimiter(offset_header) {
                self.parser
                    .warn(offset_header, Warning::PartWithoutHeadersOrContent, None);
                self.stream.pos = hit.next_pos;
                self.last_end = ScopeEnd::Boundary(hit);
                return Entity {
                    headers: Vec::new(),
                    encoding: Encoding::default(),
                    body: Body::Leaf {
                        contents: Cow::Borrowed(&[]),
                    },
                    offset_header,
                    offset_body: offset_header,
                    offset_end: offset_header,
                };
            }
        }

        let mut headers = Vec::new();
        let block_end = self.stream.parse_header_block(self.parser, &mut headers);
        let offset_body = self.stream.offset();

        self.check_unique_headers(&headers);

        if block_end == HeaderBlockEnd::Eos {
            self.parser
                .warn(offset_body, Warning::TruncatedMessage, None);
            self.last_end = ScopeEnd::Eos {
                content_end: offset_body,
            };
            let encoding = content_encoding(&headers);
            return Entity {
                headers,
                encoding,
                body: Body::Leaf {
                    contents: Cow::Borrowed(&[]),
                },
                offset_header,
                offset_body,
                offset_end: offset_body,
            };
        }

        let content_type = headers
            .iter()
            .find(|header| header.canonical_name == "content-type")
            .and_then(|header| {
                let parsed =
                    parse_content_type(header.value.as_ref(), self.parser, header.offset);
                if parsed.is_none() {
                    self.parser.warn(
                        header.offset,
                        Warning::InvalidContentType,
                        Some(header.value.as_ref()),
                    );
                }
                parsed
            });
        let encoding = content_encoding(&headers);
        let ct_offset = headers
            .iter()
            .find(|header| header.canonical_name == "content-type")
            .map(|header| header.offset)
            .unwrap_or(offset_header);

        let kind = classify(content_type.as_ref());
        match kind {
            EntityKind::Multipart => {
                let boundary = content_type
                    .as_ref()
                    .and_then(|ct| ct.attribute("boundary"))
                    .filter(|boundary| !boundary.is_empty())
                    .map(|boundary| boundary.to_string());
                match boundary {
                    Some(boundary) if depth < self.parser.max_nesting => self.parse_multipart(
                        headers,
                        encoding,
                        boundary,
                        depth,
                        offset_header,
                        offset_body,
                    ),
                    Some(_) => {
                        self.parser
                            .warn(ct_offset, Warning::NestingOverflow, None);
                        self.opaque_leaf(headers, encoding, offset_header, offset_body)
                    }
                    None => {
                        self.parser
                            .warn(ct_offset, Warning::MultipartWithoutBoundary, None);
                        self.opaque_leaf(headers, encoding, offset_header, offset_body)
                    }
                }
            }
            EntityKind::Message => {
                if depth >= self.parser.max_nesting {
                    self.parser
                        .warn(ct_offset, Warning::NestingOverflow, None);
                    return self.opaque_leaf(headers, encoding, offset_header, offset_body);
                }
                // The embedded message shares the outer boundary stack.
                let inner = self.parse_entity(depth + 1);
                let offset_end = self.last_end.content_end();
                Entity {
                    headers,
                    encoding,
                    body: Body::Message(Box::new(inner)),
                    offset_header,
                    offset_body,
                    offset_end,
                }
            }
            EntityKind::Partial => {
                let (id, number, total) = content_type
                    .as_ref()
                    .map(|ct| {
                        (
                            // The fragment id may carry Message-ID style
                            // angle brackets.
                            ct.attribute("id")
                                .and_then(|id| parse_id(id.as_bytes()))
                                .map(|id| id.into_owned())
                                .unwrap_or_default(),
                            ct.attribute("number")
                                .and_then(|number| number.trim().parse().ok())
                                .unwrap_or(1),
                            ct.attribute("total")
                                .and_then(|total| total.trim().parse().ok()),
                        )
                    })
                    .unwrap_or_default();
                let end = self.scan_content();
                let content_end = end.content_end();
                Entity {
                    headers,
                    encoding,
                    body: Body::Partial {
                        id: Cow::Owned(id),
                        number,
                        total,
                        contents: Cow::Borrowed(self.stream.bytes(offset_body, content_end)),
                    },
                    offset_header,
                    offset_body,
                    offset_end: content_end,
                }
            }
            EntityKind::Leaf => {
                let end = self.scan_content();
                let content_end = end.content_end();
                if !self.boundaries.is_empty() && content_end <= offset_body {
                    self.parser.warn(
                        offset_body,
                        if headers.is_empty() {
                            Warning::PartWithoutHeadersOrContent
                        } else {
                            Warning::PartWithoutContent
                        },
                        None,
                    );
                }
                Entity {
                    headers,
                    encoding,
                    body: Body::Leaf {
                        contents: Cow::Borrowed(self.stream.bytes(offset_body, content_end)),
                    },
                    offset_header,
                    offset_body,
                    offset_end: content_end,
                }
            }
        }
    }

    fn parse_multipart(
        &mut self,
        headers: Vec<Header<'x>>,
        encoding: Encoding,
        boundary: String,
        depth: usize,
        offset_header: usize,
        offset_body: usize,
    ) -> Entity<'x> {
        let delimiter = self.parser.delimiter_for(boundary.as_bytes());
        self.boundaries.push(delimiter);
        let level = self.boundaries.len() - 1;

        let mut children = Vec::new();
        let mut epilogue: &'x [u8] = &[];
        let first = self.scan_content();
        let preamble = self
            .stream
            .bytes(offset_body, first.content_end());
        let mut offset_end;

        match first {
            ScopeEnd::Eos { content_end } => {
                // Never saw the boundary at all.
                self.parser
                    .warn(offset_header, Warning::MalformedMultipart, None);
                self.boundaries.pop();
                self.last_end = ScopeEnd::Eos { content_end };
                offset_end = content_end;
            }
            ScopeEnd::Boundary(hit) if hit.level < level => {
                self.parser
                    .warn(offset_header, Warning::MalformedMultipart, None);
                self.parser
                    .warn(hit.content_end, Warning::TruncatedMessage, None);
                self.boundaries.pop();
                self.last_end = ScopeEnd::Boundary(hit);
                offset_end = hit.content_end;
            }
            ScopeEnd::Boundary(hit) => {
                let mut saw_close = hit.is_close;
                if saw_close {
                    self.parser
                        .warn(offset_header, Warning::MalformedMultipart, None);
                }

                while !saw_close {
                    let child = self.parse_entity(depth + 1);
                    children.push(child);
                    match self.last_end {
                        ScopeEnd::Boundary(hit) if hit.level == level => {
                            saw_close = hit.is_close;
                        }
                        ScopeEnd::Boundary(hit) => {
                            // An outer boundary closed this multipart.
                            self.parser
                                .warn(hit.content_end, Warning::TruncatedMessage, None);
                            self.boundaries.pop();
                            return Entity {
                                headers,
                                encoding,
                                body: Body::Multipart {
                                    boundary: Cow::Owned(boundary),
                                    preamble: Cow::Borrowed(preamble),
                                    children,
                                    epilogue: Cow::Borrowed(&[]),
                                },
                                offset_header,
                                offset_body,
                                offset_end: hit.content_end,
                            };
                        }
                        ScopeEnd::Eos { content_end } => {
                            self.parser
                                .warn(content_end, Warning::TruncatedMessage, None);
                            self.boundaries.pop();
                            return Entity {
                                headers,
                                encoding,
                                body: Body::Multipart {
                                    boundary: Cow::Owned(boundary),
                                    preamble: Cow::Borrowed(preamble),
                                    children,
                                    epilogue: Cow::Borrowed(&[]),
                                },
                                offset_header,
                                offset_body,
                                offset_end: content_end,
                            };
                        }
                    }
                }

                // Close delimiter seen: the epilogue runs to the next
                // outer boundary or EOS.
                self.boundaries.pop();
                let epilogue_start = self.stream.offset();
                let end = self.scan_content();
                epilogue = self.stream.bytes(epilogue_start, end.content_end());
                self.last_end = end;
                offset_end = end.content_end();
            }
        }

        if matches!(first, ScopeEnd::Boundary(hit) if hit.level == level) {
            Entity {
                headers,
                encoding,
                body: Body::Multipart {
                    boundary: Cow::Owned(boundary),
                    preamble: Cow::Borrowed(preamble),
                    children,
                    epilogue: Cow::Borrowed(epilogue),
                },
                offset_header,
                offset_body,
                offset_end,
            }
        } else {
            // Degraded to an opaque container holding only a preamble.
            Entity {
                headers,
                encoding,
                body: Body::Multipart {
                    boundary: Cow::Owned(boundary),
                    preamble: Cow::Borrowed(preamble),
                    children,
                    epilogue: Cow::Borrowed(&[]),
                },
                offset_header,
                offset_body,
                offset_end,
            }
        }
    }

    /// A part whose structure could not be parsed; its raw bytes run to
    /// the end of the enclosing scope.
    fn opaque_leaf(
        &mut self,
        headers: Vec<Header<'x>>,
        encoding: Encoding,
        offset_header: usize,
        offset_body: usize,
    ) -> Entity<'x> {
        let end = self.scan_content();
        let content_end = end.content_end();
        Entity {
            headers,
            encoding,
            body: Body::Leaf {
                contents: Cow::Borrowed(self.stream.bytes(offset_body, content_end)),
            },
            offset_header,
            offset_body,
            offset_end: content_end,
        }
    }

    /// Scans from the current position to the first line matching a
    /// delimiter on the boundary stack, leaving the stream positioned
    /// after the delimiter line and recording how the scope ended.
    fn scan_content(&mut self) -> ScopeEnd {
        let data = self.stream.data;
        let mut line_start = self.stream.offset();

        while line_start < data.len() {
            if let Some(hit) = self.match_delimiter(line_start) {
                self.stream.pos = hit.next_pos;
                self.last_end = ScopeEnd::Boundary(hit);
                return self.last_end;
            }
            line_start = match data[line_start..].iter().position(|&ch| ch == b'\n') {
                Some(lf) => line_start + lf + 1,
                None => break,
            };
        }

        self.stream.pos = data.len();
        self.last_end = ScopeEnd::Eos {
            content_end: data.len(),
        };
        self.last_end
    }

    /// Checks the line starting at `line_start` against the boundary
    /// stack, innermost first.
    fn match_delimiter(&self, line_start: usize) -> Option<BoundaryHit> {
        let data = self.stream.data;
        let line = &data[line_start..];
        if !line.starts_with(b"--") {
            return None;
        }

        for level in (0..self.boundaries.len()).rev() {
            let delimiter = &self.boundaries[level];
            let Some(rest) = line.strip_prefix(delimiter.as_slice()) else {
                continue;
            };
            let (is_close, rest) = match rest.strip_prefix(b"--") {
                Some(rest) => (true, rest),
                None => (false, rest),
            };
            // Trailing transport padding is allowed and ignored.
            let mut pos = 0;
            while matches!(rest.get(pos), Some(&b' ') | Some(&b'\t')) {
                pos += 1;
            }
            let line_len = delimiter.len() + if is_close { 2 } else { 0 } + pos;
            let next_pos = match rest.get(pos) {
                Some(&b'\n') => line_start + line_len + 1,
                Some(&b'\r') if rest.get(pos + 1) == Some(&b'\n') => line_start + line_len + 2,
                None => data.len(),
                _ => continue,
            };
            return Some(BoundaryHit {
                level,
                is_close,
                content_end: line_start,
                next_pos,
            });
        }
        None
    }

    fn check_unique_headers(&self, headers: &[Header<'x>]) {
        for unique in UNIQUE_HEADERS {
            let mut first: Option<&Header> = None;
            for header in headers {
                if header.canonical_name != *unique {
                    continue;
                }
                match first {
                    None => first = Some(header),
                    Some(original) => {
                        self.parser.warn(
                            header.offset,
                            if original.value == header.value {
                                Warning::DuplicatedHeader
                            } else {
                                Warning::ConflictingHeader
                            },
                            Some(header.name.as_bytes()),
                        );
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityKind {
    Leaf,
    Multipart,
    Message,
    Partial,
}

fn classify(content_type: Option<&ContentType>) -> EntityKind {
    let Some(ct) = content_type else {
        return EntityKind::Leaf;
    };
    if ct.ctype().eq_ignore_ascii_case("multipart") {
        EntityKind::Multipart
    } else if ct.is("message", "rfc822") || ct.is("message", "global") {
        EntityKind::Message
    } else if ct.is("message", "partial") {
        EntityKind::Partial
    } else {
        EntityKind::Leaf
    }
}

fn content_encoding(headers: &[Header]) -> Encoding {
    headers
        .iter()
        .find(|header| header.canonical_name == "content-transfer-encoding")
        .map(|header| Encoding::parse(header.value.as_ref()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use crate::{Body, Encoding, MessageParser, Warning};

    fn warnings_parser() -> (MessageParser, Rc<RefCell<Vec<(usize, Warning)>>>) {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let log = warnings.clone();
        let parser = MessageParser::new()
            .with_warning_fn(move |offset, warning, _| log.borrow_mut().push((offset, warning)));
        (parser, warnings)
    }

    #[test]
    fn empty_input_returns_none() {
        assert!(MessageParser::default().parse(b"").is_none());
    }

    #[test]
    fn parse_simple_message() {
        let raw = b"From: a@example.com\r\nSubject: test\r\n\r\nhello world\r\n";
        let message = MessageParser::default().parse(raw).unwrap();
        assert_eq!(message.subject().unwrap(), "test");
        assert_eq!(message.contents().unwrap(), b"hello world\r\n");
        assert_eq!(message.offset_header, 0);
        assert_eq!(message.offset_body, raw.len() - 13);
        assert_eq!(message.offset_end, raw.len());
    }

    #[test]
    fn parse_multipart_with_preamble_and_epilogue() {
        let raw = b"Content-Type: multipart/mixed; boundary=\"b\"\n\
            \n\
            preamble\n\
            --b\n\
            Content-Type: text/plain\n\
            \n\
            hello\n\
            --b--\n\
            epilogue\n";
        let message = MessageParser::default().parse(raw).unwrap();
        match &message.body {
            Body::Multipart {
                boundary,
                preamble,
                children,
                epilogue,
            } => {
                assert_eq!(boundary.as_ref(), "b");
                assert_eq!(preamble.as_ref(), b"preamble\n");
                assert_eq!(epilogue.as_ref(), b"epilogue\n");
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].contents().unwrap(), b"hello\n");
            }
            other => panic!("expected multipart, got {other:?}"),
        }
        assert_eq!(message.offset_end, raw.len());
    }

    #[test]
    fn nested_multiparts() {
        let raw = b"Content-Type: multipart/mixed; boundary=outer\n\
            \n\
            --outer\n\
            Content-Type: multipart/alternative; boundary=inner\n\
            \n\
            --inner\n\
            \n\
            plain\n\
            --inner\n\
            Content-Type: text/html\n\
            \n\
            <b>html</b>\n\
            --inner--\n\
            inner epilogue\n\
            --outer\n\
            Content-Type: text/plain\n\
            \n\
            tail part\n\
            --outer--\n";
        let message = MessageParser::default().parse(raw).unwrap();
        let children = message.children();
        assert_eq!(children.len(), 2);

        let inner = &children[0];
        assert_eq!(inner.children().len(), 2);
        assert_eq!(inner.children()[0].contents().unwrap(), b"plain\n");
        assert_eq!(inner.children()[1].contents().unwrap(), b"<b>html</b>\n");
        match &inner.body {
            Body::Multipart { epilogue, .. } => {
                assert_eq!(epilogue.as_ref(), b"inner epilogue\n")
            }
            other => panic!("expected multipart, got {other:?}"),
        }
        assert_eq!(children[1].contents().unwrap(), b"tail part\n");
    }

    #[test]
    fn outer_boundary_closes_inner_multipart() {
        let raw = b"Content-Type: multipart/mixed; boundary=outer\n\
            \n\
            --outer\n\
            Content-Type: multipart/alternative; boundary=inner\n\
            \n\
            --inner\n\
            \n\
            orphan part\n\
            --outer\n\
            Content-Type: text/plain\n\
            \n\
            recovered\n\
            --outer--\n";
        let (parser, warnings) = warnings_parser();
        let message = parser.parse(raw).unwrap();
        let children = message.children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].children().len(), 1);
        assert_eq!(
            children[0].children()[0].contents().unwrap(),
            b"orphan part\n"
        );
        assert_eq!(children[1].contents().unwrap(), b"recovered\n");
        assert!(warnings
            .borrow()
            .iter()
            .any(|(_, warning)| *warning == Warning::TruncatedMessage));
    }

    #[test]
    fn multipart_without_boundary_is_opaque_leaf() {
        let raw = b"Content-Type: multipart/mixed\n\nraw bytes\n";
        let (parser, warnings) = warnings_parser();
        let message = parser.parse(raw).unwrap();
        assert_eq!(message.contents().unwrap(), b"raw bytes\n");
        assert_eq!(
            warnings.borrow()[0],
            (0, Warning::MultipartWithoutBoundary)
        );
    }

    #[test]
    fn missing_close_delimiter_warns_truncated() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\
            \n\
            --b\n\
            Content-Type: text/plain\n\
            \n\
            dangling";
        let (parser, warnings) = warnings_parser();
        let message = parser.parse(raw).unwrap();
        assert_eq!(message.children().len(), 1);
        assert_eq!(message.children()[0].contents().unwrap(), b"dangling");
        assert!(warnings
            .borrow()
            .iter()
            .any(|(_, warning)| *warning == Warning::TruncatedMessage));
    }

    #[test]
    fn message_rfc822_recurses() {
        let raw = b"Content-Type: message/rfc822\n\
            \n\
            Subject: inner\n\
            \n\
            inner body\n";
        let message = MessageParser::default().parse(raw).unwrap();
        match &message.body {
            Body::Message(inner) => {
                assert_eq!(inner.subject().unwrap(), "inner");
                assert_eq!(inner.contents().unwrap(), b"inner body\n");
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn message_partial_metadata() {
        let raw = b"Content-Type: message/partial; id=\"<abc@host>\"; number=2; total=3\n\
            \n\
            raw fragment bytes";
        let message = MessageParser::default().parse(raw).unwrap();
        match &message.body {
            Body::Partial {
                id,
                number,
                total,
                contents,
            } => {
                assert_eq!(id.as_ref(), "abc@host");
                assert_eq!(*number, 2);
                assert_eq!(*total, Some(3));
                assert_eq!(contents.as_ref(), b"raw fragment bytes");
            }
            other => panic!("expected partial, got {other:?}"),
        }
    }

    #[test]
    fn content_is_not_transfer_decoded() {
        let raw = b"Content-Transfer-Encoding: base64\n\
            \n\
            aGVsbG8=\n";
        let message = MessageParser::default().parse(raw).unwrap();
        assert_eq!(message.encoding, Encoding::Base64);
        assert_eq!(message.contents().unwrap(), b"aGVsbG8=\n");
        assert_eq!(message.decoded_contents().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn header_only_message_is_truncated() {
        let raw = b"Subject: headers only";
        let (parser, warnings) = warnings_parser();
        let message = parser.parse(raw).unwrap();
        assert_eq!(message.subject().unwrap(), "headers only");
        assert_eq!(message.contents().unwrap(), b"");
        assert_eq!(warnings.borrow()[0].1, Warning::TruncatedMessage);
    }

    #[test]
    fn mbox_envelope_is_skipped() {
        let raw = b"From someone@example.com Sat Jan  1 00:00:00 2022\n\
            Subject: enveloped\n\
            \n\
            body\n";
        let message = MessageParser::default().parse(raw).unwrap();
        assert_eq!(message.subject().unwrap(), "enveloped");
        assert_eq!(message.offset_header, 50);
    }

    #[test]
    fn nesting_limit_collapses_content() {
        let mut raw = Vec::new();
        for depth in 0..10 {
            raw.extend_from_slice(
                format!("Content-Type: multipart/mixed; boundary=b{depth}\n\n--b{depth}\n")
                    .as_bytes(),
            );
        }
        raw.extend_from_slice(b"Content-Type: text/plain\n\ndeep\n");
        for depth in (0..10).rev() {
            raw.extend_from_slice(format!("--b{depth}--\n").as_bytes());
        }

        let (parser, warnings) = warnings_parser();
        let parser = parser.with_max_nesting(4);
        let message = parser.parse(&raw).unwrap();

        let mut node = &message;
        let mut depth = 0;
        while let Body::Multipart { children, .. } = &node.body {
            assert_eq!(children.len(), 1);
            node = &children[0];
            depth += 1;
        }
        assert!(depth <= 4, "depth {depth}");
        assert!(warnings
            .borrow()
            .iter()
            .any(|(_, warning)| *warning == Warning::NestingOverflow));
    }

    #[test]
    fn duplicated_and_conflicting_headers() {
        let (parser, warnings) = warnings_parser();
        let _ = parser.parse(
            b"Content-Type: text/plain\n\
              Content-Type: text/plain\n\
              Content-Transfer-Encoding: 7bit\n\
              Content-Transfer-Encoding: base64\n\
              \n\
              body\n",
        );
        let seen: Vec<Warning> = warnings.borrow().iter().map(|(_, w)| *w).collect();
        assert!(seen.contains(&Warning::DuplicatedHeader));
        assert!(seen.contains(&Warning::ConflictingHeader));
    }

    #[test]
    fn empty_multipart_warns() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\n--b--\n";
        let (parser, warnings) = warnings_parser();
        let message = parser.parse(raw).unwrap();
        assert!(message.children().is_empty());
        assert!(warnings
            .borrow()
            .iter()
            .any(|(_, warning)| *warning == Warning::MalformedMultipart));
    }

    #[test]
    fn empty_part_between_delimiters() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\
            \n\
            --b\n\
            --b\n\
            Content-Type: text/plain\n\
            \n\
            real\n\
            --b--\n";
        let (parser, warnings) = warnings_parser();
        let message = parser.parse(raw).unwrap();
        assert_eq!(message.children().len(), 2);
        assert_eq!(message.children()[0].contents().unwrap(), b"");
        assert_eq!(message.children()[1].contents().unwrap(), b"real\n");
        assert!(warnings
            .borrow()
            .iter()
            .any(|(_, warning)| *warning == Warning::PartWithoutHeadersOrContent));
    }

    #[test]
    fn boundary_with_transport_padding() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\
            \n\
            --b \t\n\
            \n\
            padded\n\
            --b-- \n";
        let message = MessageParser::default().parse(raw).unwrap();
        assert_eq!(message.children().len(), 1);
        assert_eq!(message.children()[0].contents().unwrap(), b"padded\n");
    }

    #[test]
    fn offsets_allow_reparsing_subtrees() {
        let raw: &[u8] = b"Content-Type: multipart/mixed; boundary=b\n\
            \n\
            --b\n\
            Subject: part one\n\
            \n\
            first\n\
            --b\n\
            Subject: part two\n\
            \n\
            second\n\
            --b--\n";
        let parser = MessageParser::default();
        let message = parser.parse(raw).unwrap();

        for child in message.children() {
            let slice = &raw[child.offset_header..child.offset_end];
            let reparsed = parser.parse_part(slice).unwrap();
            assert_eq!(
                reparsed.contents().unwrap(),
                child.contents().unwrap()
            );
            assert_eq!(reparsed.headers.len(), child.headers.len());
        }
    }
}
