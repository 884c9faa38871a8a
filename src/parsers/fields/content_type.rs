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
    charsets::map::decode_with_fallback,
    parsers::encoded_word::decode_unstructured,
    util::tables::{is_ttoken, HEX_MAP},
    Compliance, ContentType, MessageParser, Warning,
};

struct Tokens<'x> {
    data: &'x [u8],
    pos: usize,
}

impl<'x> Tokens<'x> {
    fn new(data: &'x [u8]) -> Self {
        Tokens { data, pos: 0 }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Skips whitespace, folds and `(comments)`.
    fn skip_cfws(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'(' => {
                    let mut depth = 0usize;
                    while let Some(ch) = self.peek() {
                        self.pos += 1;
                        match ch {
                            b'(' => depth += 1,
                            b')' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            b'\\' => {
                                self.pos += 1;
                            }
                            _ => (),
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn token(&mut self) -> Option<&'x [u8]> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if is_ttoken(ch) {
                self.pos += 1;
            } else {
                break;
            }
        }
        (self.pos > start).then(|| &self.data[start..self.pos])
    }

    /// Parses a `"quoted string"`, unescaping quoted pairs. The cursor
    /// must be at the opening quote.
    fn quoted_string(&mut self) -> Cow<'x, str> {
        self.pos += 1;
        let start = self.pos;
        let mut owned: Option<Vec<u8>> = None;
        while let Some(ch) = self.peek() {
            match ch {
                b'"' => {
                    self.pos += 1;
                    return match owned {
                        Some(bytes) => String::from_utf8_lossy(&bytes).into_owned().into(),
                        None => String::from_utf8_lossy(&self.data[start..self.pos - 1]),
                    };
                }
                b'\\' => {
                    let bytes =
                        owned.get_or_insert_with(|| self.data[start..self.pos].to_vec());
                    self.pos += 1;
                    if let Some(escaped) = self.peek() {
                        bytes.push(escaped);
                        self.pos += 1;
                    }
                }
                _ => {
                    if let Some(bytes) = owned.as_mut() {
                        bytes.push(ch);
                    }
                    self.pos += 1;
                }
            }
        }
        match owned {
            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned().into(),
            None => String::from_utf8_lossy(&self.data[start..self.pos]),
        }
    }

    /// Parses a parameter value: a quoted string, a token, or in loose
    /// mode any run up to the next `;`.
    fn value(&mut self, loose: bool) -> Option<Cow<'x, str>> {
        self.skip_cfws();
        match self.peek()? {
            b'"' => Some(self.quoted_string()),
            _ if !loose => self.token().map(|token| String::from_utf8_lossy(token)),
            _ => {
                let start = self.pos;
                while let Some(ch) = self.peek() {
                    if ch == b';' || ch == b'\r' || ch == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
                let mut end = self.pos;
                while end > start && self.data[end - 1].is_ascii_whitespace() {
                    end -= 1;
                }
                (end > start).then(|| String::from_utf8_lossy(&self.data[start..end]))
            }
        }
    }
}

/// One raw parameter occurrence, before RFC 2231 reassembly.
struct Segment<'x> {
    base: String,
    raw_base: Cow<'x, str>,
    number: Option<u32>,
    encoded: bool,
    value: Cow<'x, str>,
}

fn split_param_name<'x>(name: &'x [u8]) -> (String, Cow<'x, str>, Option<u32>, bool) {
    let text = String::from_utf8_lossy(name);
    let mut base = text.as_ref();
    let mut encoded = false;
    let mut number = None;

    if let Some(stripped) = base.strip_suffix('*') {
        encoded = true;
        base = stripped;
    }
    if let Some(star) = base.rfind('*') {
        if let Ok(parsed) = base[star + 1..].parse::<u32>() {
            number = Some(parsed);
            base = &base[..star];
        }
    }
    let raw_base = match &text {
        Cow::Borrowed(text) => Cow::Borrowed(&text[..base.len()]),
        Cow::Owned(text) => Cow::Owned(text[..base.len()].to_string()),
    };
    (base.to_ascii_lowercase(), raw_base, number, encoded)
}

/// Percent-decodes an RFC 2231 encoded segment.
fn decode_percent(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut buf = Vec::with_capacity(bytes.len());
    let mut pos = 0;
    while pos < bytes.len() {
        if bytes[pos] == b'%' {
            let hex1 = bytes.get(pos + 1).map_or(-1, |&ch| HEX_MAP[ch as usize]);
            let hex2 = bytes.get(pos + 2).map_or(-1, |&ch| HEX_MAP[ch as usize]);
            if hex1 != -1 && hex2 != -1 {
                buf.push(((hex1 as u8) << 4) | hex2 as u8);
                pos += 3;
                continue;
            }
        }
        buf.push(bytes[pos]);
        pos += 1;
    }
    buf
}

/// Parses a Content-Type or Content-Disposition header value, including
/// RFC 2231 parameter continuations and charset-tagged values.
pub fn parse_content_type<'x>(
    value: &'x [u8],
    parser: &MessageParser,
    offset: usize,
) -> Option<ContentType<'x>> {
    let loose = parser.parameter_compliance == Compliance::Loose;
    let mut tokens = Tokens::new(value);

    tokens.skip_cfws();
    let c_type = tokens.token()?;
    tokens.skip_cfws();
    let c_subtype = if tokens.peek() == Some(b'/') {
        tokens.pos += 1;
        tokens.skip_cfws();
        match tokens.token() {
            Some(subtype) => Some(String::from_utf8_lossy(subtype)),
            None => {
                parser.warn(offset, Warning::InvalidContentType, Some(value));
                None
            }
        }
    } else {
        None
    };

    // Collect raw parameter segments in order.
    let mut segments: Vec<Segment> = Vec::new();
    loop {
        tokens.skip_cfws();
        match tokens.peek() {
            None => break,
            Some(b';') => {
                tokens.pos += 1;
                continue;
            }
            Some(_) => (),
        }

        let Some(name) = tokens.token() else {
            parser.warn(offset + tokens.pos, Warning::InvalidParameter, None);
            // Skip to the next `;`.
            while let Some(ch) = tokens.peek() {
                tokens.pos += 1;
                if ch == b';' {
                    break;
                }
            }
            continue;
        };
        tokens.skip_cfws();
        if tokens.peek() != Some(b'=') {
            parser.warn(offset + tokens.pos, Warning::InvalidParameter, Some(name));
            continue;
        }
        tokens.pos += 1;

        let Some(param_value) = tokens.value(loose) else {
            parser.warn(offset + tokens.pos, Warning::InvalidParameter, Some(name));
            continue;
        };

        let (base, raw_base, number, encoded) = split_param_name(name);
        segments.push(Segment {
            base,
            raw_base,
            number,
            encoded,
            value: param_value,
        });
    }

    // Reassemble continuations and decode charset-tagged values.
    let mut attributes: Vec<(Cow<'x, str>, Cow<'x, str>)> = Vec::new();
    let mut assembled: Vec<String> = Vec::new();
    for segment in &segments {
        if assembled.iter().any(|name| name == &segment.base) {
            continue;
        }
        assembled.push(segment.base.clone());

        let mut parts: Vec<&Segment> = segments
            .iter()
            .filter(|other| other.base == segment.base)
            .collect();

        if parts.len() > 1 && parts.iter().all(|part| part.number.is_none()) {
            // Plain duplicates of the same parameter.
            let conflicting = parts
                .iter()
                .any(|part| part.value != parts[0].value);
            parser.warn(
                offset,
                if conflicting {
                    Warning::ConflictingParameter
                } else {
                    Warning::DuplicatedParameter
                },
                Some(segment.base.as_bytes()),
            );
            parts.truncate(1);
        }
        parts.sort_by_key(|part| part.number.unwrap_or(0));

        let mut charset: Option<String> = None;
        let mut buf: Vec<u8> = Vec::new();
        for (index, part) in parts.iter().enumerate() {
            if part.encoded {
                let mut data = part.value.as_ref();
                if index == 0 {
                    // charset'language'data
                    let mut fields = data.splitn(3, '\'');
                    if let (Some(cs), Some(_lang), Some(rest)) =
                        (fields.next(), fields.next(), fields.next())
                    {
                        if !cs.is_empty() {
                            charset = Some(cs.to_string());
                        }
                        data = rest;
                    }
                }
                buf.extend_from_slice(&decode_percent(data));
            } else {
                buf.extend_from_slice(part.value.as_bytes());
            }
        }

        let decoded = if parts.iter().any(|part| part.encoded) || charset.is_some() {
            decode_with_fallback(&buf, charset.as_deref(), &parser.fallback_charsets)
        } else {
            let text = String::from_utf8_lossy(&buf).into_owned();
            // Encoded words inside parameter values are ubiquitous even
            // though RFC 2231 defines the canonical form.
            if loose && text.contains("=?") {
                decode_unstructured(text.as_bytes(), parser)
            } else {
                text
            }
        };

        attributes.push((segment.raw_base.clone(), decoded.into()));
    }

    Some(ContentType {
        c_type: String::from_utf8_lossy(c_type),
        c_subtype,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    fn parse(input: &str) -> Option<ContentType<'_>> {
        parse_content_type(input.as_bytes(), &MessageParser::default(), 0)
    }

    #[test]
    fn parse_simple_types() {
        let ct = parse("text/plain; charset=us-ascii").unwrap();
        assert_eq!(ct.ctype(), "text");
        assert_eq!(ct.subtype(), Some("plain"));
        assert_eq!(ct.attribute("charset"), Some("us-ascii"));

        let ct = parse("multipart/mixed; boundary=\"simple boundary\"").unwrap();
        assert_eq!(ct.attribute("boundary"), Some("simple boundary"));

        let ct = parse("TEXT/HTML").unwrap();
        assert!(ct.is("text", "html"));
    }

    #[test]
    fn parameter_lookup_is_case_insensitive() {
        let ct = parse("application/pdf; Name=\"file.pdf\"").unwrap();
        assert_eq!(ct.attribute("name"), Some("file.pdf"));
        // Original casing preserved for emission.
        assert_eq!(ct.attributes[0].0, "Name");
    }

    #[test]
    fn comments_and_folding_are_skipped() {
        let ct = parse("text/plain (plain text); charset=utf-8 (Plain text)").unwrap();
        assert!(ct.is("text", "plain"));
        assert_eq!(ct.attribute("charset"), Some("utf-8"));

        let ct = parse("multipart/mixed;\r\n boundary=frontier").unwrap();
        assert_eq!(ct.attribute("boundary"), Some("frontier"));
    }

    #[test]
    fn quoted_pairs_unescape() {
        let ct = parse("application/x-stuff; title=\"quote \\\" and \\\\ slash\"").unwrap();
        assert_eq!(ct.attribute("title"), Some("quote \" and \\ slash"));
    }

    #[test]
    fn rfc2231_charset_tagged_value() {
        let ct = parse("application/x-stuff; title*=us-ascii'en-us'This%20is%20%2A%2A%2Afun%2A%2A%2A").unwrap();
        assert_eq!(ct.attribute("title"), Some("This is ***fun***"));
    }

    #[test]
    fn rfc2231_continuations() {
        let ct = parse(
            "message/external-body; access-type=URL;\r\n \
             URL*0=\"ftp://\";\r\n \
             URL*1=\"cs.utk.edu/pub/moore/bulk-mailer/bulk-mailer.tar\"",
        )
        .unwrap();
        assert_eq!(
            ct.attribute("url"),
            Some("ftp://cs.utk.edu/pub/moore/bulk-mailer/bulk-mailer.tar")
        );
    }

    #[test]
    fn rfc2231_mixed_continuations() {
        let ct = parse(
            "application/x-stuff;\r\n \
             title*0*=us-ascii'en'This%20is%20even%20more%20;\r\n \
             title*1*=%2A%2A%2Afun%2A%2A%2A%20;\r\n \
             title*2=\"isn't it!\"",
        )
        .unwrap();
        assert_eq!(
            ct.attribute("title"),
            Some("This is even more ***fun*** isn't it!")
        );
    }

    #[test]
    fn rfc2231_utf8_value() {
        let ct = parse("attachment; filename*=utf-8''caf%C3%A9%20menu.pdf").unwrap();
        assert_eq!(ct.attribute("filename"), Some("café menu.pdf"));
    }

    #[test]
    fn encoded_word_in_parameter() {
        let ct = parse("attachment; filename=\"=?utf-8?Q?caf=C3=A9.pdf?=\"").unwrap();
        assert_eq!(ct.attribute("filename"), Some("café.pdf"));
    }

    #[test]
    fn loose_unquoted_value_with_spaces() {
        let ct = parse("attachment; filename=annual report.pdf; x=1").unwrap();
        assert_eq!(ct.attribute("filename"), Some("annual report.pdf"));
        assert_eq!(ct.attribute("x"), Some("1"));
    }

    #[test]
    fn conflicting_parameters_warn() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let log = warnings.clone();
        let parser = MessageParser::new()
            .with_warning_fn(move |_, warning, _| log.borrow_mut().push(warning));

        let ct =
            parse_content_type(b"text/plain; charset=utf-8; charset=latin1", &parser, 0).unwrap();
        assert_eq!(ct.attribute("charset"), Some("utf-8"));
        assert_eq!(&*warnings.borrow(), &[Warning::ConflictingParameter]);

        let ct =
            parse_content_type(b"text/plain; charset=utf-8; charset=utf-8", &parser, 0).unwrap();
        assert_eq!(ct.attribute("charset"), Some("utf-8"));
        assert_eq!(
            &*warnings.borrow(),
            &[Warning::ConflictingParameter, Warning::DuplicatedParameter]
        );
    }

    #[test]
    fn invalid_content_type_warns() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let log = warnings.clone();
        let parser = MessageParser::new()
            .with_warning_fn(move |_, warning, _| log.borrow_mut().push(warning));

        let ct = parse_content_type(b"multipart/; boundary=b", &parser, 0).unwrap();
        assert_eq!(ct.ctype(), "multipart");
        assert_eq!(ct.subtype(), None);
        assert_eq!(&*warnings.borrow(), &[Warning::InvalidContentType]);
    }
}
