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

//! # mail-stream
//!
//! _mail-stream_ is a **streaming MIME engine** written in Rust covering the
//! Internet Message Format (_RFC 5322_) and MIME (_RFC 2045 - 2049_) along
//! with the transfer encodings and header codecs found in real-world mail:
//!
//! - **Byte streams** with bounded windows and substreams over memory,
//!   files, pipes, memory maps and virtual concatenations.
//! - A **filter pipeline** of chainable byte transformers with back-up
//!   semantics: CRLF canonicalization, SMTP dot-stuffing, whitespace
//!   stripping, gzip, MD5 digesting, OpenPGP block extraction, charset and
//!   encoding inference, HTML conversion.
//! - **Transfer codecs** with streaming step/close state machines for
//!   base64 (RFC 4648), quoted-printable (RFC 2045), uuencode and yEnc.
//! - **Header codecs** for RFC 2047 encoded words, RFC 2231 parameter
//!   continuations, address lists and dates.
//! - An **offset-preserving MIME parser** that builds the part tree
//!   without decoding or copying content, reports every RFC violation it
//!   tolerates through a warning callback, and never panics on malformed
//!   input.
//! - **Autocrypt** header parsing and emission (autocrypt.org level 1).
//!
//! Parsing follows the Robustness Principle: malformed messages are
//! accepted whenever a reasonable interpretation exists, and each repair
//! is reported with its byte offset so callers can audit what was fixed.
//!
//! ## Parsing example
//!
//! ```rust,ignore
//! use mail_stream::MessageParser;
//!
//! let message = MessageParser::default()
//!     .parse(b"From: a@example.com\r\nSubject: hi\r\n\r\nbody")
//!     .unwrap();
//! assert_eq!(message.subject().unwrap(), "hi");
//! ```

pub mod autocrypt;
pub mod cache;
pub mod charsets;
pub mod codecs;
pub mod encoders;
pub mod filters;
pub mod parsers;
pub mod stream;
pub mod util;

use std::{borrow::Cow, fmt};

pub use codecs::Encoding;
pub use parsers::options::{Compliance, MessageParser, Warning};
pub use stream::{Stream, StreamError};

/// A parsed header field. The raw name preserves the original casing,
/// the canonical name is its ASCII-lowercase form, and the value keeps
/// the raw bytes including any folding.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header<'x> {
    pub name: Cow<'x, str>,
    pub canonical_name: Cow<'x, str>,
    pub value: Cow<'x, [u8]>,
    pub offset: usize,
}

impl<'x> Header<'x> {
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    pub fn canonical_name(&self) -> &str {
        self.canonical_name.as_ref()
    }

    pub fn value(&self) -> &[u8] {
        self.value.as_ref()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// A node of the parsed MIME tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entity<'x> {
    pub headers: Vec<Header<'x>>,
    pub encoding: Encoding,
    pub body: Body<'x>,
    /// Offset of the first header byte.
    pub offset_header: usize,
    /// Offset of the first content byte.
    pub offset_body: usize,
    /// Offset one past the last content byte.
    pub offset_end: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Body<'x> {
    /// A leaf part; contents are the raw, still transfer-encoded bytes.
    Leaf { contents: Cow<'x, [u8]> },
    /// A multipart container.
    Multipart {
        boundary: Cow<'x, str>,
        preamble: Cow<'x, [u8]>,
        children: Vec<Entity<'x>>,
        epilogue: Cow<'x, [u8]>,
    },
    /// An embedded message/rfc822 or message/global.
    Message(Box<Entity<'x>>),
    /// A message/partial fragment.
    Partial {
        id: Cow<'x, str>,
        number: u32,
        total: Option<u32>,
        contents: Cow<'x, [u8]>,
    },
}

impl<'x> Entity<'x> {
    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&Header<'x>> {
        self.headers
            .iter()
            .find(|header| header.canonical_name.as_ref() == name.to_ascii_lowercase())
    }

    /// Raw value of the first header with the given name.
    pub fn header_value(&self, name: &str) -> Option<&[u8]> {
        self.header(name).map(|header| header.value.as_ref())
    }

    /// The Subject header with encoded words decoded.
    pub fn subject(&self) -> Option<String> {
        self.header_value("subject")
            .map(|value| parsers::encoded_word::decode_unstructured(value, &MessageParser::default()))
    }

    /// The parsed Content-Type header.
    pub fn content_type(&self) -> Option<ContentType<'_>> {
        parsers::fields::content_type::parse_content_type(
            self.header_value("content-type")?,
            &MessageParser::default(),
            0,
        )
    }

    /// The parsed Content-Disposition header.
    pub fn content_disposition(&self) -> Option<ContentType<'_>> {
        parsers::fields::content_type::parse_content_type(
            self.header_value("content-disposition")?,
            &MessageParser::default(),
            0,
        )
    }

    /// Parsed address list of the given header.
    pub fn addresses(&self, name: &str) -> Vec<Address<'_>> {
        self.header(name)
            .map(|header| {
                parsers::fields::address::parse_address_list(
                    header.value.as_ref(),
                    &MessageParser::default(),
                    header.offset,
                )
            })
            .unwrap_or_default()
    }

    /// The parsed Date header.
    pub fn date(&self) -> Option<DateTime> {
        parsers::fields::date::parse_date(self.header_value("date")?)
    }

    /// The Message-ID header with its angle brackets stripped.
    pub fn message_id(&self) -> Option<Cow<'_, str>> {
        parsers::fields::id::parse_id(self.header_value("message-id")?)
    }

    /// The Content-ID header with its angle brackets stripped.
    pub fn content_id(&self) -> Option<Cow<'_, str>> {
        parsers::fields::id::parse_id(self.header_value("content-id")?)
    }

    /// The raw content bytes of a leaf or partial body.
    pub fn contents(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Leaf { contents } | Body::Partial { contents, .. } => Some(contents.as_ref()),
            _ => None,
        }
    }

    /// Decodes the content transfer encoding of a leaf body.
    pub fn decoded_contents(&self) -> Option<Cow<'_, [u8]>> {
        self.contents()
            .map(|contents| codecs::decode_body(contents, self.encoding))
    }

    /// Child parts of a multipart body.
    pub fn children(&self) -> &[Entity<'x>] {
        match &self.body {
            Body::Multipart { children, .. } => children,
            _ => &[],
        }
    }

    /// Walks the tree depth-first in document order, yielding each
    /// entity with its nesting depth. This is the low-level view used
    /// by structure checkers: every header block and body range appears
    /// exactly once, with absolute offsets.
    pub fn walk(&self) -> Walk<'_, 'x> {
        Walk {
            stack: vec![(0, self)],
        }
    }
}

/// Depth-first iterator over a parsed entity tree.
pub struct Walk<'e, 'x> {
    stack: Vec<(usize, &'e Entity<'x>)>,
}

impl<'e, 'x> Iterator for Walk<'e, 'x> {
    type Item = (usize, &'e Entity<'x>);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, entity) = self.stack.pop()?;
        match &entity.body {
            Body::Multipart { children, .. } => {
                for child in children.iter().rev() {
                    self.stack.push((depth + 1, child));
                }
            }
            Body::Message(inner) => {
                self.stack.push((depth + 1, inner.as_ref()));
            }
            _ => (),
        }
        Some((depth, entity))
    }
}

/// An RFC 5322 address: either a single mailbox or a named group.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Address<'x> {
    Mailbox(Mailbox<'x>),
    Group(Group<'x>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mailbox<'x> {
    pub name: Option<Cow<'x, str>>,
    pub local_part: Cow<'x, str>,
    pub domain: Option<Cow<'x, str>>,
    pub route: Vec<Cow<'x, str>>,
}

impl<'x> Mailbox<'x> {
    /// The `local@domain` form.
    pub fn address(&self) -> String {
        match &self.domain {
            Some(domain) => format!("{}@{}", self.local_part, domain),
            None => self.local_part.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Group<'x> {
    pub name: Cow<'x, str>,
    pub addresses: Vec<Address<'x>>,
}

/// A Content-Type or Content-Disposition value with its parameters in
/// declaration order. Parameter lookup is case-insensitive but the
/// original casing is preserved for emission.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContentType<'x> {
    pub c_type: Cow<'x, str>,
    pub c_subtype: Option<Cow<'x, str>>,
    pub attributes: Vec<(Cow<'x, str>, Cow<'x, str>)>,
}

impl<'x> ContentType<'x> {
    pub fn ctype(&self) -> &str {
        self.c_type.as_ref()
    }

    pub fn subtype(&self) -> Option<&str> {
        self.c_subtype.as_deref()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_ref())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn is(&self, c_type: &str, c_subtype: &str) -> bool {
        self.c_type.eq_ignore_ascii_case(c_type)
            && self
                .c_subtype
                .as_deref()
                .is_some_and(|subtype| subtype.eq_ignore_ascii_case(c_subtype))
    }
}

/// A parsed RFC 5322 date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub tz_before_gmt: bool,
    pub tz_hour: u8,
    pub tz_minute: u8,
}

impl DateTime {
    /// Seconds since the Unix epoch, ignoring leap seconds.
    pub fn to_timestamp(&self) -> i64 {
        // Days since epoch via the civil-from-days inverse.
        let year = self.year as i64;
        let month = self.month as i64;
        let era_year = if month <= 2 { year - 1 } else { year };
        let era = era_year.div_euclid(400);
        let year_of_era = era_year - era * 400;
        let day_of_year = (153 * (if month > 2 { month - 3 } else { month + 9 }) + 2) / 5
            + self.day as i64
            - 1;
        let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
        let days = era * 146097 + day_of_era - 719468;

        let tz = (self.tz_hour as i64 * 3600 + self.tz_minute as i64 * 60)
            * if self.tz_before_gmt { 1 } else { -1 };
        days * 86400
            + self.hour as i64 * 3600
            + self.minute as i64 * 60
            + self.second as i64
            + tz
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{}{:02}:{:02}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            if self.tz_before_gmt { "-" } else { "+" },
            self.tz_hour,
            self.tz_minute
        )
    }
}

#[cfg(test)]
mod tests {
    use super::DateTime;

    #[test]
    fn timestamp_conversion() {
        // Cross-checked against chrono.
        for (datetime, expected) in [
            (
                DateTime {
                    year: 2021,
                    month: 11,
                    day: 20,
                    hour: 14,
                    minute: 22,
                    second: 1,
                    tz_before_gmt: true,
                    tz_hour: 8,
                    tz_minute: 0,
                },
                1637446921,
            ),
            (
                DateTime {
                    year: 1970,
                    month: 1,
                    day: 1,
                    ..DateTime::default()
                },
                0,
            ),
            (
                DateTime {
                    year: 2003,
                    month: 7,
                    day: 1,
                    hour: 10,
                    minute: 52,
                    second: 37,
                    tz_before_gmt: false,
                    tz_hour: 2,
                    tz_minute: 0,
                },
                1057049557,
            ),
        ] {
            assert_eq!(datetime.to_timestamp(), expected, "{datetime}");
            let chrono = chrono::DateTime::parse_from_rfc3339(&datetime.to_string()).unwrap();
            assert_eq!(chrono.timestamp(), expected, "{datetime}");
        }
    }
}
