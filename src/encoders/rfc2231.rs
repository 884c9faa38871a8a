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

use crate::util::tables::{is_attr_char, is_ttoken, HEX_CHARS};

/// Column limit for one `name*N*=value` segment.
const MAX_SEGMENT: usize = 76;

/// One emitted parameter segment: the attribute name with any `*N`/`*`
/// suffix applied, and the ready-to-emit value (quoted if needed).
pub type Segment = (String, String);

/// Encodes a parameter for a structured header. ASCII values short
/// enough for one line become a single `name=value` (quoted when the
/// value is not a plain token); anything else is split into RFC 2231
/// continuations, with percent-encoded charset-tagged segments when the
/// value is not pure ASCII.
pub fn encode_parameter(name: &str, value: &str) -> Vec<Segment> {
    let simple_len = name.len() + value.len() + 3;
    if value.is_ascii() && simple_len <= MAX_SEGMENT {
        return vec![(name.to_string(), quote_value(value))];
    }

    if value.is_ascii() {
        // Long but plain: quoted continuations.
        let budget = MAX_SEGMENT.saturating_sub(name.len() + 8).max(8);
        let chunks = value
            .as_bytes()
            .chunks(budget)
            .collect::<Vec<_>>();
        return chunks
            .iter()
            .enumerate()
            .map(|(number, chunk)| {
                (
                    format!("{name}*{number}"),
                    quote_value(std::str::from_utf8(chunk).unwrap_or_default()),
                )
            })
            .collect();
    }

    // 8-bit value: charset-tagged percent encoding.
    let mut segments = Vec::new();
    let mut buf = String::new();
    let mut number = 0;
    let budget = MAX_SEGMENT.saturating_sub(name.len() + 8).max(12);

    for ch in value.chars() {
        let mut encoded = String::new();
        for byte in ch.to_string().as_bytes() {
            if is_attr_char(*byte) {
                encoded.push(*byte as char);
            } else {
                encoded.push('%');
                encoded.push(HEX_CHARS[(byte >> 4) as usize] as char);
                encoded.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
            }
        }
        let prefix_len = if number == 0 { "utf-8''".len() } else { 0 };
        if prefix_len + buf.len() + encoded.len() > budget && !buf.is_empty() {
            segments.push((seg_name(name, number), seg_value(number, &buf)));
            number += 1;
            buf.clear();
        }
        buf.push_str(&encoded);
    }
    if !buf.is_empty() || segments.is_empty() {
        segments.push((seg_name(name, number), seg_value(number, &buf)));
    }

    // A single segment needs no number.
    if segments.len() == 1 {
        if let Some((_, value)) = segments.pop() {
            return vec![(format!("{name}*"), value)];
        }
    }
    segments
}

fn seg_name(name: &str, number: u32) -> String {
    format!("{name}*{number}*")
}

fn seg_value(number: u32, data: &str) -> String {
    if number == 0 {
        format!("utf-8''{data}")
    } else {
        data.to_string()
    }
}

/// Quotes a value unless it is already a plain token.
fn quote_value(value: &str) -> String {
    if !value.is_empty() && value.bytes().all(is_ttoken) {
        value.to_string()
    } else {
        let mut quoted = String::with_capacity(value.len() + 2);
        quoted.push('"');
        for ch in value.chars() {
            if ch == '"' || ch == '\\' {
                quoted.push('\\');
            }
            quoted.push(ch);
        }
        quoted.push('"');
        quoted
    }
}

/// Renders parameter segments folded onto continuation lines, ready to
/// append after a `type/subtype` value.
pub fn format_parameters(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (name, value) in segments {
        out.push_str(";\r\n\t");
        out.push_str(name);
        out.push('=');
        out.push_str(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::{parsers::fields::content_type::parse_content_type, MessageParser};

    use super::*;

    fn round_trip(name: &str, value: &str) {
        let segments = encode_parameter(name, value);
        let header = format!("application/octet-stream{}", format_parameters(&segments));
        let ct = parse_content_type(header.as_bytes(), &MessageParser::default(), 0)
            .unwrap_or_else(|| panic!("unparsable: {header}"));
        assert_eq!(ct.attribute(name), Some(value), "via {header}");
    }

    #[test]
    fn simple_values_stay_simple() {
        assert_eq!(
            encode_parameter("charset", "utf-8"),
            vec![("charset".to_string(), "utf-8".to_string())]
        );
        assert_eq!(
            encode_parameter("name", "two words.pdf"),
            vec![("name".to_string(), "\"two words.pdf\"".to_string())]
        );
    }

    #[test]
    fn long_ascii_values_use_continuations() {
        let value = "a-rather-long-file-name-that-does-not-fit-on-one-line-at-all-really.tar.gz";
        let segments = encode_parameter("filename", value);
        assert!(segments.len() > 1);
        assert!(segments[0].0.ends_with("*0"));
        round_trip("filename", value);
    }

    #[test]
    fn non_ascii_values_are_charset_tagged() {
        let segments = encode_parameter("filename", "caf\u{e9} menu.pdf");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].0, "filename*");
        assert!(segments[0].1.starts_with("utf-8''"), "{}", segments[0].1);
        round_trip("filename", "caf\u{e9} menu.pdf");
    }

    #[test]
    fn long_non_ascii_values_round_trip() {
        round_trip("filename", &"\u{65e5}\u{672c}\u{8a9e}-report ".repeat(8));
        round_trip("title", &"gr\u{fc}\u{df}e ".repeat(20));
    }

    #[test]
    fn segments_stay_within_line_budget() {
        let segments = encode_parameter("filename", &"\u{e9}".repeat(100));
        for (name, value) in &segments {
            assert!(name.len() + value.len() + 1 <= MAX_SEGMENT + 10, "{name}={value}");
        }
    }
}
