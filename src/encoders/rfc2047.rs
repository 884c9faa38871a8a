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

use crate::{
    charsets::map,
    util::tables::{is_esafe, is_psafe, HEX_CHARS},
};

/// Maximum length of one encoded word including its framing.
const MAX_WORD: usize = 75;

static BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Encodes an unstructured header value; the Q-encoding safe set is the
/// RFC 2047 §5.1 `esafe` class.
pub fn encode_text(text: &str) -> String {
    encode(text, is_esafe)
}

/// Encodes a phrase (display name); the safe set is the stricter §5.3
/// `psafe` class.
pub fn encode_phrase(text: &str) -> String {
    encode(text, is_psafe)
}

fn needs_encoding(word: &str) -> bool {
    !word.is_ascii() || word.contains("=?") || word.bytes().any(|ch| ch < 0x20 && ch != b'\t')
}

/// Encodes runs of words that need it, leaving plain ASCII words
/// untouched. Adjacent words needing encoding become a single run so
/// the whitespace between them survives the decoder's elision rule.
fn encode(text: &str, safe: fn(u8) -> bool) -> String {
    if !needs_encoding(text) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() * 2);
    let mut run: Vec<&str> = Vec::new();
    for word in text.split(' ') {
        if needs_encoding(word) {
            run.push(word);
        } else {
            if !run.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                encode_run(&run.join(" "), safe, &mut out);
                run.clear();
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    if !run.is_empty() {
        if !out.is_empty() {
            out.push(' ');
        }
        encode_run(&run.join(" "), safe, &mut out);
    }
    out
}

/// The smallest charset that can hold the run: iso-8859-1 when it fits,
/// utf-8 otherwise.
fn charset_for(text: &str) -> &'static str {
    if !text.is_ascii() && map::encode("iso-8859-1", text).is_some() {
        "iso-8859-1"
    } else if text.is_ascii() {
        "us-ascii"
    } else {
        "utf-8"
    }
}

#[inline]
fn q_cost(byte: u8, safe: fn(u8) -> bool) -> usize {
    if byte == b' ' || (safe(byte) && byte != b'_') {
        1
    } else {
        3
    }
}

/// Emits one run as encoded words split at character boundaries so no
/// word exceeds [`MAX_WORD`] characters. The shorter of the B and Q
/// encodings always fits once the Q estimate does.
fn encode_run(text: &str, safe: fn(u8) -> bool, out: &mut String) {
    let charset = charset_for(text);
    let budget = MAX_WORD - charset.len() - 7;

    let mut chunk_start = 0;
    let mut cols = 0;
    let mut first = true;
    let mut char_iter = text.char_indices().peekable();

    while let Some((offset, ch)) = char_iter.next() {
        let next_offset = char_iter
            .peek()
            .map(|(next, _)| *next)
            .unwrap_or(text.len());
        let encoded = map::encode(charset, &text[offset..next_offset])
            .unwrap_or_else(|| ch.to_string().into_bytes());
        let cost: usize = encoded.iter().map(|&byte| q_cost(byte, safe)).sum();

        if cols + cost > budget && cols > 0 {
            if !first {
                out.push(' ');
            }
            encode_word(&text[chunk_start..offset], charset, safe, out);
            first = false;
            chunk_start = offset;
            cols = 0;
        }
        cols += cost;
    }
    if chunk_start < text.len() || first {
        if !first {
            out.push(' ');
        }
        encode_word(&text[chunk_start..], charset, safe, out);
    }
}

fn encode_word(chunk: &str, charset: &str, safe: fn(u8) -> bool, out: &mut String) {
    let bytes = map::encode(charset, chunk).unwrap_or_else(|| chunk.as_bytes().to_vec());

    let q_len: usize = bytes.iter().map(|&byte| q_cost(byte, safe)).sum();
    let b_len = bytes.len().div_ceil(3) * 4;

    out.push_str("=?");
    out.push_str(charset);
    if q_len <= b_len {
        out.push_str("?Q?");
        for &byte in &bytes {
            if byte == b' ' {
                out.push('_');
            } else if safe(byte) && byte != b'_' {
                out.push(byte as char);
            } else {
                out.push('=');
                out.push(HEX_CHARS[(byte >> 4) as usize] as char);
                out.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
            }
        }
    } else {
        out.push_str("?B?");
        for triple in bytes.chunks(3) {
            let b0 = triple[0] as u32;
            let b1 = triple.get(1).copied().unwrap_or(0) as u32;
            let b2 = triple.get(2).copied().unwrap_or(0) as u32;
            let group = (b0 << 16) | (b1 << 8) | b2;
            out.push(BASE64_ALPHABET[(group >> 18) as usize & 0x3f] as char);
            out.push(BASE64_ALPHABET[(group >> 12) as usize & 0x3f] as char);
            out.push(if triple.len() > 1 {
                BASE64_ALPHABET[(group >> 6) as usize & 0x3f] as char
            } else {
                '='
            });
            out.push(if triple.len() > 2 {
                BASE64_ALPHABET[group as usize & 0x3f] as char
            } else {
                '='
            });
        }
    }
    out.push_str("?=");
}

#[cfg(test)]
mod tests {
    use crate::parsers::encoded_word::decode_unstructured;
    use crate::MessageParser;

    use super::*;

    fn round_trip(input: &str) {
        let encoded = encode_text(input);
        assert!(encoded.is_ascii(), "encoded output not ascii: {encoded:?}");
        for word in encoded.split(' ') {
            assert!(word.len() <= 75, "word too long: {word:?}");
        }
        assert_eq!(
            decode_unstructured(encoded.as_bytes(), &MessageParser::default()),
            input,
            "round trip failed via {encoded:?}"
        );
    }

    #[test]
    fn ascii_passes_through() {
        assert_eq!(encode_text("plain subject line"), "plain subject line");
    }

    #[test]
    fn encodes_and_round_trips() {
        for input in [
            "Hello W\u{f6}rld",
            "caf\u{e9} cr\u{e8}me br\u{fb}l\u{e9}e",
            "добрый день",
            "日本語のテスト",
            "mixed ascii and \u{fc}mlauts in one line",
            "ends with accent \u{e9}",
        ] {
            round_trip(input);
        }
    }

    #[test]
    fn long_runs_split_under_limit() {
        round_trip("gr\u{fc}\u{df}e ".repeat(30).trim_end());
        round_trip(&"長い日本語の文章がここにあります".repeat(5));
    }

    #[test]
    fn charset_choice() {
        let encoded = encode_text("caf\u{e9}");
        assert!(encoded.starts_with("=?iso-8859-1?"), "{encoded}");
        let encoded = encode_text("日本");
        assert!(encoded.starts_with("=?utf-8?"), "{encoded}");
    }

    #[test]
    fn phrase_encoding_is_stricter() {
        // `(` is esafe but not psafe.
        let text = "caf\u{e9} (x)";
        let as_text = encode_text(text);
        let as_phrase = encode_phrase(text);
        assert_eq!(
            decode_unstructured(as_text.as_bytes(), &MessageParser::default()),
            text
        );
        assert_eq!(
            decode_unstructured(as_phrase.as_bytes(), &MessageParser::default()),
            text
        );
    }

    #[test]
    fn literal_encoded_word_marker_is_protected() {
        let input = "not =?really?= encoded";
        let encoded = encode_text(input);
        assert_ne!(encoded, input);
        assert_eq!(
            decode_unstructured(encoded.as_bytes(), &MessageParser::default()),
            input
        );
    }
}
