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
    charsets::map::decode_with_fallback,
    codecs::base64::{base64_decode, base64_decode_strict},
    util::tables::HEX_MAP,
    Compliance, MessageParser, Warning,
};

enum Word {
    /// A valid encoded word and the bytes it spans.
    Decoded(String, usize),
    /// Well-formed framing but undecodable contents.
    Invalid(usize),
    /// Not an encoded word at all.
    None,
}

fn decode_q(bytes: &[u8], loose: bool) -> Option<Vec<u8>> {
    let mut buf = Vec::with_capacity(bytes.len());
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b'_' => {
                buf.push(b' ');
                pos += 1;
            }
            b'=' => {
                let hex1 = bytes.get(pos + 1).map_or(-1, |&ch| HEX_MAP[ch as usize]);
                let hex2 = bytes.get(pos + 2).map_or(-1, |&ch| HEX_MAP[ch as usize]);
                if hex1 != -1 && hex2 != -1 {
                    buf.push(((hex1 as u8) << 4) | hex2 as u8);
                    pos += 3;
                } else if loose {
                    buf.push(b'=');
                    pos += 1;
                } else {
                    return None;
                }
            }
            b' ' | b'\t' if !loose => return None,
            ch => {
                buf.push(ch);
                pos += 1;
            }
        }
    }
    Some(buf)
}

/// Parses one `=?charset?B/Q?text?=` token starting at `pos` (which
/// must point at `=?`).
fn parse_word(value: &[u8], pos: usize, parser: &MessageParser) -> Word {
    let loose = parser.rfc2047_compliance == Compliance::Loose;
    let word = &value[pos..];

    let Some(charset_end) = word[2..].iter().position(|&ch| ch == b'?') else {
        return Word::None;
    };
    let charset = &word[2..2 + charset_end];
    if charset.is_empty() || charset.iter().any(|ch| ch.is_ascii_whitespace()) {
        return Word::None;
    }
    // RFC 2231 language suffix on the charset.
    let charset = charset
        .split(|&ch| ch == b'*')
        .next()
        .unwrap_or(charset);

    let encoding_pos = 2 + charset_end + 1;
    let (Some(&encoding), Some(&b'?')) = (word.get(encoding_pos), word.get(encoding_pos + 1))
    else {
        return Word::None;
    };
    let text_start = encoding_pos + 2;

    let Some(text_len) = word[text_start..]
        .windows(2)
        .position(|window| window == b"?=")
    else {
        return Word::None;
    };
    let text = &word[text_start..text_start + text_len];
    let consumed = text_start + text_len + 2;

    let decoded = match encoding {
        b'q' | b'Q' => decode_q(text, loose),
        b'b' | b'B' => {
            if loose {
                Some(base64_decode(text))
            } else {
                base64_decode_strict(text)
            }
        }
        _ => return Word::None,
    };

    match decoded {
        Some(bytes) => {
            let charset = String::from_utf8_lossy(charset);
            Word::Decoded(
                decode_with_fallback(&bytes, Some(charset.as_ref()), &parser.fallback_charsets),
                consumed,
            )
        }
        None => Word::Invalid(consumed),
    }
}

/// Decodes an unstructured header value: RFC 2047 encoded words are
/// decoded, whitespace between adjacent encoded words is elided, folds
/// are removed, and any raw 8-bit text is decoded through the fallback
/// charset chain.
pub fn decode_unstructured(value: &[u8], parser: &MessageParser) -> String {
    decode_unstructured_at(value, parser, 0)
}

pub fn decode_unstructured_at(value: &[u8], parser: &MessageParser, offset: usize) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending: Vec<u8> = Vec::new();
    let mut last_was_word = false;
    let mut pos = 0;

    while pos < value.len() {
        if value[pos] == b'=' && value.get(pos + 1) == Some(&b'?') {
            match parse_word(value, pos, parser) {
                Word::Decoded(decoded, consumed) => {
                    let separator_is_ws = pending.iter().all(|ch| ch.is_ascii_whitespace());
                    if !(last_was_word && separator_is_ws) {
                        flush_text(&mut out, &pending, parser);
                    }
                    pending.clear();
                    out.push_str(&decoded);
                    last_was_word = true;
                    pos += consumed;
                    continue;
                }
                Word::Invalid(consumed) => {
                    flush_text(&mut out, &pending, parser);
                    pending.clear();
                    if parser.rfc2047_compliance == Compliance::Strict {
                        parser.warn(
                            offset + pos,
                            Warning::InvalidRfc2047Value,
                            Some(&value[pos..pos + consumed]),
                        );
                    } else {
                        flush_text(&mut out, &value[pos..pos + consumed], parser);
                    }
                    last_was_word = false;
                    pos += consumed;
                    continue;
                }
                Word::None => (),
            }
        }
        pending.push(value[pos]);
        pos += 1;
    }
    flush_text(&mut out, &pending, parser);
    out
}

/// Appends raw header text, dropping fold line breaks and funneling
/// 8-bit bytes through the fallback charset chain.
fn flush_text(out: &mut String, text: &[u8], parser: &MessageParser) {
    if text.is_empty() {
        return;
    }
    let unfolded: Vec<u8> = text
        .iter()
        .copied()
        .filter(|&ch| ch != b'\r' && ch != b'\n')
        .collect();
    if unfolded.is_ascii() {
        out.push_str(&String::from_utf8_lossy(&unfolded));
    } else {
        out.push_str(&decode_with_fallback(
            &unfolded,
            None,
            &parser.fallback_charsets,
        ));
    }
}
