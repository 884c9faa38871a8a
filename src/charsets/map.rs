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

use encoding_rs::Encoding;

use super::utf8;

/// Folds a charset name to its canonical form: ASCII-lowercased, with
/// the aliases seen in real-world mail mapped to the registered name.
pub fn canonical(name: &str) -> Cow<'_, str> {
    let trimmed = name.trim().trim_matches('"');
    let lower = if trimmed
        .chars()
        .all(|ch| !ch.is_ascii_uppercase() && ch != ' ')
    {
        Cow::Borrowed(trimmed)
    } else {
        Cow::Owned(trimmed.to_ascii_lowercase().replace(' ', ""))
    };

    // iso8859-1, iso_8859-1 and friends.
    if let Some(rest) = lower
        .strip_prefix("iso8859")
        .or_else(|| lower.strip_prefix("iso_8859"))
    {
        let rest = rest.strip_prefix(['-', '_']).unwrap_or(rest);
        return format!("iso-8859-{rest}").into();
    }
    if let Some(rest) = lower.strip_prefix("iso-8859") {
        let rest = rest.strip_prefix(['-', '_']).unwrap_or(rest);
        // iso-8859-6-i and iso-8859-1:1987 style suffixes.
        let digits = rest
            .split([':', '-'])
            .next()
            .unwrap_or(rest);
        return format!("iso-8859-{digits}").into();
    }
    if let Some(rest) = lower.strip_prefix("cp").or_else(|| lower.strip_prefix("ibm")) {
        if rest.starts_with("125") {
            return format!("windows-{rest}").into();
        }
    }
    match lower.as_ref() {
        "latin1" | "latin-1" => "iso-8859-1".into(),
        "ascii" | "usascii" => "us-ascii".into(),
        "utf8" => "utf-8".into(),
        "ks_c_5601-1987" => "euc-kr".into(),
        _ => lower,
    }
}

/// Decodes `bytes` under `charset`, failing on an unknown charset or on
/// any byte sequence invalid in it so that callers can fall back.
pub fn decode(charset: &str, bytes: &[u8]) -> Option<String> {
    let charset = canonical(charset);
    match charset.as_ref() {
        "utf-8" => {
            if utf8::is_valid(bytes) {
                String::from_utf8(bytes.to_vec()).ok()
            } else {
                None
            }
        }
        "us-ascii" => {
            if bytes.is_ascii() {
                String::from_utf8(bytes.to_vec()).ok()
            } else {
                None
            }
        }
        _ => {
            let encoding = Encoding::for_label(charset.as_bytes())?;
            // BOM sniffing only makes sense for the UTF-16 family.
            let (text, had_errors) = if charset.starts_with("utf-16") {
                let (text, _, had_errors) = encoding.decode(bytes);
                (text, had_errors)
            } else {
                encoding.decode_without_bom_handling(bytes)
            };
            if !had_errors {
                Some(text.into_owned())
            } else {
                None
            }
        }
    }
}

/// Decodes `bytes` replacing every undecodable sequence with U+FFFD.
pub fn decode_lossy(charset: &str, bytes: &[u8]) -> String {
    let charset = canonical(charset);
    match Encoding::for_label(charset.as_bytes()) {
        Some(encoding) if charset.starts_with("utf-16") => {
            encoding.decode(bytes).0.into_owned()
        }
        Some(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Tries the declared charset first, then each fallback in order; the
/// final resort substitutes U+FFFD for undecodable bytes.
pub fn decode_with_fallback(bytes: &[u8], declared: Option<&str>, fallbacks: &[String]) -> String {
    if let Some(declared) = declared {
        if let Some(text) = decode(declared, bytes) {
            return text;
        }
    }
    for fallback in fallbacks {
        if let Some(text) = decode(fallback, bytes) {
            return text;
        }
    }
    match declared {
        Some(declared) => decode_lossy(declared, bytes),
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Encodes `text` into `charset`, failing on an unknown charset or any
/// unmappable character.
pub fn encode(charset: &str, text: &str) -> Option<Vec<u8>> {
    let charset = canonical(charset);
    match charset.as_ref() {
        "utf-8" => Some(text.as_bytes().to_vec()),
        "us-ascii" => {
            if text.is_ascii() {
                Some(text.as_bytes().to_vec())
            } else {
                None
            }
        }
        _ => {
            let encoding = Encoding::for_label(charset.as_bytes())?;
            let (bytes, _, had_errors) = encoding.encode(text);
            if !had_errors {
                Some(bytes.into_owned())
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_aliases() {
        for (input, expected) in [
            ("ISO-8859-1", "iso-8859-1"),
            ("iso8859-1", "iso-8859-1"),
            ("iso_8859-15", "iso-8859-15"),
            ("iso-8859-1:1987", "iso-8859-1"),
            ("latin1", "iso-8859-1"),
            ("CP1252", "windows-1252"),
            ("UTF8", "utf-8"),
            ("ascii", "us-ascii"),
            ("Shift_JIS", "shift_jis"),
            ("\"utf-8\"", "utf-8"),
        ] {
            assert_eq!(canonical(input), expected, "{input}");
        }
    }

    #[test]
    fn decode_charsets() {
        for (charset, input, expected) in [
            ("iso-8859-1", &b"\xe1\xe9\xed\xf3\xfa"[..], "áéíóú"),
            ("windows-1252", b"\xa1El \xf1and\xfa!", "¡El ñandú!"),
            ("koi8-r", b"\xf0\xd2\xc9\xd7\xc5\xd4", "Привет"),
            ("utf-8", "жизнь".as_bytes(), "жизнь"),
            ("shift_jis", b"\x83n\x83\x8d\x81[", "ハロー"),
            ("euc-kr", b"\xbe\xc8\xb3\xe7", "안녕"),
        ] {
            assert_eq!(
                decode(charset, input).as_deref(),
                Some(expected),
                "{charset}"
            );
        }
    }

    #[test]
    fn decode_fallback_chain() {
        let fallbacks = vec!["utf-8".to_string(), "iso-8859-1".to_string()];

        // Valid UTF-8 under an unknown declared charset.
        assert_eq!(
            decode_with_fallback("caf\u{e9}".as_bytes(), Some("x-unknown"), &fallbacks),
            "caf\u{e9}"
        );
        // 8-bit data that is not UTF-8 lands on iso-8859-1.
        assert_eq!(
            decode_with_fallback(b"caf\xe9", None, &fallbacks),
            "caf\u{e9}"
        );
        // Truly undecodable input degrades to U+FFFD.
        assert_eq!(
            decode_with_fallback(b"\xff\xfe", Some("utf-8"), &[]),
            "\u{fffd}\u{fffd}"
        );
    }

    #[test]
    fn encode_charsets() {
        assert_eq!(encode("iso-8859-1", "café").unwrap(), b"caf\xe9");
        assert_eq!(encode("us-ascii", "café"), None);
        assert_eq!(encode("utf-8", "café").unwrap(), "café".as_bytes());
    }
}
