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

use std::sync::OnceLock;

use encoding_rs::Encoding;

/// Charsets the inference engine can pick, highest priority first:
/// single-byte charsets, then the multi-byte East Asian charsets.
/// UTF-8 is not listed; it is the fallback when no bit survives.
pub const CHARSET_ORDER: &[&str] = &[
    "iso-8859-1",
    "iso-8859-2",
    "iso-8859-4",
    "iso-8859-5",
    "iso-8859-7",
    "iso-8859-8",
    "iso-8859-9",
    "iso-8859-13",
    "iso-8859-15",
    "koi8-r",
    "koi8-u",
    "windows-1250",
    "windows-1251",
    "windows-1252",
    "windows-1253",
    "windows-1254",
    "windows-1255",
    "windows-1256",
    "windows-1257",
    "iso-2022-jp",
    "shift_jis",
    "euc-jp",
    "euc-kr",
    "gb2312",
    "big5",
];

/// Entries of [`CHARSET_ORDER`] judged per raw byte; the rest are
/// multi-byte and judged per code point.
const SINGLE_BYTE_CHARSETS: usize = 19;

/// Bits of the single-byte charsets.
pub const SINGLE_BYTE_MASK: u32 = (1 << SINGLE_BYTE_CHARSETS) - 1;

/// Every charset bit set.
pub const FULL_MASK: u32 = (1 << CHARSET_ORDER.len()) - 1;

/// One bit per single-byte entry of [`CHARSET_ORDER`], set when the
/// byte decodes to a real character in that charset. The table is
/// probed once at first use through the active decoders rather than
/// shipped pre-computed.
fn byte_masks() -> &'static [u32; 256] {
    static MASKS: OnceLock<[u32; 256]> = OnceLock::new();
    MASKS.get_or_init(|| {
        let mut masks = [0u32; 256];
        for (index, name) in CHARSET_ORDER[..SINGLE_BYTE_CHARSETS].iter().enumerate() {
            let Some(encoding) = Encoding::for_label(name.as_bytes()) else {
                continue;
            };
            for (byte, mask) in masks.iter_mut().enumerate() {
                let (_, had_errors) = encoding.decode_without_bom_handling(&[byte as u8]);
                if !had_errors {
                    *mask |= 1 << index;
                }
            }
        }
        masks
    })
}

/// Mask of single-byte charsets in which the raw byte is defined.
/// Multi-byte bits are never set here.
#[inline]
pub fn byte_mask(ch: u8) -> u32 {
    byte_masks()[ch as usize]
}

/// Mask of every charset, single-byte and multi-byte, able to encode
/// the code point, probed through the encoders.
pub fn codepoint_mask(cp: u32) -> u32 {
    if cp < 0x80 {
        return FULL_MASK;
    }
    let Some(ch) = char::from_u32(cp) else {
        return 0;
    };
    let mut buf = [0u8; 4];
    let text = ch.encode_utf8(&mut buf);

    let mut mask = 0;
    for (index, name) in CHARSET_ORDER.iter().enumerate() {
        let Some(encoding) = Encoding::for_label(name.as_bytes()) else {
            continue;
        };
        let (_, _, had_errors) = encoding.encode(text);
        if !had_errors {
            mask |= 1 << index;
        }
    }
    mask
}

/// Which charsets could encode `bytes`: judged per code point when the
/// sample is valid UTF-8, per raw byte (single-byte charsets only)
/// otherwise.
pub fn charset_mask(bytes: &[u8]) -> u32 {
    if super::utf8::is_valid(bytes) {
        let mut mask = FULL_MASK;
        let mut pos = 0;
        while let Some((cp, next)) = super::utf8::next_char(bytes, pos) {
            if cp >= 0x80 {
                mask &= codepoint_mask(cp);
            }
            pos = next;
        }
        mask
    } else {
        let mut mask = SINGLE_BYTE_MASK;
        for &ch in bytes {
            if ch >= 0x80 {
                mask &= byte_mask(ch);
            }
        }
        mask
    }
}

/// The highest-priority charset whose bit survives in `mask`.
pub fn best_charset(mask: u32) -> Option<&'static str> {
    CHARSET_ORDER
        .iter()
        .enumerate()
        .find(|(index, _)| mask & (1 << index) != 0)
        .map(|(_, name)| *name)
}

/// Picks the best charset able to represent `bytes`: US-ASCII for pure
/// ASCII, otherwise the highest-priority charset covering the sample,
/// defaulting to UTF-8 when the sample validates and iso-8859-1 as the
/// last resort.
pub fn infer_charset(bytes: &[u8]) -> &'static str {
    if bytes.is_ascii() {
        return "us-ascii";
    }
    match best_charset(charset_mask(bytes)) {
        Some(charset) => charset,
        None if super::utf8::is_valid(bytes) => "utf-8",
        None => "iso-8859-1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_valid_everywhere() {
        for ch in 0u8..0x80 {
            let mask = byte_mask(ch);
            for index in 0..SINGLE_BYTE_CHARSETS {
                assert_ne!(
                    mask & (1 << index),
                    0,
                    "byte {ch:#x} in {}",
                    CHARSET_ORDER[index]
                );
            }
            assert_eq!(codepoint_mask(ch as u32), FULL_MASK);
        }
    }

    #[test]
    fn infer_charsets() {
        assert_eq!(infer_charset(b"plain ascii"), "us-ascii");
        // Latin-1 accented text that is not valid UTF-8.
        assert_eq!(infer_charset(b"caf\xe9"), "iso-8859-1");
        // Cyrillic fits in a single-byte charset before any multi-byte.
        assert_eq!(infer_charset("жизнь".as_bytes()), "iso-8859-5");
        // CJK text needs a multi-byte charset.
        assert_eq!(infer_charset("日本語".as_bytes()), "iso-2022-jp");
        assert_eq!(infer_charset("안녕하세요".as_bytes()), "euc-kr");
        // Nothing in the table covers emoji.
        assert_eq!(infer_charset("crab \u{1f980}".as_bytes()), "utf-8");
    }

    #[test]
    fn codepoint_masks() {
        // é is in most Latin charsets but in no Cyrillic one.
        let mask = codepoint_mask(0xe9);
        assert_ne!(mask & 1, 0, "iso-8859-1 can hold e-acute");
        // CJK ideographs only set multi-byte bits.
        let mask = codepoint_mask('\u{65e5}' as u32);
        assert_eq!(mask & SINGLE_BYTE_MASK, 0);
        assert_ne!(mask & !SINGLE_BYTE_MASK, 0);
        // Unpaired surrogates have no charset.
        assert_eq!(codepoint_mask(0xd800), 0);
    }

    #[test]
    fn mask_intersection() {
        let mask = charset_mask(b"caf\xe9 au lait");
        assert_eq!(best_charset(mask), Some("iso-8859-1"));
        assert_eq!(best_charset(0), None);

        // Valid UTF-8 is judged per code point.
        let mask = charset_mask("caf\u{e9} au lait".as_bytes());
        assert_eq!(best_charset(mask), Some("iso-8859-1"));
    }
}
