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

use std::cmp::Ordering;

use crate::{codecs::base64::base64_decode_strict, DateTime};

/// Folded emission keeps lines at or under this column.
const MAX_LINE: usize = 72;

static BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PreferEncrypt {
    #[default]
    None,
    Mutual,
}

/// A parsed `Autocrypt:` or `Autocrypt-Gossip:` header (autocrypt.org
/// level 1): the sender address, the optional `prefer-encrypt=mutual`
/// flag and the decoded key material.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AutocryptHeader {
    pub address: String,
    pub prefer_encrypt: PreferEncrypt,
    pub keydata: Vec<u8>,
    /// Date of the message the header was seen on, used for ordering.
    pub effective_date: Option<DateTime>,
}

impl AutocryptHeader {
    /// Parses a header value as a `;`-separated attribute list.
    ///
    /// `addr` and `keydata` are required; an unknown attribute whose
    /// name does not start with `_`, a duplicated attribute, or
    /// undecodable keydata invalidate the whole header.
    pub fn parse(value: &[u8]) -> Option<AutocryptHeader> {
        let mut address = None;
        let mut prefer_encrypt = PreferEncrypt::None;
        let mut keydata = None;

        for attribute in value.split(|&ch| ch == b';') {
            let attribute = attribute.trim_ascii();
            if attribute.is_empty() {
                continue;
            }
            let equals = attribute.iter().position(|&ch| ch == b'=')?;
            let name = std::str::from_utf8(&attribute[..equals])
                .ok()?
                .trim()
                .to_ascii_lowercase();
            let attr_value = &attribute[equals + 1..];

            match name.as_str() {
                "addr" => {
                    if address.is_some() {
                        return None;
                    }
                    let addr = std::str::from_utf8(attr_value).ok()?.trim();
                    if addr.is_empty() {
                        return None;
                    }
                    address = Some(addr.to_string());
                }
                "prefer-encrypt" => {
                    if attr_value.trim_ascii().eq_ignore_ascii_case(b"mutual") {
                        prefer_encrypt = PreferEncrypt::Mutual;
                    }
                }
                "keydata" => {
                    if keydata.is_some() {
                        return None;
                    }
                    let stripped: Vec<u8> = attr_value
                        .iter()
                        .copied()
                        .filter(|ch| !ch.is_ascii_whitespace())
                        .collect();
                    keydata = Some(base64_decode_strict(&stripped)?);
                }
                _ if name.starts_with('_') => (),
                _ => return None,
            }
        }

        Some(AutocryptHeader {
            address: address?,
            prefer_encrypt,
            keydata: keydata?,
            effective_date: None,
        })
    }

    pub fn is_complete(&self) -> bool {
        !self.address.is_empty() && !self.keydata.is_empty()
    }

    /// Emits the folded header value. With `gossip` the
    /// `prefer-encrypt` attribute is suppressed, as Autocrypt level 1
    /// requires for `Autocrypt-Gossip:` headers.
    pub fn to_value(&self, gossip: bool) -> String {
        let mut out = String::new();
        out.push_str("addr=");
        out.push_str(&self.address);
        out.push(';');
        if !gossip && self.prefer_encrypt == PreferEncrypt::Mutual {
            out.push_str(" prefer-encrypt=mutual;");
        }
        out.push_str(" keydata=");

        let mut col = out
            .rfind('\n')
            .map(|lf| out.len() - lf - 1)
            .unwrap_or(out.len());
        for ch in base64_no_breaks(&self.keydata) {
            if col >= MAX_LINE {
                out.push_str("\r\n ");
                col = 1;
            }
            out.push(ch as char);
            col += 1;
        }
        out
    }

    /// Canonical address form used for comparisons: the local part is
    /// Unicode-lowercased and the domain is IDN-normalized to its
    /// ASCII (punycode) form, so Unicode and punycoded spellings of the
    /// same address compare equal.
    fn address_key(&self) -> String {
        match self.address.rsplit_once('@') {
            Some((local, domain)) => {
                let domain = idna::domain_to_ascii(domain)
                    .unwrap_or_else(|_| domain.to_lowercase());
                format!("{}@{}", local.to_lowercase(), domain)
            }
            None => self.address.to_lowercase(),
        }
    }
}

impl PartialOrd for AutocryptHeader {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AutocryptHeader {
    /// Orders by address, then effective date, then keydata
    /// (lexicographic, shorter first), then prefer-encrypt.
    fn cmp(&self, other: &Self) -> Ordering {
        self.address_key()
            .cmp(&other.address_key())
            .then_with(|| {
                let this = self.effective_date.map(|date| date.to_timestamp());
                let that = other.effective_date.map(|date| date.to_timestamp());
                this.cmp(&that)
            })
            .then_with(|| self.keydata.cmp(&other.keydata))
            .then_with(|| self.prefer_encrypt.cmp(&other.prefer_encrypt))
    }
}

impl PartialOrd for PreferEncrypt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PreferEncrypt {
    fn cmp(&self, other: &Self) -> Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

fn base64_no_breaks(bytes: &[u8]) -> impl Iterator<Item = u8> + '_ {
    bytes.chunks(3).flat_map(|triple| {
        let b0 = triple[0] as u32;
        let b1 = triple.get(1).copied().unwrap_or(0) as u32;
        let b2 = triple.get(2).copied().unwrap_or(0) as u32;
        let group = (b0 << 16) | (b1 << 8) | b2;
        let mut quad = [
            BASE64_ALPHABET[(group >> 18) as usize & 0x3f],
            BASE64_ALPHABET[(group >> 12) as usize & 0x3f],
            BASE64_ALPHABET[(group >> 6) as usize & 0x3f],
            BASE64_ALPHABET[group as usize & 0x3f],
        ];
        if triple.len() < 3 {
            quad[3] = b'=';
        }
        if triple.len() < 2 {
            quad[2] = b'=';
        }
        quad.into_iter()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_autocrypt_header() {
        let header = AutocryptHeader::parse(
            b"addr=a@b.example; prefer-encrypt=mutual; keydata=QUJDRA==",
        )
        .unwrap();
        assert_eq!(header.address, "a@b.example");
        assert_eq!(header.prefer_encrypt, PreferEncrypt::Mutual);
        assert_eq!(header.keydata, [0x41, 0x42, 0x43, 0x44]);
        assert!(header.is_complete());
    }

    #[test]
    fn keydata_whitespace_is_stripped() {
        let header = AutocryptHeader::parse(b"addr=a@b.example; keydata=QUJ\r\n\t DRA==").unwrap();
        assert_eq!(header.keydata, [0x41, 0x42, 0x43, 0x44]);
        assert_eq!(header.prefer_encrypt, PreferEncrypt::None);
    }

    #[test]
    fn invalid_headers_rejected() {
        for input in [
            &b"keydata=QUJDRA=="[..],                            // missing addr
            b"addr=a@b.example",                                 // missing keydata
            b"addr=a@b.example; keydata=QUJDRA==; vanity=x",     // unknown attr
            b"addr=a@b.example; addr=c@d.example; keydata=QUJDRA==", // duplicate
            b"addr=a@b.example; keydata=!!notbase64!!",
        ] {
            assert_eq!(AutocryptHeader::parse(input), None, "accepted {input:?}");
        }

        // Underscore-prefixed attributes are explicitly allowed.
        assert!(AutocryptHeader::parse(b"addr=a@b.example; _pad=x; keydata=QUJDRA==").is_some());
    }

    #[test]
    fn emit_and_reparse() {
        let header = AutocryptHeader {
            address: "alice@example.org".to_string(),
            prefer_encrypt: PreferEncrypt::Mutual,
            keydata: (0..200u32).map(|i| (i % 256) as u8).collect(),
            effective_date: None,
        };
        let value = header.to_value(false);
        assert!(value.starts_with("addr=alice@example.org; prefer-encrypt=mutual; keydata="));
        for line in value.split("\r\n") {
            assert!(line.len() <= MAX_LINE + 1, "line too long: {line:?}");
        }

        let reparsed = AutocryptHeader::parse(value.as_bytes()).unwrap();
        assert_eq!(reparsed.address, header.address);
        assert_eq!(reparsed.prefer_encrypt, header.prefer_encrypt);
        assert_eq!(reparsed.keydata, header.keydata);

        // Gossip emission drops prefer-encrypt.
        let gossip = header.to_value(true);
        assert!(!gossip.contains("prefer-encrypt"));
    }

    #[test]
    fn ordering() {
        let base = AutocryptHeader {
            address: "alice@example.org".to_string(),
            prefer_encrypt: PreferEncrypt::None,
            keydata: vec![1, 2, 3],
            effective_date: None,
        };
        let newer = AutocryptHeader {
            effective_date: Some(DateTime {
                year: 2024,
                month: 1,
                day: 1,
                ..DateTime::default()
            }),
            ..base.clone()
        };
        assert!(base < newer);

        let shorter = AutocryptHeader {
            keydata: vec![1, 2],
            ..base.clone()
        };
        assert!(shorter < base);

        let other_addr = AutocryptHeader {
            address: "bob@example.org".to_string(),
            ..base.clone()
        };
        assert!(base < other_addr);
    }

    #[test]
    fn idn_addresses_compare_equal() {
        let unicode = AutocryptHeader {
            address: "alice@b\u{fc}cher.example".to_string(),
            keydata: vec![1],
            ..AutocryptHeader::default()
        };
        let upper = AutocryptHeader {
            address: "Alice@B\u{dc}CHER.example".to_string(),
            ..unicode.clone()
        };
        let punycoded = AutocryptHeader {
            address: "alice@xn--bcher-kva.example".to_string(),
            ..unicode.clone()
        };
        assert_eq!(unicode.cmp(&upper), Ordering::Equal);
        assert_eq!(unicode.cmp(&punycoded), Ordering::Equal);
    }
}
