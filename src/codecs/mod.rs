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

pub mod base64;
pub mod quoted_printable;
pub mod uuencode;
pub mod yencode;

use std::{borrow::Cow, fmt};

/// A Content-Transfer-Encoding value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Encoding {
    #[default]
    Default,
    SevenBit,
    EightBit,
    Binary,
    Base64,
    QuotedPrintable,
    UuEncode,
}

impl Encoding {
    pub fn parse(value: &[u8]) -> Encoding {
        let value = value.trim_ascii();
        if value.eq_ignore_ascii_case(b"7bit") {
            Encoding::SevenBit
        } else if value.eq_ignore_ascii_case(b"8bit") {
            Encoding::EightBit
        } else if value.eq_ignore_ascii_case(b"binary") {
            Encoding::Binary
        } else if value.eq_ignore_ascii_case(b"base64") {
            Encoding::Base64
        } else if value.eq_ignore_ascii_case(b"quoted-printable") {
            Encoding::QuotedPrintable
        } else if value.eq_ignore_ascii_case(b"x-uuencode")
            || value.eq_ignore_ascii_case(b"uuencode")
            || value.eq_ignore_ascii_case(b"x-uue")
        {
            Encoding::UuEncode
        } else {
            Encoding::Default
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Default => "default",
            Encoding::SevenBit => "7bit",
            Encoding::EightBit => "8bit",
            Encoding::Binary => "binary",
            Encoding::Base64 => "base64",
            Encoding::QuotedPrintable => "quoted-printable",
            Encoding::UuEncode => "x-uuencode",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decodes a transfer-encoded body in one shot. Identity encodings
/// borrow the input.
pub fn decode_body<'x>(bytes: &'x [u8], encoding: Encoding) -> Cow<'x, [u8]> {
    match encoding {
        Encoding::Base64 => base64::base64_decode(bytes).into(),
        Encoding::QuotedPrintable => quoted_printable::quoted_printable_decode(bytes).into(),
        Encoding::UuEncode => {
            let mut decoder = uuencode::UuDecoder::new(false);
            let mut buf = Vec::with_capacity(bytes.len() / 4 * 3);
            decoder.decode_close(bytes, &mut buf);
            buf.into()
        }
        _ => bytes.into(),
    }
}
