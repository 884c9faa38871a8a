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

/// Parses a Message-ID style value: comments and whitespace are
/// skipped and the `<...>` angle brackets are stripped, leaving the
/// bare `id-left@id-right`. A value without brackets is returned
/// trimmed, so Content-Type `id=` parameters parse the same way.
pub fn parse_id(value: &[u8]) -> Option<Cow<'_, str>> {
    let mut pos = 0;

    while let Some(&ch) = value.get(pos) {
        match ch {
            b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
            b'(' => {
                let mut depth = 0usize;
                while let Some(&ch) = value.get(pos) {
                    pos += 1;
                    match ch {
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        b'\\' => pos += 1,
                        _ => (),
                    }
                }
            }
            b'<' => {
                pos += 1;
                let start = pos;
                while let Some(&ch) = value.get(pos) {
                    if ch == b'>' || ch == b'\r' || ch == b'\n' {
                        break;
                    }
                    pos += 1;
                }
                let id = &value[start..pos];
                return (!id.is_empty()).then(|| String::from_utf8_lossy(id));
            }
            _ => {
                let start = pos;
                while let Some(&ch) = value.get(pos) {
                    if ch.is_ascii_whitespace() || ch == b'(' || ch == b'>' {
                        break;
                    }
                    pos += 1;
                }
                let id = &value[start..pos];
                return (!id.is_empty()).then(|| String::from_utf8_lossy(id));
            }
        }
    }
    None
}
