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

use super::Filter;

/// Convert line breaks to `<br>`.
pub const HTML_CONVERT_NL: u32 = 1 << 0;
/// Convert spaces and tabs to `&nbsp;`.
pub const HTML_CONVERT_SPACES: u32 = 1 << 1;
/// Hyperlink URLs and mail addresses.
pub const HTML_CONVERT_URLS: u32 = 1 << 2;
/// Highlight citation lines starting with `>`.
pub const HTML_CITATION: u32 = 1 << 3;
/// Replace 8-bit bytes with `?`.
pub const HTML_ESCAPE_8BIT: u32 = 1 << 4;

const CITATION_COLOR: &str = "#737373";

/// Converts plain text to HTML, escaping markup characters and applying
/// the requested conversions line by line.
pub struct HtmlFilter {
    flags: u32,
    line: Vec<u8>,
    out: Vec<u8>,
}

impl HtmlFilter {
    pub fn new(flags: u32) -> Self {
        HtmlFilter {
            flags,
            line: Vec::new(),
            out: Vec::new(),
        }
    }

    fn escape_into(&self, ch: u8, out: &mut Vec<u8>) {
        match ch {
            b'&' => out.extend_from_slice(b"&amp;"),
            b'<' => out.extend_from_slice(b"&lt;"),
            b'>' => out.extend_from_slice(b"&gt;"),
            b'"' => out.extend_from_slice(b"&quot;"),
            b' ' if self.flags & HTML_CONVERT_SPACES != 0 => {
                out.extend_from_slice(b"&nbsp;")
            }
            b'\t' if self.flags & HTML_CONVERT_SPACES != 0 => {
                for _ in 0..8 {
                    out.extend_from_slice(b"&nbsp;");
                }
            }
            ch if ch >= 0x80 && self.flags & HTML_ESCAPE_8BIT != 0 => out.push(b'?'),
            ch => out.push(ch),
        }
    }

    fn escape_text(&self, text: &[u8], out: &mut Vec<u8>) {
        for &ch in text {
            self.escape_into(ch, out);
        }
    }

    fn is_url_start(word: &[u8]) -> Option<&'static str> {
        for prefix in ["http://", "https://", "ftp://", "mailto:"] {
            if word.starts_with(prefix.as_bytes()) {
                return Some("");
            }
        }
        if word.starts_with(b"www.") {
            return Some("http://");
        }
        None
    }

    fn is_address(word: &[u8]) -> bool {
        let Some(at) = word.iter().position(|&ch| ch == b'@') else {
            return false;
        };
        at > 0 && word[at + 1..].contains(&b'.')
    }

    fn emit_word(&self, word: &[u8], out: &mut Vec<u8>) {
        if self.flags & HTML_CONVERT_URLS != 0 {
            // Trailing punctuation stays outside the link.
            let trimmed_len = word
                .iter()
                .rposition(|ch| !matches!(ch, b'.' | b',' | b';' | b':' | b'!' | b'?' | b')'))
                .map(|pos| pos + 1)
                .unwrap_or(0);
            let (link, tail) = word.split_at(trimmed_len);

            if let Some(scheme) = Self::is_url_start(link) {
                out.extend_from_slice(b"<a href=\"");
                out.extend_from_slice(scheme.as_bytes());
                self.escape_text(link, out);
                out.extend_from_slice(b"\">");
                self.escape_text(link, out);
                out.extend_from_slice(b"</a>");
                self.escape_text(tail, out);
                return;
            }
            if Self::is_address(link) {
                out.extend_from_slice(b"<a href=\"mailto:");
                self.escape_text(link, out);
                out.extend_from_slice(b"\">");
                self.escape_text(link, out);
                out.extend_from_slice(b"</a>");
                self.escape_text(tail, out);
                return;
            }
        }
        self.escape_text(word, out);
    }

    fn process_line(&mut self, line: &[u8], had_newline: bool) {
        let mut body = line;
        let mut crlf: &[u8] = b"";
        if let [head @ .., b'\r'] = body {
            body = head;
            crlf = b"\r";
        }

        let cite = self.flags & HTML_CITATION != 0 && body.first() == Some(&b'>');
        let mut rendered = Vec::with_capacity(body.len() * 2);
        if cite {
            rendered.extend_from_slice(
                format!("<span style=\"color: {CITATION_COLOR}\">").as_bytes(),
            );
        }

        let mut word_start = 0;
        for (index, &ch) in body.iter().enumerate() {
            if ch == b' ' || ch == b'\t' {
                if word_start < index {
                    let word = body[word_start..index].to_vec();
                    self.emit_word(&word, &mut rendered);
                }
                self.escape_into(ch, &mut rendered);
                word_start = index + 1;
            }
        }
        if word_start < body.len() {
            let word = body[word_start..].to_vec();
            self.emit_word(&word, &mut rendered);
        }

        if cite {
            rendered.extend_from_slice(b"</span>");
        }
        self.out.extend_from_slice(&rendered);

        if had_newline {
            if self.flags & HTML_CONVERT_NL != 0 {
                self.out.extend_from_slice(b"<br>");
            }
            self.out.extend_from_slice(crlf);
            self.out.push(b'\n');
        } else {
            self.out.extend_from_slice(crlf);
        }
    }

    fn step(&mut self, input: &[u8], flush: bool) {
        self.out.clear();
        for &ch in input {
            if ch == b'\n' {
                let line = std::mem::take(&mut self.line);
                self.process_line(&line, true);
                self.line = line;
                self.line.clear();
            } else {
                self.line.push(ch);
            }
        }
        if flush && !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.process_line(&line, false);
        }
    }
}

impl Filter for HtmlFilter {
    fn filter(&mut self, input: &[u8]) -> &[u8] {
        self.step(input, false);
        &self.out
    }

    fn complete(&mut self, input: &[u8]) -> &[u8] {
        self.step(input, true);
        &self.out
    }

    fn reset(&mut self) {
        self.line.clear();
        self.out.clear();
    }

    fn copy(&self) -> Box<dyn Filter> {
        Box::new(HtmlFilter::new(self.flags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(flags: u32, input: &[u8]) -> String {
        let mut filter = HtmlFilter::new(flags);
        let mut out = filter.filter(input).to_vec();
        out.extend(filter.complete(b""));
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            convert(0, b"a < b && c > \"d\"\n"),
            "a &lt; b &amp;&amp; c &gt; &quot;d&quot;\n"
        );
    }

    #[test]
    fn converts_newlines_and_spaces() {
        assert_eq!(
            convert(HTML_CONVERT_NL | HTML_CONVERT_SPACES, b"a b\n"),
            "a&nbsp;b<br>\n"
        );
    }

    #[test]
    fn links_urls_and_addresses() {
        assert_eq!(
            convert(HTML_CONVERT_URLS, b"see https://example.com/x, now\n"),
            "see <a href=\"https://example.com/x\">https://example.com/x</a>, now\n"
        );
        assert_eq!(
            convert(HTML_CONVERT_URLS, b"mail user@example.com!\n"),
            "mail <a href=\"mailto:user@example.com\">user@example.com</a>!\n"
        );
        assert_eq!(
            convert(HTML_CONVERT_URLS, b"visit www.example.org\n"),
            "visit <a href=\"http://www.example.org\">www.example.org</a>\n"
        );
    }

    #[test]
    fn highlights_citations() {
        assert_eq!(
            convert(HTML_CITATION, b"> quoted text\nreply\n"),
            "<span style=\"color: #737373\">&gt; quoted text</span>\nreply\n"
        );
    }

    #[test]
    fn escapes_8bit() {
        assert_eq!(convert(HTML_ESCAPE_8BIT, b"caf\xe9\n"), "caf?\n");
    }
}
