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

use crate::{
    parsers::encoded_word::decode_unstructured, Address, Compliance, Group, Mailbox,
    MessageParser, Warning,
};

struct AddressParser<'p, 'x> {
    data: &'x [u8],
    pos: usize,
    parser: &'p MessageParser,
    offset: usize,
    phrase: Vec<String>,
    comment: Option<String>,
    group: Option<Group<'x>>,
    result: Vec<Address<'x>>,
    invalid: bool,
}

/// Parses an RFC 5322 address list: mailboxes, angle-addr routes,
/// groups, comments, quoted strings and encoded words in display names.
/// In loose mode unquoted commas in display names are tolerated; the
/// `allow_addresses_without_domain` option admits bare local parts.
pub fn parse_address_list<'x>(
    value: &'x [u8],
    parser: &MessageParser,
    offset: usize,
) -> Vec<Address<'x>> {
    AddressParser {
        data: value,
        pos: 0,
        parser,
        offset,
        phrase: Vec::new(),
        comment: None,
        group: None,
        result: Vec::new(),
        invalid: false,
    }
    .run()
}

impl<'p, 'x> AddressParser<'p, 'x> {
    fn run(mut self) -> Vec<Address<'x>> {
        while let Some(&ch) = self.data.get(self.pos) {
            match ch {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'"' => {
                    let text = self.quoted_string();
                    self.phrase.push(text);
                }
                b'(' => {
                    let text = self.comment_text();
                    if !text.is_empty() {
                        self.comment = Some(text);
                    }
                }
                b'<' => {
                    self.pos += 1;
                    self.angle_addr();
                }
                b':' => {
                    self.pos += 1;
                    if self.group.is_none() {
                        self.group = Some(Group {
                            name: self.take_display_name().unwrap_or_default().into(),
                            addresses: Vec::new(),
                        });
                    }
                }
                b';' => {
                    self.pos += 1;
                    self.flush_phrase();
                    if let Some(group) = self.group.take() {
                        self.result.push(Address::Group(group));
                    }
                }
                b',' => {
                    self.pos += 1;
                    if !self.phrase.is_empty() {
                        let has_addr = self.phrase.iter().any(|token| token.contains('@'));
                        if !has_addr
                            && !self.parser.allow_addresses_without_domain
                            && self.parser.address_compliance == Compliance::Loose
                        {
                            // Unquoted comma inside a display name.
                            self.phrase.push(",".to_string());
                            continue;
                        }
                    }
                    self.flush_phrase();
                }
                b'>' | b')' => {
                    // Stray closers are noise.
                    self.pos += 1;
                    self.invalid = true;
                }
                _ => {
                    let token = self.atom();
                    self.phrase.push(token);
                }
            }
        }
        self.flush_phrase();
        if let Some(group) = self.group.take() {
            self.result.push(Address::Group(group));
        }
        if self.invalid {
            self.parser
                .warn(self.offset, Warning::InvalidAddressList, Some(self.data));
        }
        self.result
    }

    fn atom(&mut self) -> String {
        let start = self.pos;
        while let Some(&ch) = self.data.get(self.pos) {
            if matches!(
                ch,
                b' ' | b'\t' | b'\r' | b'\n' | b'(' | b')' | b'<' | b'>' | b'"' | b',' | b':'
                    | b';'
            ) {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.data[start..self.pos]).into_owned()
    }

    fn quoted_string(&mut self) -> String {
        self.pos += 1;
        let mut text = Vec::new();
        while let Some(&ch) = self.data.get(self.pos) {
            self.pos += 1;
            match ch {
                b'"' => break,
                b'\\' => {
                    if let Some(&escaped) = self.data.get(self.pos) {
                        text.push(escaped);
                        self.pos += 1;
                    }
                }
                _ => text.push(ch),
            }
        }
        String::from_utf8_lossy(&text).into_owned()
    }

    fn comment_text(&mut self) -> String {
        let mut depth = 0usize;
        let mut text = Vec::new();
        while let Some(&ch) = self.data.get(self.pos) {
            self.pos += 1;
            match ch {
                b'(' => {
                    depth += 1;
                    if depth > 1 {
                        text.push(ch);
                    }
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    text.push(ch);
                }
                b'\\' => {
                    if let Some(&escaped) = self.data.get(self.pos) {
                        text.push(escaped);
                        self.pos += 1;
                    }
                }
                _ => text.push(ch),
            }
        }
        decode_unstructured(&text, self.parser).trim().to_string()
    }

    fn take_display_name(&mut self) -> Option<String> {
        if self.phrase.is_empty() {
            return self.comment.take();
        }
        let joined = self.phrase.join(" ").replace(" ,", ",");
        self.phrase.clear();
        let decoded = decode_unstructured(joined.as_bytes(), self.parser);
        let trimmed = decoded.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn push_mailbox(&mut self, mailbox: Mailbox<'x>) {
        self.comment = None;
        match &mut self.group {
            Some(group) => group.addresses.push(Address::Mailbox(mailbox)),
            None => self.result.push(Address::Mailbox(mailbox)),
        }
    }

    fn angle_addr(&mut self) {
        let mut route = Vec::new();
        // A source route: `<@relay1,@relay2:user@example.com>`.
        loop {
            while matches!(self.data.get(self.pos), Some(&b' ') | Some(&b'\t')) {
                self.pos += 1;
            }
            if self.data.get(self.pos) != Some(&b'@') {
                break;
            }
            self.pos += 1;
            let start = self.pos;
            while let Some(&ch) = self.data.get(self.pos) {
                if matches!(ch, b',' | b':' | b'>') {
                    break;
                }
                self.pos += 1;
            }
            let domain = String::from_utf8_lossy(&self.data[start..self.pos]);
            let domain = domain.trim();
            if !domain.is_empty() {
                route.push(Cow::Owned(domain.to_string()));
            }
            match self.data.get(self.pos) {
                Some(&b',') => self.pos += 1,
                Some(&b':') => {
                    self.pos += 1;
                    break;
                }
                _ => break,
            }
        }

        let mut spec = Vec::new();
        while let Some(&ch) = self.data.get(self.pos) {
            self.pos += 1;
            match ch {
                b'>' => break,
                b'"' => {
                    self.pos -= 1;
                    spec.extend_from_slice(self.quoted_string().as_bytes());
                }
                b' ' | b'\t' | b'\r' | b'\n' => (),
                _ => spec.push(ch),
            }
        }

        let spec = String::from_utf8_lossy(&spec).into_owned();
        let (local_part, domain) = split_addr_spec(&spec);
        if domain.is_none() && !self.parser.allow_addresses_without_domain {
            self.invalid = true;
        }
        let name = self.take_display_name();
        self.push_mailbox(Mailbox {
            name: name.map(Cow::Owned),
            local_part: Cow::Owned(local_part),
            domain: domain.map(Cow::Owned),
            route,
        });
    }

    /// Emits any pending phrase as an addr-spec mailbox.
    fn flush_phrase(&mut self) {
        if self.phrase.is_empty() {
            return;
        }
        let addr_index = self
            .phrase
            .iter()
            .rposition(|token| token.contains('@'));

        match addr_index {
            Some(index) => {
                let spec = self.phrase.remove(index);
                let (local_part, domain) = split_addr_spec(&spec);
                let name = self.take_display_name();
                self.push_mailbox(Mailbox {
                    name: name.map(Cow::Owned),
                    local_part: Cow::Owned(local_part),
                    domain: domain.map(Cow::Owned),
                    route: Vec::new(),
                });
            }
            None if self.parser.allow_addresses_without_domain => {
                if let Some(local_part) = self.take_display_name() {
                    self.push_mailbox(Mailbox {
                        name: None,
                        local_part: Cow::Owned(local_part),
                        domain: None,
                        route: Vec::new(),
                    });
                }
            }
            None => {
                self.phrase.clear();
                self.invalid = true;
            }
        }
    }
}

fn split_addr_spec(spec: &str) -> (String, Option<String>) {
    match spec.rfind('@') {
        Some(at) if at + 1 < spec.len() => (
            spec[..at].trim().to_string(),
            Some(spec[at + 1..].trim().trim_end_matches('.').to_string()),
        ),
        Some(at) => (spec[..at].trim().to_string(), None),
        None => (spec.trim().to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Vec<Address<'_>> {
        parse_address_list(input.as_bytes(), &MessageParser::default(), 0)
    }

    fn mailbox<'x>(addresses: &'x [Address<'x>], index: usize) -> &'x Mailbox<'x> {
        match &addresses[index] {
            Address::Mailbox(mailbox) => mailbox,
            other => panic!("expected mailbox, got {other:?}"),
        }
    }

    #[test]
    fn parse_mailboxes() {
        let list = parse("john@example.com");
        assert_eq!(mailbox(&list, 0).address(), "john@example.com");
        assert_eq!(mailbox(&list, 0).name, None);

        let list = parse("John Doe <john@example.com>");
        assert_eq!(mailbox(&list, 0).name.as_deref(), Some("John Doe"));
        assert_eq!(mailbox(&list, 0).local_part, "john");
        assert_eq!(mailbox(&list, 0).domain.as_deref(), Some("example.com"));

        let list = parse("\"Doe, John\" <john@example.com>, jane@example.com");
        assert_eq!(list.len(), 2);
        assert_eq!(mailbox(&list, 0).name.as_deref(), Some("Doe, John"));
        assert_eq!(mailbox(&list, 1).address(), "jane@example.com");
    }

    #[test]
    fn comment_becomes_display_name() {
        let list = parse("john@example.com (John Doe)");
        assert_eq!(mailbox(&list, 0).name.as_deref(), Some("John Doe"));

        // An explicit display name wins over the comment.
        let list = parse("John <john@example.com> (ignored)");
        assert_eq!(mailbox(&list, 0).name.as_deref(), Some("John"));
    }

    #[test]
    fn encoded_words_in_display_names() {
        let list = parse("=?UTF-8?Q?John_Sm=C3=AEth?= <john@example.com>");
        assert_eq!(mailbox(&list, 0).name.as_deref(), Some("John Smîth"));
    }

    #[test]
    fn parse_groups() {
        let list = parse("Friends: jane@example.com, john@example.com;, solo@example.com");
        assert_eq!(list.len(), 2);
        match &list[0] {
            Address::Group(group) => {
                assert_eq!(group.name, "Friends");
                assert_eq!(group.addresses.len(), 2);
            }
            other => panic!("expected group, got {other:?}"),
        }
        assert_eq!(mailbox(&list, 1).address(), "solo@example.com");
    }

    #[test]
    fn empty_group() {
        let list = parse("Undisclosed recipients:;");
        match &list[0] {
            Address::Group(group) => {
                assert_eq!(group.name, "Undisclosed recipients");
                assert!(group.addresses.is_empty());
            }
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn source_route() {
        let list = parse("<@relay1.example,@relay2.example:user@example.com>");
        let mailbox = mailbox(&list, 0);
        assert_eq!(mailbox.address(), "user@example.com");
        assert_eq!(mailbox.route, ["relay1.example", "relay2.example"]);
    }

    #[test]
    fn loose_unquoted_comma_in_display_name() {
        let list = parse("Doe, John <john@example.com>");
        assert_eq!(list.len(), 1);
        assert_eq!(mailbox(&list, 0).name.as_deref(), Some("Doe, John"));
    }

    #[test]
    fn bare_local_parts() {
        // Rejected by default.
        let warnings = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let log = warnings.clone();
        let parser = MessageParser::new()
            .with_warning_fn(move |_, warning, _| log.borrow_mut().push(warning));
        let list = parse_address_list(b"postmaster", &parser, 0);
        assert!(list.is_empty());
        assert_eq!(&*warnings.borrow(), &[Warning::InvalidAddressList]);

        // Accepted when the option is set.
        let parser = MessageParser::new().allow_addresses_without_domain(true);
        let list = parse_address_list(b"postmaster", &parser, 0);
        assert_eq!(mailbox(&list, 0).address(), "postmaster");
    }

    #[test]
    fn embedded_addr_spec_with_phrase() {
        let list = parse("Jane Doe jane@example.com");
        assert_eq!(mailbox(&list, 0).name.as_deref(), Some("Jane Doe"));
        assert_eq!(mailbox(&list, 0).address(), "jane@example.com");
    }
}
