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

use std::cell::RefCell;

use crate::cache::Cache;

/// An RFC violation tolerated while parsing. Critical warnings mean the
/// parser had to skip bytes or give up on a part; everything else was
/// repaired in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Warning {
    DuplicatedHeader,
    DuplicatedParameter,
    Unencoded8BitHeader,
    InvalidContentType,
    InvalidRfc2047Value,
    InvalidParameter,
    MalformedMultipart,
    TruncatedMessage,
    MalformedMessage,
    InvalidAddressList,
    InvalidHeaderName,
    ConflictingHeader,
    ConflictingParameter,
    MultipartWithoutBoundary,
    PartWithoutContent,
    PartWithoutHeadersOrContent,
    NestingOverflow,
}

impl Warning {
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Warning::InvalidHeaderName
                | Warning::ConflictingHeader
                | Warning::ConflictingParameter
                | Warning::MultipartWithoutBoundary
                | Warning::NestingOverflow
        )
    }
}

/// How strictly a grammar is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compliance {
    Strict,
    #[default]
    Loose,
}

pub type WarningFn = Box<dyn Fn(usize, Warning, Option<&[u8]>)>;

/// Message parser configuration.
///
/// The default configuration is loose everywhere: real-world mail is
/// accepted and each repair is reported through the warning callback.
///
/// ```rust,ignore
/// let parser = MessageParser::new()
///     .with_warning_fn(|offset, warning, _| eprintln!("{offset}: {warning:?}"));
/// let message = parser.parse(raw).unwrap();
/// ```
pub struct MessageParser {
    pub(crate) address_compliance: Compliance,
    pub(crate) parameter_compliance: Compliance,
    pub(crate) rfc2047_compliance: Compliance,
    pub(crate) allow_addresses_without_domain: bool,
    pub(crate) fallback_charsets: Vec<String>,
    pub(crate) max_nesting: usize,
    pub(crate) warning_fn: Option<WarningFn>,
    pub(crate) boundary_cache: RefCell<Cache<Vec<u8>>>,
    pub(crate) name_cache: RefCell<Cache<String>>,
}

impl Default for MessageParser {
    fn default() -> Self {
        MessageParser::new()
    }
}

impl MessageParser {
    pub fn new() -> Self {
        MessageParser {
            address_compliance: Compliance::Loose,
            parameter_compliance: Compliance::Loose,
            rfc2047_compliance: Compliance::Loose,
            allow_addresses_without_domain: false,
            fallback_charsets: vec!["utf-8".to_string(), "iso-8859-1".to_string()],
            max_nesting: 128,
            warning_fn: None,
            boundary_cache: RefCell::new(Cache::new(64)),
            name_cache: RefCell::new(Cache::new(128)),
        }
    }

    pub fn with_address_compliance(mut self, compliance: Compliance) -> Self {
        self.address_compliance = compliance;
        self
    }

    pub fn with_parameter_compliance(mut self, compliance: Compliance) -> Self {
        self.parameter_compliance = compliance;
        self
    }

    pub fn with_rfc2047_compliance(mut self, compliance: Compliance) -> Self {
        self.rfc2047_compliance = compliance;
        self
    }

    pub fn allow_addresses_without_domain(mut self, allow: bool) -> Self {
        self.allow_addresses_without_domain = allow;
        self
    }

    /// Charsets tried in order when a header declares no charset or the
    /// declared one fails to decode.
    pub fn with_fallback_charsets(mut self, charsets: Vec<String>) -> Self {
        self.fallback_charsets = charsets;
        self
    }

    /// Maximum multipart/message nesting depth before content collapses
    /// into an opaque leaf.
    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting.max(1);
        self
    }

    /// Callback invoked, in byte order, for every RFC violation found.
    pub fn with_warning_fn(
        mut self,
        warning_fn: impl Fn(usize, Warning, Option<&[u8]>) + 'static,
    ) -> Self {
        self.warning_fn = Some(Box::new(warning_fn));
        self
    }

    #[inline]
    pub(crate) fn warn(&self, offset: usize, warning: Warning, item: Option<&[u8]>) {
        if let Some(warning_fn) = &self.warning_fn {
            warning_fn(offset, warning, item);
        }
    }

    /// Canonical (lowercased) form of a header name, memoized across
    /// parses.
    pub(crate) fn canonical_name(&self, raw: &str) -> String {
        if raw.bytes().all(|ch| !ch.is_ascii_uppercase()) {
            return raw.to_string();
        }
        let mut cache = self.name_cache.borrow_mut();
        if let Some(canonical) = cache.lookup(raw.as_bytes(), true) {
            return canonical.clone();
        }
        let canonical = raw.to_ascii_lowercase();
        cache.insert(raw.as_bytes(), canonical.clone());
        canonical
    }

    /// Boundary scanner bytes (`--` + boundary), memoized across parses.
    pub(crate) fn delimiter_for(&self, boundary: &[u8]) -> Vec<u8> {
        let mut cache = self.boundary_cache.borrow_mut();
        if let Some(delimiter) = cache.lookup(boundary, true) {
            return delimiter.clone();
        }
        let mut delimiter = Vec::with_capacity(boundary.len() + 2);
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(boundary);
        cache.insert(boundary, delimiter.clone());
        delimiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_criticality() {
        assert!(Warning::NestingOverflow.is_critical());
        assert!(Warning::MultipartWithoutBoundary.is_critical());
        assert!(!Warning::DuplicatedHeader.is_critical());
        assert!(!Warning::TruncatedMessage.is_critical());
    }

    #[test]
    fn caches_memoize() {
        let parser = MessageParser::new();
        assert_eq!(parser.canonical_name("Content-Type"), "content-type");
        assert_eq!(parser.canonical_name("Content-Type"), "content-type");
        assert_eq!(parser.canonical_name("subject"), "subject");
        assert_eq!(parser.delimiter_for(b"b"), b"--b");
        assert_eq!(parser.delimiter_for(b"b"), b"--b");
    }

    #[test]
    fn warnings_reach_callback() {
        let seen = std::rc::Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let parser = MessageParser::new()
            .with_warning_fn(move |offset, warning, _| log.borrow_mut().push((offset, warning)));
        parser.warn(7, Warning::TruncatedMessage, None);
        assert_eq!(&*seen.borrow(), &[(7, Warning::TruncatedMessage)]);
    }
}
