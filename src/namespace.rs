//! Schema-URI to condition-prefix mapping bundled alongside a macaroon, so a
//! first-party [`crate::checkers::Checker`] registered under a URI still
//! matches conditions minted with a different (but URI-equivalent) prefix.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{BakeryError, BakeryResult};

/// `uri -> prefix` mapping. Serialized form is `uri:prefix`, space-separated,
/// sorted by URI — matching the reference implementation's wire format so
/// namespace strings embedded in a bakery macaroon round-trip byte for byte.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Namespace {
    uri_to_prefix: BTreeMap<String, String>,
}

impl Namespace {
    pub fn new() -> Namespace {
        Namespace::default()
    }

    /// Registers `uri` under `prefix`. Open Question (a): when the same URI
    /// is registered twice with different prefixes, first write wins (the
    /// reference behavior) rather than last write wins.
    pub fn register(&mut self, uri: &str, prefix: &str) {
        self.uri_to_prefix
            .entry(uri.to_string())
            .or_insert_with(|| prefix.to_string());
    }

    pub fn prefix(&self, uri: &str) -> Option<&str> {
        self.uri_to_prefix.get(uri).map(String::as_str)
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.uri_to_prefix
            .iter()
            .find(|(_, p)| p.as_str() == prefix)
            .map(|(uri, _)| uri.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.uri_to_prefix.is_empty()
    }

    pub fn serialize(&self) -> String {
        self.uri_to_prefix
            .iter()
            .map(|(uri, prefix)| format!("{}:{}", uri, prefix))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn deserialize(s: &str) -> BakeryResult<Namespace> {
        let mut ns = Namespace::new();
        if s.is_empty() {
            return Ok(ns);
        }
        for entry in s.split(' ') {
            let (uri, prefix) = entry.split_once(':').ok_or_else(|| {
                BakeryError::Verification(format!("malformed namespace entry {:?}", entry))
            })?;
            ns.register(uri, prefix);
        }
        Ok(ns)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}
