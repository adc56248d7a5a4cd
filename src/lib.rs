//! Minting, delegating, and verifying macaroons: bearer credentials that support
//! caveats (restrictions) attached either locally (first-party) or delegated to
//! a third party for discharge.
//!
//! The crate is split into two layers. [`caveat`], [`macaroon`], [`verifier`] and
//! [`serialization`] implement the low-level macaroon primitive: the signature
//! chain, wire formats, and basic verification. Everything else implements the
//! bakery system built on top of it: minting with third-party caveats baked in
//! ([`oven`]), checking and discharging them ([`checkers`], [`discharge`],
//! [`authchecker`]), and the HTTP protocol used to request discharges from a
//! remote service ([`httpbakery`]).

pub mod caveat;
pub mod crypto;
pub mod error;
pub mod macaroon;
pub mod serialization;
pub mod verifier;

pub mod agent;
pub mod authchecker;
pub mod authorizer;
pub mod bakery;
pub mod checkers;
pub mod codec;
pub mod discharge;
pub mod httpbakery;
pub mod identity;
pub mod interactor;
pub mod namespace;
pub mod ops;
pub mod oven;
pub mod store;
pub mod wrapper;

pub use caveat::Caveat;
pub use crypto::key::MacaroonKey;
pub use error::{MacaroonError, Result};
pub use macaroon::Macaroon;
pub use serialization::Format;
pub use verifier::Verifier;

use std::fmt;

/// Base64 "URL safe, no padding" engine, used throughout the crate's wire
/// formats (macaroon caveat ids, discharge tokens, HTTP cookie values).
pub const NO_PAD_URL_SAFE_ENGINE: base64::engine::GeneralPurpose = base64::engine::GeneralPurpose::new(
    &base64::alphabet::URL_SAFE,
    base64::engine::general_purpose::NO_PAD,
);

/// Base64 "standard, padded" engine, used where a format calls for the
/// classic alphabet (eg some third-party caveat id encodings).
pub const STANDARD_ENGINE: base64::engine::GeneralPurpose = base64::engine::GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    base64::engine::general_purpose::PAD,
);

/// An opaque byte string: a macaroon identifier, caveat predicate, or caveat
/// id. These are not guaranteed to be valid UTF-8 on the wire (third-party
/// caveat ids in particular are usually encrypted binary), but in practice
/// almost always are, so comparisons against `&str` are provided for
/// convenience.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteString(pub Vec<u8>);

impl ByteString {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for ByteString {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::ops::Deref for ByteString {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ByteString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "{:?}", s),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

impl From<&str> for ByteString {
    fn from(s: &str) -> Self {
        ByteString(s.as_bytes().to_vec())
    }
}

impl From<String> for ByteString {
    fn from(s: String) -> Self {
        ByteString(s.into_bytes())
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(v: Vec<u8>) -> Self {
        ByteString(v)
    }
}

impl From<&[u8]> for ByteString {
    fn from(v: &[u8]) -> Self {
        ByteString(v.to_vec())
    }
}

impl PartialEq<str> for ByteString {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for ByteString {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<ByteString> for str {
    fn eq(&self, other: &ByteString) -> bool {
        self.as_bytes() == other.0
    }
}
