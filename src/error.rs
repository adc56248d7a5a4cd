//! Error taxonomy for the crate.
//!
//! Two families: [`MacaroonError`] covers the low-level cryptographic
//! macaroon (signature chain, wire formats); [`BakeryError`] covers the
//! bakery system built on top of it (oven, checker, discharge, HTTP).

use thiserror::Error;

/// Errors from the low-level macaroon primitive: creation, (de)serialization
/// and signature verification.
#[derive(Error, Debug)]
pub enum MacaroonError {
    #[error("bad macaroon: {0}")]
    BadMacaroon(&'static str),

    #[error("unknown macaroon serialization")]
    UnknownSerialization,

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("key error: {0}")]
    KeyError(&'static str),

    #[error("crypto error: {0}")]
    CryptoError(&'static str),

    #[error("invalid utf8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
}

impl From<serde_json::Error> for MacaroonError {
    fn from(error: serde_json::Error) -> MacaroonError {
        MacaroonError::DeserializationError(error.to_string())
    }
}

impl From<std::string::FromUtf8Error> for MacaroonError {
    fn from(error: std::string::FromUtf8Error) -> MacaroonError {
        MacaroonError::DeserializationError(error.to_string())
    }
}

impl From<base64::DecodeError> for MacaroonError {
    fn from(error: base64::DecodeError) -> MacaroonError {
        MacaroonError::DeserializationError(error.to_string())
    }
}

impl From<std::num::ParseIntError> for MacaroonError {
    fn from(error: std::num::ParseIntError) -> MacaroonError {
        MacaroonError::DeserializationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MacaroonError>;

/// Errors from the bakery system: minting, checking, discharging.
///
/// `Verification` deliberately carries only a reason string: within
/// `AuthChecker`, per-stack failures are swallowed and aggregated rather
/// than propagated individually.
#[derive(Error, Debug)]
pub enum BakeryError {
    #[error("verification failed: {0}")]
    Verification(String),

    #[error("caveat not recognized: {0}")]
    CaveatNotRecognized(String),

    #[error("third party caveat check failed: {0}")]
    ThirdPartyCaveatCheckFailed(String),

    #[error("discharge required")]
    DischargeRequired(Box<crate::authchecker::DischargeRequiredError>),

    #[error("interaction required")]
    InteractionRequired(Box<crate::httpbakery::error::InteractionRequiredError>),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("identity error: {0}")]
    IdentityError(String),

    #[error("auth init error: {0}")]
    AuthInitError(String),

    #[error("third party info not found for location {0}")]
    ThirdPartyInfoNotFound(String),

    #[error(transparent)]
    Macaroon(#[from] MacaroonError),
}

pub type BakeryResult<T> = std::result::Result<T, BakeryError>;

/// Raised by the client-side discharge orchestrator; wraps whatever
/// underlying cause stopped discharge acquisition so callers need not
/// switch on internal error kinds.
#[derive(Error, Debug)]
#[error("unable to discharge macaroon: {0}")]
pub struct DischargeError(#[from] pub Box<BakeryError>);
