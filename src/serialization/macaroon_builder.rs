use crate::caveat::Caveat;
use crate::crypto::key::MacaroonKey;
use crate::error::MacaroonError;
use crate::macaroon::Macaroon;
use crate::{ByteString, Result};

/// Assembles a [`Macaroon`] field-by-field while deserializing, since the
/// wire formats deliver identifier/location/signature/caveats in whatever
/// order they appear on the wire rather than all at once.
#[derive(Default)]
pub struct MacaroonBuilder {
    identifier: ByteString,
    location: Option<String>,
    signature: [u8; 32],
    caveats: Vec<Caveat>,
}

impl MacaroonBuilder {
    pub fn new() -> MacaroonBuilder {
        Default::default()
    }

    pub fn set_identifier(&mut self, identifier: impl Into<ByteString>) {
        self.identifier = identifier.into();
    }

    pub fn set_location(&mut self, location: &str) {
        self.location = Some(location.to_string());
    }

    pub fn has_location(&self) -> bool {
        self.location.is_some()
    }

    pub fn set_signature(&mut self, signature: &[u8]) {
        self.signature.clone_from_slice(signature);
    }

    pub fn add_caveat(&mut self, caveat: Caveat) {
        self.caveats.push(caveat);
    }

    pub fn build(&self) -> Result<Macaroon> {
        if self.identifier.as_bytes().is_empty() {
            return Err(MacaroonError::BadMacaroon("No identifier found"));
        }

        Macaroon::from_parts(
            self.identifier.clone(),
            self.location.clone(),
            MacaroonKey::from(self.signature),
            self.caveats.clone(),
        )
    }
}
