use crate::caveat::Caveat;
use crate::crypto;
use crate::crypto::key::MacaroonKey;
use crate::error::{MacaroonError, Result};
use crate::macaroon::Macaroon;
use crate::ByteString;

/// A general-purpose caveat satisfier, eg for range checks (`time < ...`)
/// that [`Verifier::satisfy_exact`] cannot express.
pub type VerifierCallback = fn(&ByteString) -> bool;

/// Checks a macaroon's first-party caveats against a set of known-good
/// predicates, and recursively verifies any third-party caveats against a
/// supplied set of discharge macaroons.
#[derive(Default)]
pub struct Verifier {
    exact: Vec<ByteString>,
    general: Vec<VerifierCallback>,
}

impl Verifier {
    /// Registers a predicate that exactly satisfies a first-party caveat.
    pub fn satisfy_exact(&mut self, predicate: ByteString) {
        self.exact.push(predicate);
    }

    /// Registers a callback that can satisfy any first-party caveat it
    /// recognizes, eg for predicates with a variable part (`time < ...`).
    pub fn satisfy_general(&mut self, callback: VerifierCallback) {
        self.general.push(callback);
    }

    fn satisfies(&self, predicate: &ByteString) -> bool {
        self.exact.iter().any(|p| p == predicate) || self.general.iter().any(|cb| cb(predicate))
    }

    /// Verifies `macaroon` against `key`, discharging any third-party caveats
    /// using `discharge_macaroons`. Each discharge macaroon must already have
    /// been bound to `macaroon` via [`Macaroon::bind`].
    pub fn verify(
        &self,
        macaroon: &Macaroon,
        key: &MacaroonKey,
        discharge_macaroons: Vec<Macaroon>,
    ) -> Result<()> {
        self.verify_inner(macaroon, key, macaroon, &discharge_macaroons, true, 0)
    }

    fn verify_inner(
        &self,
        macaroon: &Macaroon,
        key: &MacaroonKey,
        root: &Macaroon,
        discharges: &[Macaroon],
        is_root: bool,
        depth: usize,
    ) -> Result<()> {
        if depth > discharges.len() {
            return Err(MacaroonError::BadMacaroon("discharge chain too deep"));
        }

        let mut signature = crypto::hmac(key, &macaroon.identifier());
        for caveat in macaroon.caveats() {
            match caveat {
                Caveat::FirstParty(fp) => {
                    if !self.satisfies(&fp.predicate()) {
                        return Err(MacaroonError::BadMacaroon("caveat not satisfied"));
                    }
                }
                Caveat::ThirdParty(tp) => {
                    let discharge_key = crypto::decrypt_key(&signature, &tp.verifier_id())?;
                    let discharge = discharges
                        .iter()
                        .find(|d| d.identifier() == tp.id())
                        .ok_or(MacaroonError::BadMacaroon("missing discharge macaroon"))?;
                    self.verify_inner(
                        discharge,
                        &discharge_key,
                        root,
                        discharges,
                        false,
                        depth + 1,
                    )?;
                }
            }
            signature = caveat.sign(&signature);
        }

        let expected = if is_root {
            signature
        } else {
            let zero_key = MacaroonKey::from([0u8; 32]);
            crypto::hmac2(&zero_key, &root.signature(), &signature)
        };
        if expected != macaroon.signature() {
            return Err(MacaroonError::BadMacaroon("signature mismatch"));
        }
        Ok(())
    }
}
