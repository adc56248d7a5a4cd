use crate::caveat::{self, Caveat};
use crate::crypto::key::MacaroonKey;
use crate::error::{MacaroonError, Result};
use crate::serialization::{self, Format};
use crate::ByteString;

/// A bearer credential: an identifier, an optional location hint, a list of
/// caveats restricting what it authorizes, and a signature binding all of the
/// above to a root key via HMAC chaining.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Macaroon {
    identifier: ByteString,
    location: Option<String>,
    signature: MacaroonKey,
    caveats: Vec<Caveat>,
}

impl Macaroon {
    /// Mints a fresh macaroon with no caveats, signed with `key`.
    pub fn create(
        location: Option<String>,
        key: &MacaroonKey,
        identifier: ByteString,
    ) -> Result<Macaroon> {
        let macaroon = Macaroon {
            location,
            signature: crate::crypto::hmac(key, &identifier),
            identifier,
            caveats: Vec::new(),
        };
        macaroon.validate()
    }

    pub(crate) fn from_parts(
        identifier: ByteString,
        location: Option<String>,
        signature: MacaroonKey,
        caveats: Vec<Caveat>,
    ) -> Result<Macaroon> {
        Macaroon {
            identifier,
            location,
            signature,
            caveats,
        }
        .validate()
    }

    fn validate(self) -> Result<Self> {
        if self.identifier.as_bytes().is_empty() {
            return Err(MacaroonError::BadMacaroon("no macaroon identifier"));
        }
        Ok(self)
    }

    pub fn identifier(&self) -> ByteString {
        self.identifier.clone()
    }

    pub fn location(&self) -> Option<String> {
        self.location.clone()
    }

    pub fn signature(&self) -> MacaroonKey {
        self.signature
    }

    pub fn caveats(&self) -> &Vec<Caveat> {
        &self.caveats
    }

    pub fn first_party_caveats(&self) -> Vec<&Caveat> {
        self.caveats
            .iter()
            .filter(|c| matches!(c, Caveat::FirstParty(_)))
            .collect()
    }

    pub fn third_party_caveats(&self) -> Vec<&Caveat> {
        self.caveats
            .iter()
            .filter(|c| matches!(c, Caveat::ThirdParty(_)))
            .collect()
    }

    /// Adds a first-party caveat: a predicate this crate's [`crate::Verifier`]
    /// must satisfy locally, with no involvement from a third party.
    pub fn add_first_party_caveat(&mut self, predicate: ByteString) {
        let caveat = caveat::new_first_party(predicate);
        self.signature = caveat.sign(&self.signature);
        self.caveats.push(caveat);
    }

    /// Adds a third-party caveat: `key` is the root key of the discharge
    /// macaroon the third party at `location` must mint for `id` in order for
    /// this caveat to be satisfied. `key` is encrypted under the macaroon's
    /// current running signature, so only a verifier who can reproduce that
    /// signature (ie one who holds the macaroon's root key) can recover it.
    pub fn add_third_party_caveat(&mut self, location: &str, key: &MacaroonKey, id: ByteString) {
        let vid = crate::crypto::encrypt_key(&self.signature, key);
        let caveat = caveat::new_third_party(id, vid.into(), location);
        self.signature = caveat.sign(&self.signature);
        self.caveats.push(caveat);
    }

    /// Binds a discharge macaroon to this one, so that it is only valid when
    /// presented alongside it. Must be called on every discharge macaroon
    /// before it is sent to a verifier (see [`crate::Verifier::verify`]).
    pub fn bind(&self, discharge: &mut Macaroon) {
        let zero_key = MacaroonKey::from([0u8; 32]);
        discharge.signature = crate::crypto::hmac2(&zero_key, &self.signature, &discharge.signature);
    }

    pub fn verify_signature(&self, key: &MacaroonKey) -> bool {
        self.compute_signature(key) == self.signature
    }

    pub(crate) fn compute_signature(&self, key: &MacaroonKey) -> MacaroonKey {
        let mut signature = crate::crypto::hmac(key, &self.identifier);
        for caveat in &self.caveats {
            signature = caveat.sign(&signature);
        }
        signature
    }

    pub fn serialize(&self, format: Format) -> Result<String> {
        let bytes = match format {
            Format::V1 => serialization::v1::serialize(self)?,
            Format::V2 => serialization::v2::serialize(self)?,
            Format::V2JSON => serialization::v2json::serialize(self)?,
        };
        Ok(String::from_utf8(bytes)?)
    }

    /// Deserializes a macaroon from any of the supported wire formats,
    /// detecting which one was used from the leading byte(s).
    pub fn deserialize(data: impl AsRef<[u8]>) -> Result<Macaroon> {
        let bytes = data.as_ref();
        if bytes.is_empty() {
            return Err(MacaroonError::DeserializationError(String::from(
                "empty input",
            )));
        }
        let macaroon = if bytes[0] == b'{' {
            serialization::v2json::deserialize(bytes)?
        } else {
            match base64::decode_config(bytes, base64::URL_SAFE) {
                Ok(decoded) if decoded.first() == Some(&2) => {
                    serialization::v2::deserialize(&decoded)?
                }
                _ => serialization::v1::deserialize(bytes)?,
            }
        };
        macaroon.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::Macaroon;
    use crate::error::MacaroonError;

    #[test]
    fn create_macaroon() {
        let key = crate::MacaroonKey::generate(b"this is a super duper secret key");
        let macaroon = Macaroon::create(Some("location".into()), &key, "identifier".into()).unwrap();
        assert_eq!(Some("location".to_string()), macaroon.location());
        assert_eq!("identifier", macaroon.identifier());
        assert_eq!(0, macaroon.caveats().len());
    }

    #[test]
    fn create_invalid_macaroon() {
        let key = crate::MacaroonKey::generate(b"this is a super duper secret key");
        let result = Macaroon::create(Some("location".into()), &key, "".into());
        assert!(matches!(result, Err(MacaroonError::BadMacaroon(_))));
    }

    #[test]
    fn create_macaroon_with_first_party_caveat() {
        let key = crate::MacaroonKey::generate(b"this is a super duper secret key");
        let mut macaroon = Macaroon::create(Some("location".into()), &key, "identifier".into()).unwrap();
        macaroon.add_first_party_caveat("predicate".into());
        assert_eq!(1, macaroon.caveats().len());
        assert_eq!(
            "predicate",
            macaroon.caveats()[0].as_first_party().unwrap().predicate()
        );
        assert!(macaroon.verify_signature(&key));
    }
}
