//! The bakery's own `Macaroon`: the underlying cryptographic macaroon plus
//! the bakery version, namespace snapshot, and (for version 3) the map from
//! third-party caveat id to its externally-stored encrypted payload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crypto::bakery_key::PrivateKey;
use crate::error::{BakeryError, BakeryResult};
use crate::namespace::Namespace;
use crate::store::ThirdPartyLocator;
use crate::{codec, ByteString, MacaroonKey};

/// A caveat as seen by the bakery layer: a condition string, and (for
/// third-party caveats) the location it must be discharged at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caveat {
    pub condition: String,
    pub location: Option<String>,
}

impl Caveat {
    pub fn first_party(condition: impl Into<String>) -> Caveat {
        Caveat {
            condition: condition.into(),
            location: None,
        }
    }

    pub fn third_party(location: impl Into<String>, condition: impl Into<String>) -> Caveat {
        Caveat {
            condition: condition.into(),
            location: Some(location.into()),
        }
    }

    pub fn is_third_party(&self) -> bool {
        self.location.is_some()
    }
}

/// Highest bakery version this crate mints by default.
pub const LATEST_VERSION: u8 = 3;

/// The bakery's own macaroon: a thin wrapper that carries bakery-specific
/// bookkeeping (version, namespace, out-of-band caveat data) alongside the
/// cryptographic primitive from [`crate::macaroon`].
#[derive(Clone, Debug)]
pub struct Macaroon {
    pub(crate) inner: crate::macaroon::Macaroon,
    pub(crate) version: u8,
    pub(crate) namespace: Namespace,
    pub(crate) caveat_data: HashMap<ByteString, ByteString>,
}

impl Macaroon {
    pub(crate) fn new(
        inner: crate::macaroon::Macaroon,
        version: u8,
        namespace: Namespace,
    ) -> Macaroon {
        Macaroon {
            inner,
            version,
            namespace,
            caveat_data: HashMap::new(),
        }
    }

    pub fn underlying(&self) -> &crate::macaroon::Macaroon {
        &self.inner
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Resolves a third-party caveat's encrypted payload: for a version 3
    /// caveat, `id` is a short key into `caveat_data`; for earlier versions
    /// the payload is the id itself.
    pub fn caveat_payload(&self, id: &ByteString) -> Vec<u8> {
        match self.caveat_data.get(id) {
            Some(payload) => payload.clone().into_vec(),
            None => id.clone().into_vec(),
        }
    }

    /// Adds `caveat` to the macaroon. A third-party caveat is first resolved
    /// against `locator`, then sealed with a freshly generated discharge
    /// root key via the third-party caveat codec, using `key` as our own
    /// keypair and `self.version` to pick the wire format.
    pub fn add_caveat(
        &mut self,
        caveat: &Caveat,
        key: &PrivateKey,
        locator: &dyn ThirdPartyLocator,
    ) -> BakeryResult<()> {
        match &caveat.location {
            None => {
                self.inner
                    .add_first_party_caveat(ByteString::from(caveat.condition.as_str()));
                Ok(())
            }
            Some(location) => {
                let info = locator.third_party_info(location)?;
                let discharge_key = MacaroonKey::generate_random();
                let negotiated = self.version.min(info.version);
                let payload = match (self.version, info.version) {
                    (v, iv) if v >= 3 && iv >= 3 => codec::encode_v3(
                        &caveat.condition,
                        &discharge_key,
                        &info.public_key,
                        key,
                        &self.namespace,
                    )
                    .map_err(BakeryError::from)?,
                    (_, iv) if iv >= 2 => codec::encode_v2(
                        &caveat.condition,
                        &discharge_key,
                        &info.public_key,
                        key,
                    )
                    .map_err(BakeryError::from)?,
                    _ => codec::encode_v1(&caveat.condition, &discharge_key, &info.public_key, key)
                        .map_err(BakeryError::from)?,
                };
                let id = self.store_caveat_payload(negotiated, payload);
                self.inner.add_third_party_caveat(location, &discharge_key, id);
                Ok(())
            }
        }
    }

    /// For bakery version 3, caveat payloads are kept out of the macaroon's
    /// own wire form: the encoded payload is stashed in `caveat_data` keyed
    /// by a short id, and only that short id travels as the caveat's id.
    /// Earlier versions have no external store to target, so the full
    /// payload is the id.
    fn store_caveat_payload(&mut self, negotiated_version: u8, payload: Vec<u8>) -> ByteString {
        if negotiated_version < 3 {
            return ByteString(payload);
        }
        let id = self.new_caveat_id();
        self.caveat_data.insert(id.clone(), ByteString(payload));
        id
    }

    /// Picks a caveat id not already used by a third-party caveat on this
    /// macaroon: a version byte followed by a uvarint index, bumped past any
    /// collision.
    fn new_caveat_id(&self) -> ByteString {
        let mut index = self.caveat_data.len() as u64;
        loop {
            let mut id = vec![LATEST_VERSION];
            let mut v = index;
            loop {
                let mut byte = (v & 0x7f) as u8;
                v >>= 7;
                if v != 0 {
                    byte |= 0x80;
                }
                id.push(byte);
                if v == 0 {
                    break;
                }
            }
            let candidate = ByteString(id);
            let collides = self
                .inner
                .third_party_caveats()
                .iter()
                .any(|c| c.id() == candidate);
            if !collides {
                return candidate;
            }
            index += 1;
        }
    }

    /// Binds `discharge` to this macaroon (see [`crate::macaroon::Macaroon::bind`]).
    pub fn bind(&self, discharge: &mut Macaroon) {
        self.inner.bind(&mut discharge.inner);
    }

    /// Adds a caveat addressed to a "local" third party: one whose public
    /// key is carried in the location string itself (`local <version>
    /// <pubkey>`) rather than resolved via a locator, and whose condition is
    /// always `"true"` since the discharger is the client holding the
    /// matching private key, with nothing further to check.
    pub fn add_local_caveat(
        &mut self,
        version: u8,
        location: &str,
        public_key: &crate::crypto::bakery_key::PublicKey,
        key: &PrivateKey,
    ) -> BakeryResult<()> {
        let discharge_key = MacaroonKey::generate_random();
        let payload = if version >= 3 {
            codec::encode_v3("true", &discharge_key, public_key, key, &self.namespace)
                .map_err(BakeryError::from)?
        } else if version == 2 {
            codec::encode_v2("true", &discharge_key, public_key, key).map_err(BakeryError::from)?
        } else {
            codec::encode_v1("true", &discharge_key, public_key, key).map_err(BakeryError::from)?
        };
        let negotiated = self.version.min(version);
        let id = self.store_caveat_payload(negotiated, payload);
        self.inner.add_third_party_caveat(location, &discharge_key, id);
        Ok(())
    }
}

/// Wire envelope used to serialize a bakery macaroon: `{m, v, ns?, cdata?}`.
#[derive(Serialize, Deserialize)]
struct Envelope {
    m: serde_json::Value,
    v: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    ns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cdata: Option<HashMap<String, String>>,
}

pub fn serialize(macaroon: &Macaroon) -> BakeryResult<String> {
    let format = if macaroon.version <= 1 {
        crate::serialization::Format::V1
    } else {
        crate::serialization::Format::V2JSON
    };
    let m = macaroon.inner.serialize(format).map_err(BakeryError::from)?;
    let envelope = Envelope {
        m: serde_json::from_str(&m).unwrap_or(serde_json::Value::String(m)),
        v: macaroon.version,
        ns: if macaroon.namespace.is_empty() {
            None
        } else {
            Some(macaroon.namespace.serialize())
        },
        cdata: if macaroon.caveat_data.is_empty() {
            None
        } else {
            Some(
                macaroon
                    .caveat_data
                    .iter()
                    .map(|(id, payload)| {
                        (
                            base64::encode_config(id.as_bytes(), base64::URL_SAFE),
                            base64::encode_config(payload.as_bytes(), base64::URL_SAFE),
                        )
                    })
                    .collect(),
            )
        },
    };
    Ok(serde_json::to_string(&envelope).map_err(crate::MacaroonError::from)?)
}

pub fn deserialize(data: &str) -> BakeryResult<Macaroon> {
    let envelope: Envelope = serde_json::from_str(data).map_err(crate::MacaroonError::from)?;
    let m_text = match &envelope.m {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let inner = crate::macaroon::Macaroon::deserialize(&m_text).map_err(BakeryError::from)?;
    let namespace = match envelope.ns {
        Some(ns) => Namespace::deserialize(&ns)?,
        None => Namespace::new(),
    };
    let mut caveat_data = HashMap::new();
    if let Some(cdata) = envelope.cdata {
        for (id64, payload64) in cdata {
            let id = ByteString(
                base64::decode_config(&id64, base64::URL_SAFE).map_err(crate::MacaroonError::from)?,
            );
            let payload = ByteString(
                base64::decode_config(&payload64, base64::URL_SAFE)
                    .map_err(crate::MacaroonError::from)?,
            );
            caveat_data.insert(id, payload);
        }
    }
    Ok(Macaroon {
        inner,
        version: envelope.v,
        namespace,
        caveat_data,
    })
}
