//! The mint side of the bakery: turns `(operations, caveats, expiry,
//! version)` into a macaroon, and the reverse — recovering the operations a
//! presented macaroon bundle grants.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::checkers::Checker;
use crate::crypto::bakery_key::{PrivateKey, PublicKey};
use crate::error::{BakeryError, BakeryResult};
use crate::namespace::Namespace;
use crate::ops::{canonical_ops, Operation};
use crate::store::{OpsStore, RootKeyStore, ThirdPartyLocator};
use crate::verifier::Verifier;
use crate::wrapper::{self, Caveat, Macaroon};
use crate::ByteString;

const TAG_LOGIN: &str = "login";
const TAG_MULTI_PREFIX: &str = "multi-";

/// Parses a `local <version> <pubkey>` (or, per the 1-field variant, just
/// `local <pubkey>`, which implies version 2) location into a protocol
/// version and public key.
pub fn parse_local_location(location: &str) -> Option<(u8, PublicKey)> {
    let rest = location.strip_prefix("local ")?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let (version, key_b64) = match fields.as_slice() {
        [key] => (2u8, *key),
        [version, key] => (version.parse().ok()?, *key),
        _ => return None,
    };
    let bytes: [u8; 32] = base64::decode(key_b64).ok()?.try_into().ok()?;
    Some((version, bytes.into()))
}

fn write_uvarint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn read_uvarint(data: &[u8], pos: &mut usize) -> BakeryResult<u64> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| BakeryError::Verification(String::from("truncated bakery id uvarint")))?;
        *pos += 1;
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(value)
}

fn fingerprint(ops: &[Operation]) -> String {
    let mut hasher = Sha256::new();
    for op in ops {
        hasher.update(op.entity.as_bytes());
        hasher.update(b"\0");
        hasher.update(op.action.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

fn encode_identifier(version: u8, key_id: &[u8], tag: &str, namespace: &Namespace) -> ByteString {
    if version <= 1 {
        let mut id = hex::encode(key_id);
        id.push('-');
        id.push_str(&uuid::Uuid::new_v4().to_string());
        let _ = tag; // V1 ids carry no tag; the full ops list is re-derived from the OpsStore below.
        return ByteString::from(id);
    }
    let mut packed = vec![version];
    write_uvarint(key_id.len() as u64, &mut packed);
    packed.extend_from_slice(key_id);
    write_uvarint(tag.len() as u64, &mut packed);
    packed.extend_from_slice(tag.as_bytes());
    let ns = namespace.serialize();
    write_uvarint(ns.len() as u64, &mut packed);
    packed.extend_from_slice(ns.as_bytes());
    ByteString(packed)
}

struct DecodedIdentifier {
    key_id: Vec<u8>,
    tag: String,
    namespace: Namespace,
}

fn decode_identifier(version: u8, identifier: &ByteString) -> BakeryResult<DecodedIdentifier> {
    if version <= 1 {
        let text = String::from_utf8(identifier.clone().into_vec())
            .map_err(|_| BakeryError::Verification(String::from("bakery id not utf8")))?;
        let (hex_part, uuid_part) = text.split_once('-').ok_or_else(|| {
            BakeryError::Verification(String::from("v1 bakery id missing key id separator"))
        })?;
        let key_id =
            hex::decode(hex_part).map_err(|_| BakeryError::Verification(String::from("bad key id hex")))?;
        uuid::Uuid::parse_str(uuid_part)
            .map_err(|_| BakeryError::Verification(String::from("bad v1 id uuid suffix")))?;
        return Ok(DecodedIdentifier {
            key_id,
            tag: String::new(),
            namespace: Namespace::new(),
        });
    }
    let data = identifier.as_bytes();
    let mut pos = 1usize;
    let key_id_len = read_uvarint(data, &mut pos)? as usize;
    let key_id = data
        .get(pos..pos + key_id_len)
        .ok_or_else(|| BakeryError::Verification(String::from("truncated bakery id")))?
        .to_vec();
    pos += key_id_len;
    let tag_len = read_uvarint(data, &mut pos)? as usize;
    let tag = std::str::from_utf8(
        data.get(pos..pos + tag_len)
            .ok_or_else(|| BakeryError::Verification(String::from("truncated bakery id")))?,
    )
    .map_err(|_| BakeryError::Verification(String::from("bad tag utf8")))?
    .to_string();
    pos += tag_len;
    let ns_len = read_uvarint(data, &mut pos)? as usize;
    let ns_str = std::str::from_utf8(
        data.get(pos..pos + ns_len)
            .ok_or_else(|| BakeryError::Verification(String::from("truncated bakery id")))?,
    )
    .map_err(|_| BakeryError::Verification(String::from("bad namespace utf8")))?;
    let namespace = Namespace::deserialize(ns_str)?;
    Ok(DecodedIdentifier {
        key_id,
        tag,
        namespace,
    })
}

/// Mints macaroons and recovers the operations a presented one grants.
pub struct Oven {
    pub location: String,
    pub key: PrivateKey,
    pub version: u8,
    pub key_store: Arc<dyn RootKeyStore>,
    pub ops_store: Option<Arc<dyn OpsStore>>,
    pub locator: Arc<dyn ThirdPartyLocator>,
}

impl Oven {
    pub fn new(
        location: impl Into<String>,
        key: PrivateKey,
        key_store: Arc<dyn RootKeyStore>,
        ops_store: Option<Arc<dyn OpsStore>>,
        locator: Arc<dyn ThirdPartyLocator>,
    ) -> Oven {
        Oven {
            location: location.into(),
            key,
            version: wrapper::LATEST_VERSION,
            key_store,
            ops_store,
            locator,
        }
    }

    /// Mints a macaroon authorizing `ops`, expiring at `expiry`, with
    /// `extra_caveats` (first- or third-party) baked in alongside the
    /// mandatory `time-before` expiry caveat.
    pub fn mint(
        &self,
        expiry: OffsetDateTime,
        ops: Vec<Operation>,
        extra_caveats: Vec<Caveat>,
    ) -> BakeryResult<Macaroon> {
        let ops = canonical_ops(ops);
        let tag = if ops.len() == 1 && ops[0].is_login() {
            TAG_LOGIN.to_string()
        } else if ops.len() == 1 {
            format!("{}-{}", ops[0].entity, ops[0].action)
        } else {
            let fp = fingerprint(&ops);
            if let Some(store) = &self.ops_store {
                store.put_ops(&fp, ops.clone())?;
            }
            format!("{}{}", TAG_MULTI_PREFIX, fp)
        };

        let namespace = {
            let mut ns = Namespace::new();
            ns.register("std", "");
            ns
        };

        let (root_key, key_id) = self.key_store.root_key()?;
        let identifier = encode_identifier(self.version, &key_id, &tag, &namespace);

        let inner =
            crate::macaroon::Macaroon::create(Some(self.location.clone()), &root_key, identifier)
                .map_err(BakeryError::from)?;
        let mut macaroon = Macaroon::new(inner, self.version, namespace);

        let expiry_text = expiry
            .format(&Rfc3339)
            .map_err(|e| BakeryError::AuthInitError(format!("cannot format expiry: {}", e)))?;
        macaroon.add_caveat(
            &Caveat::first_party(format!("time-before {}", expiry_text)),
            &self.key,
            &*self.locator,
        )?;

        for caveat in &extra_caveats {
            match &caveat.location {
                Some(location) if location.starts_with("local ") || location == "local" => {
                    let (version, public_key) = parse_local_location(location).ok_or_else(|| {
                        BakeryError::Verification(format!("malformed local location {:?}", location))
                    })?;
                    macaroon.add_local_caveat(version, location, &public_key, &self.key)?;
                }
                _ => macaroon.add_caveat(caveat, &self.key, &*self.locator)?,
            }
        }

        Ok(macaroon)
    }

    /// Given presented macaroons (a primary plus its discharges), verifies
    /// the full signature chain and recovers `(operations,
    /// first_party_conditions)`.
    pub fn macaroon_ops(
        &self,
        macaroon: &Macaroon,
        discharges: &[crate::macaroon::Macaroon],
    ) -> BakeryResult<(Vec<Operation>, Vec<String>)> {
        let decoded = decode_identifier(macaroon.version, &macaroon.inner.identifier())?;
        let root_key = self.key_store.get(&decoded.key_id)?;

        // Only the cryptographic chain (signatures, discharge bindings) is
        // checked here; first-party conditions are the Checker/AuthContext's
        // job, so every predicate is accepted at this layer.
        let mut verifier = Verifier::default();
        verifier.satisfy_general(|_| true);
        verifier
            .verify(&macaroon.inner, &root_key, discharges.to_vec())
            .map_err(|e| BakeryError::Verification(e.to_string()))?;

        let mut conditions: Vec<String> = macaroon
            .inner
            .first_party_caveats()
            .into_iter()
            .filter_map(|c| c.as_first_party())
            .map(|fp| String::from_utf8_lossy(fp.predicate().as_bytes()).into_owned())
            .collect();
        for discharge in discharges {
            conditions.extend(
                discharge
                    .first_party_caveats()
                    .into_iter()
                    .filter_map(|c| c.as_first_party())
                    .map(|fp| String::from_utf8_lossy(fp.predicate().as_bytes()).into_owned()),
            );
        }

        let ops = if decoded.tag == TAG_LOGIN {
            vec![Operation::login()]
        } else if let Some(fp) = decoded.tag.strip_prefix(TAG_MULTI_PREFIX) {
            let store = self.ops_store.as_ref().ok_or_else(|| {
                BakeryError::Verification(String::from("multi-op macaroon but no ops store configured"))
            })?;
            store.get_ops(fp)?
        } else {
            // Entities conventionally contain hyphens themselves (e.g.
            // "profile-picture"), so split on the *last* hyphen: the action
            // is the documented suffix.
            let (entity, action) = decoded.tag.rsplit_once('-').ok_or_else(|| {
                BakeryError::Verification(format!("malformed op tag {:?}", decoded.tag))
            })?;
            vec![Operation::new(entity, action)?]
        };

        Ok((ops, conditions))
    }

    /// Constructs a [`Checker`] wired with this oven's standard namespace,
    /// for convenience callers that don't need a custom registry.
    pub fn checker() -> Checker {
        Checker::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryKeyStore, MemoryOpsStore, MemoryThirdPartyLocator};
    use time::macros::datetime;

    fn oven() -> Oven {
        Oven::new(
            "https://bakerytest.example",
            PrivateKey::generate(),
            Arc::new(MemoryKeyStore::new()),
            Some(Arc::new(MemoryOpsStore::new())),
            Arc::new(MemoryThirdPartyLocator::new()),
        )
    }

    #[test]
    fn mint_and_recover_single_op() {
        let oven = oven();
        let op = Operation::new("thing", "read").unwrap();
        let macaroon = oven
            .mint(datetime!(2030-01-01 0:00 UTC), vec![op.clone()], Vec::new())
            .unwrap();
        let (ops, conditions) = oven.macaroon_ops(&macaroon, &[]).unwrap();
        assert_eq!(vec![op], ops);
        assert_eq!(1, conditions.len());
    }

    #[test]
    fn mint_and_recover_login_op() {
        let oven = oven();
        let macaroon = oven
            .mint(datetime!(2030-01-01 0:00 UTC), vec![Operation::login()], Vec::new())
            .unwrap();
        let (ops, _) = oven.macaroon_ops(&macaroon, &[]).unwrap();
        assert_eq!(vec![Operation::login()], ops);
    }

    #[test]
    fn mint_huge_ops_collapses_into_ops_store() {
        let oven = oven();
        let ops: Vec<Operation> = (0..30_000)
            .map(|i| Operation::new(format!("entity{}", i), "read").unwrap())
            .collect();
        let macaroon = oven
            .mint(datetime!(2030-01-01 0:00 UTC), ops.clone(), Vec::new())
            .unwrap();
        let serialized = wrapper::serialize(&macaroon).unwrap();
        assert!(serialized.len() < 2000, "serialized size was {}", serialized.len());
        let (recovered, _) = oven.macaroon_ops(&macaroon, &[]).unwrap();
        assert_eq!(canonical_ops(ops), recovered);
    }

    #[test]
    fn mint_and_recover_single_op_with_hyphenated_entity() {
        let oven = oven();
        let op = Operation::new("profile-picture", "update").unwrap();
        let macaroon = oven
            .mint(datetime!(2030-01-01 0:00 UTC), vec![op.clone()], Vec::new())
            .unwrap();
        let (ops, _) = oven.macaroon_ops(&macaroon, &[]).unwrap();
        assert_eq!(vec![op], ops);
    }

    #[test]
    fn parses_one_and_two_field_local_locations() {
        let key = PublicKey::from([7u8; 32]);
        let b64 = base64::encode(key.to_bytes());
        let (v, k) = parse_local_location(&format!("local {}", b64)).unwrap();
        assert_eq!(2, v);
        assert_eq!(key, k);
        let (v, k) = parse_local_location(&format!("local 3 {}", b64)).unwrap();
        assert_eq!(3, v);
        assert_eq!(key, k);
    }
}
