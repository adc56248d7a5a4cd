//! The discharge engine: server side mints a discharge macaroon once a
//! third-party caveat's condition checks out; client side recursively
//! acquires discharges for a primary macaroon's whole caveat tree and binds
//! them to it.

use std::collections::{HashMap, VecDeque};

use crate::checkers::{AuthContext, Checker};
use crate::codec;
use crate::crypto::bakery_key::PrivateKey;
use crate::error::{BakeryError, BakeryResult};
use crate::store::ThirdPartyLocator;
use crate::wrapper::{self, Caveat, Macaroon};
use crate::ByteString;

/// Guards against a cyclic or runaway third-party caveat graph; unrelated to
/// the HTTP layer's per-URL retry counter (see [`crate::httpbakery`]).
const MAX_QUEUED_DISCHARGES: usize = 1000;

/// Decodes and checks a third-party caveat, minting the discharge macaroon
/// that attests its condition holds.
///
/// `id` is the caveat's own id (becomes the discharge macaroon's identifier,
/// so [`crate::verifier::Verifier`] can match it back up); `encrypted_caveat`
/// is the payload the codec can decrypt with `key`.
pub fn discharge(
    id: ByteString,
    encrypted_caveat: &[u8],
    key: &PrivateKey,
    checker: &Checker,
    ctx: &AuthContext,
    locator: &dyn ThirdPartyLocator,
) -> BakeryResult<Macaroon> {
    let info = codec::decode(encrypted_caveat, key).map_err(BakeryError::from)?;

    let mut declared_caveats = Vec::new();
    if let Some(rest) = info.condition.strip_prefix("need-declared ") {
        let (keys_csv, inner) = rest.split_once(' ').ok_or_else(|| {
            BakeryError::CaveatNotRecognized(format!(
                "malformed need-declared caveat {:?}",
                info.condition
            ))
        })?;
        checker
            .check(ctx, inner)
            .map_err(|e| BakeryError::ThirdPartyCaveatCheckFailed(e.to_string()))?;
        for key_name in keys_csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let value = ctx.declared.get(key_name).cloned().unwrap_or_default();
            declared_caveats.push(format!("declared {} {}", key_name, value));
        }
    } else {
        checker
            .check(ctx, &info.condition)
            .map_err(|e| BakeryError::ThirdPartyCaveatCheckFailed(e.to_string()))?;
    }

    let discharge_id = info.id.clone().unwrap_or(id);
    let inner = crate::macaroon::Macaroon::create(None, &info.root_key, discharge_id)
        .map_err(BakeryError::from)?;
    let mut macaroon = Macaroon::new(inner, wrapper::LATEST_VERSION, info.namespace.clone());
    for condition in declared_caveats {
        macaroon.add_caveat(&Caveat::first_party(condition), key, locator)?;
    }
    Ok(macaroon)
}

/// Acquires a discharge for a non-local third-party caveat. Implementations
/// range from an in-process call (tests) to the real HTTP client
/// ([`crate::httpbakery::client`]).
pub trait DischargeAcquirer: Send + Sync {
    fn acquire(
        &self,
        location: &str,
        id: &ByteString,
        encrypted_caveat: &[u8],
    ) -> BakeryResult<Macaroon>;
}

/// Recursively discharges every third-party caveat reachable from `primary`,
/// binding each discharge to it as it's produced, in BFS order over the
/// caveat tree.
pub fn discharge_all(
    primary: &Macaroon,
    local_key: Option<&PrivateKey>,
    local_checker: &Checker,
    local_ctx: &AuthContext,
    local_locator: &dyn ThirdPartyLocator,
    acquirer: &dyn DischargeAcquirer,
) -> BakeryResult<Vec<Macaroon>> {
    let mut discharges: Vec<Macaroon> = Vec::new();
    // Caveat payloads live in whichever macaroon minted them (`caveat_data`),
    // so each queued caveat carries the index of its source's snapshot.
    let mut data_sources: Vec<HashMap<ByteString, ByteString>> = vec![primary.caveat_data.clone()];
    let mut queue: VecDeque<(usize, crate::caveat::ThirdParty)> = primary
        .underlying()
        .third_party_caveats()
        .into_iter()
        .filter_map(|c| c.as_third_party().cloned())
        .map(|tp| (0usize, tp))
        .collect();

    let mut processed = 0usize;
    while let Some((source, tp)) = queue.pop_front() {
        processed += 1;
        if processed > MAX_QUEUED_DISCHARGES {
            return Err(BakeryError::Verification(String::from(
                "too many discharge requests",
            )));
        }

        let payload = match data_sources[source].get(&tp.id()) {
            Some(stored) => stored.clone().into_vec(),
            None => tp.id().into_vec(),
        };

        let mut dm = if tp.location().starts_with("local") {
            let key = local_key
                .ok_or_else(|| BakeryError::ThirdPartyInfoNotFound(tp.location()))?;
            discharge(tp.id(), &payload, key, local_checker, local_ctx, local_locator)?
        } else {
            acquirer.acquire(&tp.location(), &tp.id(), &payload)?
        };

        primary.bind(&mut dm);

        data_sources.push(dm.caveat_data.clone());
        let dm_source = data_sources.len() - 1;
        for caveat in dm.underlying().third_party_caveats() {
            if let Some(tp2) = caveat.as_third_party() {
                queue.push_back((dm_source, tp2.clone()));
            }
        }
        discharges.push(dm);
    }
    Ok(discharges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::bakery_key::PrivateKey;
    use crate::store::{MemoryThirdPartyLocator, ThirdPartyInfo};
    use crate::verifier::Verifier;
    use crate::MacaroonKey;

    struct InProcessAcquirer<'a> {
        key: &'a PrivateKey,
        checker: &'a Checker,
        ctx: &'a AuthContext,
        locator: &'a MemoryThirdPartyLocator,
    }

    impl<'a> DischargeAcquirer for InProcessAcquirer<'a> {
        fn acquire(
            &self,
            _location: &str,
            id: &ByteString,
            encrypted_caveat: &[u8],
        ) -> BakeryResult<Macaroon> {
            discharge(
                id.clone(),
                encrypted_caveat,
                self.key,
                self.checker,
                self.ctx,
                self.locator,
            )
        }
    }

    #[test]
    fn three_party_discharge_verifies() {
        let root_key = MacaroonKey::generate(b"ts root");
        let ts_key = PrivateKey::generate();
        let bs_key = PrivateKey::generate();

        let locator = MemoryThirdPartyLocator::new();
        locator.add_info(
            "https://bs.example",
            ThirdPartyInfo {
                version: 3,
                public_key: bs_key.public_key(),
            },
        );

        let inner = crate::macaroon::Macaroon::create(Some("ts".into()), &root_key, "id".into())
            .unwrap();
        let mut primary = Macaroon::new(inner, wrapper::LATEST_VERSION, crate::namespace::Namespace::new());
        primary
            .add_caveat(
                &Caveat::third_party("https://bs.example", "declared user bob"),
                &ts_key,
                &locator,
            )
            .unwrap();

        let checker = Checker::new();
        let mut ctx = AuthContext::new();
        ctx.declared.insert("user".to_string(), "bob".to_string());
        let acquirer = InProcessAcquirer {
            key: &bs_key,
            checker: &checker,
            ctx: &ctx,
            locator: &locator,
        };
        let discharges = discharge_all(&primary, None, &checker, &ctx, &locator, &acquirer).unwrap();
        assert_eq!(1, discharges.len());

        let verifier = Verifier::default();
        verifier
            .verify(
                primary.underlying(),
                &root_key,
                discharges.iter().map(|d| d.underlying().clone()).collect(),
            )
            .unwrap();
    }

    #[test]
    fn discharge_bound_to_wrong_primary_fails() {
        let root_key = MacaroonKey::generate(b"ts root");
        let ts_key = PrivateKey::generate();
        let bs_key = PrivateKey::generate();

        let locator = MemoryThirdPartyLocator::new();
        locator.add_info(
            "https://bs.example",
            ThirdPartyInfo {
                version: 3,
                public_key: bs_key.public_key(),
            },
        );

        let inner = crate::macaroon::Macaroon::create(Some("ts".into()), &root_key, "id".into())
            .unwrap();
        let mut primary = Macaroon::new(inner, wrapper::LATEST_VERSION, crate::namespace::Namespace::new());
        primary
            .add_caveat(
                &Caveat::third_party("https://bs.example", "declared user bob"),
                &ts_key,
                &locator,
            )
            .unwrap();

        let checker = Checker::new();
        let mut ctx = AuthContext::new();
        ctx.declared.insert("user".to_string(), "bob".to_string());
        let acquirer = InProcessAcquirer {
            key: &bs_key,
            checker: &checker,
            ctx: &ctx,
            locator: &locator,
        };
        let discharges = discharge_all(&primary, None, &checker, &ctx, &locator, &acquirer).unwrap();

        let bogus_root = MacaroonKey::generate(b"bogus");
        let bogus_inner =
            crate::macaroon::Macaroon::create(Some("ts".into()), &bogus_root, "id".into()).unwrap();
        let bogus = Macaroon::new(bogus_inner, wrapper::LATEST_VERSION, crate::namespace::Namespace::new());

        let verifier = Verifier::default();
        let result = verifier.verify(
            bogus.underlying(),
            &bogus_root,
            discharges.iter().map(|d| d.underlying().clone()).collect(),
        );
        assert!(result.is_err());
    }
}
