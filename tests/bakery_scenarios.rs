//! End-to-end scenarios exercising the bakery layer (oven, checker,
//! discharge engine, auth checker) together rather than module by module.

use std::sync::Arc;

use macaroon::agent::{Agent, AgentAuthInfo};
use macaroon::authchecker::{AuthChecker, MacaroonStack};
use macaroon::authorizer::{AclAuthorizer, AllowAll};
use macaroon::checkers::{AuthContext, Checker};
use macaroon::crypto::bakery_key::PrivateKey;
use macaroon::discharge::{discharge, discharge_all, DischargeAcquirer};
use macaroon::error::BakeryError;
use macaroon::identity::DeclaredIdentityClient;
use macaroon::ops::Operation;
use macaroon::oven::Oven;
use macaroon::store::{MemoryKeyStore, MemoryOpsStore, MemoryThirdPartyLocator, ThirdPartyInfo};
use macaroon::wrapper::{self, Caveat, Macaroon};
use macaroon::ByteString;
use time::macros::datetime;

fn test_oven(locator: Arc<MemoryThirdPartyLocator>) -> Oven {
    Oven::new(
        "https://auth.example",
        PrivateKey::generate(),
        Arc::new(MemoryKeyStore::new()),
        Some(Arc::new(MemoryOpsStore::new())),
        locator,
    )
}

struct LocalAcquirer<'a> {
    key: &'a PrivateKey,
    checker: &'a Checker,
    ctx: &'a AuthContext,
    locator: &'a MemoryThirdPartyLocator,
}

impl<'a> DischargeAcquirer for LocalAcquirer<'a> {
    fn acquire(
        &self,
        _location: &str,
        id: &ByteString,
        payload: &[u8],
    ) -> macaroon::error::BakeryResult<Macaroon> {
        discharge(id.clone(), payload, self.key, self.checker, self.ctx, self.locator)
    }
}

// S1: a single-service, first-party-only macaroon authorizes the operation
// it was minted for and nothing else.
#[test]
fn s1_first_party_single_service() {
    let locator = Arc::new(MemoryThirdPartyLocator::new());
    let oven = test_oven(locator);
    let read = Operation::new("doc-1", "read").unwrap();
    let write = Operation::new("doc-1", "write").unwrap();

    let macaroon = oven
        .mint(datetime!(2030-01-01 0:00 UTC), vec![read.clone()], Vec::new())
        .unwrap();

    let checker = Checker::new();
    let identity_client = DeclaredIdentityClient;
    let authorizer = AclAuthorizer::new();
    let auth_checker = AuthChecker::new(&oven, &checker, &identity_client, &authorizer)
        .with_clock(datetime!(2020-01-01 0:00 UTC));
    let stacks = vec![MacaroonStack::new(macaroon, Vec::new())];

    let info = auth_checker.authorize(&stacks, vec![read.clone()]).unwrap();
    assert_eq!(vec![read], info.used_ops);

    match auth_checker.authorize(&stacks, vec![write]) {
        Err(BakeryError::DischargeRequired(_)) => {}
        other => panic!(
            "expected discharge required for uncovered op, got ok={:?}",
            other.is_ok()
        ),
    }
}

// S2: a primary macaroon with a third-party caveat authorizes only once the
// matching discharge is presented alongside it.
#[test]
fn s2_three_party_discharge_required_then_satisfied() {
    let locator = Arc::new(MemoryThirdPartyLocator::new());
    let bs_key = PrivateKey::generate();
    locator.add_info(
        "https://idp.example",
        ThirdPartyInfo {
            version: 3,
            public_key: bs_key.public_key(),
        },
    );
    let oven = test_oven(locator.clone());
    let op = Operation::new("doc-1", "read").unwrap();

    let primary = oven
        .mint(
            datetime!(2030-01-01 0:00 UTC),
            vec![op.clone()],
            vec![Caveat::third_party("https://idp.example", "declared user alice")],
        )
        .unwrap();

    let checker = Checker::new();
    let identity_client = DeclaredIdentityClient;
    let authorizer = AllowAll;
    let auth_checker = AuthChecker::new(&oven, &checker, &identity_client, &authorizer)
        .with_clock(datetime!(2020-01-01 0:00 UTC));

    // Without the discharge, the stack isn't usable.
    let bare_stacks = vec![MacaroonStack::new(primary.clone(), Vec::new())];
    match auth_checker.authorize(&bare_stacks, vec![op.clone()]) {
        Err(BakeryError::DischargeRequired(_)) => {}
        other => panic!("expected discharge required, got ok={:?}", other.is_ok()),
    }

    // Acquire the discharge and authorize again, this time successfully.
    let mut discharge_ctx = AuthContext::new();
    discharge_ctx.declared.insert("user".to_string(), "alice".to_string());
    let acquirer = LocalAcquirer {
        key: &bs_key,
        checker: &checker,
        ctx: &discharge_ctx,
        locator: &locator,
    };
    let discharges = discharge_all(&primary, None, &checker, &discharge_ctx, &*locator, &acquirer).unwrap();

    let stacks = vec![MacaroonStack::new(primary, discharges)];
    let info = auth_checker.authorize(&stacks, vec![op.clone()]).unwrap();
    assert_eq!(vec![op], info.used_ops);
}

// S3: a discharge bound to one primary macaroon must not verify against a
// different primary, even one minted for the same operation.
#[test]
fn s3_discharge_bound_to_wrong_primary_is_rejected() {
    let locator = Arc::new(MemoryThirdPartyLocator::new());
    let bs_key = PrivateKey::generate();
    locator.add_info(
        "https://idp.example",
        ThirdPartyInfo {
            version: 3,
            public_key: bs_key.public_key(),
        },
    );
    let oven = test_oven(locator.clone());
    let op = Operation::new("doc-1", "read").unwrap();

    let primary = oven
        .mint(
            datetime!(2030-01-01 0:00 UTC),
            vec![op.clone()],
            vec![Caveat::third_party("https://idp.example", "declared user alice")],
        )
        .unwrap();

    let checker = Checker::new();
    let mut discharge_ctx = AuthContext::new();
    discharge_ctx.declared.insert("user".to_string(), "alice".to_string());
    let acquirer = LocalAcquirer {
        key: &bs_key,
        checker: &checker,
        ctx: &discharge_ctx,
        locator: &locator,
    };
    let discharges = discharge_all(&primary, None, &checker, &discharge_ctx, &*locator, &acquirer).unwrap();

    // A different primary, minted independently for the same operation,
    // never bound to these discharges.
    let other_primary = oven
        .mint(
            datetime!(2030-01-01 0:00 UTC),
            vec![op.clone()],
            vec![Caveat::third_party("https://idp.example", "declared user alice")],
        )
        .unwrap();

    let identity_client = DeclaredIdentityClient;
    let authorizer = AllowAll;
    let auth_checker = AuthChecker::new(&oven, &checker, &identity_client, &authorizer)
        .with_clock(datetime!(2020-01-01 0:00 UTC));
    let stacks = vec![MacaroonStack::new(other_primary, discharges)];
    match auth_checker.authorize(&stacks, vec![op]) {
        Err(BakeryError::DischargeRequired(_)) => {}
        other => panic!(
            "discharges bound to one primary must not validate another, got ok={:?}",
            other.is_ok()
        ),
    }
}

// S4: a discharger asked for a `need-declared` caveat attaches the declared
// values as first-party caveats on the discharge it mints.
#[test]
fn s4_need_declared_inference() {
    let locator = MemoryThirdPartyLocator::new();
    let bs_key = PrivateKey::generate();
    let ts_key = PrivateKey::generate();
    let checker = Checker::new();

    let mut ctx = AuthContext::new();
    ctx.declared.insert("user".to_string(), "bob".to_string());
    ctx.declared.insert("group".to_string(), "admins".to_string());
    ctx.operations.push(Operation::new("thing", "read").unwrap());

    let root_key = macaroon::MacaroonKey::generate(b"discharge root");
    let encoded = macaroon::codec::encode_v3(
        "need-declared user,group allow read",
        &root_key,
        &bs_key.public_key(),
        &ts_key,
        &macaroon::namespace::Namespace::new(),
    )
    .unwrap();

    let dm = discharge("cav-id".into(), &encoded, &bs_key, &checker, &ctx, &locator).unwrap();
    let conditions: Vec<String> = dm
        .underlying()
        .first_party_caveats()
        .into_iter()
        .filter_map(|c| {
            c.as_first_party()
                .map(|fp| String::from_utf8_lossy(fp.predicate().as_bytes()).into_owned())
        })
        .collect();
    assert!(conditions.contains(&"declared user bob".to_string()));
    assert!(conditions.contains(&"declared group admins".to_string()));
}

// S5: when two presented stacks declare conflicting values for the same
// key, that key is dropped from the collated context rather than resolved
// to either value, so a condition depending on it fails.
#[test]
fn s5_conflicting_declarations_are_dropped() {
    let locator = Arc::new(MemoryThirdPartyLocator::new());
    let oven = test_oven(locator);
    let op = Operation::new("thing", "read").unwrap();

    let m1 = oven
        .mint(
            datetime!(2030-01-01 0:00 UTC),
            vec![op.clone()],
            vec![Caveat::first_party("declared user alice")],
        )
        .unwrap();
    let m2 = oven
        .mint(
            datetime!(2030-01-01 0:00 UTC),
            vec![op.clone()],
            vec![Caveat::first_party("declared user bob")],
        )
        .unwrap();

    let checker = Checker::new();
    let identity_client = DeclaredIdentityClient;
    let authorizer = AllowAll;
    let auth_checker = AuthChecker::new(&oven, &checker, &identity_client, &authorizer)
        .with_clock(datetime!(2020-01-01 0:00 UTC));
    let stacks = vec![
        MacaroonStack::new(m1, Vec::new()),
        MacaroonStack::new(m2, Vec::new()),
    ];

    // Both stacks are individually unusable since `declared user <x>` no
    // longer matches the collated (dropped) value once a conflict appears,
    // so the op still requires a fresh discharge.
    match auth_checker.authorize(&stacks, vec![op]) {
        Err(BakeryError::DischargeRequired(_)) => {}
        other => panic!("expected discharge required, got ok={:?}", other.is_ok()),
    }
}

// S6: minting for a large operation list collapses into a single
// fingerprint, keeping the serialized macaroon's size roughly constant
// regardless of how many operations it actually covers.
#[test]
fn s6_huge_op_list_collapses_size() {
    let locator = Arc::new(MemoryThirdPartyLocator::new());
    let oven = test_oven(locator);

    let few = vec![Operation::new("e1", "read").unwrap()];
    let many: Vec<Operation> = (0..500)
        .map(|i| Operation::new(format!("entity-{}", i), "read").unwrap())
        .collect();

    let small = oven.mint(datetime!(2030-01-01 0:00 UTC), few, Vec::new()).unwrap();
    let large = oven.mint(datetime!(2030-01-01 0:00 UTC), many, Vec::new()).unwrap();

    let small_len = wrapper::serialize(&small).unwrap().len();
    let large_len = wrapper::serialize(&large).unwrap().len();
    // Collapse keeps the two within a small constant factor of each other,
    // rather than growing linearly with the operation count.
    assert!(large_len < small_len * 3, "large={} small={}", large_len, small_len);
}

// S7 / S8: a caller that never supplies a discharge keeps failing
// discharge_all rather than looping forever, the same "bounded retries"
// property the HTTP client enforces over the wire.
#[test]
fn s7_s8_discharge_without_acquirer_fails_cleanly() {
    let locator = Arc::new(MemoryThirdPartyLocator::new());
    let bs_key = PrivateKey::generate();
    locator.add_info(
        "https://idp.example",
        ThirdPartyInfo {
            version: 3,
            public_key: bs_key.public_key(),
        },
    );
    let oven = test_oven(locator.clone());
    let op = Operation::new("doc-1", "read").unwrap();

    let primary = oven
        .mint(
            datetime!(2030-01-01 0:00 UTC),
            vec![op],
            vec![Caveat::third_party("https://idp.example", "declared user alice")],
        )
        .unwrap();

    struct AlwaysFails;
    impl DischargeAcquirer for AlwaysFails {
        fn acquire(
            &self,
            location: &str,
            _id: &ByteString,
            _payload: &[u8],
        ) -> macaroon::error::BakeryResult<Macaroon> {
            Err(BakeryError::ThirdPartyInfoNotFound(location.to_string()))
        }
    }

    let checker = Checker::new();
    let ctx = AuthContext::new();
    let result = discharge_all(&primary, None, &checker, &ctx, &*locator, &AlwaysFails);
    assert!(result.is_err());
}

// S9: a V1-style identifier (`hex(key_id)-<uuid>`) round-trips through mint
// and macaroon_ops, confirming legacy clients that only understand the V1
// wire format can still be served.
#[test]
fn s9_v1_identifier_round_trips() {
    let locator = Arc::new(MemoryThirdPartyLocator::new());
    let oven = Oven {
        location: "https://auth.example".to_string(),
        key: PrivateKey::generate(),
        version: 1,
        key_store: Arc::new(MemoryKeyStore::new()),
        ops_store: Some(Arc::new(MemoryOpsStore::new())),
        locator,
    };
    let op = Operation::new("doc-1", "read").unwrap();
    let macaroon = oven
        .mint(datetime!(2030-01-01 0:00 UTC), vec![op.clone()], Vec::new())
        .unwrap();

    let text = String::from_utf8(macaroon.underlying().identifier().into_vec()).unwrap();
    let (hex_part, uuid_part) = text.split_once('-').unwrap();
    assert!(hex::decode(hex_part).is_ok());
    assert!(uuid::Uuid::parse_str(uuid_part).is_ok());

    let (ops, _conditions) = oven.macaroon_ops(&macaroon, &[]).unwrap();
    assert_eq!(vec![op], ops);
}

// Agent login round trip: a fixed keypair resolves which account to log in
// as by location, ignoring a trailing slash mismatch.
#[test]
fn agent_for_resolves_by_location_ignoring_trailing_slash() {
    let info = AgentAuthInfo {
        key: PrivateKey::generate(),
        agents: vec![Agent {
            url: "https://idp.example/".to_string(),
            username: "svc-account".to_string(),
        }],
    };
    let agent = info.agent_for("https://idp.example").unwrap();
    assert_eq!("svc-account", agent.username);
}
