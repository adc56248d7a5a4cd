//! Authorizer: decides whether an identity may perform an operation the
//! presented macaroons didn't already cover, optionally attaching further
//! caveats to a freshly minted macaroon instead of an outright denial.

use std::collections::HashMap;

use crate::error::BakeryResult;
use crate::identity::Identity;
use crate::ops::Operation;
use crate::wrapper::Caveat;

pub trait Authorizer: Send + Sync {
    /// Returns `(allowed, caveats)`. `caveats` are only meaningful when
    /// `allowed` is true: extra restrictions to bake into the macaroon that
    /// will grant `op` (e.g. a time-before expiry narrower than the
    /// request's).
    fn authorize(
        &self,
        identity: Option<&dyn Identity>,
        op: &Operation,
    ) -> BakeryResult<(bool, Vec<Caveat>)>;
}

/// Allows every operation unconditionally, with no extra caveats.
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(
        &self,
        _identity: Option<&dyn Identity>,
        _op: &Operation,
    ) -> BakeryResult<(bool, Vec<Caveat>)> {
        Ok((true, Vec::new()))
    }
}

/// Denies every operation.
pub struct DenyAll;

impl Authorizer for DenyAll {
    fn authorize(
        &self,
        _identity: Option<&dyn Identity>,
        _op: &Operation,
    ) -> BakeryResult<(bool, Vec<Caveat>)> {
        Ok((false, Vec::new()))
    }
}

/// Authorizes an operation iff the identity is an [`AclIdentity`] that
/// allows at least one ACL entry registered for that operation's entity.
/// Operations with no registered ACL entry are denied.
#[derive(Default)]
pub struct AclAuthorizer {
    acls: HashMap<String, Vec<String>>,
}

impl AclAuthorizer {
    pub fn new() -> AclAuthorizer {
        AclAuthorizer::default()
    }

    pub fn allow(&mut self, entity: impl Into<String>, acl: Vec<String>) {
        self.acls.insert(entity.into(), acl);
    }
}

impl Authorizer for AclAuthorizer {
    fn authorize(
        &self,
        identity: Option<&dyn Identity>,
        op: &Operation,
    ) -> BakeryResult<(bool, Vec<Caveat>)> {
        let acl = match self.acls.get(&op.entity) {
            Some(acl) => acl,
            None => return Ok((false, Vec::new())),
        };
        let identity = match identity {
            Some(identity) => identity,
            None => return Ok((false, Vec::new())),
        };
        Ok((acl_allows(identity, acl)?, Vec::new()))
    }
}

/// Helper kept separate so callers with a concrete `AclIdentity` (not just
/// `dyn Identity`) can reuse the same ACL-matching logic.
pub fn acl_allows(identity: &dyn Identity, acl: &[String]) -> BakeryResult<bool> {
    if acl.iter().any(|entry| entry == "everyone") {
        return Ok(true);
    }
    Ok(acl.iter().any(|entry| *entry == identity.id()))
}
