//! Top-level convenience wrapper bundling an oven, checker, identity client,
//! and authorizer into the one object a service actually holds onto.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::authchecker::{AuthChecker, AuthInfo, MacaroonStack};
use crate::authorizer::Authorizer;
use crate::checkers::Checker;
use crate::crypto::bakery_key::PrivateKey;
use crate::error::BakeryResult;
use crate::identity::IdentityClient;
use crate::ops::Operation;
use crate::oven::Oven;
use crate::store::{OpsStore, RootKeyStore, ThirdPartyLocator};
use crate::wrapper::{Caveat, Macaroon};

/// A minting-and-checking pair for one service: wraps an [`Oven`] and the
/// [`Checker`]/[`IdentityClient`]/[`Authorizer`] triple an [`AuthChecker`]
/// needs to evaluate presented macaroons.
pub struct Bakery {
    pub oven: Oven,
    pub checker: Checker,
    pub identity_client: Box<dyn IdentityClient>,
    pub authorizer: Box<dyn Authorizer>,
}

impl Bakery {
    pub fn new(
        location: impl Into<String>,
        key: PrivateKey,
        key_store: Arc<dyn RootKeyStore>,
        ops_store: Option<Arc<dyn OpsStore>>,
        locator: Arc<dyn ThirdPartyLocator>,
        identity_client: Box<dyn IdentityClient>,
        authorizer: Box<dyn Authorizer>,
    ) -> Bakery {
        Bakery {
            oven: Oven::new(location, key, key_store, ops_store, locator),
            checker: Oven::checker(),
            identity_client,
            authorizer,
        }
    }

    pub fn mint(
        &self,
        expiry: OffsetDateTime,
        ops: Vec<Operation>,
        extra_caveats: Vec<Caveat>,
    ) -> BakeryResult<Macaroon> {
        self.oven.mint(expiry, ops, extra_caveats)
    }

    pub fn checker_with_clock(&self, now: OffsetDateTime) -> AuthChecker<'_> {
        AuthChecker::new(
            &self.oven,
            &self.checker,
            self.identity_client.as_ref(),
            self.authorizer.as_ref(),
        )
        .with_clock(now)
    }

    pub fn authorize(
        &self,
        now: OffsetDateTime,
        stacks: &[MacaroonStack],
        ops: Vec<Operation>,
    ) -> BakeryResult<AuthInfo> {
        self.checker_with_clock(now).authorize(stacks, ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::AllowAll;
    use crate::identity::DeclaredIdentityClient;
    use crate::store::{MemoryKeyStore, MemoryOpsStore, MemoryThirdPartyLocator};
    use time::macros::datetime;

    #[test]
    fn mints_and_authorizes_via_the_bundled_components() {
        let bakery = Bakery::new(
            "https://bakerytest.example",
            PrivateKey::generate(),
            Arc::new(MemoryKeyStore::new()),
            Some(Arc::new(MemoryOpsStore::new())),
            Arc::new(MemoryThirdPartyLocator::new()),
            Box::new(DeclaredIdentityClient),
            Box::new(AllowAll),
        );
        let op = Operation::new("thing", "read").unwrap();
        let macaroon = bakery
            .mint(datetime!(2030-01-01 0:00 UTC), vec![op.clone()], Vec::new())
            .unwrap();
        let stacks = vec![MacaroonStack::new(macaroon, Vec::new())];
        let info = bakery
            .authorize(datetime!(2020-01-01 0:00 UTC), &stacks, vec![op.clone()])
            .unwrap();
        assert_eq!(vec![op], info.used_ops);
    }
}
