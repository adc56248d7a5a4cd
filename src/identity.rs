//! Identity: the result of authenticating a request, and the client
//! interface that derives one from context or from declared caveats.

use std::collections::HashMap;
use std::fmt;

use crate::checkers::AuthContext;
use crate::error::BakeryResult;
use crate::wrapper::Caveat;

/// An authenticated principal. Opaque beyond its id: callers that need ACL
/// checks implement [`AclIdentity`] as well.
pub trait Identity: fmt::Debug + Send + Sync {
    fn id(&self) -> String;

    fn domain(&self) -> Option<String> {
        None
    }
}

/// An [`Identity`] that can answer ACL membership questions directly,
/// without the Authorizer needing to know its concrete type.
pub trait AclIdentity: Identity {
    fn allow(&self, acls: &[String]) -> BakeryResult<bool>;
}

/// The simplest possible identity: just an id, no ACL capability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimpleIdentity {
    id: String,
}

impl SimpleIdentity {
    pub fn new(id: impl Into<String>) -> SimpleIdentity {
        SimpleIdentity { id: id.into() }
    }
}

impl Identity for SimpleIdentity {
    fn id(&self) -> String {
        self.id.clone()
    }
}

/// Converts request context (cookies, headers — opaque to this crate) or a
/// macaroon's declared attributes into an [`Identity`].
pub trait IdentityClient: Send + Sync {
    /// Tries to derive an identity from context alone (e.g. a session
    /// cookie outside of any macaroon). Returns `(None, caveats)` when no
    /// identity can be derived this way; `caveats` are then the third-party
    /// caveats a login macaroon must carry to obtain one (e.g. an
    /// `is-authenticated-user` caveat addressed to an identity service).
    fn identity_from_context(
        &self,
        ctx: &AuthContext,
    ) -> BakeryResult<(Option<Box<dyn Identity>>, Vec<Caveat>)>;

    /// Derives an identity from a login macaroon's declared attributes.
    fn declared_identity(
        &self,
        declared: &HashMap<String, String>,
    ) -> BakeryResult<Box<dyn Identity>>;
}

/// An `IdentityClient` that only ever derives identity from the `user`
/// declared attribute, never from context. Useful for tests and for
/// services with no separate session mechanism.
pub struct DeclaredIdentityClient;

impl IdentityClient for DeclaredIdentityClient {
    fn identity_from_context(
        &self,
        _ctx: &AuthContext,
    ) -> BakeryResult<(Option<Box<dyn Identity>>, Vec<Caveat>)> {
        Ok((None, Vec::new()))
    }

    fn declared_identity(
        &self,
        declared: &HashMap<String, String>,
    ) -> BakeryResult<Box<dyn Identity>> {
        match declared.get("user") {
            Some(user) => Ok(Box::new(SimpleIdentity::new(user.clone()))),
            None => Err(crate::error::BakeryError::IdentityError(String::from(
                "no user declared",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_identity_client_reads_user() {
        let client = DeclaredIdentityClient;
        let mut declared = HashMap::new();
        declared.insert("user".to_string(), "alice".to_string());
        let identity = client.declared_identity(&declared).unwrap();
        assert_eq!("alice", identity.id());
    }

    #[test]
    fn declared_identity_client_errors_without_user() {
        let client = DeclaredIdentityClient;
        assert!(client.declared_identity(&HashMap::new()).is_err());
    }
}
