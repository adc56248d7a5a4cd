//! Verifies a bundle of macaroon stacks against a requested operation list,
//! deriving an identity and surfacing a fresh macaroon when some requested
//! operation isn't yet covered.

use std::collections::HashMap;
use std::fmt;

use time::OffsetDateTime;

use crate::checkers::{AuthContext, Checker};
use crate::error::{BakeryError, BakeryResult};
use crate::identity::{Identity, IdentityClient};
use crate::authorizer::Authorizer;
use crate::ops::Operation;
use crate::oven::Oven;
use crate::wrapper::{Caveat, Macaroon};

/// A macaroon together with whatever discharges were presented alongside it.
pub struct MacaroonStack {
    pub primary: Macaroon,
    pub discharges: Vec<Macaroon>,
}

impl MacaroonStack {
    pub fn new(primary: Macaroon, discharges: Vec<Macaroon>) -> MacaroonStack {
        MacaroonStack { primary, discharges }
    }

    fn inner_discharges(&self) -> Vec<crate::macaroon::Macaroon> {
        self.discharges.iter().map(|d| d.underlying().clone()).collect()
    }
}

/// Carries the fresh macaroon a caller must discharge (or present caveats
/// for) before the requested operations can be authorized.
pub struct DischargeRequiredError {
    pub macaroon: Macaroon,
    pub ops: Vec<Operation>,
}

impl fmt::Debug for DischargeRequiredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DischargeRequiredError")
            .field("ops", &self.ops)
            .finish()
    }
}

/// The result of a successful authorization.
pub struct AuthInfo {
    pub identity: Option<Box<dyn Identity>>,
    pub used_ops: Vec<Operation>,
}

impl fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInfo")
            .field("identity", &self.identity.as_ref().map(|i| i.id()))
            .field("used_ops", &self.used_ops)
            .finish()
    }
}

struct UsableStack {
    ops: Vec<Operation>,
}

/// How long a fresh discharge-required macaroon is minted to live for, absent
/// any narrower expiry requested by an authorizer-supplied caveat.
const DEFAULT_DISCHARGE_TTL: time::Duration = time::Duration::minutes(5);

/// Verifies presented macaroon stacks and authorizes a requested operation
/// list, consulting a [`Checker`] for first-party conditions, an
/// [`IdentityClient`] for identity derivation, and an [`Authorizer`] for
/// operations no presented stack already covers.
pub struct AuthChecker<'a> {
    pub oven: &'a Oven,
    pub checker: &'a Checker,
    pub identity_client: &'a dyn IdentityClient,
    pub authorizer: &'a dyn Authorizer,
    pub now: Option<OffsetDateTime>,
}

impl<'a> AuthChecker<'a> {
    pub fn new(
        oven: &'a Oven,
        checker: &'a Checker,
        identity_client: &'a dyn IdentityClient,
        authorizer: &'a dyn Authorizer,
    ) -> AuthChecker<'a> {
        AuthChecker {
            oven,
            checker,
            identity_client,
            authorizer,
            now: None,
        }
    }

    pub fn with_clock(mut self, now: OffsetDateTime) -> AuthChecker<'a> {
        self.now = Some(now);
        self
    }

    pub fn authorize(
        &self,
        stacks: &[MacaroonStack],
        ops: Vec<Operation>,
    ) -> BakeryResult<AuthInfo> {
        // Unverified -> Verified: decode each stack, dropping any that fail
        // the cryptographic chain. Surviving stacks carry their recovered
        // ops plus every first-party condition (primary's and discharges').
        let mut decoded: Vec<(Vec<Operation>, Vec<String>)> = Vec::new();
        for stack in stacks {
            if let Ok(pair) = self
                .oven
                .macaroon_ops(&stack.primary, &stack.inner_discharges())
            {
                decoded.push(pair);
            }
        }

        // `need-declared` inference: collate `declared key value` conditions
        // across the whole bundle before anything else is checked. A key
        // with conflicting values anywhere is dropped entirely rather than
        // resolved to either value.
        let mut declared: HashMap<String, String> = HashMap::new();
        let mut conflicting: std::collections::HashSet<String> = std::collections::HashSet::new();
        for (_, conditions) in &decoded {
            for condition in conditions {
                if let Some(rest) = condition.strip_prefix("declared ") {
                    if let Some((key, value)) = rest.split_once(' ') {
                        match declared.get(key) {
                            Some(existing) if existing != value => {
                                conflicting.insert(key.to_string());
                            }
                            _ => {
                                declared.insert(key.to_string(), value.to_string());
                            }
                        }
                    }
                }
            }
        }
        for key in &conflicting {
            declared.remove(key);
        }

        let ctx = AuthContext {
            now: self.now,
            operations: ops.clone(),
            declared,
        };

        let mut usable_stacks = Vec::new();
        for (stack_ops, conditions) in decoded {
            let usable = conditions
                .iter()
                .all(|condition| self.checker.check(&ctx, condition).is_ok());
            if usable {
                usable_stacks.push(UsableStack { ops: stack_ops });
            }
        }

        let (context_identity, mut extra_caveats) = self.identity_client.identity_from_context(&ctx)?;
        let identity = match context_identity {
            Some(identity) => Some(identity),
            None => {
                let has_login = usable_stacks
                    .iter()
                    .any(|stack| stack.ops.iter().any(Operation::is_login));
                if has_login {
                    self.identity_client.declared_identity(&ctx.declared).ok()
                } else {
                    None
                }
            }
        };

        let mut unsatisfied_ops = Vec::new();
        for op in &ops {
            let covered = usable_stacks.iter().any(|stack| stack.ops.contains(op));
            if covered {
                continue;
            }
            let (allowed, caveats) = self
                .authorizer
                .authorize(identity.as_deref(), op)?;
            if allowed {
                continue;
            }
            extra_caveats.extend(caveats);
            unsatisfied_ops.push(op.clone());
        }

        if unsatisfied_ops.is_empty() {
            return Ok(AuthInfo {
                identity,
                used_ops: ops,
            });
        }

        let expiry = ctx.current_time() + DEFAULT_DISCHARGE_TTL;
        let macaroon = self.oven.mint(expiry, unsatisfied_ops.clone(), extra_caveats)?;
        Err(BakeryError::DischargeRequired(Box::new(DischargeRequiredError {
            macaroon,
            ops: unsatisfied_ops,
        })))
    }
}

/// Convenience re-export so callers building extra caveats for an
/// [`Authorizer`] don't need to reach into [`crate::wrapper`] directly.
pub type ExtraCaveat = Caveat;
