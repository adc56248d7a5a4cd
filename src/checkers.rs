//! First-party caveat checking: a namespaced predicate registry plus the
//! standard set of conditions (`time-before`, `declared`, `allow`, `deny`,
//! `error`).

use std::collections::HashMap;
use std::fmt;

use time::OffsetDateTime;

use crate::error::{BakeryError, BakeryResult};
use crate::namespace::Namespace;
use crate::ops::Operation;

/// Everything a check function needs to evaluate a condition: the current
/// time (injectable for tests), the operations being authorized, and any
/// attributes declared by discharged caveats so far.
#[derive(Clone, Debug, Default)]
pub struct AuthContext {
    pub now: Option<OffsetDateTime>,
    pub operations: Vec<Operation>,
    pub declared: HashMap<String, String>,
}

impl AuthContext {
    pub fn new() -> AuthContext {
        AuthContext::default()
    }

    pub fn with_clock(now: OffsetDateTime) -> AuthContext {
        AuthContext {
            now: Some(now),
            ..Default::default()
        }
    }

    pub fn current_time(&self) -> OffsetDateTime {
        self.now.unwrap_or_else(OffsetDateTime::now_utc)
    }
}

pub type CheckFn = Box<dyn Fn(&AuthContext, &str) -> BakeryResult<()> + Send + Sync>;

/// Splits a condition into `(predicate-with-prefix, argument)`.
fn split_condition(condition: &str) -> (&str, &str) {
    match condition.split_once(' ') {
        Some((name, arg)) => (name, arg),
        None => (condition, ""),
    }
}

/// Splits a (possibly prefixed) predicate name into `(prefix, bare_name)`.
fn split_prefix(name: &str) -> (&str, &str) {
    match name.split_once(':') {
        Some((prefix, bare)) => (prefix, bare),
        None => ("", name),
    }
}

/// A registry of `(schema URI, name) -> check function`, plus the namespace
/// that maps URIs to the prefixes conditions are expected to carry.
pub struct Checker {
    namespace: Namespace,
    checks: HashMap<(String, String), CheckFn>,
}

impl Checker {
    /// A checker with only the standard namespace registered, no predicates.
    pub fn empty() -> Checker {
        let mut namespace = Namespace::new();
        namespace.register("std", "");
        Checker {
            namespace,
            checks: HashMap::new(),
        }
    }

    /// A checker with the standard namespace and standard predicates
    /// (`time-before`, `declared`, `allow`, `deny`, `error`) registered.
    pub fn new() -> Checker {
        let mut checker = Checker::empty();
        checker.register_std();
        checker
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Registers `name` (under schema `schema_uri`) with `check`.
    ///
    /// Errors if `schema_uri` has no registered prefix, if `name` is already
    /// registered under that URI, or if `name` contains a colon while the
    /// URI's prefix is empty (that form is reserved for `prefix:name`).
    pub fn register(
        &mut self,
        name: &str,
        schema_uri: &str,
        check: CheckFn,
    ) -> BakeryResult<()> {
        let prefix = self
            .namespace
            .prefix(schema_uri)
            .ok_or_else(|| {
                BakeryError::Verification(format!("no prefix registered for {}", schema_uri))
            })?
            .to_string();
        if prefix.is_empty() && name.contains(':') {
            return Err(BakeryError::Verification(format!(
                "{} is not allowed in an unprefixed checker name",
                name
            )));
        }
        let key = (schema_uri.to_string(), name.to_string());
        if self.checks.contains_key(&key) {
            return Err(BakeryError::Verification(format!(
                "{} already registered for {}",
                name, schema_uri
            )));
        }
        self.checks.insert(key, check);
        Ok(())
    }

    fn register_std(&mut self) {
        self.register(
            "time-before",
            "std",
            Box::new(|ctx, arg| {
                let deadline = time::OffsetDateTime::parse(
                    arg.trim(),
                    &time::format_description::well_known::Rfc3339,
                )
                .map_err(|e| BakeryError::Verification(format!("invalid time-before: {}", e)))?;
                if ctx.current_time() < deadline {
                    Ok(())
                } else {
                    Err(BakeryError::Verification(String::from("macaroon has expired")))
                }
            }),
        )
        .expect("std checkers register cleanly");
        self.register(
            "declared",
            "std",
            Box::new(|ctx, arg| {
                let (key, value) = arg
                    .split_once(' ')
                    .ok_or_else(|| BakeryError::Verification(String::from("malformed declared caveat")))?;
                match ctx.declared.get(key) {
                    Some(declared) if declared == value => Ok(()),
                    Some(_) => Err(BakeryError::Verification(format!(
                        "declared caveat {:?} not satisfied",
                        key
                    ))),
                    None => Err(BakeryError::Verification(format!(
                        "declared caveat {:?} not satisfied",
                        key
                    ))),
                }
            }),
        )
        .expect("std checkers register cleanly");
        self.register(
            "allow",
            "std",
            Box::new(|ctx, arg| check_op_list(ctx, arg, true)),
        )
        .expect("std checkers register cleanly");
        self.register(
            "deny",
            "std",
            Box::new(|ctx, arg| check_op_list(ctx, arg, false)),
        )
        .expect("std checkers register cleanly");
        self.register(
            "error",
            "std",
            Box::new(|_ctx, arg| Err(BakeryError::Verification(arg.to_string()))),
        )
        .expect("std checkers register cleanly");
    }

    /// Parses `condition`, resolves its namespace prefix, and runs the
    /// registered check function. Unsatisfied conditions and unrecognized
    /// conditions both surface as an error.
    pub fn check(&self, ctx: &AuthContext, condition: &str) -> BakeryResult<()> {
        let (name, arg) = split_condition(condition);
        let (prefix, bare_name) = split_prefix(name);
        let uri = self.namespace.resolve(prefix).ok_or_else(|| {
            BakeryError::CaveatNotRecognized(format!("unknown namespace prefix {:?}", prefix))
        })?;
        let check = self
            .checks
            .get(&(uri.to_string(), bare_name.to_string()))
            .ok_or_else(|| {
                BakeryError::CaveatNotRecognized(format!("caveat {:?} not recognized", condition))
            })?;
        check(ctx, arg)
    }
}

impl Default for Checker {
    fn default() -> Self {
        Checker::new()
    }
}

impl fmt::Debug for Checker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checker")
            .field("namespace", &self.namespace)
            .field("registered", &self.checks.len())
            .finish()
    }
}

fn check_op_list(ctx: &AuthContext, arg: &str, allow: bool) -> BakeryResult<()> {
    let listed: Vec<&str> = arg.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    let matches = ctx
        .operations
        .iter()
        .any(|op| listed.contains(&op.action.as_str()));
    if allow == matches {
        Ok(())
    } else if allow {
        Err(BakeryError::Verification(String::from(
            "operation not in allow list",
        )))
    } else {
        Err(BakeryError::Verification(String::from(
            "operation in deny list",
        )))
    }
}
