//! Operations: `(entity, action)` pairs an authorization request is checked
//! against, plus the canonicalization the Oven and AuthChecker rely on.

use std::fmt;

use crate::error::{BakeryError, BakeryResult};

pub const LOGIN_ENTITY: &str = "login";
pub const LOGIN_ACTION: &str = "login";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Operation {
    pub entity: String,
    pub action: String,
}

impl Operation {
    pub fn new(entity: impl Into<String>, action: impl Into<String>) -> BakeryResult<Operation> {
        let entity = entity.into();
        if entity.contains(' ') {
            return Err(BakeryError::Verification(String::from(
                "operation entity must not contain spaces",
            )));
        }
        Ok(Operation {
            entity,
            action: action.into(),
        })
    }

    /// The sentinel operation that triggers identity-only authorization: no
    /// resource is being accessed, only a login is being asserted.
    pub fn login() -> Operation {
        Operation {
            entity: LOGIN_ENTITY.to_string(),
            action: LOGIN_ACTION.to_string(),
        }
    }

    pub fn is_login(&self) -> bool {
        self.entity == LOGIN_ENTITY && self.action == LOGIN_ACTION
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.entity, self.action)
    }
}

/// Sorts by `(entity, action)` and removes duplicates. Idempotent: calling
/// this again on its own output returns an equal list.
pub fn canonical_ops(mut ops: Vec<Operation>) -> Vec<Operation> {
    ops.sort();
    ops.dedup();
    ops
}
