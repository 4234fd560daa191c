use std::str::FromStr;

use crate::{errors::Error, Result};

// ============== Authorization ==============

/// Exact-match check of a sender against the single configured operator.
///
/// An empty operator id authorizes nobody.
pub fn is_authorized(sender: &str, operator_id: &str) -> bool {
    let operator_id = operator_id.trim();
    if operator_id.is_empty() {
        return false;
    }
    sender.trim() == operator_id
}

/// What to do with a message from anyone other than the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnauthorizedPolicy {
    /// Drop the message without replying.
    Silent,
    /// Reply with [`DENIAL_MESSAGE`].
    Reply,
}

pub const DENIAL_MESSAGE: &str = "⛔ Access denied. This bot only answers its operator.";

impl FromStr for UnauthorizedPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "silent" | "ignore" | "drop" => Ok(Self::Silent),
            "reply" | "deny" => Ok(Self::Reply),
            other => Err(Error::Config(format!(
                "UNAUTHORIZED_POLICY must be `silent` or `reply`, got {other:?}"
            ))),
        }
    }
}
