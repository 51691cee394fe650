//! Typed errors for the board core.
//!
//! `BoardError` is what a command returns to its caller. Store failures are
//! carried as `Internal` (the transaction they happened in is rolled back).
//! `AutomationActionFailed` is only ever logged by the automation engine.

use corkboard_common::{Capability, Role};
use serde::Serialize;
use thiserror::Error;

use crate::board::models::EntityKind;

/// Why the authorization gate refused a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    NotMember,
    MissingCapability { role: Role, capability: Capability },
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotMember => f.write_str("not a member"),
            Self::MissingCapability { role, capability } => {
                write!(f, "role {} lacks capability {}", role, capability)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Access to board {board_id} denied: {reason}")]
    Denied { board_id: i64, reason: DenyReason },

    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: i64 },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Automation rule {rule_id} action #{action_index} failed: {reason}")]
    AutomationActionFailed {
        rule_id: i64,
        action_index: usize,
        reason: String,
    },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BoardError {
    pub fn not_found(entity: EntityKind, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidCommand(message.into())
    }

    /// True when the actor is not a member of the board at all.
    pub fn is_not_member(&self) -> bool {
        matches!(
            self,
            Self::Denied {
                reason: DenyReason::NotMember,
                ..
            }
        )
    }
}
