//! Authorization gate.
//!
//! Consulted once per command, before anything is written. The decision is
//! a pure function of the actor's membership row and the policy table.

use anyhow::Result;
use corkboard_common::Capability;

use super::models::Member;
use crate::errors::{BoardError, DenyReason};

/// Source of (board, user) membership rows.
pub trait MembershipLookup {
    fn membership(&self, board_id: i64, user_id: i64) -> Result<Option<Member>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Convert to a `Result`, attaching the board for the error message.
    pub fn into_result(self, board_id: i64) -> Result<(), BoardError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(BoardError::Denied { board_id, reason }),
        }
    }
}

pub fn authorize(membership: Option<&Member>, capability: Capability) -> Decision {
    match membership {
        None => Decision::Deny(DenyReason::NotMember),
        Some(member) if member.role.grants(capability) => Decision::Allow,
        Some(member) => Decision::Deny(DenyReason::MissingCapability {
            role: member.role,
            capability,
        }),
    }
}

/// Look up the actor's membership and decide.
pub fn check<L: MembershipLookup + ?Sized>(
    lookup: &L,
    board_id: i64,
    user_id: i64,
    capability: Capability,
) -> Result<(), BoardError> {
    let membership = lookup.membership(board_id, user_id)?;
    authorize(membership.as_ref(), capability).into_result(board_id)
}
