//! Static role → capability table.
//!
//! Every board member holds exactly one [`Role`]. [`Role::grants`] is an
//! exhaustive match over every (role, capability) pair, so adding a
//! capability without deciding it for each role does not compile.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Admin, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Whether this role holds `capability`.
    pub fn grants(&self, capability: Capability) -> bool {
        use Capability::*;
        match (self, capability) {
            (Role::Admin, _) => true,
            (Role::User, RemoveMember | ChangeMemberRole | DeleteBoard) => false,
            (
                Role::User,
                ViewBoard
                | UpdateBoard
                | InviteMember
                | CreateColumn
                | UpdateColumn
                | MoveColumn
                | ArchiveColumn
                | DeleteColumn
                | CreateCard
                | UpdateCard
                | MoveCard
                | ArchiveCard
                | DeleteCard
                | CreateLabel
                | UpdateLabel
                | DeleteLabel
                | AssignLabel
                | CreateChecklist
                | DeleteChecklist
                | MoveChecklist
                | CreateChecklistItem
                | UpdateChecklistItem
                | MoveChecklistItem
                | DeleteChecklistItem
                | ManageAutomations,
            ) => true,
        }
    }

    /// All capabilities this role holds, in declaration order.
    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .iter()
            .copied()
            .filter(|c| self.grants(*c))
            .collect()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// A single named permission checked before a command is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewBoard,
    UpdateBoard,
    DeleteBoard,
    InviteMember,
    RemoveMember,
    ChangeMemberRole,
    CreateColumn,
    UpdateColumn,
    MoveColumn,
    ArchiveColumn,
    DeleteColumn,
    CreateCard,
    UpdateCard,
    MoveCard,
    ArchiveCard,
    DeleteCard,
    CreateLabel,
    UpdateLabel,
    DeleteLabel,
    AssignLabel,
    CreateChecklist,
    DeleteChecklist,
    MoveChecklist,
    CreateChecklistItem,
    UpdateChecklistItem,
    MoveChecklistItem,
    DeleteChecklistItem,
    ManageAutomations,
}

impl Capability {
    pub const ALL: [Capability; 28] = [
        Capability::ViewBoard,
        Capability::UpdateBoard,
        Capability::DeleteBoard,
        Capability::InviteMember,
        Capability::RemoveMember,
        Capability::ChangeMemberRole,
        Capability::CreateColumn,
        Capability::UpdateColumn,
        Capability::MoveColumn,
        Capability::ArchiveColumn,
        Capability::DeleteColumn,
        Capability::CreateCard,
        Capability::UpdateCard,
        Capability::MoveCard,
        Capability::ArchiveCard,
        Capability::DeleteCard,
        Capability::CreateLabel,
        Capability::UpdateLabel,
        Capability::DeleteLabel,
        Capability::AssignLabel,
        Capability::CreateChecklist,
        Capability::DeleteChecklist,
        Capability::MoveChecklist,
        Capability::CreateChecklistItem,
        Capability::UpdateChecklistItem,
        Capability::MoveChecklistItem,
        Capability::DeleteChecklistItem,
        Capability::ManageAutomations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewBoard => "view_board",
            Self::UpdateBoard => "update_board",
            Self::DeleteBoard => "delete_board",
            Self::InviteMember => "invite_member",
            Self::RemoveMember => "remove_member",
            Self::ChangeMemberRole => "change_member_role",
            Self::CreateColumn => "create_column",
            Self::UpdateColumn => "update_column",
            Self::MoveColumn => "move_column",
            Self::ArchiveColumn => "archive_column",
            Self::DeleteColumn => "delete_column",
            Self::CreateCard => "create_card",
            Self::UpdateCard => "update_card",
            Self::MoveCard => "move_card",
            Self::ArchiveCard => "archive_card",
            Self::DeleteCard => "delete_card",
            Self::CreateLabel => "create_label",
            Self::UpdateLabel => "update_label",
            Self::DeleteLabel => "delete_label",
            Self::AssignLabel => "assign_label",
            Self::CreateChecklist => "create_checklist",
            Self::DeleteChecklist => "delete_checklist",
            Self::MoveChecklist => "move_checklist",
            Self::CreateChecklistItem => "create_checklist_item",
            Self::UpdateChecklistItem => "update_checklist_item",
            Self::MoveChecklistItem => "move_checklist_item",
            Self::DeleteChecklistItem => "delete_checklist_item",
            Self::ManageAutomations => "manage_automations",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN_ONLY: [Capability; 3] = [
        Capability::RemoveMember,
        Capability::ChangeMemberRole,
        Capability::DeleteBoard,
    ];

    #[test]
    fn admin_holds_every_capability() {
        for cap in Capability::ALL {
            assert!(Role::Admin.grants(cap), "admin should hold {}", cap);
        }
    }

    #[test]
    fn user_holds_everything_but_admin_only() {
        for cap in Capability::ALL {
            assert_eq!(
                Role::User.grants(cap),
                !ADMIN_ONLY.contains(&cap),
                "unexpected grant for user/{}",
                cap
            );
        }
    }

    #[test]
    fn capability_list_matches_grants() {
        assert_eq!(Role::Admin.capabilities().len(), Capability::ALL.len());
        assert_eq!(
            Role::User.capabilities().len(),
            Capability::ALL.len() - ADMIN_ONLY.len()
        );
    }

    #[test]
    fn capability_names_are_unique() {
        let mut names: Vec<&str> = Capability::ALL.iter().map(|c| c.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Capability::ALL.len());
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Capability::ChangeMemberRole).unwrap();
        assert_eq!(json, "\"change_member_role\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }
}
