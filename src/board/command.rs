//! Typed commands: one variant per capability-gated operation.
//!
//! Input is assumed validated and the actor authenticated; the coordinator
//! only resolves which board a command touches and whether the actor may.

use corkboard_common::{Capability, Role};
use serde::{Deserialize, Deserializer, Serialize};

use super::automation::{Action, Trigger};
use super::models::EntityKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    RenameBoard {
        board_id: i64,
        name: String,
    },
    DeleteBoard {
        board_id: i64,
    },

    InviteMember {
        board_id: i64,
        user_id: i64,
        role: Role,
    },
    RemoveMember {
        board_id: i64,
        user_id: i64,
    },
    ChangeMemberRole {
        board_id: i64,
        user_id: i64,
        role: Role,
    },

    /// `index` counts non-archived columns; `None` appends.
    CreateColumn {
        board_id: i64,
        title: String,
        #[serde(default)]
        index: Option<usize>,
    },
    RenameColumn {
        column_id: i64,
        title: String,
    },
    MoveColumn {
        column_id: i64,
        index: usize,
    },
    SetColumnArchived {
        column_id: i64,
        archived: bool,
    },
    /// Removes the column and every card in it.
    DeleteColumn {
        column_id: i64,
    },

    CreateCard {
        column_id: i64,
        title: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        index: Option<usize>,
    },
    UpdateCard {
        card_id: i64,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        description: Option<String>,
        /// Absent leaves the due date alone; `null` clears it.
        #[serde(
            default,
            deserialize_with = "present_or_null",
            skip_serializing_if = "Option::is_none"
        )]
        due_date: Option<Option<String>>,
    },
    MoveCard {
        card_id: i64,
        to_column_id: i64,
        #[serde(default)]
        index: Option<usize>,
    },
    SetCardCompleted {
        card_id: i64,
        completed: bool,
    },
    ArchiveCard {
        card_id: i64,
    },
    DeleteCard {
        card_id: i64,
    },

    CreateLabel {
        board_id: i64,
        name: String,
        color: String,
    },
    UpdateLabel {
        label_id: i64,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        color: Option<String>,
    },
    DeleteLabel {
        label_id: i64,
    },
    AddCardLabel {
        card_id: i64,
        label_id: i64,
    },
    RemoveCardLabel {
        card_id: i64,
        label_id: i64,
    },

    CreateChecklist {
        card_id: i64,
        title: String,
    },
    MoveChecklist {
        checklist_id: i64,
        index: usize,
    },
    DeleteChecklist {
        checklist_id: i64,
    },
    CreateChecklistItem {
        checklist_id: i64,
        text: String,
        #[serde(default)]
        index: Option<usize>,
    },
    UpdateChecklistItem {
        item_id: i64,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        checked: Option<bool>,
    },
    MoveChecklistItem {
        item_id: i64,
        index: usize,
    },
    DeleteChecklistItem {
        item_id: i64,
    },

    CreateAutomationRule {
        board_id: i64,
        name: String,
        trigger: Trigger,
        actions: Vec<Action>,
    },
    SetAutomationRuleEnabled {
        rule_id: i64,
        enabled: bool,
    },
    DeleteAutomationRule {
        rule_id: i64,
    },
}

/// The entity a command addresses, used to find its board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub entity: EntityKind,
    pub id: i64,
}

impl Target {
    fn new(entity: EntityKind, id: i64) -> Self {
        Self { entity, id }
    }
}

impl Command {
    pub fn capability(&self) -> Capability {
        match self {
            Self::RenameBoard { .. } => Capability::UpdateBoard,
            Self::DeleteBoard { .. } => Capability::DeleteBoard,
            Self::InviteMember { .. } => Capability::InviteMember,
            Self::RemoveMember { .. } => Capability::RemoveMember,
            Self::ChangeMemberRole { .. } => Capability::ChangeMemberRole,
            Self::CreateColumn { .. } => Capability::CreateColumn,
            Self::RenameColumn { .. } => Capability::UpdateColumn,
            Self::MoveColumn { .. } => Capability::MoveColumn,
            Self::SetColumnArchived { .. } => Capability::ArchiveColumn,
            Self::DeleteColumn { .. } => Capability::DeleteColumn,
            Self::CreateCard { .. } => Capability::CreateCard,
            Self::UpdateCard { .. } | Self::SetCardCompleted { .. } => Capability::UpdateCard,
            Self::MoveCard { .. } => Capability::MoveCard,
            Self::ArchiveCard { .. } => Capability::ArchiveCard,
            Self::DeleteCard { .. } => Capability::DeleteCard,
            Self::CreateLabel { .. } => Capability::CreateLabel,
            Self::UpdateLabel { .. } => Capability::UpdateLabel,
            Self::DeleteLabel { .. } => Capability::DeleteLabel,
            Self::AddCardLabel { .. } | Self::RemoveCardLabel { .. } => Capability::AssignLabel,
            Self::CreateChecklist { .. } => Capability::CreateChecklist,
            Self::MoveChecklist { .. } => Capability::MoveChecklist,
            Self::DeleteChecklist { .. } => Capability::DeleteChecklist,
            Self::CreateChecklistItem { .. } => Capability::CreateChecklistItem,
            Self::UpdateChecklistItem { .. } => Capability::UpdateChecklistItem,
            Self::MoveChecklistItem { .. } => Capability::MoveChecklistItem,
            Self::DeleteChecklistItem { .. } => Capability::DeleteChecklistItem,
            Self::CreateAutomationRule { .. }
            | Self::SetAutomationRuleEnabled { .. }
            | Self::DeleteAutomationRule { .. } => Capability::ManageAutomations,
        }
    }

    pub fn target(&self) -> Target {
        use EntityKind::*;
        match self {
            Self::RenameBoard { board_id, .. }
            | Self::DeleteBoard { board_id }
            | Self::InviteMember { board_id, .. }
            | Self::RemoveMember { board_id, .. }
            | Self::ChangeMemberRole { board_id, .. }
            | Self::CreateColumn { board_id, .. }
            | Self::CreateLabel { board_id, .. }
            | Self::CreateAutomationRule { board_id, .. } => Target::new(Board, *board_id),
            Self::RenameColumn { column_id, .. }
            | Self::MoveColumn { column_id, .. }
            | Self::SetColumnArchived { column_id, .. }
            | Self::DeleteColumn { column_id }
            | Self::CreateCard { column_id, .. } => Target::new(Column, *column_id),
            Self::UpdateCard { card_id, .. }
            | Self::MoveCard { card_id, .. }
            | Self::SetCardCompleted { card_id, .. }
            | Self::ArchiveCard { card_id }
            | Self::DeleteCard { card_id }
            | Self::AddCardLabel { card_id, .. }
            | Self::RemoveCardLabel { card_id, .. }
            | Self::CreateChecklist { card_id, .. } => Target::new(Card, *card_id),
            Self::UpdateLabel { label_id, .. } | Self::DeleteLabel { label_id } => {
                Target::new(Label, *label_id)
            }
            Self::MoveChecklist { checklist_id, .. }
            | Self::DeleteChecklist { checklist_id }
            | Self::CreateChecklistItem { checklist_id, .. } => Target::new(Checklist, *checklist_id),
            Self::UpdateChecklistItem { item_id, .. }
            | Self::MoveChecklistItem { item_id, .. }
            | Self::DeleteChecklistItem { item_id } => Target::new(ChecklistItem, *item_id),
            Self::SetAutomationRuleEnabled { rule_id, .. } | Self::DeleteAutomationRule { rule_id } => {
                Target::new(AutomationRule, *rule_id)
            }
        }
    }
}

/// Keeps an explicit `null` distinct from an absent field.
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}
