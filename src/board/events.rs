//! Mutation events: ephemeral descriptions of committed changes.
//!
//! A [`MutationEvent`] is built after its transaction commits, published on
//! the [`EventBus`](super::bus::EventBus) and then dropped. Observers receive
//! it as a `{ "type": ..., "payload": ... }` frame (see [`MutationEvent::to_frame`]).

use serde::{Deserialize, Serialize};

use super::models::*;

/// Who caused a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    Actor { user_id: i64 },
    Automation { rule_id: i64 },
}

impl Origin {
    pub fn actor_id(&self) -> Option<i64> {
        match self {
            Self::Actor { user_id } => Some(*user_id),
            Self::Automation { .. } => None,
        }
    }

    pub fn rule_id(&self) -> Option<i64> {
        match self {
            Self::Automation { rule_id } => Some(*rule_id),
            Self::Actor { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Change {
    BoardCreated {
        board: Board,
    },
    BoardUpdated {
        board: Board,
    },
    BoardDeleted {
        board_id: i64,
    },

    MemberAdded {
        member: Member,
    },
    MemberRemoved {
        user_id: i64,
    },
    MemberRoleChanged {
        member: Member,
    },

    ColumnCreated {
        column: Column,
    },
    ColumnUpdated {
        column: Column,
    },
    ColumnMoved {
        column_id: i64,
        position: f64,
    },
    /// Hard delete; the column's cards went with it.
    ColumnDeleted {
        column_id: i64,
    },

    CardCreated {
        card: Card,
    },
    CardUpdated {
        card: Card,
    },
    CardMoved {
        card_id: i64,
        from_column_id: i64,
        to_column_id: i64,
        position: f64,
    },
    CardCompletionChanged {
        card_id: i64,
        completed: bool,
    },
    CardArchived {
        card_id: i64,
    },
    CardDeleted {
        card_id: i64,
    },
    CardLabelAdded {
        card_id: i64,
        label_id: i64,
    },
    CardLabelRemoved {
        card_id: i64,
        label_id: i64,
    },

    LabelCreated {
        label: Label,
    },
    LabelUpdated {
        label: Label,
    },
    LabelDeleted {
        label_id: i64,
    },

    ChecklistCreated {
        checklist: Checklist,
    },
    ChecklistMoved {
        checklist_id: i64,
        position: f64,
    },
    ChecklistDeleted {
        checklist_id: i64,
    },
    ChecklistItemCreated {
        item: ChecklistItem,
    },
    ChecklistItemUpdated {
        item: ChecklistItem,
    },
    ChecklistItemMoved {
        item_id: i64,
        position: f64,
    },
    ChecklistItemDeleted {
        item_id: i64,
    },

    /// Every sibling under `parent_id` received a fresh position.
    PositionsRebalanced {
        entity: EntityKind,
        parent_id: i64,
        positions: Vec<(i64, f64)>,
    },

    AutomationRuleCreated {
        rule: AutomationRule,
    },
    AutomationRuleUpdated {
        rule: AutomationRule,
    },
    AutomationRuleDeleted {
        rule_id: i64,
    },
}

impl Change {
    /// Frame `type` of this change, e.g. `"CardMoved"`.
    pub fn type_name(&self) -> String {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub board_id: i64,
    pub origin: Origin,
    pub change: Change,
}

impl MutationEvent {
    /// Wire frame: the change's `type`, with `board_id` and `origin` folded
    /// into its `payload`.
    pub fn to_frame(&self) -> serde_json::Result<serde_json::Value> {
        let mut frame = serde_json::to_value(&self.change)?;
        if let Some(obj) = frame.as_object_mut() {
            let payload = obj
                .entry("payload")
                .or_insert_with(|| serde_json::Value::Object(Default::default()));
            if let Some(payload) = payload.as_object_mut() {
                payload.insert("board_id".to_string(), self.board_id.into());
                payload.insert("origin".to_string(), serde_json::to_value(self.origin)?);
            }
        }
        Ok(frame)
    }
}
