use std::str::FromStr;

use corkboard_common::Role;
use serde::{Deserialize, Serialize};

use super::automation::{Action, Trigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Board,
    Member,
    Column,
    Card,
    Label,
    Checklist,
    ChecklistItem,
    AutomationRule,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Board => "board",
            Self::Member => "member",
            Self::Column => "column",
            Self::Card => "card",
            Self::Label => "label",
            Self::Checklist => "checklist",
            Self::ChecklistItem => "checklist_item",
            Self::AutomationRule => "automation_rule",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "board" => Ok(Self::Board),
            "member" => Ok(Self::Member),
            "column" => Ok(Self::Column),
            "card" => Ok(Self::Card),
            "label" => Ok(Self::Label),
            "checklist" => Ok(Self::Checklist),
            "checklist_item" => Ok(Self::ChecklistItem),
            "automation_rule" => Ok(Self::AutomationRule),
            _ => Err(format!("Invalid entity kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Board {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub board_id: i64,
    pub user_id: i64,
    pub role: Role,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub id: i64,
    pub board_id: i64,
    pub title: String,
    pub position: f64,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub id: i64,
    pub board_id: i64,
    pub column_id: i64,
    pub title: String,
    pub description: String,
    pub position: f64,
    pub completed: bool,
    pub archived: bool,
    pub due_date: Option<String>,
    pub labels: Vec<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Label {
    pub id: i64,
    pub board_id: i64,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checklist {
    pub id: i64,
    pub card_id: i64,
    pub title: String,
    pub position: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChecklistItem {
    pub id: i64,
    pub checklist_id: i64,
    pub text: String,
    pub checked: bool,
    pub position: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutomationRule {
    pub id: i64,
    pub board_id: i64,
    pub name: String,
    pub trigger: Trigger,
    pub actions: Vec<Action>,
    pub enabled: bool,
    pub created_at: String,
}

/// Audit record written in the same transaction as the change it describes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: i64,
    pub board_id: i64,
    /// `None` when the change was made by an automation rule.
    pub actor_id: Option<i64>,
    pub rule_id: Option<i64>,
    pub action: String,
    pub detail: serde_json::Value,
    pub created_at: String,
}

// API view types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    pub board: Board,
    pub members: Vec<Member>,
    pub labels: Vec<Label>,
    pub columns: Vec<ColumnView>,
    pub rules: Vec<AutomationRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnView {
    #[serde(flatten)]
    pub column: Column,
    pub cards: Vec<CardView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardView {
    #[serde(flatten)]
    pub card: Card,
    pub checklists: Vec<ChecklistView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistView {
    #[serde(flatten)]
    pub checklist: Checklist,
    pub items: Vec<ChecklistItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_round_trips() {
        for kind in [
            EntityKind::Board,
            EntityKind::Member,
            EntityKind::Column,
            EntityKind::Card,
            EntityKind::Label,
            EntityKind::Checklist,
            EntityKind::ChecklistItem,
            EntityKind::AutomationRule,
        ] {
            assert_eq!(kind.as_str().parse::<EntityKind>(), Ok(kind));
        }
        assert!("swimlane".parse::<EntityKind>().is_err());
    }

    #[test]
    fn column_view_flattens_column_fields() {
        let view = ColumnView {
            column: Column {
                id: 1,
                board_id: 2,
                title: "To-Do".to_string(),
                position: 65536.0,
                archived: false,
                created_at: "2024-01-01".to_string(),
                updated_at: "2024-01-01".to_string(),
            },
            cards: vec![],
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["title"], "To-Do");
        assert_eq!(json["position"], 65536.0);
        assert!(json["cards"].as_array().unwrap().is_empty());
    }
}
