//! Automation engine.
//!
//! A rule binds one [`Trigger`] to an ordered list of [`Action`]s. When a
//! committed mutation produces a [`TriggerEvent`], every enabled rule of the
//! board whose trigger matches runs in creation order. Actions are applied by
//! an [`ActionExecutor`] with system rights scoped to the rule's board; each
//! action is its own committed sub-mutation and may produce further trigger
//! events, which are evaluated recursively under the same [`Cascade`].
//!
//! A rule fires at most once per originating command. Action failures abort
//! the rest of that rule only and are logged, never returned.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::events::MutationEvent;
use super::models::AutomationRule;
use crate::errors::BoardError;

/// Default bound on nested automation evaluation within one command.
pub const DEFAULT_MAX_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    CardEnteredColumn { column_id: i64 },
    CardLeftColumn { column_id: i64 },
    CardCreatedInColumn { column_id: i64 },
    CardCompleted,
    LabelAdded { label_id: i64 },
}

impl Trigger {
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        match (self, event) {
            (
                Trigger::CardEnteredColumn { column_id },
                TriggerEvent::CardEnteredColumn { column_id: c, .. },
            ) => column_id == c,
            (
                Trigger::CardLeftColumn { column_id },
                TriggerEvent::CardLeftColumn { column_id: c, .. },
            ) => column_id == c,
            (
                Trigger::CardCreatedInColumn { column_id },
                TriggerEvent::CardCreated { column_id: c, .. },
            ) => column_id == c,
            (Trigger::CardCompleted, TriggerEvent::CardCompleted { .. }) => true,
            (Trigger::LabelAdded { label_id }, TriggerEvent::LabelAdded { label_id: l, .. }) => {
                label_id == l
            }
            _ => false,
        }
    }

    /// Column referenced by the trigger, if any.
    pub fn column_id(&self) -> Option<i64> {
        match self {
            Self::CardEnteredColumn { column_id }
            | Self::CardLeftColumn { column_id }
            | Self::CardCreatedInColumn { column_id } => Some(*column_id),
            Self::CardCompleted | Self::LabelAdded { .. } => None,
        }
    }

    pub fn label_id(&self) -> Option<i64> {
        match self {
            Self::LabelAdded { label_id } => Some(*label_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Top,
    #[default]
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    AddLabel {
        label_id: i64,
    },
    RemoveLabel {
        label_id: i64,
    },
    SetCompleted {
        completed: bool,
    },
    MoveToColumn {
        column_id: i64,
        #[serde(default)]
        placement: Placement,
    },
    Archive,
}

impl Action {
    pub fn column_id(&self) -> Option<i64> {
        match self {
            Self::MoveToColumn { column_id, .. } => Some(*column_id),
            _ => None,
        }
    }

    pub fn label_id(&self) -> Option<i64> {
        match self {
            Self::AddLabel { label_id } | Self::RemoveLabel { label_id } => Some(*label_id),
            _ => None,
        }
    }
}

/// A qualifying state transition produced by a committed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    CardEnteredColumn { card_id: i64, column_id: i64 },
    CardLeftColumn { card_id: i64, column_id: i64 },
    CardCreated { card_id: i64, column_id: i64 },
    CardCompleted { card_id: i64 },
    LabelAdded { card_id: i64, label_id: i64 },
}

impl TriggerEvent {
    pub fn card_id(&self) -> i64 {
        match self {
            Self::CardEnteredColumn { card_id, .. }
            | Self::CardLeftColumn { card_id, .. }
            | Self::CardCreated { card_id, .. }
            | Self::CardCompleted { card_id }
            | Self::LabelAdded { card_id, .. } => *card_id,
        }
    }
}

/// Recursion state for one originating command.
#[derive(Debug, Clone)]
pub struct Cascade {
    fired: HashSet<i64>,
    depth: usize,
    max_depth: usize,
}

impl Cascade {
    pub fn new(max_depth: usize) -> Self {
        Self {
            fired: HashSet::new(),
            depth: 0,
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn has_fired(&self, rule_id: i64) -> bool {
        self.fired.contains(&rule_id)
    }

    /// Run `f` one level deeper.
    pub fn nested<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }
}

/// Applies automation actions on behalf of the engine.
pub trait ActionExecutor {
    /// Enabled and disabled rules of `board_id`, oldest first.
    fn rules(&mut self, board_id: i64) -> Result<Vec<AutomationRule>, BoardError>;

    /// Apply one action to `card_id` as a committed sub-mutation, then
    /// evaluate any trigger events it produced under `cascade`. Returns every
    /// event published along the way.
    fn execute(
        &mut self,
        engine: &AutomationEngine,
        rule: &AutomationRule,
        card_id: i64,
        action: &Action,
        cascade: &mut Cascade,
    ) -> Result<Vec<MutationEvent>, BoardError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AutomationEngine;

impl AutomationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run every matching rule of `board_id` for `trigger`.
    pub fn evaluate<E: ActionExecutor + ?Sized>(
        &self,
        executor: &mut E,
        board_id: i64,
        trigger: TriggerEvent,
        cascade: &mut Cascade,
    ) -> Vec<MutationEvent> {
        if cascade.depth >= cascade.max_depth {
            warn!(
                board_id,
                ?trigger,
                depth = cascade.depth,
                "Automation depth limit reached; not evaluating further rules"
            );
            return Vec::new();
        }

        let rules = match executor.rules(board_id) {
            Ok(rules) => rules,
            Err(e) => {
                warn!(board_id, error = %e, "Failed to load automation rules");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        for rule in rules
            .iter()
            .filter(|r| r.enabled && r.board_id == board_id && r.trigger.matches(&trigger))
        {
            if !cascade.fired.insert(rule.id) {
                warn!(
                    board_id,
                    rule_id = rule.id,
                    ?trigger,
                    "Automation rule already fired for this command; skipping"
                );
                continue;
            }
            debug!(board_id, rule_id = rule.id, rule = %rule.name, ?trigger, "Running automation rule");

            for (action_index, action) in rule.actions.iter().enumerate() {
                match executor.execute(self, rule, trigger.card_id(), action, cascade) {
                    Ok(produced) => events.extend(produced),
                    Err(e) => {
                        let failure = BoardError::AutomationActionFailed {
                            rule_id: rule.id,
                            action_index,
                            reason: e.to_string(),
                        };
                        warn!(board_id, error = %failure, "Automation action failed; skipping rest of rule");
                        break;
                    }
                }
            }
        }
        events
    }
}
