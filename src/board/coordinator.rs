//! Composition root for board mutations.
//!
//! [`Coordinator::apply`] runs one command end to end:
//!
//! 1. resolve the board the command touches and authorize the actor once;
//! 2. open a transaction, compute positions (rebalancing siblings in the same
//!    transaction when the allocator runs out of room), mutate, and append one
//!    activity row per change;
//! 3. commit, then publish one event per change in commit order;
//! 4. evaluate automation rules for every trigger event the mutation produced.
//!    Each action repeats 2-4 with the gate bypassed and the command's
//!    [`Cascade`] threaded through.
//!
//! All store access happens on the blocking pool via [`DbHandle::call`], so
//! a command holds the store for its whole unit of work.

use corkboard_common::{Capability, PositionAllocator, Role};
use serde::Serialize;
use tracing::{debug, info};

use super::auth;
use super::automation::{
    Action, ActionExecutor, AutomationEngine, Cascade, DEFAULT_MAX_DEPTH, Placement, TriggerEvent,
};
use super::bus::{EventBus, Subscription};
use super::command::{Command, Target};
use super::db::{BoardDb, DbHandle, Siblings, StoreTx};
use super::events::{Change, MutationEvent, Origin};
use super::models::*;
use crate::errors::BoardError;

/// Tunables shared by every command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoreSettings {
    pub allocator: PositionAllocator,
    pub max_automation_depth: usize,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            allocator: PositionAllocator::default(),
            max_automation_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Every event committed on behalf of one command, automation-caused ones
/// included, in publish order.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub events: Vec<MutationEvent>,
}

#[derive(Clone)]
pub struct Coordinator {
    db: DbHandle,
    bus: EventBus,
    settings: CoreSettings,
    engine: AutomationEngine,
}

impl Coordinator {
    pub fn new(db: DbHandle, bus: EventBus, settings: CoreSettings) -> Self {
        Self {
            db,
            bus,
            settings,
            engine: AutomationEngine::new(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn settings(&self) -> &CoreSettings {
        &self.settings
    }

    /// Apply `command` on behalf of `actor`.
    pub async fn apply(&self, actor: i64, command: Command) -> Result<CommandOutcome, BoardError> {
        let bus = self.bus.clone();
        let settings = self.settings;
        let engine = self.engine;
        self.db
            .call(move |db| {
                let mut pipeline = Pipeline {
                    db,
                    bus: &bus,
                    settings: &settings,
                };
                pipeline.run(&engine, actor, &command)
            })
            .await
    }

    /// Create a board with `actor` as its first ADMIN.
    pub async fn create_board(&self, actor: i64, name: String) -> Result<Board, BoardError> {
        let board = self
            .db
            .call(move |db| -> Result<Board, BoardError> {
                let tx = db.transaction()?;
                let board = tx.insert_board(&name)?;
                let member = tx.insert_member(board.id, actor, Role::Admin)?;
                let origin = Origin::Actor { user_id: actor };
                tx.append_activity(
                    board.id,
                    origin,
                    &Change::BoardCreated {
                        board: board.clone(),
                    },
                )?;
                tx.append_activity(board.id, origin, &Change::MemberAdded { member })?;
                tx.commit()?;
                Ok(board)
            })
            .await?;
        info!(board_id = board.id, actor, "Board created");
        Ok(board)
    }

    /// Snapshot of a board for (re)synchronising an observer.
    pub async fn board_view(&self, actor: i64, board_id: i64) -> Result<BoardView, BoardError> {
        self.db
            .call(move |db| -> Result<BoardView, BoardError> {
                authorize_view(db, actor, board_id)?;
                db.board_view(board_id)?
                    .ok_or_else(|| BoardError::not_found(EntityKind::Board, board_id))
            })
            .await
    }

    /// Most recent activity first.
    pub async fn activities(
        &self,
        actor: i64,
        board_id: i64,
        limit: usize,
    ) -> Result<Vec<Activity>, BoardError> {
        self.db
            .call(move |db| -> Result<Vec<Activity>, BoardError> {
                authorize_view(db, actor, board_id)?;
                Ok(db.list_activities(board_id, limit)?)
            })
            .await
    }

    /// Live feed of a board's events. Requires `ViewBoard`.
    pub async fn subscribe(&self, actor: i64, board_id: i64) -> Result<Subscription, BoardError> {
        let bus = self.bus.clone();
        // Attach under the store lock so a concurrent removal cannot slip in
        // between the check and the subscribe.
        self.db
            .call(move |db| -> Result<Subscription, BoardError> {
                authorize_view(db, actor, board_id)?;
                Ok(bus.subscribe(board_id, actor))
            })
            .await
    }
}

fn authorize_view(db: &BoardDb, actor: i64, board_id: i64) -> Result<(), BoardError> {
    let exists = db
        .transaction()?
        .resolve_board(Target {
            entity: EntityKind::Board,
            id: board_id,
        })?
        .is_some();
    if !exists {
        return Err(BoardError::not_found(EntityKind::Board, board_id));
    }
    auth::check(db, board_id, actor, Capability::ViewBoard)
}

/// Result of one committed unit of work.
struct Applied {
    events: Vec<MutationEvent>,
    triggers: Vec<TriggerEvent>,
}

/// One command's trip through the store. Lives on the blocking thread that
/// holds the database lock.
struct Pipeline<'a> {
    db: &'a BoardDb,
    bus: &'a EventBus,
    settings: &'a CoreSettings,
}

impl Pipeline<'_> {
    fn run(
        &mut self,
        engine: &AutomationEngine,
        actor: i64,
        command: &Command,
    ) -> Result<CommandOutcome, BoardError> {
        let target = command.target();
        let board_id = self
            .db
            .transaction()?
            .resolve_board(target)?
            .ok_or_else(|| BoardError::not_found(target.entity, target.id))?;

        let capability = command.capability();
        auth::check(self.db, board_id, actor, capability)?;
        debug!(board_id, actor, %capability, "Applying command");

        let applied = self.commit(board_id, Origin::Actor { user_id: actor }, |w| {
            w.apply_command(command)
        })?;

        let mut events = applied.events;
        let mut cascade = Cascade::new(self.settings.max_automation_depth);
        for trigger in applied.triggers {
            events.extend(engine.evaluate(self, board_id, trigger, &mut cascade));
        }
        Ok(CommandOutcome { events })
    }

    /// Run `f` in one transaction, record activity for every change it made,
    /// commit, and only then publish.
    fn commit<F>(&self, board_id: i64, origin: Origin, f: F) -> Result<Applied, BoardError>
    where
        F: FnOnce(&mut Writer<'_>) -> Result<(), BoardError>,
    {
        let tx = self.db.transaction()?;
        let mut writer = Writer {
            tx: &tx,
            allocator: &self.settings.allocator,
            board_id,
            changes: Vec::new(),
            triggers: Vec::new(),
        };
        f(&mut writer)?;
        let Writer {
            changes, triggers, ..
        } = writer;

        for change in &changes {
            tx.append_activity(board_id, origin, change)?;
        }
        tx.commit()?;

        let events: Vec<MutationEvent> = changes
            .into_iter()
            .map(|change| MutationEvent {
                board_id,
                origin,
                change,
            })
            .collect();
        for event in &events {
            let delivered = self.bus.publish(event.clone());
            debug!(board_id, event = %event.change.type_name(), delivered, "Published");
            match event.change {
                Change::MemberRemoved { user_id } => self.bus.revoke(board_id, user_id),
                Change::BoardDeleted { .. } => self.bus.close_board(board_id),
                _ => {}
            }
        }
        Ok(Applied { events, triggers })
    }
}

impl ActionExecutor for Pipeline<'_> {
    fn rules(&mut self, board_id: i64) -> Result<Vec<AutomationRule>, BoardError> {
        Ok(self.db.transaction()?.list_rules(board_id)?)
    }

    fn execute(
        &mut self,
        engine: &AutomationEngine,
        rule: &AutomationRule,
        card_id: i64,
        action: &Action,
        cascade: &mut Cascade,
    ) -> Result<Vec<MutationEvent>, BoardError> {
        let board_id = rule.board_id;
        debug!(board_id, rule_id = rule.id, card_id, ?action, "Executing automation action");
        let applied = self.commit(board_id, Origin::Automation { rule_id: rule.id }, |w| {
            w.apply_action(card_id, action)
        })?;

        let mut events = applied.events;
        for trigger in applied.triggers {
            events.extend(cascade.nested(|c| engine.evaluate(self, board_id, trigger, c)));
        }
        Ok(events)
    }
}

/// Mutations inside one open transaction, scoped to one board.
struct Writer<'a> {
    tx: &'a StoreTx<'a>,
    allocator: &'a PositionAllocator,
    board_id: i64,
    changes: Vec<Change>,
    triggers: Vec<TriggerEvent>,
}

impl Writer<'_> {
    fn apply_command(&mut self, command: &Command) -> Result<(), BoardError> {
        match command {
            Command::RenameBoard { board_id, name } => {
                let board = self.tx.rename_board(*board_id, name)?;
                self.changes.push(Change::BoardUpdated { board });
            }
            Command::DeleteBoard { board_id } => {
                self.tx.soft_delete_board(*board_id)?;
                self.changes.push(Change::BoardDeleted {
                    board_id: *board_id,
                });
            }

            Command::InviteMember {
                board_id,
                user_id,
                role,
            } => {
                if self.tx.membership(*board_id, *user_id)?.is_some() {
                    return Err(BoardError::invalid(format!(
                        "user {} is already a member of board {}",
                        user_id, board_id
                    )));
                }
                let member = self.tx.insert_member(*board_id, *user_id, *role)?;
                self.changes.push(Change::MemberAdded { member });
            }
            Command::RemoveMember { board_id, user_id } => {
                let member = self.member(*board_id, *user_id)?;
                self.ensure_other_admin(&member)?;
                self.tx.delete_member(*board_id, *user_id)?;
                self.changes.push(Change::MemberRemoved { user_id: *user_id });
            }
            Command::ChangeMemberRole {
                board_id,
                user_id,
                role,
            } => {
                let member = self.member(*board_id, *user_id)?;
                if *role != Role::Admin {
                    self.ensure_other_admin(&member)?;
                }
                let member = self.tx.update_member_role(*board_id, *user_id, *role)?;
                self.changes.push(Change::MemberRoleChanged { member });
            }

            Command::CreateColumn { title, index, .. } => {
                let siblings = Siblings::Columns {
                    board_id: self.board_id,
                };
                let position = self.place(siblings, None, *index)?;
                let column = self.tx.insert_column(self.board_id, title, position)?;
                self.changes.push(Change::ColumnCreated { column });
            }
            Command::RenameColumn { column_id, title } => {
                let column = self.tx.rename_column(*column_id, title)?;
                self.changes.push(Change::ColumnUpdated { column });
            }
            Command::MoveColumn { column_id, index } => {
                let column = self.column(*column_id)?;
                if column.archived {
                    return Err(BoardError::invalid(format!(
                        "column {} is archived",
                        column_id
                    )));
                }
                let siblings = Siblings::Columns {
                    board_id: self.board_id,
                };
                let position = self.place(siblings, Some(column.id), Some(*index))?;
                let column = self.tx.move_column(column.id, position)?;
                self.changes.push(Change::ColumnMoved {
                    column_id: column.id,
                    position: column.position,
                });
            }
            Command::SetColumnArchived {
                column_id,
                archived,
            } => {
                let column = self.column(*column_id)?;
                if column.archived == *archived {
                    return Ok(());
                }
                // Restored columns rejoin at the end.
                let position = if *archived {
                    column.position
                } else {
                    let siblings = Siblings::Columns {
                        board_id: self.board_id,
                    };
                    self.place(siblings, Some(column.id), None)?
                };
                let column = self
                    .tx
                    .set_column_archived(column.id, *archived, position)?;
                self.changes.push(Change::ColumnUpdated { column });
            }
            Command::DeleteColumn { column_id } => {
                let column = self.column(*column_id)?;
                let used_by = self.tx.list_rules(self.board_id)?.into_iter().find(|rule| {
                    rule.trigger.column_id() == Some(column.id)
                        || rule.actions.iter().any(|a| a.column_id() == Some(column.id))
                });
                if let Some(rule) = used_by {
                    return Err(BoardError::invalid(format!(
                        "column {} is used by automation rule {}",
                        column.id, rule.id
                    )));
                }
                self.tx.delete_column(column.id)?;
                self.changes.push(Change::ColumnDeleted {
                    column_id: column.id,
                });
            }

            Command::CreateCard {
                column_id,
                title,
                description,
                index,
            } => {
                let column = self.open_column(*column_id)?;
                let position = self.place(
                    Siblings::Cards {
                        column_id: column.id,
                    },
                    None,
                    *index,
                )?;
                let card = self.tx.insert_card(
                    self.board_id,
                    column.id,
                    title,
                    description.as_deref().unwrap_or_default(),
                    position,
                )?;
                self.triggers.push(TriggerEvent::CardCreated {
                    card_id: card.id,
                    column_id: column.id,
                });
                self.changes.push(Change::CardCreated { card });
            }
            Command::UpdateCard {
                card_id,
                title,
                description,
                due_date,
            } => {
                let card = self.card(*card_id)?;
                let title = title.as_deref().filter(|t| *t != card.title);
                let description = description.as_deref().filter(|d| *d != card.description);
                let due_date = due_date
                    .as_ref()
                    .map(|d| d.as_deref())
                    .filter(|d| *d != card.due_date.as_deref());
                if title.is_none() && description.is_none() && due_date.is_none() {
                    return Ok(());
                }
                let card = self
                    .tx
                    .update_card(card.id, title, description, due_date)?;
                self.changes.push(Change::CardUpdated { card });
            }
            Command::MoveCard {
                card_id,
                to_column_id,
                index,
            } => self.move_card(*card_id, *to_column_id, *index)?,
            Command::SetCardCompleted { card_id, completed } => {
                self.set_completed(*card_id, *completed)?
            }
            Command::ArchiveCard { card_id } => self.archive_card(*card_id)?,
            Command::DeleteCard { card_id } => {
                self.tx.delete_card(*card_id)?;
                self.changes.push(Change::CardDeleted { card_id: *card_id });
            }

            Command::CreateLabel { name, color, .. } => {
                let label = self.tx.insert_label(self.board_id, name, color)?;
                self.changes.push(Change::LabelCreated { label });
            }
            Command::UpdateLabel {
                label_id,
                name,
                color,
            } => {
                let label = self
                    .tx
                    .update_label(*label_id, name.as_deref(), color.as_deref())?;
                self.changes.push(Change::LabelUpdated { label });
            }
            Command::DeleteLabel { label_id } => {
                self.tx.delete_label(*label_id)?;
                self.changes.push(Change::LabelDeleted {
                    label_id: *label_id,
                });
            }
            Command::AddCardLabel { card_id, label_id } => self.add_label(*card_id, *label_id)?,
            Command::RemoveCardLabel { card_id, label_id } => {
                self.remove_label(*card_id, *label_id)?
            }

            Command::CreateChecklist { card_id, title } => {
                let position = self.place(Siblings::Checklists { card_id: *card_id }, None, None)?;
                let checklist = self.tx.insert_checklist(*card_id, title, position)?;
                self.changes.push(Change::ChecklistCreated { checklist });
            }
            Command::MoveChecklist {
                checklist_id,
                index,
            } => {
                let checklist = self
                    .tx
                    .find_checklist(*checklist_id)?
                    .ok_or_else(|| BoardError::not_found(EntityKind::Checklist, *checklist_id))?;
                let siblings = Siblings::Checklists {
                    card_id: checklist.card_id,
                };
                let position = self.place(siblings, Some(checklist.id), Some(*index))?;
                let checklist = self.tx.move_checklist(checklist.id, position)?;
                self.changes.push(Change::ChecklistMoved {
                    checklist_id: checklist.id,
                    position: checklist.position,
                });
            }
            Command::DeleteChecklist { checklist_id } => {
                self.tx.delete_checklist(*checklist_id)?;
                self.changes.push(Change::ChecklistDeleted {
                    checklist_id: *checklist_id,
                });
            }
            Command::CreateChecklistItem {
                checklist_id,
                text,
                index,
            } => {
                let siblings = Siblings::ChecklistItems {
                    checklist_id: *checklist_id,
                };
                let position = self.place(siblings, None, *index)?;
                let item = self.tx.insert_item(*checklist_id, text, position)?;
                self.changes.push(Change::ChecklistItemCreated { item });
            }
            Command::UpdateChecklistItem {
                item_id,
                text,
                checked,
            } => {
                let item = self.tx.update_item(*item_id, text.as_deref(), *checked)?;
                self.changes.push(Change::ChecklistItemUpdated { item });
            }
            Command::MoveChecklistItem { item_id, index } => {
                let item = self
                    .tx
                    .find_item(*item_id)?
                    .ok_or_else(|| BoardError::not_found(EntityKind::ChecklistItem, *item_id))?;
                let siblings = Siblings::ChecklistItems {
                    checklist_id: item.checklist_id,
                };
                let position = self.place(siblings, Some(item.id), Some(*index))?;
                let item = self.tx.move_item(item.id, position)?;
                self.changes.push(Change::ChecklistItemMoved {
                    item_id: item.id,
                    position: item.position,
                });
            }
            Command::DeleteChecklistItem { item_id } => {
                self.tx.delete_item(*item_id)?;
                self.changes.push(Change::ChecklistItemDeleted { item_id: *item_id });
            }

            Command::CreateAutomationRule {
                name,
                trigger,
                actions,
                ..
            } => {
                if actions.is_empty() {
                    return Err(BoardError::invalid("automation rule has no actions"));
                }
                let columns = trigger
                    .column_id()
                    .into_iter()
                    .chain(actions.iter().filter_map(Action::column_id));
                for column_id in columns {
                    self.column(column_id)?;
                }
                let labels = trigger
                    .label_id()
                    .into_iter()
                    .chain(actions.iter().filter_map(Action::label_id));
                for label_id in labels {
                    self.label(label_id)?;
                }
                let rule = self
                    .tx
                    .insert_rule(self.board_id, name, trigger, actions)?;
                self.changes.push(Change::AutomationRuleCreated { rule });
            }
            Command::SetAutomationRuleEnabled { rule_id, enabled } => {
                let rule = self.tx.set_rule_enabled(*rule_id, *enabled)?;
                self.changes.push(Change::AutomationRuleUpdated { rule });
            }
            Command::DeleteAutomationRule { rule_id } => {
                self.tx.delete_rule(*rule_id)?;
                self.changes.push(Change::AutomationRuleDeleted { rule_id: *rule_id });
            }
        }
        Ok(())
    }

    /// Apply one automation action with system rights, confined to this board.
    fn apply_action(&mut self, card_id: i64, action: &Action) -> Result<(), BoardError> {
        self.card(card_id)?;
        match action {
            Action::AddLabel { label_id } => self.add_label(card_id, *label_id),
            Action::RemoveLabel { label_id } => self.remove_label(card_id, *label_id),
            Action::SetCompleted { completed } => self.set_completed(card_id, *completed),
            Action::MoveToColumn {
                column_id,
                placement,
            } => {
                let index = match placement {
                    Placement::Top => Some(0),
                    Placement::Bottom => None,
                };
                self.move_card(card_id, *column_id, index)
            }
            Action::Archive => self.archive_card(card_id),
        }
    }

    // ── Shared by commands and automation actions ─────────────────────

    fn move_card(
        &mut self,
        card_id: i64,
        to_column_id: i64,
        index: Option<usize>,
    ) -> Result<(), BoardError> {
        let card = self.card(card_id)?;
        if card.archived {
            return Err(BoardError::invalid(format!("card {} is archived", card_id)));
        }
        let column = self.open_column(to_column_id)?;
        let position = self.place(
            Siblings::Cards {
                column_id: column.id,
            },
            Some(card.id),
            index,
        )?;
        self.tx.move_card(card.id, column.id, position)?;
        self.changes.push(Change::CardMoved {
            card_id: card.id,
            from_column_id: card.column_id,
            to_column_id: column.id,
            position,
        });
        if card.column_id != column.id {
            self.triggers.push(TriggerEvent::CardLeftColumn {
                card_id: card.id,
                column_id: card.column_id,
            });
            self.triggers.push(TriggerEvent::CardEnteredColumn {
                card_id: card.id,
                column_id: column.id,
            });
        }
        Ok(())
    }

    fn set_completed(&mut self, card_id: i64, completed: bool) -> Result<(), BoardError> {
        let card = self.card(card_id)?;
        if card.completed == completed {
            return Ok(());
        }
        self.tx.set_card_completed(card.id, completed)?;
        self.changes.push(Change::CardCompletionChanged {
            card_id: card.id,
            completed,
        });
        if completed {
            self.triggers
                .push(TriggerEvent::CardCompleted { card_id: card.id });
        }
        Ok(())
    }

    fn archive_card(&mut self, card_id: i64) -> Result<(), BoardError> {
        let card = self.card(card_id)?;
        if card.archived {
            return Ok(());
        }
        self.tx.archive_card(card.id)?;
        self.changes.push(Change::CardArchived { card_id: card.id });
        Ok(())
    }

    fn add_label(&mut self, card_id: i64, label_id: i64) -> Result<(), BoardError> {
        let label = self.label(label_id)?;
        if self.tx.add_card_label(card_id, label.id)? {
            self.changes.push(Change::CardLabelAdded {
                card_id,
                label_id: label.id,
            });
            self.triggers.push(TriggerEvent::LabelAdded {
                card_id,
                label_id: label.id,
            });
        }
        Ok(())
    }

    fn remove_label(&mut self, card_id: i64, label_id: i64) -> Result<(), BoardError> {
        let label = self.label(label_id)?;
        if self.tx.remove_card_label(card_id, label.id)? {
            self.changes.push(Change::CardLabelRemoved {
                card_id,
                label_id: label.id,
            });
        }
        Ok(())
    }

    // ── Ordering ──────────────────────────────────────────────────────

    /// Position for inserting at `index` among `siblings` (appending when
    /// `None`). Rebalances the set first if there is no room left.
    fn place(
        &mut self,
        siblings: Siblings,
        exclude: Option<i64>,
        index: Option<usize>,
    ) -> Result<f64, BoardError> {
        let current = self.tx.sibling_positions(siblings, exclude)?;
        let index = index.unwrap_or(current.len());
        let positions: Vec<f64> = current.iter().map(|(_, p)| *p).collect();
        let exhausted = match self.allocator.place(&positions, index) {
            Ok(position) => return Ok(position),
            Err(exhausted) => exhausted,
        };

        info!(
            board_id = self.board_id,
            entity = %siblings.entity(),
            parent_id = siblings.parent_id(),
            count = current.len(),
            %exhausted,
            "Rebalancing sibling positions"
        );
        let fresh: Vec<(i64, f64)> = current
            .iter()
            .map(|(id, _)| *id)
            .zip(self.allocator.rebalance(current.len()))
            .collect();
        self.tx.write_positions(siblings, &fresh)?;
        let positions: Vec<f64> = fresh.iter().map(|(_, p)| *p).collect();
        let position = self
            .allocator
            .place(&positions, index)
            .map_err(|e| anyhow::Error::new(e).context("No room after rebalancing"))?;
        self.changes.push(Change::PositionsRebalanced {
            entity: siblings.entity(),
            parent_id: siblings.parent_id(),
            positions: fresh,
        });
        Ok(position)
    }

    // ── Lookups confined to this board ────────────────────────────────

    fn member(&self, board_id: i64, user_id: i64) -> Result<Member, BoardError> {
        self.tx
            .membership(board_id, user_id)?
            .ok_or_else(|| BoardError::not_found(EntityKind::Member, user_id))
    }

    /// Refuse to strip the last ADMIN of a board.
    fn ensure_other_admin(&self, member: &Member) -> Result<(), BoardError> {
        if member.role == Role::Admin && self.tx.count_admins(member.board_id)? <= 1 {
            return Err(BoardError::invalid(format!(
                "user {} is the last admin of board {}",
                member.user_id, member.board_id
            )));
        }
        Ok(())
    }

    fn card(&self, id: i64) -> Result<Card, BoardError> {
        let card = self
            .tx
            .find_card(id)?
            .ok_or_else(|| BoardError::not_found(EntityKind::Card, id))?;
        if card.board_id != self.board_id {
            return Err(BoardError::invalid(format!(
                "card {} belongs to another board",
                id
            )));
        }
        Ok(card)
    }

    fn column(&self, id: i64) -> Result<Column, BoardError> {
        let column = self
            .tx
            .find_column(id)?
            .ok_or_else(|| BoardError::not_found(EntityKind::Column, id))?;
        if column.board_id != self.board_id {
            return Err(BoardError::invalid(format!(
                "column {} belongs to another board",
                id
            )));
        }
        Ok(column)
    }

    /// A column that can receive cards.
    fn open_column(&self, id: i64) -> Result<Column, BoardError> {
        let column = self.column(id)?;
        if column.archived {
            return Err(BoardError::invalid(format!("column {} is archived", id)));
        }
        Ok(column)
    }

    fn label(&self, id: i64) -> Result<Label, BoardError> {
        let label = self
            .tx
            .find_label(id)?
            .ok_or_else(|| BoardError::not_found(EntityKind::Label, id))?;
        if label.board_id != self.board_id {
            return Err(BoardError::invalid(format!(
                "label {} belongs to another board",
                id
            )));
        }
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::automation::Trigger;
    use crate::board::bus::BusFrame;
    use crate::errors::DenyReason;
    use anyhow::Result;

    const ALICE: i64 = 1;
    const BOB: i64 = 2;
    const MALLORY: i64 = 3;

    fn coordinator() -> Result<Coordinator> {
        coordinator_with(CoreSettings::default())
    }

    fn coordinator_with(settings: CoreSettings) -> Result<Coordinator> {
        let db = DbHandle::new(BoardDb::new_in_memory()?);
        Ok(Coordinator::new(db, EventBus::default(), settings))
    }

    /// Board owned by ALICE with BOB as USER and columns To-Do, Done.
    async fn sprint_board(c: &Coordinator) -> Result<(i64, i64, i64)> {
        let board = c.create_board(ALICE, "Sprint".to_string()).await?;
        c.apply(
            ALICE,
            Command::InviteMember {
                board_id: board.id,
                user_id: BOB,
                role: Role::User,
            },
        )
        .await?;
        let todo = create_column(c, board.id, "To-Do").await?;
        let done = create_column(c, board.id, "Done").await?;
        Ok((board.id, todo, done))
    }

    async fn create_column(c: &Coordinator, board_id: i64, title: &str) -> Result<i64> {
        let outcome = c
            .apply(
                ALICE,
                Command::CreateColumn {
                    board_id,
                    title: title.to_string(),
                    index: None,
                },
            )
            .await?;
        match &outcome.events[0].change {
            Change::ColumnCreated { column } => Ok(column.id),
            other => panic!("Expected ColumnCreated, got {:?}", other),
        }
    }

    async fn create_card(c: &Coordinator, column_id: i64, index: Option<usize>) -> Result<Card> {
        let outcome = c
            .apply(
                BOB,
                Command::CreateCard {
                    column_id,
                    title: "Card".to_string(),
                    description: None,
                    index,
                },
            )
            .await?;
        outcome
            .events
            .into_iter()
            .find_map(|e| match e.change {
                Change::CardCreated { card } => Some(card),
                _ => None,
            })
            .ok_or_else(|| anyhow::anyhow!("no CardCreated event"))
    }

    async fn create_label(c: &Coordinator, board_id: i64) -> Result<i64> {
        let outcome = c
            .apply(
                ALICE,
                Command::CreateLabel {
                    board_id,
                    name: "urgent".to_string(),
                    color: "#ff0000".to_string(),
                },
            )
            .await?;
        match &outcome.events[0].change {
            Change::LabelCreated { label } => Ok(label.id),
            other => panic!("Expected LabelCreated, got {:?}", other),
        }
    }

    async fn add_rule(
        c: &Coordinator,
        board_id: i64,
        trigger: Trigger,
        actions: Vec<Action>,
    ) -> Result<i64> {
        let outcome = c
            .apply(
                ALICE,
                Command::CreateAutomationRule {
                    board_id,
                    name: "rule".to_string(),
                    trigger,
                    actions,
                },
            )
            .await?;
        match &outcome.events[0].change {
            Change::AutomationRuleCreated { rule } => Ok(rule.id),
            other => panic!("Expected AutomationRuleCreated, got {:?}", other),
        }
    }

    async fn card_in_view(c: &Coordinator, board_id: i64, card_id: i64) -> Result<Card> {
        let view = c.board_view(ALICE, board_id).await?;
        view.columns
            .into_iter()
            .flat_map(|col| col.cards)
            .map(|cv| cv.card)
            .find(|card| card.id == card_id)
            .ok_or_else(|| anyhow::anyhow!("card {} not visible", card_id))
    }

    #[tokio::test]
    async fn test_positions_scenario() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, done) = sprint_board(&c).await?;

        let view = c.board_view(ALICE, board_id).await?;
        assert_eq!(view.columns[0].column.id, todo);
        assert_eq!(view.columns[0].column.position, 65536.0);
        assert_eq!(view.columns[1].column.id, done);
        assert_eq!(view.columns[1].column.position, 131072.0);

        let first = create_card(&c, todo, None).await?;
        let second = create_card(&c, todo, None).await?;
        let third = create_card(&c, todo, Some(1)).await?;
        assert_eq!(first.position, 65536.0);
        assert_eq!(second.position, 131072.0);
        assert_eq!(third.position, 98304.0);

        let view = c.board_view(ALICE, board_id).await?;
        let order: Vec<i64> = view.columns[0].cards.iter().map(|cv| cv.card.id).collect();
        assert_eq!(order, vec![first.id, third.id, second.id]);
        Ok(())
    }

    #[tokio::test]
    async fn test_exhausted_gap_rebalances_in_same_commit() -> Result<()> {
        let c = coordinator_with(CoreSettings {
            allocator: PositionAllocator::new(65536.0, 20000.0),
            ..CoreSettings::default()
        })?;
        let (board_id, todo, _) = sprint_board(&c).await?;
        let a = create_card(&c, todo, None).await?;
        let d = create_card(&c, todo, None).await?;
        let b = create_card(&c, todo, Some(1)).await?; // 98304
        let x = create_card(&c, todo, Some(1)).await?; // 81920
        assert_eq!(x.position, 81920.0);

        // Gap 65536..81920 is below epsilon.
        let outcome = c
            .apply(
                BOB,
                Command::CreateCard {
                    column_id: todo,
                    title: "squeezed".to_string(),
                    description: None,
                    index: Some(1),
                },
            )
            .await?;
        let types: Vec<String> = outcome.events.iter().map(|e| e.change.type_name()).collect();
        assert_eq!(types, vec!["PositionsRebalanced", "CardCreated"]);
        let squeezed = match &outcome.events[1].change {
            Change::CardCreated { card } => card.clone(),
            other => panic!("Expected CardCreated, got {:?}", other),
        };
        assert_eq!(squeezed.position, 98304.0);

        let view = c.board_view(ALICE, board_id).await?;
        let cards: Vec<(i64, f64)> = view.columns[0]
            .cards
            .iter()
            .map(|cv| (cv.card.id, cv.card.position))
            .collect();
        assert_eq!(
            cards,
            vec![
                (a.id, 65536.0),
                (squeezed.id, 98304.0),
                (x.id, 131072.0),
                (b.id, 196608.0),
                (d.id, 262144.0),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_non_member_and_missing_capability_are_distinct() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, _) = sprint_board(&c).await?;
        let before = c.activities(ALICE, board_id, 100).await?.len();

        let err = c
            .apply(
                MALLORY,
                Command::CreateCard {
                    column_id: todo,
                    title: "sneaky".to_string(),
                    description: None,
                    index: None,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_not_member());

        let err = c
            .apply(BOB, Command::DeleteBoard { board_id })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BoardError::Denied {
                reason: DenyReason::MissingCapability {
                    role: Role::User,
                    capability: Capability::DeleteBoard
                },
                ..
            }
        ));

        // Denied commands leave no trace.
        assert_eq!(c.activities(ALICE, board_id, 100).await?.len(), before);
        assert!(c.board_view(ALICE, board_id).await?.columns[0].cards.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_target_is_not_found() -> Result<()> {
        let c = coordinator()?;
        sprint_board(&c).await?;
        let err = c
            .apply(ALICE, Command::ArchiveCard { card_id: 999 })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BoardError::NotFound {
                entity: EntityKind::Card,
                id: 999
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_card_moved_precedes_automated_completion() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, done) = sprint_board(&c).await?;
        let rule_id = add_rule(
            &c,
            board_id,
            Trigger::CardEnteredColumn { column_id: done },
            vec![Action::SetCompleted { completed: true }],
        )
        .await?;
        let card = create_card(&c, todo, None).await?;

        let mut sub = c.subscribe(ALICE, board_id).await?;
        let outcome = c
            .apply(
                BOB,
                Command::MoveCard {
                    card_id: card.id,
                    to_column_id: done,
                    index: None,
                },
            )
            .await?;

        let types: Vec<String> = outcome.events.iter().map(|e| e.change.type_name()).collect();
        assert_eq!(types, vec!["CardMoved", "CardCompletionChanged"]);
        assert_eq!(outcome.events[0].origin, Origin::Actor { user_id: BOB });
        assert_eq!(outcome.events[1].origin, Origin::Automation { rule_id });

        for expected in ["CardMoved", "CardCompletionChanged"] {
            match sub.next().await {
                Some(BusFrame::Event(event)) => assert_eq!(event.change.type_name(), expected),
                other => panic!("Expected {}, got {:?}", expected, other),
            }
        }
        assert!(card_in_view(&c, board_id, card.id).await?.completed);

        let activities = c.activities(ALICE, board_id, 2).await?;
        assert_eq!(activities[0].action, "CardCompletionChanged");
        assert_eq!(activities[0].rule_id, Some(rule_id));
        assert_eq!(activities[1].action, "CardMoved");
        assert_eq!(activities[1].actor_id, Some(BOB));
        Ok(())
    }

    #[tokio::test]
    async fn test_actions_run_in_declared_order() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, done) = sprint_board(&c).await?;
        let label = create_label(&c, board_id).await?;
        add_rule(
            &c,
            board_id,
            Trigger::CardCreatedInColumn { column_id: todo },
            vec![
                Action::AddLabel { label_id: label },
                Action::MoveToColumn {
                    column_id: done,
                    placement: Placement::Top,
                },
                Action::SetCompleted { completed: true },
            ],
        )
        .await?;

        let outcome = c
            .apply(
                BOB,
                Command::CreateCard {
                    column_id: todo,
                    title: "auto".to_string(),
                    description: None,
                    index: None,
                },
            )
            .await?;
        let types: Vec<String> = outcome.events.iter().map(|e| e.change.type_name()).collect();
        assert_eq!(
            types,
            vec![
                "CardCreated",
                "CardLabelAdded",
                "CardMoved",
                "CardCompletionChanged"
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_self_retriggering_rule_fires_once() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, done) = sprint_board(&c).await?;
        // Entering Done bounces the card to To-Do; entering To-Do sends it back.
        add_rule(
            &c,
            board_id,
            Trigger::CardEnteredColumn { column_id: done },
            vec![Action::MoveToColumn {
                column_id: todo,
                placement: Placement::Bottom,
            }],
        )
        .await?;
        add_rule(
            &c,
            board_id,
            Trigger::CardEnteredColumn { column_id: todo },
            vec![Action::MoveToColumn {
                column_id: done,
                placement: Placement::Bottom,
            }],
        )
        .await?;
        let card = create_card(&c, todo, None).await?;

        let outcome = c
            .apply(
                BOB,
                Command::MoveCard {
                    card_id: card.id,
                    to_column_id: done,
                    index: None,
                },
            )
            .await?;
        // User move, then each rule exactly once.
        assert_eq!(outcome.events.len(), 3);
        let final_column = card_in_view(&c, board_id, card.id).await?.column_id;
        assert_eq!(final_column, done);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_action_keeps_earlier_commits() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, _) = sprint_board(&c).await?;
        let archived = create_column(&c, board_id, "Icebox").await?;
        let label = create_label(&c, board_id).await?;
        add_rule(
            &c,
            board_id,
            Trigger::CardCompleted,
            vec![
                Action::AddLabel { label_id: label },
                Action::MoveToColumn {
                    column_id: archived,
                    placement: Placement::Bottom,
                },
                Action::Archive,
            ],
        )
        .await?;
        c.apply(
            ALICE,
            Command::SetColumnArchived {
                column_id: archived,
                archived: true,
            },
        )
        .await?;
        let card = create_card(&c, todo, None).await?;

        let outcome = c
            .apply(
                BOB,
                Command::SetCardCompleted {
                    card_id: card.id,
                    completed: true,
                },
            )
            .await?;
        let types: Vec<String> = outcome.events.iter().map(|e| e.change.type_name()).collect();
        assert_eq!(types, vec!["CardCompletionChanged", "CardLabelAdded"]);

        let card = card_in_view(&c, board_id, card.id).await?;
        assert!(card.completed);
        assert!(!card.archived);
        assert_eq!(card.labels, vec![label]);
        assert_eq!(card.column_id, todo);
        Ok(())
    }

    #[tokio::test]
    async fn test_rules_cannot_reference_other_boards() -> Result<()> {
        let c = coordinator()?;
        let (board_id, _, _) = sprint_board(&c).await?;
        let other = c.create_board(ALICE, "Other".to_string()).await?;
        let foreign = create_column(&c, other.id, "Elsewhere").await?;

        let err = c
            .apply(
                ALICE,
                Command::CreateAutomationRule {
                    board_id,
                    name: "escape".to_string(),
                    trigger: Trigger::CardCompleted,
                    actions: vec![Action::MoveToColumn {
                        column_id: foreign,
                        placement: Placement::Bottom,
                    }],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::InvalidCommand(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_cannot_move_card_to_other_board() -> Result<()> {
        let c = coordinator()?;
        let (_, todo, _) = sprint_board(&c).await?;
        let other = c.create_board(ALICE, "Other".to_string()).await?;
        let foreign = create_column(&c, other.id, "Elsewhere").await?;
        let card = create_card(&c, todo, None).await?;

        let err = c
            .apply(
                ALICE,
                Command::MoveCard {
                    card_id: card.id,
                    to_column_id: foreign,
                    index: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::InvalidCommand(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_last_admin_is_protected() -> Result<()> {
        let c = coordinator()?;
        let (board_id, _, _) = sprint_board(&c).await?;

        let err = c
            .apply(
                ALICE,
                Command::ChangeMemberRole {
                    board_id,
                    user_id: ALICE,
                    role: Role::User,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::InvalidCommand(_)));

        c.apply(
            ALICE,
            Command::ChangeMemberRole {
                board_id,
                user_id: BOB,
                role: Role::Admin,
            },
        )
        .await?;
        c.apply(
            BOB,
            Command::RemoveMember {
                board_id,
                user_id: ALICE,
            },
        )
        .await?;

        let err = c
            .apply(ALICE, Command::RenameBoard {
                board_id,
                name: "mine".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.is_not_member());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_invite_is_rejected() -> Result<()> {
        let c = coordinator()?;
        let (board_id, _, _) = sprint_board(&c).await?;
        let err = c
            .apply(
                ALICE,
                Command::InviteMember {
                    board_id,
                    user_id: BOB,
                    role: Role::Admin,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::InvalidCommand(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_archived_column_rejects_cards() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, _) = sprint_board(&c).await?;
        c.apply(
            ALICE,
            Command::SetColumnArchived {
                column_id: todo,
                archived: true,
            },
        )
        .await?;
        assert_eq!(c.board_view(ALICE, board_id).await?.columns.len(), 1);
        assert!(create_card(&c, todo, None).await.is_err());

        // Restored columns rejoin at the end.
        c.apply(
            ALICE,
            Command::SetColumnArchived {
                column_id: todo,
                archived: false,
            },
        )
        .await?;
        let view = c.board_view(ALICE, board_id).await?;
        assert_eq!(view.columns.last().map(|cv| cv.column.id), Some(todo));
        Ok(())
    }

    #[tokio::test]
    async fn test_deleted_board_behaves_as_not_found() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, _) = sprint_board(&c).await?;
        c.apply(ALICE, Command::DeleteBoard { board_id }).await?;

        let err = c.board_view(ALICE, board_id).await.unwrap_err();
        assert!(matches!(err, BoardError::NotFound { .. }));
        let err = create_card(&c, todo, None).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
        Ok(())
    }

    #[tokio::test]
    async fn test_checklist_items_order_and_move() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, _) = sprint_board(&c).await?;
        let card = create_card(&c, todo, None).await?;
        let outcome = c
            .apply(
                BOB,
                Command::CreateChecklist {
                    card_id: card.id,
                    title: "Steps".to_string(),
                },
            )
            .await?;
        let checklist_id = match &outcome.events[0].change {
            Change::ChecklistCreated { checklist } => checklist.id,
            other => panic!("Expected ChecklistCreated, got {:?}", other),
        };
        let mut items = Vec::new();
        for text in ["one", "two", "three"] {
            let outcome = c
                .apply(
                    BOB,
                    Command::CreateChecklistItem {
                        checklist_id,
                        text: text.to_string(),
                        index: None,
                    },
                )
                .await?;
            match &outcome.events[0].change {
                Change::ChecklistItemCreated { item } => items.push(item.id),
                other => panic!("Expected ChecklistItemCreated, got {:?}", other),
            }
        }
        c.apply(
            BOB,
            Command::MoveChecklistItem {
                item_id: items[2],
                index: 0,
            },
        )
        .await?;

        let view = c.board_view(ALICE, board_id).await?;
        let texts: Vec<String> = view.columns[0].cards[0].checklists[0]
            .items
            .iter()
            .map(|i| i.text.clone())
            .collect();
        assert_eq!(texts, vec!["three", "one", "two"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_subscribe_requires_membership() -> Result<()> {
        let c = coordinator()?;
        let (board_id, _, _) = sprint_board(&c).await?;
        assert!(c.subscribe(MALLORY, board_id).await.unwrap_err().is_not_member());
        let sub = c.subscribe(BOB, board_id).await?;
        assert_eq!(c.bus().subscriber_count(board_id), 1);
        drop(sub);
        assert_eq!(c.bus().subscriber_count(board_id), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_rule_does_not_fire() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, done) = sprint_board(&c).await?;
        let rule_id = add_rule(
            &c,
            board_id,
            Trigger::CardEnteredColumn { column_id: done },
            vec![Action::Archive],
        )
        .await?;
        c.apply(
            ALICE,
            Command::SetAutomationRuleEnabled {
                rule_id,
                enabled: false,
            },
        )
        .await?;
        let card = create_card(&c, todo, None).await?;
        let outcome = c
            .apply(
                BOB,
                Command::MoveCard {
                    card_id: card.id,
                    to_column_id: done,
                    index: None,
                },
            )
            .await?;
        assert_eq!(outcome.events.len(), 1);
        Ok(())
    }

    async fn next_event_type(sub: &mut Subscription) -> Option<String> {
        loop {
            match sub.next().await? {
                BusFrame::Event(event) => return Some(event.change.type_name()),
                BusFrame::Heartbeat | BusFrame::Lagged { .. } => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_removed_member_feed_ends() -> Result<()> {
        let c = coordinator()?;
        let (board_id, _, _) = sprint_board(&c).await?;
        let mut alice = c.subscribe(ALICE, board_id).await?;
        let mut bob = c.subscribe(BOB, board_id).await?;

        c.apply(
            ALICE,
            Command::RemoveMember {
                board_id,
                user_id: BOB,
            },
        )
        .await?;
        create_label(&c, board_id).await?;

        assert!(c.board_view(BOB, board_id).await.is_err());
        assert_eq!(next_event_type(&mut bob).await, None);
        assert_eq!(c.bus().subscriber_count(board_id), 1);

        assert_eq!(next_event_type(&mut alice).await.as_deref(), Some("MemberRemoved"));
        assert_eq!(next_event_type(&mut alice).await.as_deref(), Some("LabelCreated"));
        Ok(())
    }

    #[tokio::test]
    async fn test_deleted_board_feed_ends_after_delete_event() -> Result<()> {
        let c = coordinator()?;
        let (board_id, _, _) = sprint_board(&c).await?;
        let mut bob = c.subscribe(BOB, board_id).await?;

        c.apply(ALICE, Command::DeleteBoard { board_id }).await?;

        assert_eq!(next_event_type(&mut bob).await.as_deref(), Some("BoardDeleted"));
        assert_eq!(next_event_type(&mut bob).await, None);
        assert_eq!(c.bus().board_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_column_removes_its_cards() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, done) = sprint_board(&c).await?;
        let card = create_card(&c, todo, None).await?;

        let outcome = c.apply(BOB, Command::DeleteColumn { column_id: todo }).await?;
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].change, Change::ColumnDeleted { column_id: todo });

        let view = c.board_view(ALICE, board_id).await?;
        assert_eq!(view.columns.len(), 1);
        assert_eq!(view.columns[0].column.id, done);
        let err = c
            .apply(BOB, Command::ArchiveCard { card_id: card.id })
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::NotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_column_used_by_rule_is_rejected() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, done) = sprint_board(&c).await?;
        add_rule(
            &c,
            board_id,
            Trigger::CardCreatedInColumn { column_id: todo },
            vec![Action::MoveToColumn {
                column_id: done,
                placement: Placement::Top,
            }],
        )
        .await?;

        let err = c
            .apply(ALICE, Command::DeleteColumn { column_id: done })
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::InvalidCommand(_)));
        assert_eq!(c.board_view(ALICE, board_id).await?.columns.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_checklists_reorder() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, _) = sprint_board(&c).await?;
        let card = create_card(&c, todo, None).await?;
        let mut ids = Vec::new();
        for title in ["Design", "Build", "Ship"] {
            let outcome = c
                .apply(
                    BOB,
                    Command::CreateChecklist {
                        card_id: card.id,
                        title: title.to_string(),
                    },
                )
                .await?;
            match &outcome.events[0].change {
                Change::ChecklistCreated { checklist } => ids.push(checklist.id),
                other => panic!("Expected ChecklistCreated, got {:?}", other),
            }
        }

        let outcome = c
            .apply(
                BOB,
                Command::MoveChecklist {
                    checklist_id: ids[2],
                    index: 0,
                },
            )
            .await?;
        assert_eq!(outcome.events[0].change.type_name(), "ChecklistMoved");

        let view = c.board_view(ALICE, board_id).await?;
        let titles: Vec<String> = view.columns[0].cards[0]
            .checklists
            .iter()
            .map(|cl| cl.checklist.title.clone())
            .collect();
        assert_eq!(titles, vec!["Ship", "Design", "Build"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_card_clears_due_date_and_skips_noops() -> Result<()> {
        let c = coordinator()?;
        let (board_id, todo, _) = sprint_board(&c).await?;
        let card = create_card(&c, todo, None).await?;

        let set_due = Command::UpdateCard {
            card_id: card.id,
            title: None,
            description: None,
            due_date: Some(Some("2025-03-01".to_string())),
        };
        assert_eq!(c.apply(BOB, set_due.clone()).await?.events.len(), 1);
        assert_eq!(
            card_in_view(&c, board_id, card.id).await?.due_date.as_deref(),
            Some("2025-03-01")
        );

        // Same value again, and an update naming nothing, change nothing.
        let before = c.activities(ALICE, board_id, 100).await?.len();
        assert!(c.apply(BOB, set_due).await?.events.is_empty());
        let empty = Command::UpdateCard {
            card_id: card.id,
            title: None,
            description: None,
            due_date: None,
        };
        assert!(c.apply(BOB, empty).await?.events.is_empty());
        assert_eq!(c.activities(ALICE, board_id, 100).await?.len(), before);

        let clear = Command::UpdateCard {
            card_id: card.id,
            title: None,
            description: None,
            due_date: Some(None),
        };
        assert_eq!(c.apply(BOB, clear).await?.events.len(), 1);
        assert_eq!(card_in_view(&c, board_id, card.id).await?.due_date, None);
        Ok(())
    }
}
