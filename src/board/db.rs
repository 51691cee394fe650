use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use corkboard_common::Role;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};

use super::auth::MembershipLookup;
use super::automation::{Action, Trigger};
use super::command::Target;
use super::events::{Change, Origin};
use super::models::*;

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads. The mutex also serializes writers.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&BoardDb) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: From<anyhow::Error> + Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Used for startup
    /// initialization and tests; never from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, BoardDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct BoardDb {
    conn: Connection,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS boards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    deleted_at TEXT
                );

                CREATE TABLE IF NOT EXISTS members (
                    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL,
                    role TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (board_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS columns (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    position REAL NOT NULL,
                    touched INTEGER NOT NULL DEFAULT 0,
                    archived INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS cards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                    column_id INTEGER NOT NULL REFERENCES columns(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    position REAL NOT NULL,
                    touched INTEGER NOT NULL DEFAULT 0,
                    completed INTEGER NOT NULL DEFAULT 0,
                    archived INTEGER NOT NULL DEFAULT 0,
                    due_date TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS labels (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    color TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS card_labels (
                    card_id INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                    label_id INTEGER NOT NULL REFERENCES labels(id) ON DELETE CASCADE,
                    PRIMARY KEY (card_id, label_id)
                );

                CREATE TABLE IF NOT EXISTS checklists (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    card_id INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    position REAL NOT NULL,
                    touched INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS checklist_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    checklist_id INTEGER NOT NULL REFERENCES checklists(id) ON DELETE CASCADE,
                    text TEXT NOT NULL,
                    checked INTEGER NOT NULL DEFAULT 0,
                    position REAL NOT NULL,
                    touched INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS automation_rules (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    trigger_spec TEXT NOT NULL,
                    actions TEXT NOT NULL DEFAULT '[]',
                    enabled INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS activities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                    actor_id INTEGER,
                    rule_id INTEGER,
                    action TEXT NOT NULL,
                    detail TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_members_user ON members(user_id);
                CREATE INDEX IF NOT EXISTS idx_columns_board ON columns(board_id, position);
                CREATE INDEX IF NOT EXISTS idx_cards_column ON cards(column_id, position);
                CREATE INDEX IF NOT EXISTS idx_checklists_card ON checklists(card_id, position);
                CREATE INDEX IF NOT EXISTS idx_items_checklist ON checklist_items(checklist_id, position);
                CREATE INDEX IF NOT EXISTS idx_rules_board ON automation_rules(board_id);
                CREATE INDEX IF NOT EXISTS idx_activities_board ON activities(board_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Begin a transaction. Dropping the returned value without calling
    /// [`StoreTx::commit`] rolls everything back.
    pub fn transaction(&self) -> Result<StoreTx<'_>> {
        // unchecked_transaction: DbHandle's Mutex already guarantees
        // single-threaded access to the connection.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        Ok(StoreTx { tx })
    }

    /// Full snapshot of an active board, used by observers to resync.
    pub fn board_view(&self, board_id: i64) -> Result<Option<BoardView>> {
        let tx = self.transaction()?;
        let Some(board) = tx.find_board(board_id)? else {
            return Ok(None);
        };
        let members = tx.list_members(board_id)?;
        let labels = tx.list_labels(board_id)?;
        let rules = tx.list_rules(board_id)?;

        let mut columns = Vec::new();
        for column in tx.list_columns(board_id)? {
            let mut cards = Vec::new();
            for card in tx.list_cards(column.id)? {
                let mut checklists = Vec::new();
                for checklist in tx.list_checklists(card.id)? {
                    let items = tx.list_items(checklist.id)?;
                    checklists.push(ChecklistView { checklist, items });
                }
                cards.push(CardView { card, checklists });
            }
            columns.push(ColumnView { column, cards });
        }

        Ok(Some(BoardView {
            board,
            members,
            labels,
            columns,
            rules,
        }))
    }

    /// Most recent activity first.
    pub fn list_activities(&self, board_id: i64, limit: usize) -> Result<Vec<Activity>> {
        let tx = self.transaction()?;
        tx.list_activities(board_id, limit)
    }
}

impl MembershipLookup for BoardDb {
    fn membership(&self, board_id: i64, user_id: i64) -> Result<Option<Member>> {
        self.transaction()?.membership(board_id, user_id)
    }
}

/// An ordered sibling set sharing one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Siblings {
    Columns { board_id: i64 },
    Cards { column_id: i64 },
    Checklists { card_id: i64 },
    ChecklistItems { checklist_id: i64 },
}

impl Siblings {
    pub fn entity(&self) -> EntityKind {
        match self {
            Self::Columns { .. } => EntityKind::Column,
            Self::Cards { .. } => EntityKind::Card,
            Self::Checklists { .. } => EntityKind::Checklist,
            Self::ChecklistItems { .. } => EntityKind::ChecklistItem,
        }
    }

    pub fn parent_id(&self) -> i64 {
        match self {
            Self::Columns { board_id } => *board_id,
            Self::Cards { column_id } => *column_id,
            Self::Checklists { card_id } => *card_id,
            Self::ChecklistItems { checklist_id } => *checklist_id,
        }
    }

    fn table(&self) -> &'static str {
        match self {
            Self::Columns { .. } => "columns",
            Self::Cards { .. } => "cards",
            Self::Checklists { .. } => "checklists",
            Self::ChecklistItems { .. } => "checklist_items",
        }
    }

    fn parent_column(&self) -> &'static str {
        match self {
            Self::Columns { .. } => "board_id",
            Self::Cards { .. } => "column_id",
            Self::Checklists { .. } => "card_id",
            Self::ChecklistItems { .. } => "checklist_id",
        }
    }

    fn filter(&self) -> &'static str {
        match self {
            Self::Columns { .. } | Self::Cards { .. } => " AND archived = 0",
            Self::Checklists { .. } | Self::ChecklistItems { .. } => "",
        }
    }
}

const COLUMN_FIELDS: &str = "id, board_id, title, position, archived, created_at, updated_at";
const CARD_FIELDS: &str = "id, board_id, column_id, title, description, position, completed, archived, due_date, created_at, updated_at";
const RULE_FIELDS: &str = "id, board_id, name, trigger_spec, actions, enabled, created_at";

fn column_from_row(row: &Row<'_>) -> rusqlite::Result<Column> {
    Ok(Column {
        id: row.get(0)?,
        board_id: row.get(1)?,
        title: row.get(2)?,
        position: row.get(3)?,
        archived: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        board_id: row.get(1)?,
        column_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        position: row.get(5)?,
        completed: row.get(6)?,
        archived: row.get(7)?,
        due_date: row.get(8)?,
        labels: Vec::new(),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<MemberRow> {
    Ok(MemberRow {
        board_id: row.get(0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn label_from_row(row: &Row<'_>) -> rusqlite::Result<Label> {
    Ok(Label {
        id: row.get(0)?,
        board_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
    })
}

fn checklist_from_row(row: &Row<'_>) -> rusqlite::Result<Checklist> {
    Ok(Checklist {
        id: row.get(0)?,
        card_id: row.get(1)?,
        title: row.get(2)?,
        position: row.get(3)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<ChecklistItem> {
    Ok(ChecklistItem {
        id: row.get(0)?,
        checklist_id: row.get(1)?,
        text: row.get(2)?,
        checked: row.get(3)?,
        position: row.get(4)?,
    })
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<RuleRow> {
    Ok(RuleRow {
        id: row.get(0)?,
        board_id: row.get(1)?,
        name: row.get(2)?,
        trigger_spec: row.get(3)?,
        actions: row.get(4)?,
        enabled: row.get(5)?,
        created_at: row.get(6)?,
    })
}

struct MemberRow {
    board_id: i64,
    user_id: i64,
    role: String,
    created_at: String,
}

impl MemberRow {
    fn into_member(self) -> Result<Member> {
        Ok(Member {
            board_id: self.board_id,
            user_id: self.user_id,
            role: Role::from_str(&self.role).map_err(|e| anyhow::anyhow!(e))?,
            created_at: self.created_at,
        })
    }
}

struct RuleRow {
    id: i64,
    board_id: i64,
    name: String,
    trigger_spec: String,
    actions: String,
    enabled: bool,
    created_at: String,
}

impl RuleRow {
    fn into_rule(self) -> Result<AutomationRule> {
        let trigger: Trigger = serde_json::from_str(&self.trigger_spec)
            .with_context(|| format!("Failed to parse trigger of rule {}", self.id))?;
        let actions: Vec<Action> = serde_json::from_str(&self.actions)
            .with_context(|| format!("Failed to parse actions of rule {}", self.id))?;
        Ok(AutomationRule {
            id: self.id,
            board_id: self.board_id,
            name: self.name,
            trigger,
            actions,
            enabled: self.enabled,
            created_at: self.created_at,
        })
    }
}

/// One atomic unit of work against the record store.
pub struct StoreTx<'conn> {
    tx: Transaction<'conn>,
}

impl StoreTx<'_> {
    pub fn commit(self) -> Result<()> {
        self.tx.commit().context("Failed to commit transaction")
    }

    // ── Resolution and membership ─────────────────────────────────────

    /// Board owning `target`, if both exist and the board is active.
    pub fn resolve_board(&self, target: Target) -> Result<Option<i64>> {
        let sql = match target.entity {
            EntityKind::Board => "SELECT id FROM boards WHERE id = ?1 AND deleted_at IS NULL",
            EntityKind::Column => {
                "SELECT c.board_id FROM columns c JOIN boards b ON b.id = c.board_id
                 WHERE c.id = ?1 AND b.deleted_at IS NULL"
            }
            EntityKind::Card => {
                "SELECT c.board_id FROM cards c JOIN boards b ON b.id = c.board_id
                 WHERE c.id = ?1 AND b.deleted_at IS NULL"
            }
            EntityKind::Label => {
                "SELECT l.board_id FROM labels l JOIN boards b ON b.id = l.board_id
                 WHERE l.id = ?1 AND b.deleted_at IS NULL"
            }
            EntityKind::Checklist => {
                "SELECT c.board_id FROM checklists ch
                 JOIN cards c ON c.id = ch.card_id
                 JOIN boards b ON b.id = c.board_id
                 WHERE ch.id = ?1 AND b.deleted_at IS NULL"
            }
            EntityKind::ChecklistItem => {
                "SELECT c.board_id FROM checklist_items i
                 JOIN checklists ch ON ch.id = i.checklist_id
                 JOIN cards c ON c.id = ch.card_id
                 JOIN boards b ON b.id = c.board_id
                 WHERE i.id = ?1 AND b.deleted_at IS NULL"
            }
            EntityKind::AutomationRule => {
                "SELECT r.board_id FROM automation_rules r JOIN boards b ON b.id = r.board_id
                 WHERE r.id = ?1 AND b.deleted_at IS NULL"
            }
            EntityKind::Member => return Ok(None),
        };
        self.tx
            .query_row(sql, params![target.id], |row| row.get(0))
            .optional()
            .context("Failed to resolve board")
    }

    pub fn membership(&self, board_id: i64, user_id: i64) -> Result<Option<Member>> {
        let row = self
            .tx
            .query_row(
                "SELECT board_id, user_id, role, created_at FROM members
                 WHERE board_id = ?1 AND user_id = ?2",
                params![board_id, user_id],
                member_from_row,
            )
            .optional()
            .context("Failed to query membership")?;
        row.map(MemberRow::into_member).transpose()
    }

    pub fn list_members(&self, board_id: i64) -> Result<Vec<Member>> {
        let mut stmt = self
            .tx
            .prepare(
                "SELECT board_id, user_id, role, created_at FROM members
                 WHERE board_id = ?1 ORDER BY created_at, user_id",
            )
            .context("Failed to prepare list_members")?;
        let rows = stmt
            .query_map(params![board_id], member_from_row)
            .context("Failed to query members")?;
        let mut members = Vec::new();
        for row in rows {
            members.push(row.context("Failed to read member row")?.into_member()?);
        }
        Ok(members)
    }

    pub fn count_admins(&self, board_id: i64) -> Result<i64> {
        self.tx
            .query_row(
                "SELECT COUNT(*) FROM members WHERE board_id = ?1 AND role = ?2",
                params![board_id, Role::Admin.as_str()],
                |row| row.get(0),
            )
            .context("Failed to count admins")
    }

    pub fn insert_member(&self, board_id: i64, user_id: i64, role: Role) -> Result<Member> {
        self.tx
            .execute(
                "INSERT INTO members (board_id, user_id, role) VALUES (?1, ?2, ?3)",
                params![board_id, user_id, role.as_str()],
            )
            .context("Failed to insert member")?;
        self.membership(board_id, user_id)?
            .context("Member not found after insert")
    }

    pub fn update_member_role(&self, board_id: i64, user_id: i64, role: Role) -> Result<Member> {
        self.tx
            .execute(
                "UPDATE members SET role = ?1 WHERE board_id = ?2 AND user_id = ?3",
                params![role.as_str(), board_id, user_id],
            )
            .context("Failed to update member role")?;
        self.membership(board_id, user_id)?
            .context("Member not found after role change")
    }

    pub fn delete_member(&self, board_id: i64, user_id: i64) -> Result<bool> {
        let count = self
            .tx
            .execute(
                "DELETE FROM members WHERE board_id = ?1 AND user_id = ?2",
                params![board_id, user_id],
            )
            .context("Failed to delete member")?;
        Ok(count > 0)
    }

    // ── Boards ────────────────────────────────────────────────────────

    pub fn insert_board(&self, name: &str) -> Result<Board> {
        self.tx
            .execute("INSERT INTO boards (name) VALUES (?1)", params![name])
            .context("Failed to insert board")?;
        let id = self.tx.last_insert_rowid();
        self.find_board(id)?.context("Board not found after insert")
    }

    /// Active (not soft-deleted) board.
    pub fn find_board(&self, id: i64) -> Result<Option<Board>> {
        self.tx
            .query_row(
                "SELECT id, name, created_at, updated_at FROM boards
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![id],
                |row| {
                    Ok(Board {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to query board")
    }

    pub fn rename_board(&self, id: i64, name: &str) -> Result<Board> {
        self.tx
            .execute(
                "UPDATE boards SET name = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![name, id],
            )
            .context("Failed to rename board")?;
        self.find_board(id)?.context("Board not found after rename")
    }

    pub fn soft_delete_board(&self, id: i64) -> Result<bool> {
        let count = self
            .tx
            .execute(
                "UPDATE boards SET deleted_at = datetime('now') WHERE id = ?1 AND deleted_at IS NULL",
                params![id],
            )
            .context("Failed to delete board")?;
        Ok(count > 0)
    }

    // ── Ordering ──────────────────────────────────────────────────────

    /// Sibling ids and positions in render order, optionally leaving one out.
    /// Equal positions fall back to touch order, so the most recently
    /// touched sibling sorts last.
    pub fn sibling_positions(&self, siblings: Siblings, exclude: Option<i64>) -> Result<Vec<(i64, f64)>> {
        let sql = format!(
            "SELECT id, position FROM {} WHERE {} = ?1{} AND id != ?2
             ORDER BY position, touched, id",
            siblings.table(),
            siblings.parent_column(),
            siblings.filter()
        );
        let mut stmt = self
            .tx
            .prepare(&sql)
            .context("Failed to prepare sibling_positions")?;
        let rows = stmt
            .query_map(params![siblings.parent_id(), exclude.unwrap_or(-1)], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .context("Failed to query sibling positions")?;
        let mut positions = Vec::new();
        for row in rows {
            positions.push(row.context("Failed to read sibling row")?);
        }
        Ok(positions)
    }

    /// Overwrite positions without changing touch order.
    pub fn write_positions(&self, siblings: Siblings, positions: &[(i64, f64)]) -> Result<()> {
        let sql = format!("UPDATE {} SET position = ?1 WHERE id = ?2", siblings.table());
        let mut stmt = self
            .tx
            .prepare(&sql)
            .context("Failed to prepare write_positions")?;
        for (id, position) in positions {
            stmt.execute(params![position, id])
                .context("Failed to write position")?;
        }
        Ok(())
    }

    fn next_touch(&self, table: &str) -> Result<i64> {
        self.tx
            .query_row(
                &format!("SELECT COALESCE(MAX(touched), 0) + 1 FROM {}", table),
                [],
                |row| row.get(0),
            )
            .context("Failed to compute touch sequence")
    }

    // ── Columns ───────────────────────────────────────────────────────

    pub fn find_column(&self, id: i64) -> Result<Option<Column>> {
        self.tx
            .query_row(
                &format!("SELECT {} FROM columns WHERE id = ?1", COLUMN_FIELDS),
                params![id],
                column_from_row,
            )
            .optional()
            .context("Failed to query column")
    }

    /// Non-archived columns in order.
    pub fn list_columns(&self, board_id: i64) -> Result<Vec<Column>> {
        let mut stmt = self
            .tx
            .prepare(&format!(
                "SELECT {} FROM columns WHERE board_id = ?1 AND archived = 0
                 ORDER BY position, touched, id",
                COLUMN_FIELDS
            ))
            .context("Failed to prepare list_columns")?;
        let rows = stmt
            .query_map(params![board_id], column_from_row)
            .context("Failed to query columns")?;
        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.context("Failed to read column row")?);
        }
        Ok(columns)
    }

    pub fn insert_column(&self, board_id: i64, title: &str, position: f64) -> Result<Column> {
        let touched = self.next_touch("columns")?;
        self.tx
            .execute(
                "INSERT INTO columns (board_id, title, position, touched) VALUES (?1, ?2, ?3, ?4)",
                params![board_id, title, position, touched],
            )
            .context("Failed to insert column")?;
        let id = self.tx.last_insert_rowid();
        self.find_column(id)?.context("Column not found after insert")
    }

    pub fn rename_column(&self, id: i64, title: &str) -> Result<Column> {
        self.tx
            .execute(
                "UPDATE columns SET title = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![title, id],
            )
            .context("Failed to rename column")?;
        self.find_column(id)?.context("Column not found after rename")
    }

    pub fn move_column(&self, id: i64, position: f64) -> Result<Column> {
        let touched = self.next_touch("columns")?;
        self.tx
            .execute(
                "UPDATE columns SET position = ?1, touched = ?2, updated_at = datetime('now') WHERE id = ?3",
                params![position, touched, id],
            )
            .context("Failed to move column")?;
        self.find_column(id)?.context("Column not found after move")
    }

    pub fn set_column_archived(&self, id: i64, archived: bool, position: f64) -> Result<Column> {
        let touched = self.next_touch("columns")?;
        self.tx
            .execute(
                "UPDATE columns SET archived = ?1, position = ?2, touched = ?3, updated_at = datetime('now')
                 WHERE id = ?4",
                params![archived, position, touched, id],
            )
            .context("Failed to archive column")?;
        self.find_column(id)?.context("Column not found after archive")
    }

    /// Cards in the column go with it (`ON DELETE CASCADE`).
    pub fn delete_column(&self, id: i64) -> Result<bool> {
        let count = self
            .tx
            .execute("DELETE FROM columns WHERE id = ?1", params![id])
            .context("Failed to delete column")?;
        Ok(count > 0)
    }

    // ── Cards ─────────────────────────────────────────────────────────

    pub fn find_card(&self, id: i64) -> Result<Option<Card>> {
        let card = self
            .tx
            .query_row(
                &format!("SELECT {} FROM cards WHERE id = ?1", CARD_FIELDS),
                params![id],
                card_from_row,
            )
            .optional()
            .context("Failed to query card")?;
        match card {
            Some(mut card) => {
                card.labels = self.card_labels(card.id)?;
                Ok(Some(card))
            }
            None => Ok(None),
        }
    }

    /// Non-archived cards of a column in order.
    pub fn list_cards(&self, column_id: i64) -> Result<Vec<Card>> {
        let mut stmt = self
            .tx
            .prepare(&format!(
                "SELECT {} FROM cards WHERE column_id = ?1 AND archived = 0
                 ORDER BY position, touched, id",
                CARD_FIELDS
            ))
            .context("Failed to prepare list_cards")?;
        let rows = stmt
            .query_map(params![column_id], card_from_row)
            .context("Failed to query cards")?;
        let mut cards = Vec::new();
        for row in rows {
            let mut card = row.context("Failed to read card row")?;
            card.labels = self.card_labels(card.id)?;
            cards.push(card);
        }
        Ok(cards)
    }

    pub fn insert_card(
        &self,
        board_id: i64,
        column_id: i64,
        title: &str,
        description: &str,
        position: f64,
    ) -> Result<Card> {
        let touched = self.next_touch("cards")?;
        self.tx
            .execute(
                "INSERT INTO cards (board_id, column_id, title, description, position, touched)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![board_id, column_id, title, description, position, touched],
            )
            .context("Failed to insert card")?;
        let id = self.tx.last_insert_rowid();
        self.find_card(id)?.context("Card not found after insert")
    }

    /// `due_date: Some(None)` clears the due date.
    pub fn update_card(
        &self,
        id: i64,
        title: Option<&str>,
        description: Option<&str>,
        due_date: Option<Option<&str>>,
    ) -> Result<Card> {
        if let Some(t) = title {
            self.tx
                .execute(
                    "UPDATE cards SET title = ?1, updated_at = datetime('now') WHERE id = ?2",
                    params![t, id],
                )
                .context("Failed to update card title")?;
        }
        if let Some(d) = description {
            self.tx
                .execute(
                    "UPDATE cards SET description = ?1, updated_at = datetime('now') WHERE id = ?2",
                    params![d, id],
                )
                .context("Failed to update card description")?;
        }
        if let Some(d) = due_date {
            self.tx
                .execute(
                    "UPDATE cards SET due_date = ?1, updated_at = datetime('now') WHERE id = ?2",
                    params![d, id],
                )
                .context("Failed to update card due date")?;
        }
        self.find_card(id)?.context("Card not found after update")
    }

    pub fn move_card(&self, id: i64, column_id: i64, position: f64) -> Result<Card> {
        let touched = self.next_touch("cards")?;
        self.tx
            .execute(
                "UPDATE cards SET column_id = ?1, position = ?2, touched = ?3, updated_at = datetime('now')
                 WHERE id = ?4",
                params![column_id, position, touched, id],
            )
            .context("Failed to move card")?;
        self.find_card(id)?.context("Card not found after move")
    }

    pub fn set_card_completed(&self, id: i64, completed: bool) -> Result<()> {
        self.tx
            .execute(
                "UPDATE cards SET completed = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![completed, id],
            )
            .context("Failed to set card completion")?;
        Ok(())
    }

    pub fn archive_card(&self, id: i64) -> Result<()> {
        self.tx
            .execute(
                "UPDATE cards SET archived = 1, updated_at = datetime('now') WHERE id = ?1",
                params![id],
            )
            .context("Failed to archive card")?;
        Ok(())
    }

    pub fn delete_card(&self, id: i64) -> Result<bool> {
        let count = self
            .tx
            .execute("DELETE FROM cards WHERE id = ?1", params![id])
            .context("Failed to delete card")?;
        Ok(count > 0)
    }

    pub fn card_labels(&self, card_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .tx
            .prepare("SELECT label_id FROM card_labels WHERE card_id = ?1 ORDER BY label_id")
            .context("Failed to prepare card_labels")?;
        let rows = stmt
            .query_map(params![card_id], |row| row.get(0))
            .context("Failed to query card labels")?;
        let mut labels = Vec::new();
        for row in rows {
            labels.push(row.context("Failed to read card label row")?);
        }
        Ok(labels)
    }

    /// Returns false when the label was already attached.
    pub fn add_card_label(&self, card_id: i64, label_id: i64) -> Result<bool> {
        let count = self
            .tx
            .execute(
                "INSERT OR IGNORE INTO card_labels (card_id, label_id) VALUES (?1, ?2)",
                params![card_id, label_id],
            )
            .context("Failed to attach label")?;
        Ok(count > 0)
    }

    /// Returns false when the label was not attached.
    pub fn remove_card_label(&self, card_id: i64, label_id: i64) -> Result<bool> {
        let count = self
            .tx
            .execute(
                "DELETE FROM card_labels WHERE card_id = ?1 AND label_id = ?2",
                params![card_id, label_id],
            )
            .context("Failed to detach label")?;
        Ok(count > 0)
    }

    // ── Labels ────────────────────────────────────────────────────────

    pub fn find_label(&self, id: i64) -> Result<Option<Label>> {
        self.tx
            .query_row(
                "SELECT id, board_id, name, color FROM labels WHERE id = ?1",
                params![id],
                label_from_row,
            )
            .optional()
            .context("Failed to query label")
    }

    pub fn list_labels(&self, board_id: i64) -> Result<Vec<Label>> {
        let mut stmt = self
            .tx
            .prepare("SELECT id, board_id, name, color FROM labels WHERE board_id = ?1 ORDER BY id")
            .context("Failed to prepare list_labels")?;
        let rows = stmt
            .query_map(params![board_id], label_from_row)
            .context("Failed to query labels")?;
        let mut labels = Vec::new();
        for row in rows {
            labels.push(row.context("Failed to read label row")?);
        }
        Ok(labels)
    }

    pub fn insert_label(&self, board_id: i64, name: &str, color: &str) -> Result<Label> {
        self.tx
            .execute(
                "INSERT INTO labels (board_id, name, color) VALUES (?1, ?2, ?3)",
                params![board_id, name, color],
            )
            .context("Failed to insert label")?;
        let id = self.tx.last_insert_rowid();
        self.find_label(id)?.context("Label not found after insert")
    }

    pub fn update_label(&self, id: i64, name: Option<&str>, color: Option<&str>) -> Result<Label> {
        if let Some(n) = name {
            self.tx
                .execute("UPDATE labels SET name = ?1 WHERE id = ?2", params![n, id])
                .context("Failed to rename label")?;
        }
        if let Some(c) = color {
            self.tx
                .execute("UPDATE labels SET color = ?1 WHERE id = ?2", params![c, id])
                .context("Failed to recolor label")?;
        }
        self.find_label(id)?.context("Label not found after update")
    }

    pub fn delete_label(&self, id: i64) -> Result<bool> {
        let count = self
            .tx
            .execute("DELETE FROM labels WHERE id = ?1", params![id])
            .context("Failed to delete label")?;
        Ok(count > 0)
    }

    // ── Checklists ────────────────────────────────────────────────────

    pub fn find_checklist(&self, id: i64) -> Result<Option<Checklist>> {
        self.tx
            .query_row(
                "SELECT id, card_id, title, position FROM checklists WHERE id = ?1",
                params![id],
                checklist_from_row,
            )
            .optional()
            .context("Failed to query checklist")
    }

    pub fn list_checklists(&self, card_id: i64) -> Result<Vec<Checklist>> {
        let mut stmt = self
            .tx
            .prepare(
                "SELECT id, card_id, title, position FROM checklists WHERE card_id = ?1
                 ORDER BY position, touched, id",
            )
            .context("Failed to prepare list_checklists")?;
        let rows = stmt
            .query_map(params![card_id], checklist_from_row)
            .context("Failed to query checklists")?;
        let mut checklists = Vec::new();
        for row in rows {
            checklists.push(row.context("Failed to read checklist row")?);
        }
        Ok(checklists)
    }

    pub fn insert_checklist(&self, card_id: i64, title: &str, position: f64) -> Result<Checklist> {
        let touched = self.next_touch("checklists")?;
        self.tx
            .execute(
                "INSERT INTO checklists (card_id, title, position, touched) VALUES (?1, ?2, ?3, ?4)",
                params![card_id, title, position, touched],
            )
            .context("Failed to insert checklist")?;
        let id = self.tx.last_insert_rowid();
        self.find_checklist(id)?
            .context("Checklist not found after insert")
    }

    pub fn move_checklist(&self, id: i64, position: f64) -> Result<Checklist> {
        let touched = self.next_touch("checklists")?;
        self.tx
            .execute(
                "UPDATE checklists SET position = ?1, touched = ?2 WHERE id = ?3",
                params![position, touched, id],
            )
            .context("Failed to move checklist")?;
        self.find_checklist(id)?
            .context("Checklist not found after move")
    }

    pub fn delete_checklist(&self, id: i64) -> Result<bool> {
        let count = self
            .tx
            .execute("DELETE FROM checklists WHERE id = ?1", params![id])
            .context("Failed to delete checklist")?;
        Ok(count > 0)
    }

    pub fn find_item(&self, id: i64) -> Result<Option<ChecklistItem>> {
        self.tx
            .query_row(
                "SELECT id, checklist_id, text, checked, position FROM checklist_items WHERE id = ?1",
                params![id],
                item_from_row,
            )
            .optional()
            .context("Failed to query checklist item")
    }

    pub fn list_items(&self, checklist_id: i64) -> Result<Vec<ChecklistItem>> {
        let mut stmt = self
            .tx
            .prepare(
                "SELECT id, checklist_id, text, checked, position FROM checklist_items
                 WHERE checklist_id = ?1 ORDER BY position, touched, id",
            )
            .context("Failed to prepare list_items")?;
        let rows = stmt
            .query_map(params![checklist_id], item_from_row)
            .context("Failed to query checklist items")?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row.context("Failed to read checklist item row")?);
        }
        Ok(items)
    }

    pub fn insert_item(&self, checklist_id: i64, text: &str, position: f64) -> Result<ChecklistItem> {
        let touched = self.next_touch("checklist_items")?;
        self.tx
            .execute(
                "INSERT INTO checklist_items (checklist_id, text, position, touched) VALUES (?1, ?2, ?3, ?4)",
                params![checklist_id, text, position, touched],
            )
            .context("Failed to insert checklist item")?;
        let id = self.tx.last_insert_rowid();
        self.find_item(id)?
            .context("Checklist item not found after insert")
    }

    pub fn update_item(&self, id: i64, text: Option<&str>, checked: Option<bool>) -> Result<ChecklistItem> {
        if let Some(t) = text {
            self.tx
                .execute(
                    "UPDATE checklist_items SET text = ?1 WHERE id = ?2",
                    params![t, id],
                )
                .context("Failed to update checklist item text")?;
        }
        if let Some(c) = checked {
            self.tx
                .execute(
                    "UPDATE checklist_items SET checked = ?1 WHERE id = ?2",
                    params![c, id],
                )
                .context("Failed to update checklist item state")?;
        }
        self.find_item(id)?
            .context("Checklist item not found after update")
    }

    pub fn move_item(&self, id: i64, position: f64) -> Result<ChecklistItem> {
        let touched = self.next_touch("checklist_items")?;
        self.tx
            .execute(
                "UPDATE checklist_items SET position = ?1, touched = ?2 WHERE id = ?3",
                params![position, touched, id],
            )
            .context("Failed to move checklist item")?;
        self.find_item(id)?
            .context("Checklist item not found after move")
    }

    pub fn delete_item(&self, id: i64) -> Result<bool> {
        let count = self
            .tx
            .execute("DELETE FROM checklist_items WHERE id = ?1", params![id])
            .context("Failed to delete checklist item")?;
        Ok(count > 0)
    }

    // ── Automation rules ──────────────────────────────────────────────

    pub fn find_rule(&self, id: i64) -> Result<Option<AutomationRule>> {
        let row = self
            .tx
            .query_row(
                &format!("SELECT {} FROM automation_rules WHERE id = ?1", RULE_FIELDS),
                params![id],
                rule_from_row,
            )
            .optional()
            .context("Failed to query automation rule")?;
        row.map(RuleRow::into_rule).transpose()
    }

    /// All rules of a board in creation order.
    pub fn list_rules(&self, board_id: i64) -> Result<Vec<AutomationRule>> {
        let mut stmt = self
            .tx
            .prepare(&format!(
                "SELECT {} FROM automation_rules WHERE board_id = ?1 ORDER BY id",
                RULE_FIELDS
            ))
            .context("Failed to prepare list_rules")?;
        let rows = stmt
            .query_map(params![board_id], rule_from_row)
            .context("Failed to query automation rules")?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(row.context("Failed to read automation rule row")?.into_rule()?);
        }
        Ok(rules)
    }

    pub fn insert_rule(
        &self,
        board_id: i64,
        name: &str,
        trigger: &Trigger,
        actions: &[Action],
    ) -> Result<AutomationRule> {
        let trigger_json = serde_json::to_string(trigger).context("Failed to serialize trigger")?;
        let actions_json = serde_json::to_string(actions).context("Failed to serialize actions")?;
        self.tx
            .execute(
                "INSERT INTO automation_rules (board_id, name, trigger_spec, actions) VALUES (?1, ?2, ?3, ?4)",
                params![board_id, name, trigger_json, actions_json],
            )
            .context("Failed to insert automation rule")?;
        let id = self.tx.last_insert_rowid();
        self.find_rule(id)?
            .context("Automation rule not found after insert")
    }

    pub fn set_rule_enabled(&self, id: i64, enabled: bool) -> Result<AutomationRule> {
        self.tx
            .execute(
                "UPDATE automation_rules SET enabled = ?1 WHERE id = ?2",
                params![enabled, id],
            )
            .context("Failed to toggle automation rule")?;
        self.find_rule(id)?
            .context("Automation rule not found after update")
    }

    pub fn delete_rule(&self, id: i64) -> Result<bool> {
        let count = self
            .tx
            .execute("DELETE FROM automation_rules WHERE id = ?1", params![id])
            .context("Failed to delete automation rule")?;
        Ok(count > 0)
    }

    // ── Activity log ──────────────────────────────────────────────────

    pub fn append_activity(&self, board_id: i64, origin: Origin, change: &Change) -> Result<i64> {
        let value = serde_json::to_value(change).context("Failed to serialize change")?;
        let action = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();
        let detail = value
            .get("payload")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));
        self.tx
            .execute(
                "INSERT INTO activities (board_id, actor_id, rule_id, action, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    board_id,
                    origin.actor_id(),
                    origin.rule_id(),
                    action,
                    detail.to_string()
                ],
            )
            .context("Failed to append activity")?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn list_activities(&self, board_id: i64, limit: usize) -> Result<Vec<Activity>> {
        let mut stmt = self
            .tx
            .prepare(
                "SELECT id, board_id, actor_id, rule_id, action, detail, created_at
                 FROM activities WHERE board_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .context("Failed to prepare list_activities")?;
        let rows = stmt
            .query_map(params![board_id, limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .context("Failed to query activities")?;
        let mut activities = Vec::new();
        for row in rows {
            let (id, board_id, actor_id, rule_id, action, detail, created_at) =
                row.context("Failed to read activity row")?;
            activities.push(Activity {
                id,
                board_id,
                actor_id,
                rule_id,
                action,
                detail: serde_json::from_str(&detail).context("Failed to parse activity detail")?,
                created_at,
            });
        }
        Ok(activities)
    }
}
