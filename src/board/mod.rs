//! Corkboard — collaborative state coordination core.
//!
//! ## Overview
//!
//! Keeps concurrently edited, ordered board state consistent. Every mutation
//! arrives as a typed [`Command`](command::Command), is gated once by the
//! actor's role on the board, applied in a single SQLite transaction together
//! with its activity record, may fire user-defined automation rules, and is
//! broadcast to live observers only after it commits.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    ├─ api.rs  (route handlers, AppState)         │
//! └──────────┘ WebSocket│    └─ ws.rs   (observer socket loop)             │
//!                       │         │                                        │
//!                       │         │ Coordinator::apply(actor, command)     │
//!                       │         v                                        │
//!                       │  coordinator.rs  (Pipeline, Writer)              │
//!                       │         │                                        │
//!                       │         ├─ auth.rs        gate, once per command │
//!                       │         ├─ db.rs          StoreTx + positions    │
//!                       │         ├─ automation.rs  rules, Cascade         │
//!                       │         v                                        │
//!                       │  bus.rs  (EventBus, Subscription)                │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module    | Responsibility                                            |
//! |-----------|-----------------------------------------------------------|
//! | `models`  | Persisted entities and the `BoardView` snapshot           |
//! | `command` | `Command` enum, its capability and target entity          |
//! | `events`  | `Change`, `MutationEvent` and the `{type, payload}` frame |
//!
//! Position arithmetic and the role → capability table live in the
//! `corkboard-common` crate.
//!
//! ## Typical Request Flow (move a card into "Done")
//!
//! 1. `POST /api/commands` with `{"op":"move_card",...}` → `api::apply_command()`
//! 2. The coordinator resolves the card's board and checks `MoveCard` for the
//!    actor's membership. A non-member gets 404, a role without the
//!    capability gets 403; nothing is written.
//! 3. Inside one transaction the card is placed after its new neighbours
//!    (rebalancing the column if the gap is exhausted), moved, and a
//!    `CardMoved` activity row is appended. After commit the event is
//!    published to the board's subscribers.
//! 4. The move yields `CardLeftColumn` and `CardEnteredColumn` triggers.
//!    A rule "on entering Done, mark complete" commits and publishes
//!    `CardCompletionChanged` as its own unit, after `CardMoved`.

pub mod api;
pub mod auth;
pub mod automation;
pub mod bus;
pub mod command;
pub mod coordinator;
pub mod db;
pub mod events;
pub mod models;
pub mod server;
pub mod ws;
