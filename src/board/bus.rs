//! In-process, per-board publish/subscribe.
//!
//! Each board with at least one live subscriber owns a bounded
//! `tokio::sync::broadcast` channel for events and a small control channel
//! for access changes. Events for one board reach every subscriber in
//! publish order; a subscriber that falls more than `capacity` events behind
//! is handed a [`BusFrame::Lagged`] and must resync. A feed is cut off as
//! soon as its user leaves the board or the board is deleted. Dropping a
//! [`Subscription`] releases its handle, and the board's channel is pruned
//! once nobody is listening.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::events::MutationEvent;

/// Default idle interval before a subscription yields a heartbeat.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default per-board buffer.
pub const DEFAULT_CAPACITY: usize = 256;

const CONTROL_CAPACITY: usize = 16;

/// What a subscription yields.
#[derive(Debug, Clone, PartialEq)]
pub enum BusFrame {
    Event(Arc<MutationEvent>),
    /// Nothing was published for a full heartbeat interval.
    Heartbeat,
    /// `missed` events were dropped; the observer must resync from a snapshot.
    Lagged { missed: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    /// The user is no longer a member of the board.
    Revoke { user_id: i64 },
}

struct BoardChannel {
    events: broadcast::Sender<Arc<MutationEvent>>,
    control: broadcast::Sender<Control>,
}

struct BusInner {
    channels: DashMap<i64, BoardChannel>,
    capacity: usize,
    heartbeat: Duration,
}

/// Cloneable handle to the bus; all clones share one registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, HEARTBEAT_INTERVAL)
    }
}

impl EventBus {
    pub fn new(capacity: usize, heartbeat: Duration) -> Self {
        Self {
            inner: Arc::new(BusInner {
                channels: DashMap::new(),
                capacity: capacity.max(1),
                heartbeat,
            }),
        }
    }

    /// Deliver `event` to current subscribers of its board. Returns how many
    /// subscribers it was queued for; zero when nobody is listening.
    pub fn publish(&self, event: MutationEvent) -> usize {
        let board_id = event.board_id;
        match self.inner.channels.get(&board_id) {
            Some(channel) => channel.events.send(Arc::new(event)).unwrap_or(0),
            None => 0,
        }
    }

    /// Attach `user_id` to the live feed of `board_id`. Access must already
    /// have been checked.
    pub fn subscribe(&self, board_id: i64, user_id: i64) -> Subscription {
        let capacity = self.inner.capacity;
        let channel = self
            .inner
            .channels
            .entry(board_id)
            .or_insert_with(|| BoardChannel {
                events: broadcast::channel(capacity).0,
                control: broadcast::channel(CONTROL_CAPACITY).0,
            });
        let rx = channel.events.subscribe();
        let control = channel.control.subscribe();
        drop(channel);
        debug!(board_id, user_id, "Subscriber attached");
        Subscription {
            bus: self.inner.clone(),
            board_id,
            user_id,
            rx: Some(rx),
            control: Some(control),
            last_activity: Instant::now(),
        }
    }

    /// End every feed `user_id` holds on `board_id`. Events already queued
    /// for that user are discarded.
    pub fn revoke(&self, board_id: i64, user_id: i64) {
        if let Some(channel) = self.inner.channels.get(&board_id) {
            let _ = channel.control.send(Control::Revoke { user_id });
            debug!(board_id, user_id, "Subscriber access revoked");
        }
    }

    /// Close one board's feed. Subscribers receive what was already
    /// published, then `None`.
    pub fn close_board(&self, board_id: i64) {
        if self.inner.channels.remove(&board_id).is_some() {
            debug!(board_id, "Board feed closed");
        }
    }

    pub fn subscriber_count(&self, board_id: i64) -> usize {
        self.inner
            .channels
            .get(&board_id)
            .map(|channel| channel.events.receiver_count())
            .unwrap_or(0)
    }

    /// Number of boards with at least one live channel.
    pub fn board_count(&self) -> usize {
        self.inner.channels.len()
    }

    /// Close every feed. Live subscriptions return `None` once drained.
    pub fn shutdown(&self) {
        let boards = self.inner.channels.len();
        self.inner.channels.clear();
        info!(boards, "Event bus shut down");
    }
}

enum Wake {
    Control(Result<Control, RecvError>),
    Event(Result<Arc<MutationEvent>, RecvError>),
    Idle,
}

/// A live feed of one board's events, held on behalf of one user.
pub struct Subscription {
    bus: Arc<BusInner>,
    board_id: i64,
    user_id: i64,
    rx: Option<broadcast::Receiver<Arc<MutationEvent>>>,
    control: Option<broadcast::Receiver<Control>>,
    last_activity: Instant,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("board_id", &self.board_id)
            .field("user_id", &self.user_id)
            .field("open", &self.rx.is_some())
            .finish()
    }
}

impl Subscription {
    pub fn board_id(&self) -> i64 {
        self.board_id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Next event, a heartbeat after an idle interval, or a lag notice.
    /// `None` once the feed is closed: bus shutdown, board deletion, or the
    /// user losing access. Stays `None` afterwards.
    pub async fn next(&mut self) -> Option<BusFrame> {
        let heartbeat = self.bus.heartbeat;
        loop {
            let deadline = self.last_activity + heartbeat;
            let rx = self.rx.as_mut()?;
            let control_open = self.control.is_some();
            let wake = tokio::select! {
                biased;
                msg = recv_control(&mut self.control), if control_open => Wake::Control(msg),
                result = rx.recv() => Wake::Event(result),
                _ = tokio::time::sleep_until(deadline) => Wake::Idle,
            };

            match wake {
                Wake::Control(Ok(Control::Revoke { user_id })) => {
                    if user_id == self.user_id {
                        debug!(board_id = self.board_id, user_id, "Feed revoked");
                        self.close();
                        return None;
                    }
                }
                Wake::Control(Err(RecvError::Lagged(_))) => {
                    // A revocation may have been lost; make the client re-authorize.
                    warn!(board_id = self.board_id, "Control feed lagged; closing subscription");
                    self.close();
                    return None;
                }
                Wake::Control(Err(RecvError::Closed)) => {
                    // Board closed; drain what is left of the event feed.
                    self.control = None;
                }
                Wake::Event(Ok(event)) => {
                    self.last_activity = Instant::now();
                    return Some(BusFrame::Event(event));
                }
                Wake::Event(Err(RecvError::Lagged(missed))) => {
                    warn!(board_id = self.board_id, missed, "Subscriber lagged; events dropped");
                    self.last_activity = Instant::now();
                    return Some(BusFrame::Lagged { missed });
                }
                Wake::Event(Err(RecvError::Closed)) => {
                    self.close();
                    return None;
                }
                Wake::Idle => {
                    self.last_activity = Instant::now();
                    return Some(BusFrame::Heartbeat);
                }
            }
        }
    }

    fn close(&mut self) {
        self.rx = None;
        self.control = None;
        self.bus
            .channels
            .remove_if(&self.board_id, |_, channel| channel.events.receiver_count() == 0);
    }
}

async fn recv_control(control: &mut Option<broadcast::Receiver<Control>>) -> Result<Control, RecvError> {
    match control.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Release our receiver first so the count excludes it.
        self.close();
        debug!(board_id = self.board_id, user_id = self.user_id, "Subscriber detached");
    }
}
