//! Session lifecycle events
//!
//! Two ways to observe the session:
//! - synchronous listeners registered with [`SessionEvents::on`], called in
//!   registration order on the publishing thread
//! - a [`tokio::sync::broadcast`] receiver from [`SessionEvents::subscribe`]
//!   for async consumers
//!
//! A listener that returns an error or panics is logged and skipped; the
//! publisher and the remaining listeners are unaffected.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

/// Broadcast buffer; slow subscribers past this lag lose the oldest events
const BROADCAST_CAPACITY: usize = 64;

/// Error type listeners may return
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

type Listener = dyn Fn(SessionEvent) -> Result<(), ListenerError> + Send + Sync;

/// Session lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// Tokens were set, updated or removed by the user
    Changed,
    /// Session was cleared and cannot be recovered without logging in
    Expired,
    /// A token refresh succeeded
    Refreshed,
}

impl SessionEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Changed => "session-changed",
            SessionEvent::Expired => "session-expired",
            SessionEvent::Refreshed => "session-refreshed",
        }
    }
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Handle returned by [`SessionEvents::on`], used to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Typed publish/subscribe channel for [`SessionEvent`]s
pub struct SessionEvents {
    listeners: RwLock<Vec<(ListenerId, Arc<Listener>)>>,
    next_id: AtomicU64,
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            tx,
        }
    }

    /// Register a listener for every event
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(SessionEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns false when it was already gone
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Async subscription to all subsequent events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Deliver an event to every listener and subscriber
    pub fn publish(&self, event: SessionEvent) {
        tracing::debug!(event = %event, "publishing session event");

        // Snapshot so listeners may register or remove listeners while running
        let snapshot: Vec<(ListenerId, Arc<Listener>)> = {
            let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            listeners.clone()
        };

        for (id, listener) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(event = %event, listener = id.0, error = %e, "session listener failed");
                }
                Err(_) => {
                    tracing::warn!(event = %event, listener = id.0, "session listener panicked");
                }
            }
        }

        // No receivers is fine
        let _ = self.tx.send(event);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
