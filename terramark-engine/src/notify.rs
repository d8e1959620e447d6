//! Session notification hub
//!
//! Fan-out point for background work completion. Each session has at most
//! one attached listener; messages sent while nobody listens are queued and
//! flushed in order when a listener attaches. The pending queue is bounded,
//! dropping the oldest message when full.

use dashmap::DashMap;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::{debug, warn};

enum Channel {
    Attached(mpsc::UnboundedSender<String>),
    Pending(VecDeque<String>),
}

/// Per-session message router with store-and-forward semantics
pub struct NotificationHub {
    channels: DashMap<String, Channel>,
    backlog: usize,
}

impl NotificationHub {
    pub fn new(backlog: usize) -> Self {
        Self {
            channels: DashMap::new(),
            backlog,
        }
    }

    /// Attach a listener for a session, flushing any queued messages into it
    /// in arrival order. A second subscribe replaces the previous listener.
    pub fn subscribe(&self, session_id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self
            .channels
            .insert(session_id.to_string(), Channel::Attached(tx.clone()));
        if let Some(Channel::Pending(queue)) = previous {
            debug!(
                "Flushing {} queued messages to session {}",
                queue.len(),
                session_id
            );
            for message in queue {
                // Receiver was handed out this call; send cannot fail yet
                let _ = tx.send(message);
            }
        }
        rx
    }

    /// Detach the session's listener and discard anything still queued
    pub fn unsubscribe(&self, session_id: &str) {
        self.channels.remove(session_id);
        debug!("Session {} unsubscribed from notifications", session_id);
    }

    /// Deliver a message now if a listener is attached, queue it otherwise.
    /// A listener that went away without unsubscribing falls back to queueing.
    pub fn notify(&self, session_id: &str, message: impl Into<String>) {
        let mut message = message.into();
        let mut entry = self
            .channels
            .entry(session_id.to_string())
            .or_insert_with(|| Channel::Pending(VecDeque::new()));

        if let Channel::Attached(tx) = entry.value() {
            match tx.send(message) {
                Ok(()) => return,
                Err(err) => {
                    debug!(
                        "Listener for session {} is gone; queueing message",
                        session_id
                    );
                    message = err.0;
                    *entry.value_mut() = Channel::Pending(VecDeque::new());
                }
            }
        }

        if let Channel::Pending(queue) = entry.value_mut() {
            if queue.len() >= self.backlog {
                queue.pop_front();
                warn!(
                    "Notification backlog full for session {}; dropping oldest message",
                    session_id
                );
            }
            queue.push_back(message);
        }
    }

    /// Number of messages queued for a session with no attached listener
    pub fn pending_count(&self, session_id: &str) -> usize {
        self.channels
            .get(session_id)
            .map_or(0, |entry| match entry.value() {
                Channel::Pending(queue) => queue.len(),
                Channel::Attached(_) => 0,
            })
    }
}
