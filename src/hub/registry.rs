//! Connection registry and pub/sub delivery
//!
//! The hub is the only owner of connection state. Delivery never awaits:
//! each connection has a bounded outbox drained by its socket writer, and
//! `try_send` either enqueues or tells us the connection is gone or stalled.
//! Both of those end in lazy unregistration, so a dead or slow consumer can
//! never hold up the others or the publisher.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::{Envelope, OutboundMessage};

pub type ConnectionId = Uuid;

/// Publishing side of the hub, as seen by the pipeline
pub trait EventSink: Send + Sync {
    /// Deliver to every open connection subscribed to `channel`.
    /// Returns the number of connections reached.
    fn broadcast(&self, channel: &str, message: OutboundMessage) -> usize;

    /// Deliver to every open connection bound to `user_id`.
    fn send_to_user(&self, user_id: &str, message: OutboundMessage) -> usize;
}

#[derive(Debug)]
struct ConnectionEntry {
    outbox: mpsc::Sender<Envelope>,
    channels: HashSet<String>,
    user_id: Option<String>,
    connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryFailure {
    Closed,
    Lagging,
}

/// Live connection registry
#[derive(Debug, Default)]
pub struct Hub {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection with no subscriptions and send it the welcome message.
    pub fn register(&self, outbox: mpsc::Sender<Envelope>) -> ConnectionId {
        let id = Uuid::new_v4();
        let welcome = OutboundMessage::connection(id).stamp();
        if outbox.try_send(welcome).is_err() {
            debug!(connection_id = %id, "welcome not delivered");
        }

        self.connections.insert(
            id,
            ConnectionEntry {
                outbox,
                channels: HashSet::new(),
                user_id: None,
                connected_at: Utc::now(),
            },
        );
        info!(connection_id = %id, total = self.connections.len(), "connection registered");
        id
    }

    /// Remove a connection. Unknown ids are ignored.
    pub fn unregister(&self, id: ConnectionId) {
        if let Some((_, entry)) = self.connections.remove(&id) {
            let lifetime = Utc::now() - entry.connected_at;
            info!(
                connection_id = %id,
                user_id = entry.user_id.as_deref().unwrap_or("-"),
                lifetime_secs = lifetime.num_seconds(),
                "connection unregistered"
            );
        }
    }

    pub fn subscribe(&self, id: ConnectionId, channel: &str) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            if entry.channels.insert(channel.to_string()) {
                debug!(connection_id = %id, channel, "subscribed");
            }
        }
    }

    pub fn unsubscribe(&self, id: ConnectionId, channel: &str) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            if entry.channels.remove(channel) {
                debug!(connection_id = %id, channel, "unsubscribed");
            }
        }
    }

    /// Bind a user identity to a connection, replacing any earlier binding.
    pub fn authenticate(&self, id: ConnectionId, user_id: &str) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            let previous = entry.user_id.replace(user_id.to_string());
            debug!(
                connection_id = %id,
                user_id,
                previous = previous.as_deref().unwrap_or("-"),
                "connection authenticated"
            );
        }
    }

    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.channels.contains(channel))
            .count()
    }

    /// Number of connections currently bound to `user_id`
    pub fn user_connection_count(&self, user_id: &str) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.user_id.as_deref() == Some(user_id))
            .count()
    }

    /// Channels a connection is subscribed to, sorted
    pub fn subscriptions(&self, id: ConnectionId) -> Option<Vec<String>> {
        self.connections.get(&id).map(|entry| {
            let mut channels: Vec<String> = entry.channels.iter().cloned().collect();
            channels.sort();
            channels
        })
    }

    /// User bound to a connection, if any
    pub fn user_of(&self, id: ConnectionId) -> Option<String> {
        self.connections.get(&id).and_then(|entry| entry.user_id.clone())
    }

    /// Send to a single connection (used for protocol replies).
    pub fn send_to_connection(&self, id: ConnectionId, message: OutboundMessage) -> bool {
        self.deliver(message.stamp(), |entry_id, _| entry_id == id) == 1
    }

    fn deliver<F>(&self, envelope: Envelope, matches: F) -> usize
    where
        F: Fn(ConnectionId, &ConnectionEntry) -> bool,
    {
        let mut delivered = 0;
        let mut dead: Vec<(ConnectionId, DeliveryFailure)> = Vec::new();

        for entry in self.connections.iter() {
            let id = *entry.key();
            if !matches(id, entry.value()) {
                continue;
            }
            match entry.outbox.try_send(envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Closed(_)) => dead.push((id, DeliveryFailure::Closed)),
                Err(TrySendError::Full(_)) => dead.push((id, DeliveryFailure::Lagging)),
            }
        }

        // Iteration guards are released; safe to mutate the map now.
        for (id, reason) in dead {
            match reason {
                DeliveryFailure::Closed => {
                    debug!(connection_id = %id, kind = %envelope.kind, "transport closed")
                }
                DeliveryFailure::Lagging => {
                    warn!(connection_id = %id, kind = %envelope.kind, "outbox full, evicting slow consumer")
                }
            }
            self.unregister(id);
        }

        delivered
    }
}

impl EventSink for Hub {
    fn broadcast(&self, channel: &str, message: OutboundMessage) -> usize {
        let delivered = self.deliver(message.stamp(), |_, entry| entry.channels.contains(channel));
        debug!(channel, delivered, "broadcast");
        delivered
    }

    fn send_to_user(&self, user_id: &str, message: OutboundMessage) -> usize {
        self.deliver(message.stamp(), |_, entry| {
            entry.user_id.as_deref() == Some(user_id)
        })
    }
}
