//! Live channels to riders and drivers.
//!
//! Delivery is at-most-once: an event for an id with no registered channel
//! is dropped, and nothing is queued for later.

use std::fmt;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::models::driver::Driver;
use crate::models::trip::Trip;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Rider,
    Driver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Rider => "rider",
            Role::Driver => "driver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events pushed to connected clients, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    TripAssigned {
        trip_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        driver: Option<Driver>,
        #[serde(skip_serializing_if = "Option::is_none")]
        trip: Option<Trip>,
    },
    TripStarted {
        trip_id: Uuid,
    },
    TripCompleted {
        trip_id: Uuid,
        fare: f64,
        distance: f64,
    },
    TripCancelled {
        trip_id: Uuid,
    },
}

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

struct Connection {
    connection_id: Uuid,
    sender: EventSender,
}

/// What happened to a single notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    NoChannel,
    Closed,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Sent => "sent",
            Delivery::NoChannel => "no_channel",
            Delivery::Closed => "closed",
        }
    }
}

/// At most one channel per `(role, id)`.
#[derive(Default)]
pub struct ConnectionRegistry {
    riders: DashMap<Uuid, Connection>,
    drivers: DashMap<Uuid, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, role: Role) -> &DashMap<Uuid, Connection> {
        match role {
            Role::Rider => &self.riders,
            Role::Driver => &self.drivers,
        }
    }

    /// Replaces any channel already registered for `(role, id)` and returns
    /// the id of the new connection.
    pub fn register(&self, role: Role, id: Uuid, sender: EventSender) -> Uuid {
        let connection_id = Uuid::new_v4();
        let previous = self.map(role).insert(
            id,
            Connection {
                connection_id,
                sender,
            },
        );

        if previous.is_some() {
            debug!(%role, %id, "replaced existing live channel");
        }

        connection_id
    }

    pub fn unregister(&self, role: Role, id: Uuid) {
        self.map(role).remove(&id);
    }

    /// Removes the entry only while it still belongs to `connection_id`, so a
    /// replaced socket closing late leaves its successor in place.
    pub fn unregister_connection(&self, role: Role, id: Uuid, connection_id: Uuid) -> bool {
        self.map(role)
            .remove_if(&id, |_, conn| conn.connection_id == connection_id)
            .is_some()
    }

    pub fn connected(&self, role: Role) -> usize {
        self.map(role).len()
    }

    pub fn notify(&self, role: Role, id: Uuid, event: ServerEvent) -> Delivery {
        let Some(sender) = self.map(role).get(&id).map(|conn| conn.sender.clone()) else {
            return Delivery::NoChannel;
        };

        if sender.send(event).is_ok() {
            return Delivery::Sent;
        }

        // Receiver is gone; drop the entry unless it was replaced meanwhile.
        self.map(role)
            .remove_if(&id, |_, conn| conn.sender.same_channel(&sender));
        Delivery::Closed
    }
}
