//! Channel registry — directory of attached UI surfaces
//!
//! Explicitly constructed and owned by the host for the process lifetime.
//! It records which endpoints exist; delivery stays with the endpoints.
//! Endpoints closed with `disconnect()` are dropped from the directory the
//! next time it is read.

use crate::endpoint::{ChannelEndpoint, SendOutcome};
use agentlink_core::{ConnectionId, ConnectionState, EnvelopeType};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;

struct Registration {
    endpoint: ChannelEndpoint,
    name: String,
    attached_at: DateTime<Utc>,
}

/// Snapshot of one registered channel.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: ConnectionId,
    pub name: String,
    pub attached_at: DateTime<Utc>,
    pub state: ConnectionState,
}

pub struct ChannelRegistry {
    channels: DashMap<ConnectionId, Registration>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Record a newly attached endpoint under a fresh connection id.
    pub fn register(&self, name: impl Into<String>, endpoint: ChannelEndpoint) -> ConnectionId {
        let id = ConnectionId::generate();
        let name = name.into();
        info!("Channel {} attached as {}", name, id);
        self.channels.insert(
            id.clone(),
            Registration {
                endpoint,
                name,
                attached_at: Utc::now(),
            },
        );
        id
    }

    pub fn unregister(&self, id: &ConnectionId) -> Option<ChannelEndpoint> {
        self.channels.remove(id).map(|(_, reg)| {
            info!("Channel {} detached ({})", reg.name, id);
            reg.endpoint
        })
    }

    /// Terminally disconnect the endpoint and drop it from the directory.
    pub fn disconnect(&self, id: &ConnectionId) -> bool {
        match self.unregister(id) {
            Some(endpoint) => {
                endpoint.disconnect();
                true
            }
            None => false,
        }
    }

    /// Drop every endpoint that was terminally disconnected.
    fn prune_closed(&self) {
        self.channels.retain(|id, reg| {
            let closed = reg.endpoint.is_closed();
            if closed {
                info!("Channel {} closed; detached ({})", reg.name, id);
            }
            !closed
        });
    }

    pub fn get(&self, id: &ConnectionId) -> Option<ChannelEndpoint> {
        self.prune_closed();
        self.channels.get(id).map(|r| r.endpoint.clone())
    }

    /// First endpoint registered under `name`.
    pub fn find(&self, name: &str) -> Option<(ConnectionId, ChannelEndpoint)> {
        self.prune_closed();
        self.channels
            .iter()
            .find(|e| e.value().name == name)
            .map(|e| (e.key().clone(), e.value().endpoint.clone()))
    }

    pub fn list(&self) -> Vec<ChannelInfo> {
        self.prune_closed();
        let mut infos: Vec<ChannelInfo> = self
            .channels
            .iter()
            .map(|e| ChannelInfo {
                id: e.key().clone(),
                name: e.value().name.clone(),
                attached_at: e.value().attached_at,
                state: e.value().endpoint.state(),
            })
            .collect();
        infos.sort_by_key(|info| info.attached_at);
        infos
    }

    pub fn len(&self) -> usize {
        self.prune_closed();
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send the same envelope to every open endpoint.
    pub fn broadcast(
        &self,
        kind: EnvelopeType,
        payload: serde_json::Value,
    ) -> Vec<(ConnectionId, SendOutcome)> {
        self.prune_closed();
        let targets: Vec<(ConnectionId, ChannelEndpoint)> = self
            .channels
            .iter()
            .map(|e| (e.key().clone(), e.value().endpoint.clone()))
            .collect();
        targets
            .into_iter()
            .map(|(id, endpoint)| {
                let outcome = endpoint.send(kind, payload.clone(), None);
                (id, outcome)
            })
            .collect()
    }
}
