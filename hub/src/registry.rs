//! Channel registry for subscribed connections.
//!
//! Maps channel names to the connections subscribed to them. A single lock
//! guards the whole registry; every read that feeds iteration returns an owned
//! snapshot so no caller ever walks the live set.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::connection::{Connection, ConnectionId};
use crate::error::HubError;

#[derive(Debug, Default)]
struct Channels {
    /// Channel name to its members keyed by connection ID.
    members: HashMap<String, HashMap<ConnectionId, Arc<Connection>>>,

    /// Connection ID to the channel it is registered under.
    index: HashMap<ConnectionId, String>,

    /// Set once the registry has been drained.
    closed: bool,
}

/// Registry of connections per channel.
///
/// A connection is registered under at most one channel at a time. Channels
/// are created lazily and are kept when they empty out.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    inner: Arc<RwLock<Channels>>,
}

impl ChannelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Channels::default())),
        }
    }

    /// Creates a registry with the given channels already present.
    #[must_use]
    pub fn with_channels<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members = channels
            .into_iter()
            .map(|c| (c.into(), HashMap::new()))
            .collect();

        Self {
            inner: Arc::new(RwLock::new(Channels {
                members,
                ..Default::default()
            })),
        }
    }

    /// Makes a channel addressable without subscribing anyone.
    pub async fn ensure_channel(&self, channel: &str) {
        let mut inner = self.inner.write().await;
        if !inner.members.contains_key(channel) {
            inner.members.insert(channel.to_string(), HashMap::new());
        }
    }

    /// Registers a connection under its channel.
    ///
    /// Adding the same connection twice is a no-op. If a different connection
    /// object with the same ID was registered, in this or any other channel,
    /// it is displaced and returned so the caller can close it.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Stopped`] once the registry has been drained.
    pub async fn add(
        &self,
        connection: Arc<Connection>,
    ) -> Result<Option<Arc<Connection>>, HubError> {
        let mut inner = self.inner.write().await;
        if inner.closed {
            return Err(HubError::Stopped);
        }

        let id = connection.id();
        let channel = connection.channel().to_string();

        let mut displaced = None;
        if let Some(previous) = inner.index.get(&id).cloned() {
            if previous != channel {
                displaced = inner
                    .members
                    .get_mut(&previous)
                    .and_then(|members| members.remove(&id));
            }
        }

        let replaced = inner
            .members
            .entry(channel.clone())
            .or_default()
            .insert(id, Arc::clone(&connection));
        inner.index.insert(id, channel);

        Ok(displaced
            .or(replaced)
            .filter(|old| !Arc::ptr_eq(old, &connection)))
    }

    /// Removes a connection from a channel.
    ///
    /// Returns the removed connection, or `None` if it was not registered
    /// there.
    pub async fn remove(&self, channel: &str, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut inner = self.inner.write().await;
        let removed = inner.members.get_mut(channel)?.remove(&id)?;
        inner.index.remove(&id);
        Some(removed)
    }

    /// Removes `connection` from a channel only if that exact object is the
    /// one registered under its ID.
    ///
    /// Returns false if the ID is absent or now belongs to another object.
    pub async fn remove_exact(&self, channel: &str, connection: &Arc<Connection>) -> bool {
        let mut inner = self.inner.write().await;
        let id = connection.id();
        let Some(members) = inner.members.get_mut(channel) else {
            return false;
        };
        if !members
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, connection))
        {
            return false;
        }
        members.remove(&id);
        inner.index.remove(&id);
        true
    }

    /// Returns a copy of the connections currently on a channel.
    pub async fn snapshot(&self, channel: &str) -> Vec<Arc<Connection>> {
        let inner = self.inner.read().await;
        inner
            .members
            .get(channel)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns a copy of every channel's connections, taken under one lock.
    pub async fn snapshot_all(&self) -> Vec<(String, Vec<Arc<Connection>>)> {
        let inner = self.inner.read().await;
        inner
            .members
            .iter()
            .map(|(channel, members)| (channel.clone(), members.values().cloned().collect()))
            .collect()
    }

    /// Returns the known channel names, sorted.
    pub async fn channels(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = inner.members.keys().cloned().collect();
        names.sort();
        names
    }

    /// Looks up a connection by ID in any channel.
    pub async fn find(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let inner = self.inner.read().await;
        let channel = inner.index.get(&id)?;
        inner.members.get(channel)?.get(&id).cloned()
    }

    /// Returns true if the connection is registered under the channel.
    pub async fn contains(&self, channel: &str, id: ConnectionId) -> bool {
        let inner = self.inner.read().await;
        inner
            .members
            .get(channel)
            .is_some_and(|members| members.contains_key(&id))
    }

    /// Returns the number of connections on a channel.
    pub async fn channel_size(&self, channel: &str) -> usize {
        let inner = self.inner.read().await;
        inner.members.get(channel).map_or(0, HashMap::len)
    }

    /// Returns the total number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.index.len()
    }

    /// Returns true once the registry has been drained.
    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.closed
    }

    /// Closes the registry and hands back every registered connection.
    ///
    /// Subsequent [`add`](Self::add) calls fail with [`HubError::Stopped`].
    pub async fn drain(&self) -> Vec<Arc<Connection>> {
        let mut inner = self.inner.write().await;
        inner.closed = true;
        inner.index.clear();
        let drained: Vec<Arc<Connection>> = inner
            .members
            .values_mut()
            .flat_map(|members| members.drain().map(|(_, conn)| conn))
            .collect();
        drained
    }
}
