use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::{debug, warn};

use crate::bus::dispatcher::{self, InboundEvent, ObserverId, SharedDispatcher};
use crate::utils::error::StoreError;

const LAST_VALUES: &str = "last_values";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub topic: String,
    pub payload: String,
    /// Unix seconds.
    pub timestamp: i64,
}

impl StoredMessage {
    fn into_event(self) -> InboundEvent {
        InboundEvent {
            received_at: DateTime::from_timestamp(self.timestamp, 0).unwrap_or_else(Utc::now),
            topic: self.topic,
            payload: self.payload,
        }
    }
}

/// Last-value-per-topic store backed by a sled tree keyed by topic.
#[derive(Clone)]
pub struct SnapshotStore {
    db: Db,
    values: Tree,
    ttl: Duration,
}

impl SnapshotStore {
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let values = db.open_tree(LAST_VALUES)?;
        Ok(Self { db, values, ttl })
    }

    pub fn store(&self, topic: &str, payload: &str) -> Result<(), StoreError> {
        self.store_at(topic, payload, Utc::now().timestamp())
    }

    pub fn store_at(&self, topic: &str, payload: &str, timestamp: i64) -> Result<(), StoreError> {
        let msg = StoredMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
            timestamp,
        };
        self.values
            .insert(topic.as_bytes(), serde_json::to_vec(&msg)?)?;
        Ok(())
    }

    pub fn get(&self, topic: &str) -> Result<Option<StoredMessage>, StoreError> {
        match self.values.get(topic.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Every entry younger than the TTL, oldest first. Expired or unreadable
    /// entries are deleted.
    pub fn load_all(&self) -> Result<Vec<StoredMessage>, StoreError> {
        let expiry = Utc::now().timestamp() - i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let mut fresh = Vec::new();
        let mut stale = Vec::new();

        for entry in self.values.iter() {
            let (key, raw) = entry?;
            match serde_json::from_slice::<StoredMessage>(&raw) {
                Ok(msg) if msg.timestamp >= expiry => fresh.push(msg),
                Ok(_) => stale.push(key),
                Err(e) => {
                    warn!("dropping unreadable snapshot entry: {e}");
                    stale.push(key);
                }
            }
        }

        for key in stale {
            self.values.remove(key)?;
        }
        fresh.sort_by_key(|msg| msg.timestamp);
        Ok(fresh)
    }

    /// Restores the fresh entries into `dispatcher`; returns how many.
    pub fn restore_into(&self, dispatcher: &SharedDispatcher) -> Result<usize, StoreError> {
        let entries = self.load_all()?;
        let count = entries.len();
        dispatcher::lock(dispatcher).restore(entries.into_iter().map(StoredMessage::into_event));
        debug!("restored {} topics from snapshot", count);
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("db", &"sled::Db")
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Stores every message the dispatcher sees.
pub fn record_into(store: SnapshotStore, dispatcher: &SharedDispatcher) -> ObserverId {
    dispatcher::lock(dispatcher).observe_all(move |event| {
        if let Err(e) = store.store(&event.topic, &event.payload) {
            warn!("could not snapshot {}: {e}", event.topic);
        }
    })
}
