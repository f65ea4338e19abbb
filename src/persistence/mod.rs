//! The `persistence` module keeps the last payload seen on every topic.
//!
//! With a snapshot path configured, each inbound message overwrites its
//! topic's entry in an embedded `sled` database. On the next start the
//! entries that have not outlived the TTL are fed back through the
//! dispatcher, so derived state is available before the broker answers.

pub mod snapshot;

pub use snapshot::{SnapshotStore, StoredMessage, record_into};

#[cfg(test)]
mod tests;
