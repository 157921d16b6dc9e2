// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Volume Record Store
//!
//! Persistence contract for the `Volume` aggregate. The store is keyed by
//! volume name and offers a single-writer transaction plus committed-state
//! reads:
//!
//! | Operation | Lock | Sees |
//! |-----------|------|------|
//! | `VolumeStore::begin` | writer lock, held until the transaction drops | committed state + own staged writes |
//! | `VolumeStore::find` | none | committed state |
//! | `VolumeStore::list` | none | committed state |
//!
//! Writes staged in a transaction become visible only on `commit`. Dropping
//! a transaction without committing discards them. Committing does not
//! release the writer lock, so callers may keep mutating external state under
//! the same critical section after the record change is durable.
//!
//! Implementations live in `crate::infrastructure::repositories`.

use async_trait::async_trait;
use crate::domain::volume::{Volume, VolumeName};

/// Repository interface for Volume aggregates
#[async_trait]
pub trait VolumeStore: Send + Sync {
    /// Acquire the writer lock and open a transaction
    async fn begin(&self) -> Result<Box<dyn VolumeTransaction>, RepositoryError>;

    /// Find a committed volume by name
    async fn find(&self, name: &VolumeName) -> Result<Option<Volume>, RepositoryError>;

    /// Raw committed records in key order
    ///
    /// Records are returned undecoded so callers can skip a corrupt entry
    /// without losing the rest.
    async fn list(&self) -> Result<Vec<StoredRecord>, RepositoryError>;

    /// Flush committed state to durable storage
    async fn flush(&self) -> Result<(), RepositoryError>;
}

/// Write transaction over the volume store
#[async_trait]
pub trait VolumeTransaction: Send {
    /// Look up a volume, including writes staged in this transaction
    fn get(&self, name: &VolumeName) -> Result<Option<Volume>, RepositoryError>;

    /// Stage an insert or overwrite
    fn put(&mut self, volume: &Volume) -> Result<(), RepositoryError>;

    /// Stage a removal
    fn delete(&mut self, name: &VolumeName);

    /// Atomically and durably apply staged writes. The writer lock stays held.
    async fn commit(&mut self) -> Result<(), RepositoryError>;
}

/// A persisted key/value pair as read from the store
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl StoredRecord {
    /// Key rendered for log output
    pub fn key_lossy(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }

    pub fn decode(&self) -> Result<Volume, RepositoryError> {
        Ok(Volume::from_record(&self.value)?)
    }
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for RepositoryError {
    fn from(err: sled::Error) -> Self {
        RepositoryError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
