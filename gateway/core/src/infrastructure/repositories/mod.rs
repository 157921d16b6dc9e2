// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the `VolumeStore` contract defined in
//! the domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve volume records
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **SledVolumeStore** - Embedded, crash-safe store used by the daemon
//! - **InMemoryVolumeStore** - HashMap-style store for tests and development
//!
//! Both serialize writers through an async mutex held for the lifetime of a
//! transaction, and stage writes in a `StagedWrites` overlay until commit.

pub mod sled_volume;

pub use sled_volume::SledVolumeStore;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use crate::domain::repository::{RepositoryError, StoredRecord, VolumeStore, VolumeTransaction};
use crate::domain::volume::{Volume, VolumeName};

/// Pending writes of an open transaction. `None` marks a removal.
#[derive(Debug, Default)]
pub(crate) struct StagedWrites {
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl StagedWrites {
    /// `Some(..)` if the key was touched by this transaction
    pub(crate) fn lookup(&self, key: &[u8]) -> Option<Option<&[u8]>> {
        self.writes.get(key).map(|value| value.as_deref())
    }

    pub(crate) fn put(&mut self, volume: &Volume) -> Result<(), RepositoryError> {
        self.writes
            .insert(volume.name.as_bytes().to_vec(), Some(volume.to_record()?));
        Ok(())
    }

    pub(crate) fn delete(&mut self, name: &VolumeName) {
        self.writes.insert(name.as_bytes().to_vec(), None);
    }

    pub(crate) fn take(&mut self) -> BTreeMap<Vec<u8>, Option<Vec<u8>>> {
        std::mem::take(&mut self.writes)
    }
}

/// Decode an optional raw record
pub(crate) fn decode(value: Option<&[u8]>) -> Result<Option<Volume>, RepositoryError> {
    value
        .map(|bytes| Volume::from_record(bytes).map_err(RepositoryError::from))
        .transpose()
}

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Clone)]
pub struct InMemoryVolumeStore {
    records: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    writer: Arc<Mutex<()>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryVolumeStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
            writer: Arc::new(Mutex::new(())),
            fail_next_commit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Store raw bytes under `key`, bypassing encoding
    pub fn insert_raw(&self, key: &[u8], value: &[u8]) {
        self.records
            .write()
            .unwrap()
            .insert(key.to_vec(), value.to_vec());
    }

    /// Make the next transaction commit fail with a database error
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryVolumeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VolumeStore for InMemoryVolumeStore {
    async fn begin(&self) -> Result<Box<dyn VolumeTransaction>, RepositoryError> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(InMemoryTransaction {
            store: self.clone(),
            staged: StagedWrites::default(),
            _guard: guard,
        }))
    }

    async fn find(&self, name: &VolumeName) -> Result<Option<Volume>, RepositoryError> {
        let records = self.records.read().unwrap();
        decode(records.get(name.as_bytes()).map(Vec::as_slice))
    }

    async fn list(&self) -> Result<Vec<StoredRecord>, RepositoryError> {
        let records = self.records.read().unwrap();
        Ok(records
            .iter()
            .map(|(key, value)| StoredRecord {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn flush(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

struct InMemoryTransaction {
    store: InMemoryVolumeStore,
    staged: StagedWrites,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl VolumeTransaction for InMemoryTransaction {
    fn get(&self, name: &VolumeName) -> Result<Option<Volume>, RepositoryError> {
        if let Some(staged) = self.staged.lookup(name.as_bytes()) {
            return decode(staged);
        }
        let records = self.store.records.read().unwrap();
        decode(records.get(name.as_bytes()).map(Vec::as_slice))
    }

    fn put(&mut self, volume: &Volume) -> Result<(), RepositoryError> {
        self.staged.put(volume)
    }

    fn delete(&mut self, name: &VolumeName) {
        self.staged.delete(name);
    }

    async fn commit(&mut self) -> Result<(), RepositoryError> {
        if self.store.fail_next_commit.swap(false, Ordering::SeqCst) {
            self.staged.take();
            return Err(RepositoryError::Database("injected commit failure".to_string()));
        }

        let mut records = self.store.records.write().unwrap();
        for (key, value) in self.staged.take() {
            match value {
                Some(value) => {
                    records.insert(key, value);
                }
                None => {
                    records.remove(&key);
                }
            }
        }
        Ok(())
    }
}
