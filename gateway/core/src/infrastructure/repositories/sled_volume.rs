// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sled-backed volume record store
//!
//! One tree (`volumes`) keyed by volume name with JSON-encoded records.
//! Transactions take an async writer lock and stage writes in memory; commit
//! applies them as a single `sled::Batch` and flushes before returning, so a
//! committed create or delete survives a crash.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use crate::domain::repository::{RepositoryError, StoredRecord, VolumeStore, VolumeTransaction};
use crate::domain::volume::{Volume, VolumeName};
use super::{decode, StagedWrites};

/// Name of the tree holding volume records
pub const VOLUMES_TREE: &str = "volumes";

const OPEN_RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct SledVolumeStore {
    db: sled::Db,
    tree: sled::Tree,
    writer: Arc<Mutex<()>>,
}

impl SledVolumeStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        Self::from_db(sled::open(path)?)
    }

    /// Open the database, retrying while another process holds its lock
    pub async fn open_with_timeout(
        path: impl AsRef<Path>,
        timeout: Duration,
    ) -> Result<Self, RepositoryError> {
        let path = path.as_ref().to_path_buf();
        let deadline = Instant::now() + timeout;

        loop {
            let attempt = {
                let path = path.clone();
                tokio::task::spawn_blocking(move || sled::open(path))
                    .await
                    .map_err(|e| RepositoryError::Database(e.to_string()))?
            };

            match attempt {
                Ok(db) => return Self::from_db(db),
                Err(sled::Error::Io(e)) if Instant::now() < deadline => {
                    debug!(path = %path.display(), error = %e, "database busy, retrying");
                    tokio::time::sleep(OPEN_RETRY_INTERVAL).await;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "giving up opening database");
                    return Err(e.into());
                }
            }
        }
    }

    /// Throwaway database removed on drop
    pub fn temporary() -> Result<Self, RepositoryError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, RepositoryError> {
        let tree = db.open_tree(VOLUMES_TREE)?;
        Ok(Self {
            db,
            tree,
            writer: Arc::new(Mutex::new(())),
        })
    }

    /// Store raw bytes under `key`, bypassing encoding and the writer lock
    pub fn insert_raw(&self, key: &[u8], value: &[u8]) -> Result<(), RepositoryError> {
        self.tree.insert(key, value)?;
        Ok(())
    }
}

#[async_trait]
impl VolumeStore for SledVolumeStore {
    async fn begin(&self) -> Result<Box<dyn VolumeTransaction>, RepositoryError> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(SledTransaction {
            tree: self.tree.clone(),
            staged: StagedWrites::default(),
            _guard: guard,
        }))
    }

    async fn find(&self, name: &VolumeName) -> Result<Option<Volume>, RepositoryError> {
        let value = self.tree.get(name.as_bytes())?;
        decode(value.as_deref())
    }

    async fn list(&self) -> Result<Vec<StoredRecord>, RepositoryError> {
        self.tree
            .iter()
            .map(|entry| {
                let (key, value) = entry?;
                Ok(StoredRecord {
                    key: key.to_vec(),
                    value: value.to_vec(),
                })
            })
            .collect()
    }

    async fn flush(&self) -> Result<(), RepositoryError> {
        self.db.flush_async().await?;
        Ok(())
    }
}

struct SledTransaction {
    tree: sled::Tree,
    staged: StagedWrites,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl VolumeTransaction for SledTransaction {
    fn get(&self, name: &VolumeName) -> Result<Option<Volume>, RepositoryError> {
        if let Some(staged) = self.staged.lookup(name.as_bytes()) {
            return decode(staged);
        }
        let value = self.tree.get(name.as_bytes())?;
        decode(value.as_deref())
    }

    fn put(&mut self, volume: &Volume) -> Result<(), RepositoryError> {
        self.staged.put(volume)
    }

    fn delete(&mut self, name: &VolumeName) {
        self.staged.delete(name);
    }

    async fn commit(&mut self) -> Result<(), RepositoryError> {
        let staged = self.staged.take();
        if staged.is_empty() {
            return Ok(());
        }

        let mut batch = sled::Batch::default();
        for (key, value) in staged {
            match value {
                Some(value) => batch.insert(key, value),
                None => batch.remove(key),
            }
        }

        self.tree.apply_batch(batch)?;
        self.tree.flush_async().await?;
        Ok(())
    }
}
