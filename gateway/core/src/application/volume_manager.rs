// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume Manager Application Service
//!
//! Owns the sequencing between the two pieces of state behind a volume:
//! - Record store: the durable statement that a volume exists
//! - Export table: the live NFS export of its directory
//!
//! Create and delete each run inside one store write transaction, with the
//! directory and `exportfs` work performed while the writer lock is held.
//! Create is all-or-nothing. Delete removes the record first and never
//! restores it, even when unexporting or removing the directory fails.
//! Reload and shutdown are best-effort passes that log per-volume failures.

use crate::domain::export::{ExportError, ExportProjector};
use crate::domain::repository::{RepositoryError, VolumeStore};
use crate::domain::volume::{Volume, VolumeError, VolumeName};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait VolumeService: Send + Sync {
    /// Create a volume, its directory and its export
    async fn create_volume(
        &self,
        name: &str,
        hosts: Vec<String>,
        options: String,
    ) -> Result<CreateOutcome, VolumeManagerError>;

    /// Look up a volume by name
    async fn get_volume(&self, name: &str) -> Result<Option<Volume>, VolumeManagerError>;

    /// Delete a volume. Deleting an unknown name succeeds.
    async fn delete_volume(&self, name: &str) -> Result<(), VolumeManagerError>;

    /// Re-apply the export of every persisted volume
    async fn reload(&self) -> Result<ReloadReport, VolumeManagerError>;

    /// Withdraw every export. Never fails.
    async fn shutdown(&self);
}

/// Result of a create request that did not hit an infrastructure error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Volume),
    /// A volume with this name already exists; nothing was changed
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub applied: usize,
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum VolumeManagerError {
    #[error(transparent)]
    InvalidName(#[from] VolumeError),

    #[error("{operation} volume {name}: {source}")]
    Store {
        operation: &'static str,
        name: String,
        #[source]
        source: RepositoryError,
    },

    #[error("create volume {name}: error creating volume dir {}: {source}", .path.display())]
    CreateDirectory {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("delete volume {name}: error removing volume data {}: {source}", .path.display())]
    RemoveDirectory {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("create volume {name}: error making nfs export: {source}")]
    Export {
        name: String,
        #[source]
        source: ExportError,
    },

    #[error("delete volume {name}: error unexporting nfs dir: {source}")]
    Unexport {
        name: String,
        #[source]
        source: ExportError,
    },

    #[error("reload: error reading volumes from database: {0}")]
    Reload(#[source] RepositoryError),
}

impl VolumeManagerError {
    /// Whether the caller supplied bad input rather than the gateway failing
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidName(_))
    }

    fn store<'a>(
        operation: &'static str,
        name: &'a VolumeName,
    ) -> impl FnOnce(RepositoryError) -> Self + 'a {
        move |source| Self::Store {
            operation,
            name: name.to_string(),
            source,
        }
    }
}

// ============================================================================
// Standard Implementation
// ============================================================================

pub struct StandardVolumeService {
    store: Arc<dyn VolumeStore>,
    projector: Arc<dyn ExportProjector>,
    root: PathBuf,
}

impl StandardVolumeService {
    /// `root` is the data root; volume directories are created under `root/nfs`.
    pub fn new(
        store: Arc<dyn VolumeStore>,
        projector: Arc<dyn ExportProjector>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            projector,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Undo the live side of a create whose record will not be committed.
    /// The export batch may have been partially applied, so the full host
    /// list is retracted. Failures are logged and never replace the error
    /// that caused the rollback.
    async fn rollback_create(&self, volume: &Volume, exported: bool) {
        if exported {
            if let Err(e) = self.projector.retract(&volume.export).await {
                warn!(volume = %volume.name, error = %e, "error retracting export during create rollback");
            }
        }

        if let Err(e) = remove_dir_if_present(volume.path()).await {
            warn!(
                volume = %volume.name,
                path = %volume.path().display(),
                error = %e,
                "error removing volume dir during create rollback"
            );
        }
    }
}

#[async_trait]
impl VolumeService for StandardVolumeService {
    async fn create_volume(
        &self,
        name: &str,
        hosts: Vec<String>,
        options: String,
    ) -> Result<CreateOutcome, VolumeManagerError> {
        let name = VolumeName::new(name)?;

        let mut tx = self
            .store
            .begin()
            .await
            .map_err(VolumeManagerError::store("create", &name))?;

        if tx
            .get(&name)
            .map_err(VolumeManagerError::store("create", &name))?
            .is_some()
        {
            debug!(volume = %name, "volume already exists");
            return Ok(CreateOutcome::AlreadyExists);
        }

        let volume = Volume::new(name.clone(), &self.root, hosts, options);
        info!(
            volume = %name,
            path = %volume.path().display(),
            hosts = ?volume.export.hosts,
            "Creating volume"
        );

        tx.put(&volume)
            .map_err(VolumeManagerError::store("create", &name))?;

        // With no record under the writer lock the directory belongs to this
        // create; anything left there by an unfinished delete is discarded.
        if let Err(source) = prepare_volume_dir(volume.path()).await {
            self.rollback_create(&volume, false).await;
            return Err(VolumeManagerError::CreateDirectory {
                name: name.to_string(),
                path: volume.path().to_path_buf(),
                source,
            });
        }

        if let Err(source) = self.projector.apply(&volume.export).await {
            self.rollback_create(&volume, true).await;
            return Err(VolumeManagerError::Export {
                name: name.to_string(),
                source,
            });
        }

        if let Err(source) = tx.commit().await {
            self.rollback_create(&volume, true).await;
            return Err(VolumeManagerError::Store {
                operation: "create",
                name: name.to_string(),
                source,
            });
        }

        info!(volume = %name, "Volume created");
        Ok(CreateOutcome::Created(volume))
    }

    async fn get_volume(&self, name: &str) -> Result<Option<Volume>, VolumeManagerError> {
        let name = VolumeName::new(name)?;
        self.store
            .find(&name)
            .await
            .map_err(VolumeManagerError::store("get", &name))
    }

    async fn delete_volume(&self, name: &str) -> Result<(), VolumeManagerError> {
        let name = VolumeName::new(name)?;

        let mut tx = self
            .store
            .begin()
            .await
            .map_err(VolumeManagerError::store("delete", &name))?;

        let Some(volume) = tx
            .get(&name)
            .map_err(VolumeManagerError::store("delete", &name))?
        else {
            debug!(volume = %name, "delete of unknown volume is a no-op");
            return Ok(());
        };

        info!(volume = %name, "Deleting volume");

        // The record goes first and stays gone: a volume marked deleted is
        // never re-exported by reload, whatever happens below.
        tx.delete(&name);
        tx.commit()
            .await
            .map_err(VolumeManagerError::store("delete", &name))?;

        self.projector
            .retract(&volume.export)
            .await
            .map_err(|source| VolumeManagerError::Unexport {
                name: name.to_string(),
                source,
            })?;

        if let Err(source) = remove_dir_if_present(volume.path()).await {
            return Err(VolumeManagerError::RemoveDirectory {
                name: name.to_string(),
                path: volume.path().to_path_buf(),
                source,
            });
        }

        info!(volume = %name, "Volume deleted");
        Ok(())
    }

    async fn reload(&self) -> Result<ReloadReport, VolumeManagerError> {
        let records = self.store.list().await.map_err(VolumeManagerError::Reload)?;
        info!("Reloading exports for {} persisted volumes", records.len());

        let mut report = ReloadReport::default();
        for record in records {
            let volume = match record.decode() {
                Ok(volume) => volume,
                Err(e) => {
                    error!(volume = %record.key_lossy(), error = %e, "error unmarshaling volume from database");
                    report.failed += 1;
                    continue;
                }
            };

            match self.projector.apply(&volume.export).await {
                Ok(()) => {
                    debug!(volume = %volume.name, "export re-applied");
                    report.applied += 1;
                }
                Err(e) => {
                    error!(volume = %volume.name, error = %e, "error exporting volume on reload");
                    report.failed += 1;
                }
            }
        }

        info!(applied = report.applied, failed = report.failed, "Reload completed");
        Ok(report)
    }

    async fn shutdown(&self) {
        info!("Retracting all exports");
        if let Err(e) = self.projector.retract_all().await {
            error!(error = %e, "error during shutdown");
        }
    }
}

async fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Create an empty volume directory, clearing stale contents first
async fn prepare_volume_dir(path: &Path) -> io::Result<()> {
    if tokio::fs::try_exists(path).await? {
        warn!(path = %path.display(), "discarding stale volume dir");
        remove_dir_if_present(path).await?;
    }
    tokio::fs::create_dir_all(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::exports::{ExportCall, MockExportProjector};
    use crate::infrastructure::repositories::InMemoryVolumeStore;
    use tempfile::TempDir;

    fn create_test_service() -> (
        StandardVolumeService,
        Arc<InMemoryVolumeStore>,
        Arc<MockExportProjector>,
        TempDir,
    ) {
        let root = TempDir::new().unwrap();
        let store = Arc::new(InMemoryVolumeStore::new());
        let projector = Arc::new(MockExportProjector::new());
        let service = StandardVolumeService::new(store.clone(), projector.clone(), root.path());
        (service, store, projector, root)
    }

    fn created(outcome: CreateOutcome) -> Volume {
        match outcome {
            CreateOutcome::Created(volume) => volume,
            CreateOutcome::AlreadyExists => panic!("expected volume to be created"),
        }
    }

    #[tokio::test]
    async fn test_create_volume_success() {
        let (service, _store, projector, root) = create_test_service();

        let volume = created(
            service
                .create_volume("data1", vec!["10.0.0.0/24".into(), "10.1.0.0/24".into()], "rw".into())
                .await
                .unwrap(),
        );

        assert_eq!(volume.path(), root.path().join("nfs").join("data1"));
        assert!(volume.path().is_dir());
        assert!(projector.is_exported("10.0.0.0/24", volume.path()));
        assert!(projector.is_exported("10.1.0.0/24", volume.path()));
        assert_eq!(projector.calls(), vec![ExportCall::Apply(volume.export.clone())]);

        let found = service.get_volume("data1").await.unwrap().unwrap();
        assert_eq!(found, volume);
    }

    #[tokio::test]
    async fn test_create_existing_volume_reports_conflict_without_side_effects() {
        let (service, _store, projector, _root) = create_test_service();

        created(service.create_volume("data1", vec!["*".into()], "rw".into()).await.unwrap());
        let second = service
            .create_volume("data1", vec!["other".into()], "ro".into())
            .await
            .unwrap();

        assert_eq!(second, CreateOutcome::AlreadyExists);
        assert_eq!(projector.apply_count(), 1);
        let stored = service.get_volume("data1").await.unwrap().unwrap();
        assert_eq!(stored.export.hosts, vec!["*".to_string()]);
        assert_eq!(stored.export.options, "rw");
    }

    #[tokio::test]
    async fn test_failed_export_rolls_back_record_and_directory() {
        let (service, _store, projector, root) = create_test_service();
        let path = root.path().join("nfs").join("broken");
        projector.fail_apply_on(&path);

        let err = service
            .create_volume("broken", vec!["10.0.0.1".into()], "rw".into())
            .await
            .unwrap_err();

        assert!(matches!(err, VolumeManagerError::Export { .. }));
        assert!(service.get_volume("broken").await.unwrap().is_none());
        assert!(!path.exists());
        // the possibly partial batch is withdrawn in full
        assert_eq!(projector.retract_count(), 1);
        assert!(!projector.is_exported("10.0.0.1", &path));
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back_export_and_directory() {
        let (service, store, projector, root) = create_test_service();
        store.fail_next_commit();

        let err = service
            .create_volume("data1", vec!["10.0.0.1".into()], "rw".into())
            .await
            .unwrap_err();

        let path = root.path().join("nfs").join("data1");
        assert!(matches!(err, VolumeManagerError::Store { operation: "create", .. }));
        assert!(service.get_volume("data1").await.unwrap().is_none());
        assert!(!path.exists());
        assert!(!projector.is_exported("10.0.0.1", &path));
    }

    #[tokio::test]
    async fn test_path_ignores_hosts_and_options() {
        let (service, _store, _projector, root) = create_test_service();

        let a = created(service.create_volume("foo", vec![], String::new()).await.unwrap());
        service.delete_volume("foo").await.unwrap();
        let b = created(
            service
                .create_volume("foo", vec!["a".into(), "b".into()], "rw,no_root_squash".into())
                .await
                .unwrap(),
        );

        assert_eq!(a.path(), root.path().join("nfs").join("foo"));
        assert_eq!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_invalid_names_rejected_before_touching_state() {
        let (service, _store, projector, root) = create_test_service();

        for name in ["", "..", "a/b"] {
            let err = service
                .create_volume(name, vec!["*".into()], String::new())
                .await
                .unwrap_err();
            assert!(err.is_client_error(), "{name:?} should be rejected");
        }

        assert!(projector.calls().is_empty());
        assert!(!root.path().join("nfs").exists());
    }

    #[tokio::test]
    async fn test_delete_volume() {
        let (service, _store, projector, _root) = create_test_service();
        let volume = created(
            service
                .create_volume("data1", vec!["10.0.0.0/24".into()], "rw".into())
                .await
                .unwrap(),
        );

        service.delete_volume("data1").await.unwrap();

        assert!(service.get_volume("data1").await.unwrap().is_none());
        assert!(!volume.path().exists());
        assert!(!projector.is_exported("10.0.0.0/24", volume.path()));
        assert_eq!(
            projector.calls().last(),
            Some(&ExportCall::Retract(volume.export.clone()))
        );
    }

    #[tokio::test]
    async fn test_delete_unknown_volume_is_idempotent() {
        let (service, _store, projector, _root) = create_test_service();

        service.delete_volume("ghost").await.unwrap();
        service.delete_volume("ghost").await.unwrap();

        assert_eq!(projector.retract_count(), 0);
    }

    #[tokio::test]
    async fn test_second_delete_does_not_retract_again() {
        let (service, _store, projector, _root) = create_test_service();
        created(service.create_volume("data1", vec!["*".into()], "rw".into()).await.unwrap());

        service.delete_volume("data1").await.unwrap();
        service.delete_volume("data1").await.unwrap();

        assert_eq!(projector.retract_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_unexport_still_removes_record() {
        let (service, _store, projector, _root) = create_test_service();
        let volume = created(service.create_volume("data1", vec!["*".into()], "rw".into()).await.unwrap());
        projector.fail_retract_on(volume.path());

        let err = service.delete_volume("data1").await.unwrap_err();

        assert!(matches!(err, VolumeManagerError::Unexport { .. }));
        assert!(service.get_volume("data1").await.unwrap().is_none());
        // cleanup stopped at the failed unexport
        assert!(volume.path().exists());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_directory() {
        let (service, _store, _projector, _root) = create_test_service();
        let volume = created(service.create_volume("data1", vec!["*".into()], "rw".into()).await.unwrap());
        std::fs::remove_dir_all(volume.path()).unwrap();

        service.delete_volume("data1").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_create_clears_dir_left_by_unfinished_delete() {
        let (service, _store, projector, root) = create_test_service();
        let volume = created(service.create_volume("data1", vec!["*".into()], "rw".into()).await.unwrap());
        std::fs::write(volume.path().join("secret"), b"old tenant").unwrap();
        projector.fail_retract_on(volume.path());
        assert!(service.delete_volume("data1").await.is_err());
        assert!(volume.path().join("secret").exists());

        projector.fail_apply_on(volume.path());
        let err = service
            .create_volume("data1", vec!["10.0.0.9".into()], "rw".into())
            .await
            .unwrap_err();

        assert!(matches!(err, VolumeManagerError::Export { .. }));
        assert!(service.get_volume("data1").await.unwrap().is_none());
        assert!(!root.path().join("nfs").join("data1").exists());
    }

    #[tokio::test]
    async fn test_create_starts_from_empty_dir() {
        let (service, _store, projector, _root) = create_test_service();
        let volume = created(service.create_volume("data1", vec!["*".into()], "rw".into()).await.unwrap());
        std::fs::write(volume.path().join("secret"), b"old tenant").unwrap();
        projector.fail_retract_on(volume.path());
        assert!(service.delete_volume("data1").await.is_err());

        let fresh = created(
            service
                .create_volume("data1", vec!["10.0.0.9".into()], "rw".into())
                .await
                .unwrap(),
        );

        assert!(fresh.path().is_dir());
        assert_eq!(std::fs::read_dir(fresh.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_mkdir_leaves_no_record() {
        let (service, _store, projector, root) = create_test_service();
        std::fs::write(root.path().join("nfs"), b"not a directory").unwrap();

        let err = service
            .create_volume("data1", vec!["*".into()], "rw".into())
            .await
            .unwrap_err();

        assert!(matches!(err, VolumeManagerError::CreateDirectory { .. }));
        assert!(service.get_volume("data1").await.unwrap().is_none());
        assert_eq!(projector.apply_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_record_removal_leaves_volume_intact() {
        let (service, store, projector, _root) = create_test_service();
        let volume = created(service.create_volume("data1", vec!["*".into()], "rw".into()).await.unwrap());
        store.fail_next_commit();

        let err = service.delete_volume("data1").await.unwrap_err();

        assert!(matches!(err, VolumeManagerError::Store { operation: "delete", .. }));
        assert!(service.get_volume("data1").await.unwrap().is_some());
        assert_eq!(projector.retract_count(), 0);
        assert!(projector.is_exported("*", volume.path()));
        assert!(volume.path().is_dir());
    }

    #[tokio::test]
    async fn test_failed_dir_removal_still_removes_record() {
        let (service, _store, projector, _root) = create_test_service();
        let volume = created(service.create_volume("data1", vec!["*".into()], "rw".into()).await.unwrap());
        std::fs::remove_dir_all(volume.path()).unwrap();
        std::fs::write(volume.path(), b"not a directory").unwrap();

        let err = service.delete_volume("data1").await.unwrap_err();

        assert!(matches!(err, VolumeManagerError::RemoveDirectory { .. }));
        assert!(service.get_volume("data1").await.unwrap().is_none());
        assert!(!projector.is_exported("*", volume.path()));
    }

    #[tokio::test]
    async fn test_concurrent_creates_yield_one_conflict() {
        let (service, _store, projector, _root) = create_test_service();
        let service = Arc::new(service);

        let a = {
            let service = service.clone();
            tokio::spawn(async move { service.create_volume("race", vec!["*".into()], "rw".into()).await })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move { service.create_volume("race", vec!["*".into()], "rw".into()).await })
        };

        let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        let conflicts = outcomes
            .iter()
            .filter(|o| **o == CreateOutcome::AlreadyExists)
            .count();

        assert_eq!(conflicts, 1);
        assert_eq!(projector.apply_count(), 1);
    }

    #[tokio::test]
    async fn test_reload_reapplies_every_record() {
        let (service, _store, projector, _root) = create_test_service();
        for name in ["a", "b", "c"] {
            created(service.create_volume(name, vec!["*".into()], "rw".into()).await.unwrap());
        }
        projector.retract_all().await.unwrap();
        projector.clear_calls();

        let report = service.reload().await.unwrap();

        assert_eq!(report, ReloadReport { applied: 3, failed: 0 });
        assert_eq!(projector.apply_count(), 3);
        for name in ["a", "b", "c"] {
            let volume = service.get_volume(name).await.unwrap().unwrap();
            assert!(projector.is_exported("*", volume.path()));
        }
    }

    #[tokio::test]
    async fn test_reload_continues_past_failures() {
        let (service, store, projector, root) = create_test_service();
        for name in ["a", "b", "c"] {
            created(service.create_volume(name, vec!["*".into()], "rw".into()).await.unwrap());
        }
        store.insert_raw(b"corrupt", b"{not json");
        projector.retract_all().await.unwrap();
        projector.clear_calls();
        projector.fail_apply_on(root.path().join("nfs").join("b"));

        let report = service.reload().await.unwrap();

        assert_eq!(report, ReloadReport { applied: 2, failed: 2 });
        assert!(projector.is_exported("*", &root.path().join("nfs").join("a")));
        assert!(!projector.is_exported("*", &root.path().join("nfs").join("b")));
        assert!(projector.is_exported("*", &root.path().join("nfs").join("c")));
    }

    #[tokio::test]
    async fn test_shutdown_retracts_everything_and_keeps_records() {
        let (service, _store, projector, _root) = create_test_service();
        created(service.create_volume("data1", vec!["*".into()], "rw".into()).await.unwrap());

        service.shutdown().await;

        assert_eq!(projector.calls().last(), Some(&ExportCall::RetractAll));
        assert!(projector.exported_targets().is_empty());
        assert!(service.get_volume("data1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_swallows_errors() {
        let (service, _store, projector, _root) = create_test_service();
        projector.fail_retract_all();

        service.shutdown().await;

        assert_eq!(projector.calls(), vec![ExportCall::RetractAll]);
    }
}
