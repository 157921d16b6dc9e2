// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end volume lifecycle against the sled store and a fake export table.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use nfsg_core::application::{CreateOutcome, ReloadReport, StandardVolumeService, VolumeService};
use nfsg_core::domain::repository::VolumeStore;
use nfsg_core::infrastructure::exports::{ExportCall, MockExportProjector};
use nfsg_core::infrastructure::repositories::SledVolumeStore;
use nfsg_core::presentation::app;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

fn service_at(root: &Path, store: Arc<SledVolumeStore>, projector: Arc<MockExportProjector>) -> StandardVolumeService {
    StandardVolumeService::new(store, projector, root)
}

/// Reopen a database whose previous handle was just dropped in this process
async fn reopen(path: &Path) -> SledVolumeStore {
    SledVolumeStore::open_with_timeout(path, Duration::from_secs(5))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_get_delete_round() {
    let root = TempDir::new().unwrap();
    let store = Arc::new(SledVolumeStore::open(root.path().join("volumes.db")).unwrap());
    let projector = Arc::new(MockExportProjector::new());
    let service = service_at(root.path(), store, projector.clone());

    let outcome = service
        .create_volume("data1", vec!["10.0.0.0/24".into()], "rw".into())
        .await
        .unwrap();
    let CreateOutcome::Created(volume) = outcome else {
        panic!("expected data1 to be created");
    };
    let expected = root.path().join("nfs").join("data1");
    assert_eq!(volume.path(), expected);
    assert!(expected.is_dir());
    assert!(projector.is_exported("10.0.0.0/24", &expected));

    let found = service.get_volume("data1").await.unwrap().unwrap();
    assert_eq!(found.path(), expected);

    service.delete_volume("data1").await.unwrap();
    assert!(service.get_volume("data1").await.unwrap().is_none());
    assert!(!expected.exists());
    assert!(projector.exported_targets().is_empty());
}

#[tokio::test]
async fn test_restart_reload_reexports_persisted_volumes() {
    let root = TempDir::new().unwrap();
    let db_path = root.path().join("volumes.db");

    {
        let store = Arc::new(SledVolumeStore::open(&db_path).unwrap());
        let projector = Arc::new(MockExportProjector::new());
        let service = service_at(root.path(), store.clone(), projector.clone());

        for name in ["a", "b"] {
            service
                .create_volume(name, vec!["*".into()], "rw".into())
                .await
                .unwrap();
        }
        service.delete_volume("b").await.unwrap();
        service.shutdown().await;
        assert!(projector.exported_targets().is_empty());
        store.flush().await.unwrap();
    }

    let store = Arc::new(reopen(&db_path).await);
    let projector = Arc::new(MockExportProjector::new());
    let service = service_at(root.path(), store, projector.clone());

    let report = service.reload().await.unwrap();

    assert_eq!(report, ReloadReport { applied: 1, failed: 0 });
    assert!(projector.is_exported("*", &root.path().join("nfs").join("a")));
    assert_eq!(projector.calls().len(), 1);
    assert!(matches!(projector.calls()[0], ExportCall::Apply(_)));
}

#[tokio::test]
async fn test_failed_create_leaves_nothing_behind_after_restart() {
    let root = TempDir::new().unwrap();
    let db_path = root.path().join("volumes.db");

    {
        let store = Arc::new(SledVolumeStore::open(&db_path).unwrap());
        let projector = Arc::new(MockExportProjector::new());
        projector.fail_apply_on(root.path().join("nfs").join("bad"));
        let service = service_at(root.path(), store, projector);

        assert!(service
            .create_volume("bad", vec!["*".into()], "rw".into())
            .await
            .is_err());
    }

    let store = reopen(&db_path).await;
    assert!(store.list().await.unwrap().is_empty());
    assert!(!root.path().join("nfs").join("bad").exists());
}

#[tokio::test]
async fn test_concurrent_creates_over_sled() {
    let root = TempDir::new().unwrap();
    let store = Arc::new(SledVolumeStore::temporary().unwrap());
    let projector = Arc::new(MockExportProjector::new());
    let service = Arc::new(service_at(root.path(), store, projector.clone()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.create_volume("shared", vec!["*".into()], "rw".into()).await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            CreateOutcome::Created(_) => created += 1,
            CreateOutcome::AlreadyExists => conflicts += 1,
        }
    }

    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(projector.apply_count(), 1);
}

#[tokio::test]
async fn test_http_round_over_sled() {
    let root = TempDir::new().unwrap();
    let store = Arc::new(SledVolumeStore::temporary().unwrap());
    let projector = Arc::new(MockExportProjector::new());
    let router = app(Arc::new(service_at(root.path(), store, projector)));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/volume?name=data1")
        .body(Body::from(r#"{"Hosts":["10.0.0.0/24"],"Options":"rw"}"#))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["Name"], "data1");
    assert_eq!(
        value["Path"],
        root.path().join("nfs").join("data1").display().to_string()
    );

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/volume/data1")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .uri("/volume/data1")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
