// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Export Infrastructure Module
//!
//! Concrete implementations of the `ExportProjector` port.

pub mod exportfs;

pub use exportfs::ExportfsProjector;
pub use mock::{ExportCall, MockExportProjector};

mod mock {
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashSet};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use crate::domain::export::{ExportError, ExportProjector};
    use crate::domain::volume::NfsExport;

    /// One recorded projector invocation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ExportCall {
        Apply(NfsExport),
        Retract(NfsExport),
        RetractAll,
    }

    /// In-process stand-in for `exportfs`
    ///
    /// Records every call and keeps a simulated export table of `host:path`
    /// targets. Failures can be injected per export path.
    #[derive(Default)]
    pub struct MockExportProjector {
        calls: Mutex<Vec<ExportCall>>,
        table: Mutex<BTreeSet<String>>,
        fail_apply: Mutex<HashSet<PathBuf>>,
        fail_retract: Mutex<HashSet<PathBuf>>,
        fail_retract_all: Mutex<bool>,
    }

    impl MockExportProjector {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_apply_on(&self, path: impl AsRef<Path>) {
            self.fail_apply.lock().unwrap().insert(path.as_ref().to_path_buf());
        }

        pub fn fail_retract_on(&self, path: impl AsRef<Path>) {
            self.fail_retract.lock().unwrap().insert(path.as_ref().to_path_buf());
        }

        pub fn fail_retract_all(&self) {
            *self.fail_retract_all.lock().unwrap() = true;
        }

        pub fn calls(&self) -> Vec<ExportCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn clear_calls(&self) {
            self.calls.lock().unwrap().clear();
        }

        pub fn apply_count(&self) -> usize {
            self.count(|call| matches!(call, ExportCall::Apply(_)))
        }

        pub fn retract_count(&self) -> usize {
            self.count(|call| matches!(call, ExportCall::Retract(_)))
        }

        /// Current simulated export table, as sorted `host:path` entries
        pub fn exported_targets(&self) -> Vec<String> {
            self.table.lock().unwrap().iter().cloned().collect()
        }

        pub fn is_exported(&self, host: &str, path: &Path) -> bool {
            self.table
                .lock()
                .unwrap()
                .contains(&format!("{}:{}", host, path.display()))
        }

        fn count(&self, predicate: impl Fn(&ExportCall) -> bool) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
        }

        fn failure(operation: &str, export: &NfsExport) -> ExportError {
            ExportError::Failed {
                program: "exportfs".to_string(),
                status: "exit status: 1".to_string(),
                output: format!("injected {} failure for {}", operation, export.path.display()),
            }
        }
    }

    #[async_trait]
    impl ExportProjector for MockExportProjector {
        async fn apply(&self, export: &NfsExport) -> Result<(), ExportError> {
            self.calls.lock().unwrap().push(ExportCall::Apply(export.clone()));
            if self.fail_apply.lock().unwrap().contains(&export.path) {
                return Err(Self::failure("apply", export));
            }
            self.table.lock().unwrap().extend(export.targets());
            Ok(())
        }

        async fn retract(&self, export: &NfsExport) -> Result<(), ExportError> {
            self.calls.lock().unwrap().push(ExportCall::Retract(export.clone()));
            if self.fail_retract.lock().unwrap().contains(&export.path) {
                return Err(Self::failure("retract", export));
            }
            let mut table = self.table.lock().unwrap();
            for target in export.targets() {
                table.remove(&target);
            }
            Ok(())
        }

        async fn retract_all(&self) -> Result<(), ExportError> {
            self.calls.lock().unwrap().push(ExportCall::RetractAll);
            if *self.fail_retract_all.lock().unwrap() {
                return Err(ExportError::Failed {
                    program: "exportfs".to_string(),
                    status: "exit status: 1".to_string(),
                    output: "injected retract-all failure".to_string(),
                });
            }
            self.table.lock().unwrap().clear();
            Ok(())
        }
    }
}
