// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `exportfs` Export Projector
//!
//! Drives the kernel NFS export table through the `exportfs` command:
//!
//! | Operation | Invocation |
//! |-----------|------------|
//! | apply | `exportfs [-o <options>] host:path [-o <options>] host:path ...` |
//! | retract | `exportfs -u host:path host:path ...` |
//! | retract all | `exportfs -ua` |
//!
//! Every call is a single process invocation covering all hosts of the
//! volume. Success is a zero exit status; on failure the combined stdout and
//! stderr become the error detail. There is no timeout: a hung `exportfs`
//! blocks its caller.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;
use crate::domain::export::{ExportError, ExportProjector};
use crate::domain::volume::NfsExport;

pub struct ExportfsProjector {
    program: PathBuf,
}

impl ExportfsProjector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn run(&self, args: &[String]) -> Result<(), ExportError> {
        let program = self.program.display().to_string();
        debug!(program = %program, args = ?args, "invoking exportfs");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ExportError::Spawn {
                program: program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Err(ExportError::Failed {
            program,
            status: output.status.to_string(),
            output: combined.trim().to_string(),
        })
    }
}

#[async_trait]
impl ExportProjector for ExportfsProjector {
    async fn apply(&self, export: &NfsExport) -> Result<(), ExportError> {
        if export.hosts.is_empty() {
            return Ok(());
        }
        self.run(&apply_args(export)).await
    }

    async fn retract(&self, export: &NfsExport) -> Result<(), ExportError> {
        if export.hosts.is_empty() {
            return Ok(());
        }
        self.run(&retract_args(export)).await
    }

    async fn retract_all(&self) -> Result<(), ExportError> {
        self.run(&retract_all_args()).await
    }
}

/// Arguments exporting `export` to each of its hosts
pub fn apply_args(export: &NfsExport) -> Vec<String> {
    let mut args = Vec::new();
    for target in export.targets() {
        if !export.options.is_empty() {
            args.push("-o".to_string());
            args.push(export.options.clone());
        }
        args.push(target);
    }
    args
}

/// Arguments unexporting `export` from each of its hosts
pub fn retract_args(export: &NfsExport) -> Vec<String> {
    std::iter::once("-u".to_string())
        .chain(export.targets())
        .collect()
}

pub fn retract_all_args() -> Vec<String> {
    vec!["-ua".to_string()]
}
