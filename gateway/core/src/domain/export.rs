// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Export Projector Port
//!
//! Narrow boundary between the lifecycle service and the kernel NFS export
//! table. Each call issues exactly one batched invocation of the external
//! mechanism (or none when there is nothing to do). Implementations keep no
//! state and never retry.

use async_trait::async_trait;
use thiserror::Error;
use crate::domain::volume::NfsExport;

#[async_trait]
pub trait ExportProjector: Send + Sync {
    /// Publish the export to every declared host
    async fn apply(&self, export: &NfsExport) -> Result<(), ExportError>;

    /// Withdraw the export from every declared host
    async fn retract(&self, export: &NfsExport) -> Result<(), ExportError>;

    /// Withdraw every export known to the NFS server
    async fn retract_all(&self) -> Result<(), ExportError>;
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {output}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },
}
