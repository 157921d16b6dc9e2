// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Subdirectory of the data root holding one directory per volume.
pub const NFS_DIR: &str = "nfs";

/// Longest name accepted, matching the usual `NAME_MAX` of Linux filesystems.
pub const MAX_NAME_LEN: usize = 255;

// ============================================================================
// Value Objects
// ============================================================================

/// Volume name
///
/// The name is the record store key and the last component of the backing
/// directory, so it must be a single, non-empty path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VolumeName(String);

impl VolumeName {
    pub fn new(name: impl Into<String>) -> Result<Self, VolumeError> {
        let name = name.into();

        if name.is_empty() {
            return Err(VolumeError::EmptyName);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(VolumeError::NameTooLong(name.len()));
        }
        if name == "." || name == ".." || name.contains('/') || name.contains('\0') {
            return Err(VolumeError::InvalidName(name));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for VolumeName {
    type Error = VolumeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VolumeName> for String {
    fn from(name: VolumeName) -> Self {
        name.0
    }
}

impl std::fmt::Display for VolumeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// NFS export declaration for a volume directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfsExport {
    /// Absolute directory being exported
    pub path: PathBuf,

    /// Host patterns allowed to mount, in declaration order
    #[serde(default)]
    pub hosts: Vec<String>,

    /// `exportfs` option string applied to every host; empty means defaults
    #[serde(default)]
    pub options: String,
}

impl NfsExport {
    /// `host:path` export targets, one per host.
    pub fn targets(&self) -> impl Iterator<Item = String> + '_ {
        self.hosts
            .iter()
            .map(move |host| format!("{}:{}", host, self.path.display()))
    }
}

// ============================================================================
// Aggregate Root
// ============================================================================

/// A named, directory-backed volume exported over NFS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: VolumeName,
    pub export: NfsExport,
}

impl Volume {
    /// Declare a volume under `root`. The export path is always derived from
    /// the name and never taken from the caller.
    pub fn new(
        name: VolumeName,
        root: &Path,
        hosts: Vec<String>,
        options: impl Into<String>,
    ) -> Self {
        let path = volume_path(root, &name);
        Self {
            name,
            export: NfsExport {
                path,
                hosts,
                options: options.into(),
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.export.path
    }

    /// Serialize to the persisted record format
    pub fn to_record(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a persisted record
    pub fn from_record(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// `root/nfs/name`
pub fn volume_path(root: &Path, name: &VolumeName) -> PathBuf {
    root.join(NFS_DIR).join(name.as_str())
}

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("volume name must not be empty")]
    EmptyName,

    #[error("volume name is {0} bytes, longer than the 255 byte limit")]
    NameTooLong(usize),

    #[error("invalid volume name {0:?}: must be a single path component")]
    InvalidName(String),
}
