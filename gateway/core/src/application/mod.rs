// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod volume_manager;

pub use volume_manager::{
    CreateOutcome, ReloadReport, StandardVolumeService, VolumeManagerError, VolumeService,
};
