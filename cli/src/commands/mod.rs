// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the nfsg CLI

pub mod config;
pub mod volume;

pub use self::config::ConfigCommand;
pub use self::volume::VolumeCommand;
