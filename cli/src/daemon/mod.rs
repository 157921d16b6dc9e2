// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - Configuration resolution and startup ordering
//! - Export reload and HTTP serving
//! - Graceful shutdown

pub mod client;
pub mod server;

pub use client::{GatewayClient, VolumeInfo};
pub use server::{resolve_config, resolve_exportfs, run_gateway, ServeOverrides};
