// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! nfsg core
//!
//! Volume lifecycle management for the NFS gateway: persisted volume records,
//! projection onto the kernel export table, and the HTTP surface.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, lifecycle service, infrastructure adapters

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
