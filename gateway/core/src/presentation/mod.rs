// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`nfsg-core`)
//!
//! HTTP surface that translates external requests into volume service calls.
//! All real work is delegated to `crate::application`.

pub mod api;

pub use api::app;
