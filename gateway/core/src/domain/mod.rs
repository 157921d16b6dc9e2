// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Volume aggregate, the record store and export projector ports, and gateway
//! configuration.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Types and contracts shared by every other layer

pub mod volume;
pub mod repository;
pub mod export;
pub mod gateway_config;
