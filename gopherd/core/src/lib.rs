// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Multi-protocol file server core: protocol and handler multiplexers,
//! virtual filesystems and the connection server.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Library root re-exporting the layered modules

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
