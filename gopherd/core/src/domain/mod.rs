// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure types shared by every layer: errors, selectors, entries, MIME
//! tables, the VFS contract and configuration.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Core types with no I/O beyond the VFS contract

pub mod error;
pub mod selector;
pub mod entry;
pub mod mime;
pub mod vfs;
pub mod link;
pub mod server_config;
