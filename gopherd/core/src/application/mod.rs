// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application
//!
//! Shared server state and the content handlers that turn a selector into
//! a document or a menu.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Request resolution independent of any wire protocol

pub mod server_context;
pub mod handlers;
