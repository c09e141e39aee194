// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod vfs;
pub mod dir_cache;
pub mod mail;
pub mod tls;
