// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Filesystem implementations of the domain `Vfs` trait.

pub mod real;
pub mod zip;

pub use real::RealVfs;
pub use zip::ZipVfs;
