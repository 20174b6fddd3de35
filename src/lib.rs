// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Real-time and scheduled `ClamAV` scanning of a directory tree.
//!
//! Files created, written or moved into the watched tree are scanned by an
//! external engine. Infected files end up in a per-class quarantine
//! directory and every decision is appended to a per-class audit log.
//!
//! # Modules
//!
//! - [`watcher`] - Recursive inotify watcher producing typed file events
//! - [`filter`] - Exclusion patterns and existence/type checks
//! - [`engine`] - Scan engine contract and `ClamAV` implementations
//! - [`dispatcher`] - Per-path serialized scan scheduling and verdict handling
//! - [`quarantine`] - Quarantine roots, atomic moves and verification
//! - [`audit`] - Append-only audit log
//! - [`fullscan`] - Scheduled whole-tree scan job

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod filter;
pub mod fullscan;
pub mod quarantine;
pub mod util;
pub mod watcher;
