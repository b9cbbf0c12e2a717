//! sideload - self-update pipeline for sideloaded Android packages
//!
//! Given a "latest version" descriptor from an update server and a download
//! link of unknown shape, sideload finds the real package URL, streams it to
//! disk with progress reporting, retries transient network failures, checks
//! that the result is an installable package and records the handed-off
//! install so the next start can confirm it exactly once.
//!
//! # Architecture Overview
//!
//! ```text
//! check ──▶ resolve ──▶ download (+retry) ──▶ validate ──▶ mark pending ──▶ installer
//!                                                                           │
//!                                             next start: confirm ◀─────────┘
//! ```
//!
//! # Core Modules
//!
//! ## Pipeline
//! - [`resolver`] - Classify links and extract direct package URLs from file hosts, drive shares and release pages
//! - [`download`] - Streaming download with response guards, throttled progress and bounded retry
//! - [`package`] - Structural package validation (archive + manifest identity)
//! - [`state`] - Durable pending-install record
//! - [`upgrade`] - Version check, orchestrator state machine and post-install confirmation
//!
//! ## Supporting Modules
//! - [`http`] - Shared HTTP clients and transport error mapping
//! - [`config`] - TOML configuration (`~/.sideload/config.toml`)
//! - [`core`] - Error taxonomy and user-facing error rendering
//! - [`cli`] - Command-line interface
//! - [`utils`] - Atomic writes and terminal progress
//!
//! # Configuration (config.toml)
//!
//! ```toml
//! [app]
//! version_code = 150
//! version_name = "1.5.0"
//! locale = "en"
//!
//! [server]
//! check_endpoints = ["https://updates.example.com/api/update/check"]
//! changelog_endpoints = ["https://updates.example.com/api/changelog"]
//! check_interval_secs = 180   # background re-check for `upgrade --watch`
//!
//! [download]
//! max_retries = 20
//! retry_delay_secs = 5
//! verify_checksum = true
//!
//! [install]
//! command = ["adb", "install", "-r"]
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! sideload check
//! sideload upgrade --yes
//! sideload resolve https://www.mediafire.com/file/abc/app.apk/file
//! sideload download https://github.com/org/app/releases/latest --output app.apk
//! sideload validate app.apk
//! sideload confirm --current-version-code 200
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod download;
pub mod http;
pub mod package;
pub mod resolver;
pub mod state;
pub mod upgrade;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
