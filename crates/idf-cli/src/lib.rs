// SPDX-License-Identifier: MIT OR Apache-2.0
//! idf-cli
#![deny(unsafe_code)]
//!
//! Output formatting helpers for the `foundry` binary.

/// Table and JSON rendering for command output.
pub mod format;
