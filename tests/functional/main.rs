// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the fleet orchestrator.
//!
//! These tests drive the full workflows (create chain, upgrade chain, node
//! membership batches, recovery) against the in-memory store and scripted
//! port fakes, WITHOUT any real cluster, cloud, or automation tooling.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_create_chain_reaches_running
//! ```
//!
//! Background workflows are observed the same way production callers
//! observe them: by polling the store and the recorded notifications.

#[path = "../common/fixtures.rs"]
pub mod fixtures;

mod chain_tests;
mod upgrade_tests;
