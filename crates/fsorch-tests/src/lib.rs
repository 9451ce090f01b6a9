//! Fsorch test and validation infrastructure.
//!
//! Integration scenarios for the filesystem lifecycle controller: explicit
//! fixtures (no global environment), fault-injecting substrates, and a fake
//! filesystem client standing in for the external mount driver.

pub mod chaos;
pub mod client;
pub mod harness;

#[cfg(test)]
mod mount_guard_tests;

pub use chaos::{CountingStorage, FlakyStorage, HangingPlacement};
pub use client::{ClientError, FsClient};
pub use harness::{fixture, fixture_full, fixture_with, smoke_spec, Fixture, FixtureConfig};
