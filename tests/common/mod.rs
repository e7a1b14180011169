//! Common test infrastructure
//!
//! Tests import everything they need from this module: an isolated
//! `TestServer`, a `TestClient` wrapper, and the seeded collection
//! constants.

mod client;
mod constants;
mod fixtures;
mod server;

pub use client::TestClient;
pub use constants::*;
pub use server::{TestServer, TEST_ARTIFACT_DELAY_SECS};
