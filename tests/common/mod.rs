//! Integration test common infrastructure.
//!
//! Provides an in-process discharge server and a relying-party client that
//! seals third-party caveats to it.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::{TestCaveat, TestClient};
#[allow(unused_imports)]
pub use server::TestServer;
