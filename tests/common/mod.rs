//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::PipelineFixture;
//!
//! #[tokio::test]
//! async fn test_round_trip() {
//!     let fixture = PipelineFixture::new();
//!     fixture.tracker.mark_viewed(1, &[10]).await.unwrap();
//!     assert_eq!(fixture.flusher().flush_to_db().await.unwrap(), 1);
//! }
//! ```

mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{PipelineFixture, RacingCache, SwitchableStore};
#[allow(unused_imports)]
pub use server::TestServer;
