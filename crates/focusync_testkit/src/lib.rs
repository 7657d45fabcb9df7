//! # focusync Testkit
//!
//! Test utilities for the focusync sync engine.
//!
//! This crate provides:
//! - [`MemoryBackend`], an in-memory remote with a call log, scripted
//!   faults and a fetch gate
//! - [`TestRig`], a started coordinator wired to local collections and the
//!   backend
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use focusync_testkit::prelude::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn pulls_on_sign_in() {
//!     let rig = TestRig::start();
//!     rig.sign_in("alice");
//!     rig.wait_synced(EntityKind::Presets, "alice").await;
//!     assert_eq!(rig.backend.count(EntityKind::Presets, CallKind::Fetch), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use focusync_model::EntityKind;
}

pub use backend::*;
pub use fixtures::*;
pub use generators::*;
pub use logging::init_tracing;
