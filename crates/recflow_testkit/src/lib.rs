//! # recflow Testkit
//!
//! Test utilities for recflow.
//!
//! This crate provides:
//! - An in-memory remote database with deferred execution and fault
//!   injection
//! - An exhaustive binary-decision enumerator for driving fault injection
//!   through every path
//! - Property-based test generators using proptest
//! - Fixtures that wire a database facade over the mock
//!
//! ## Usage
//!
//! ```rust,ignore
//! use recflow_testkit::prelude::*;
//!
//! #[test]
//! fn every_fault_path_terminates_once() {
//!     let space = Arc::new(Mutex::new(DecisionSpace::new()));
//!     let cloud = MockCloud::with_faults(Arc::clone(&space));
//!     explore(&space, || {
//!         // ... run a stream against `cloud` and check its emissions
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod decision;
pub mod fixtures;
pub mod generators;
pub mod mock;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::decision::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::mock::*;
}

pub use decision::*;
pub use fixtures::*;
pub use generators::*;
pub use mock::*;
