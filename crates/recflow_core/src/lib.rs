//! # recflow core
//!
//! Streams over a remote, callback-based record database.
//!
//! This crate provides:
//! - A single emission model for every remote call shape (single result,
//!   collection, per-item progress and completion, cursor pagination)
//! - Cancellable operation handles that forward cancellation at most once
//! - Demand-driven pagination that never fetches ahead of the consumer
//! - Totally ordered progress values with clamping
//!
//! ## Architecture
//!
//! A caller asks the [`Database`] facade for a stream. Subscribing builds an
//! [`OperationHandle`] around a remote operation from the
//! [`OperationFactory`], wires its callbacks into the stream and submits the
//! handle to an [`OperationQueue`]. Callbacks may fire on any thread; each
//! stream serializes them onto its own execution context before anything
//! reaches the [`Subscriber`].
//!
//! ## Key Invariants
//!
//! - At most one terminal emission per stream, and nothing after it
//! - Nothing reaches the subscriber after it cancels
//! - Cancellation reaches each remote operation at most once
//! - Per-item progress never decreases
//! - No page is fetched while demand is zero

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapters;
mod config;
mod consumer;
mod database;
mod downstream;
mod error;
mod handle;
mod model;
mod progress;
mod query;
mod queue;
mod remote;
mod serial;
mod stream;

pub use adapters::{
    BatchItems, BatchResult, FetchStream, ModifyStream, Modified, SingleResult, TrackedStream,
};
pub use config::{OperationConfig, Priority};
pub use consumer::{BlockingStream, Recorder};
pub use database::Database;
pub use error::{outcome_from_parts, FlowError, FlowResult};
pub use handle::{OperationHandle, OperationState};
pub use model::{Cursor, Query, Record, RecordId, Resource, Zone, ZoneId};
pub use progress::{Percent, Progress};
pub use query::PaginatedQuery;
pub use queue::{InlineQueue, OperationQueue, TokioQueue};
pub use remote::{
    BatchCallback, CancelFlag, FetchCallbacks, ItemCallbacks, ModifyCallbacks, OperationFactory,
    PageCallbacks, RecordOperations, RemoteOperation, ScriptedOperation, SingleCallback,
};
pub use stream::{Demand, Emission, Publisher, Subscriber, Subscription};
