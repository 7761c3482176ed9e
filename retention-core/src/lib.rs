//! # Retention Core
//!
//! Concurrency-safe building blocks for holding values until they expire.
//!
//! ## Features
//!
//! - [`BlockingQueue`]: FIFO queue with a cancellable async `pop`
//! - [`RetentionEngine`]: retains values for individual durations and hands each one,
//!   once expired, to exactly one of any number of consumer streams
//! - [`ExpireSet`]: lazily expiring set with no background activity
//! - [`CancelToken`]: manual or deadline-driven cancellation with a recorded cause
//! - [`Retrier`]: re-runs a fallible async operation until success or cancellation
//! - [`Stack`]: thread-safe LIFO stack
//! - [`DoubleMap`]: concurrent map keyed by a root key and a child key
//!
//! ## Example
//!
//! ```rust,no_run
//! use retention_core::{RetentionConfig, RetentionEngine};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Sweep for expired values every 50ms instead of the default 100ms
//!     let config = RetentionConfig::default()
//!         .with_sweep_interval(Duration::from_millis(50));
//!     let engine = RetentionEngine::with_config(config);
//!
//!     engine.add("job-1", Duration::from_millis(200));
//!     engine.add("job-2", Duration::from_secs(1));
//!
//!     // Each stream competes for expired values
//!     let (mut stream, cancel) = engine.consumer_stream().unwrap();
//!     while let Some(job) = stream.recv().await {
//!         println!("expired: {}", job);
//!         if job == "job-2" {
//!             cancel.cancel();
//!         }
//!     }
//!
//!     // Stops the sweep task and closes every remaining stream
//!     engine.destroy();
//! }
//! ```

mod cancel;
mod config;
mod deadline;
mod double_map;
mod engine;
mod error;
mod expire_set;
mod queue;
mod retrier;
mod stack;
mod ttl_table;

pub use cancel::{CancelCause, CancelToken};
pub use config::{RetentionConfig, DEFAULT_SWEEP_INTERVAL};
pub use deadline::{Deadline, MAX_RETAIN};
pub use double_map::DoubleMap;
pub use engine::{ConsumerStream, RetentionEngine, StreamCancel};
pub use error::{PopError, RetryError};
pub use expire_set::ExpireSet;
pub use queue::BlockingQueue;
pub use retrier::{Retrier, NO_DELAY, UNLIMITED};
pub use stack::Stack;
pub use ttl_table::TtlTable;
