//! # conjecture-kernel
//!
//! The core of a property-based testing engine built on byte buffers.
//!
//! Every generated value is produced by reading bytes from a buffer, and
//! every execution records which bytes it consumed. Shrinking never touches
//! values directly: it edits the recorded buffer towards the shortlex
//! smallest one that still fails the same way, and replays it. Structure
//! discovered during an execution (nested spans, one block per raw draw)
//! lets the shrinker make structural edits such as deleting a whole list
//! element in one step.
//!
//! Layout:
//!
//! - [`source`], [`data`], [`spans`]: byte sources and the per-execution
//!   recording context.
//! - [`distributions`], [`strategy`]: value generation over bytes.
//! - [`shrinker`], [`intminimize`]: buffer minimisation.
//! - [`coordinator`], [`engine`]: failure tracking and the run phases.
//! - [`store`], [`blob`]: persistence of failing buffers.

pub mod blob;
pub mod config;
pub mod coordinator;
pub mod data;
pub mod distributions;
pub mod engine;
pub mod error;
pub mod failure;
pub mod intminimize;
pub mod shrinker;
pub mod source;
pub mod spans;
pub mod store;
pub mod strategy;

pub use config::{Phase, RunnerConfig};
pub use data::{Status, TestData, TestResult};
pub use engine::{
    reproduce, run_generation, run_generation_with_store, shrink, Engine, FailureSet,
    MinimalFailure, RunStats,
};
pub use error::{DrawError, EngineError, StoreError};
pub use failure::{assume, ensure, Failure, Signature, TestError};
pub use store::{DirectoryStore, ExampleStore, InMemoryStore, StoreKey};
pub use strategy::{BoxedStrategy, Strategy};
