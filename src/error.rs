//! Error taxonomy for the kernel.
//!
//! Draw-level errors (`DrawError`) are local to one execution and are always
//! converted into a [`Status`](crate::data::Status) by the engine. Only
//! `EngineError` ever reaches the caller of a run.

use std::io;
use std::time::Duration;

use crate::failure::Signature;

/// Why a single draw (and therefore the current execution) stopped early.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrawError {
    /// The byte source was exhausted or the buffer ceiling was hit.
    #[error("draw overran the available data")]
    Overrun,
    /// The execution was explicitly rejected (a filter gave up, or an assumption failed).
    #[error("test case rejected: {0}")]
    Invalid(String),
}

/// Errors from an example store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Errors decoding a reproduction blob.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("invalid base64 in reproduction blob: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("reproduction blob is empty")]
    Empty,

    #[error("unknown reproduction blob format byte {0:#04x}")]
    UnknownFormat(u8),

    #[error("blob was produced by engine version {found}, this is {expected}")]
    VersionMismatch { expected: String, found: String },
}

/// Engine-level failures to make progress. Test failures are not errors:
/// they are reported through [`FailureSet`](crate::engine::FailureSet).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(
        "unable to satisfy assumptions: {valid} valid examples out of {attempts} attempts \
         (needed at least {required})"
    )]
    Unsatisfiable {
        valid: u64,
        attempts: u64,
        required: u64,
    },

    #[error("flaky test: a buffer failing with {signature} gave {replayed} on immediate replay")]
    Flaky {
        signature: Signature,
        replayed: String,
        buffer: Vec<u8>,
    },

    #[error(
        "time budget of {budget:?} ran out after {valid} valid examples \
         (needed at least {required}) and no failure was found"
    )]
    Exhausted {
        budget: Duration,
        valid: u64,
        required: u64,
    },

    #[error("example store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Blob(#[from] BlobError),
}

pub type EngineResult<T> = Result<T, EngineError>;
pub type StoreResult<T> = Result<T, StoreError>;
