//! Error types for lockstep.
//!
//! This module provides structured error handling for collective operations,
//! with error class categorization separating sequencing bugs (misuse of the
//! communicator protocol) from arrival and configuration problems.

use thiserror::Error;

/// Result type for collective operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error class, categorizing the type of communicator error.
///
/// Sequencing errors indicate protocol misuse (a programmer bug): mixed
/// operation kinds within a generation, stray or excessive finalizer
/// callbacks, or a generation advancing before all finalizers completed.
/// Arrival errors cover malformed arrivals (bad site index, repeated
/// arrival, invalid generation, payload shape mismatch). Config errors
/// cover construction and registry misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Protocol misuse within a generation (invalid status).
    Sequencing,
    /// Malformed arrival arguments.
    Arrival,
    /// Construction or registry misuse.
    Config,
    /// Internal failure or user-supplied error.
    Other,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Sequencing => write!(f, "SEQUENCING"),
            ErrorClass::Arrival => write!(f, "ARRIVAL"),
            ErrorClass::Config => write!(f, "CONFIG"),
            ErrorClass::Other => write!(f, "OTHER"),
        }
    }
}

/// Error types for collective operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A finalizer callback was observed before the start of a collective
    /// operation. Indicates a stray callback left over from a prior
    /// generation.
    #[error(
        "sequencing error: on_ready callback invoked before the start of the \
         collective {operation} operation"
    )]
    ReadyBeforeStart {
        /// Name of the operation the stray callback belongs to.
        operation: &'static str,
    },

    /// A site arrived with an operation kind differing from the one already
    /// active in the current generation.
    #[error(
        "sequencing error: operation type mismatch, invoked for {requested}, \
         ongoing operation {ongoing}"
    )]
    OperationMismatch {
        /// Name of the operation the site arrived with.
        requested: &'static str,
        /// Name of the operation active in the current generation.
        ongoing: &'static str,
    },

    /// More finalizer callbacks ran than there are sites. Indicates a gate
    /// double-fire.
    #[error(
        "sequencing error: an excessive number of on_ready callbacks have \
         been invoked before the end of the collective {operation} operation \
         (expected {expected}, observed {observed})"
    )]
    ExcessiveOnReady {
        /// Name of the active operation.
        operation: &'static str,
        /// Number of sites expected to finalize.
        expected: usize,
        /// Number of finalizer invocations observed so far.
        observed: usize,
    },

    /// Fewer finalizers than sites had completed when the generation was
    /// about to advance.
    #[error(
        "sequencing error: not all on_ready callbacks have been invoked at \
         the end of the collective {operation} operation (expected \
         {expected}, observed {observed})"
    )]
    IncompleteOnReady {
        /// Name of the active operation.
        operation: &'static str,
        /// Number of sites expected to finalize.
        expected: usize,
        /// Number of finalizer invocations that completed.
        observed: usize,
    },

    /// A site index was outside `0..num_sites`.
    #[error("site index {which} out of range for {num_sites} sites")]
    SiteOutOfRange {
        /// The offending site index.
        which: usize,
        /// Number of sites in the communicator.
        num_sites: usize,
    },

    /// A site arrived more than once within the same generation.
    #[error("site {which} arrived repeatedly in generation {generation}")]
    RepeatedArrival {
        /// The offending site index.
        which: usize,
        /// The generation the repeated arrival targeted.
        generation: u64,
    },

    /// An explicit generation of 0 was requested. Generations are numbered
    /// starting at 1; pass `None` for the current generation.
    #[error("generation 0 is invalid, generations are numbered from 1")]
    InvalidGeneration,

    /// A contributed payload had the wrong number of elements.
    #[error("payload count mismatch: expected {expected} elements, got {got}")]
    CountMismatch {
        /// Expected element count.
        expected: usize,
        /// Provided element count.
        got: usize,
    },

    /// The generation storage held a different element type than requested.
    #[error("payload type mismatch: generation storage does not hold {expected}")]
    PayloadTypeMismatch {
        /// The requested element type.
        expected: &'static str,
    },

    /// A communicator was created with zero sites.
    #[error("a communicator requires at least one site")]
    ZeroSites,

    /// A communicator with the given name is already registered.
    #[error("communicator {0:?} already exists")]
    AlreadyExists(String),

    /// No communicator with the given name is registered.
    #[error("communicator {0:?} not found")]
    NotFound(String),

    /// Internal lockstep error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The class of this error.
    ///
    /// Sequencing errors are programmer bugs in the collective protocol and
    /// correspond to the invalid-status failures of the error taxonomy;
    /// recovery is not expected.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::ReadyBeforeStart { .. }
            | Error::OperationMismatch { .. }
            | Error::ExcessiveOnReady { .. }
            | Error::IncompleteOnReady { .. } => ErrorClass::Sequencing,
            Error::SiteOutOfRange { .. }
            | Error::RepeatedArrival { .. }
            | Error::InvalidGeneration
            | Error::CountMismatch { .. }
            | Error::PayloadTypeMismatch { .. } => ErrorClass::Arrival,
            Error::ZeroSites | Error::AlreadyExists(_) | Error::NotFound(_) => {
                ErrorClass::Config
            }
            Error::Internal(_) => ErrorClass::Other,
        }
    }
}
