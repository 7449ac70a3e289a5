use thiserror::Error;

use crate::types::NodeId;

/// The main result type for vortex-core operations.
pub type VortexResult<T> = Result<T, VortexError>;

/// Enum representing possible errors within the vortex-core library.
///
/// Variants map onto the error taxonomy the core is specified against:
/// `InvalidArgument` and `Configuration` are caller mistakes caught at an
/// API boundary before any state mutation; `InvariantViolation` and
/// `Internal` are bugs (an invariant the algorithm itself is supposed to
/// maintain was broken); `NotFound`/`DuplicateNode` are caller references
/// to node ids that don't (or already do) exist; `StorageFailure` is
/// bubbled up untouched from a `ScoreFunction`/`RandomAccessVectorValues`
/// collaborator.
#[derive(Error, Debug)]
pub enum VortexError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Node id not found: {0}")]
    NotFound(NodeId),

    #[error("Node id already exists: {0}")]
    DuplicateNode(NodeId),

    #[error("Index is empty, cannot perform search")]
    EmptyIndex,

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Operation is not supported: {0}")]
    UnsupportedOperation(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VortexError {
    /// Raises an [`VortexError::InvariantViolation`] and, in debug builds,
    /// panics immediately. Invariant violations are bugs in the algorithm
    /// itself (self-loops, duplicate ids, non-monotonic NodeArrays,
    /// `cleanup()` racing a live insert) and are specified to be fatal;
    /// the panic gives a debug build a hard stop at the point of failure,
    /// while a release build still gets the error variant to log and
    /// abort on, rather than silently continuing on corrupted state.
    #[track_caller]
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        debug_assert!(false, "invariant violation: {msg}");
        VortexError::InvariantViolation(msg)
    }
}
