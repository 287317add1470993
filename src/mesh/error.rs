//! Error taxonomy of the mesh core.
//!
//! Construction errors are fatal and surfaced immediately.  `InvalidThread`
//! indicates an implementation bug (a push/pop addressed a lane that does
//! not exist) and is likewise fatal.  An empty lane on pop is NOT an error —
//! it is normal control flow and shows up as `Ok(None)`.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("operand batches disagree on thread count: west {west}, north {north}, expected {expected}")]
    ThreadCountMismatch {
        expected: usize,
        west: usize,
        north: usize,
    },

    #[error("array edge {edge} does not match operand edges: west rows {west_rows}, north columns {north_cols}")]
    EdgeMismatch {
        edge: usize,
        west_rows: usize,
        north_cols: usize,
    },

    #[error("west operand depth {west} does not match north operand depth {north}")]
    OperandDepthMismatch { west: usize, north: usize },

    #[error("buffer depth must be negative (unbounded) or at least 2, got {0}")]
    InvalidBufferDepth(i64),

    #[error("invalid thread id {thread} in buffer <{i},{j}>")]
    InvalidThread { thread: usize, i: i32, j: i32 },
}
