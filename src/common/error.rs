//! Error types for ChalkDB.

use std::fmt;

/// Convenient Result type alias.
///
/// Lets the rest of the crate write `Result<T>` instead of
/// `Result<T, Error>`, the same pattern as `std::io::Result`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in ChalkDB.
///
/// Recoverable conditions (a page not resident in the cache, a pinned page
/// blocking deletion, a trie lookup with the wrong value type) are reported
/// through `bool`/`Option` returns on the operations themselves; this enum
/// covers the failures that have to propagate.
#[derive(Debug)]
pub enum Error {
    /// I/O error from disk operations.
    Io(std::io::Error),

    /// A frame id outside `[0, pool_size)` was handed to the replacer.
    ///
    /// This is a programming error in the caller, not a runtime condition.
    FrameOutOfRange { frame_id: usize, pool_size: usize },

    /// A replacer operation referenced a frame with no recorded access.
    FrameNotTracked(usize),

    /// Every frame in the buffer pool is pinned; nothing can be admitted.
    PoolExhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::FrameOutOfRange {
                frame_id,
                pool_size,
            } => write!(
                f,
                "frame id {} out of range for pool of {} frames",
                frame_id, pool_size
            ),
            Error::FrameNotTracked(fid) => {
                write!(f, "frame {} has no recorded access in the replacer", fid)
            }
            Error::PoolExhausted => {
                write!(f, "every frame in the buffer pool is pinned")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
