//! Error types for the memuc controller.
//!
//! Messages are lowercase and follow `"<operation> failed: <reason>"` where an
//! operation is involved. An out-of-range instance handle is not represented
//! here: it is a caller bug and panics at the buffer pool.

use thiserror::Error;

/// Result type alias using the controller's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Why the external process could not be run.
#[derive(Error, Debug)]
pub enum LaunchFailure {
    /// The executable does not exist at the configured path.
    #[error("{0} not found (set MEMU_MEMUC_PATH)")]
    NotFound(String),
    /// Any other spawn or pipe failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    /// The external tool could not be started.
    #[error("memuc launch failed: {0}")]
    Launch(#[from] LaunchFailure),

    /// The status sentinel was not found in the response preamble.
    #[error("memuc is not connected: expected {sentinel:?} in {status:?}")]
    DeviceNotConnected {
        sentinel: &'static str,
        status: String,
    },

    /// A listing field was missing or not a valid unsigned integer.
    #[error("listing parse failed: field {field} of line {line:?}: {reason}")]
    MalformedField {
        line: String,
        field: usize,
        reason: String,
    },

    /// The framebuffer payload is shorter than its header claims.
    #[error("framebuffer decode failed: need {needed} bytes, got {actual}")]
    TruncatedPayload { needed: u64, actual: usize },

    /// The encoded bitmap would not fit the destination buffer.
    #[error("bitmap encode failed: need {needed} bytes, buffer holds {capacity}")]
    BufferOverflow { needed: u64, capacity: usize },
}

impl Error {
    /// True when the tool answered but did not report success.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Error::DeviceNotConnected { .. })
    }
}
