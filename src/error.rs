use thiserror::Error;

/// Crate-wide result alias, mirroring the error taxonomy in the design
/// notes: transient I/O is reported through `success=false` at the RPC
/// layer, not through this type; this type exists for errors that a
/// caller must actually decide how to handle.
pub type Result<T> = std::result::Result<T, RaftError>;

#[derive(Debug, Error)]
pub enum RaftError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("persisted state is corrupt: {0}")]
    Corrupt(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<sled::Error> for RaftError {
    fn from(err: sled::Error) -> Self {
        RaftError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RaftError {
    fn from(err: serde_json::Error) -> Self {
        RaftError::Decode(err.to_string())
    }
}

/// Logs `msg` at error level and terminates the process.
///
/// Used only for the two failure modes the design marks fatal: a
/// corrupt persisted term/vote discovered at startup, and an Applier
/// that cannot advance the state machine deterministically.
pub fn fatal(msg: impl Into<String>) -> ! {
    let msg = msg.into();
    tracing::error!(%msg, "fatal error, terminating");
    std::process::exit(1);
}
