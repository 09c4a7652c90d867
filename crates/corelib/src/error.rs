//! Error taxonomy shared by every crate in the workspace.
//!
//! The first four variants are the typed errors that cross RPC
//! boundaries; the whole enum is serde-serializable so a handler can
//! embed it in a response frame and the caller gets the same value back.
//! Transport and invariant failures are local conditions that surface to
//! whoever issued the call and are never retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Error {
    /// Another node currently holds the bootstrap join token.
    #[error("the DHT is busy with a concurrent join")]
    DhtBusy,

    /// Re-insertion of a word already present at the responsible node,
    /// or cached at a forwarding hop when caching is enabled.
    #[error("word {0:?} is already present in the DHT")]
    DuplicateWord(String),

    /// The word's owning node does not hold a definition for it.
    #[error("word {0:?} was not found in the DHT")]
    WordNotFound(String),

    /// Every polled server reported version 0, or a fetch named an
    /// unknown file.
    #[error("file {0:?} was not found")]
    FileNotFound(String),

    /// Configuration file could not be loaded or failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Socket-level failure talking to a peer.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The peer spoke the framing protocol incorrectly.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Corrupted local state, e.g. routing that would loop back to the
    /// forwarding node. Fatal to the request, not to the process.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_become_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "nope");
        assert!(matches!(Error::from(io), Error::Transport(_)));
    }

    #[test]
    fn display_names_the_offending_key() {
        assert_eq!(
            Error::WordNotFound("pear".into()).to_string(),
            "word \"pear\" was not found in the DHT"
        );
    }
}
