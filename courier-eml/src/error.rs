use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmlError {
    /// The payload file is missing, malformed, or fails schema
    /// validation. Drives the `INTAKING -> INVALID` transition; the
    /// message becomes the row's diagnostic reason.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// An attachment named by the payload could not be read.
    #[error("failed to read attachment {path}: {source}")]
    Attachment {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Filesystem failure while persisting or preparing storage.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
