use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CarveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad signature for {ext:?}: {reason}")]
    BadSignature { ext: String, reason: String },

    #[error("no usable signatures compiled")]
    EmptyTable,

    #[error("signature file {0:?}: {1}")]
    SignatureFile(PathBuf, String),

    #[error("capture read error: {0}")]
    Capture(String),
}

pub type Result<T> = std::result::Result<T, CarveError>;
