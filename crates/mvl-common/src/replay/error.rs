use std::io;

/// Errors that can occur while encoding or decoding a replay file.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid magic bytes (expected b\"MVLR\")")]
    InvalidMagic,
    #[error("unsupported format version {found}")]
    UnsupportedVersion { found: u8 },
    #[error("malformed replay: {detail}")]
    Malformed { detail: String },
}

impl ReplayError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::Malformed {
            detail: detail.into(),
        }
    }
}
