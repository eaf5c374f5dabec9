//! Fatal scan errors.
//!
//! Anything that stops a scan before a single detector runs is a
//! [`ScanError`]. Failures confined to one detector never show up here; the
//! aggregator turns them into warnings on the [`ScanResult`](crate::ScanResult).

use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Path does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Path is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("min_confidence must be between 0.0 and 1.0, got {value}")]
    InvalidConfidence { value: f64 },

    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// The closest [`std::io::ErrorKind`] for this error.
    ///
    /// A missing root maps to `NotFound`; a root that is not a directory or an
    /// out-of-range threshold maps to `InvalidInput`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::NotFound { .. } => ErrorKind::NotFound,
            ScanError::NotADirectory { .. } | ScanError::InvalidConfidence { .. } => {
                ErrorKind::InvalidInput
            }
            ScanError::Io { source, .. } => source.kind(),
        }
    }
}

/// Checks that a confidence threshold lies in `[0, 1]`. NaN is rejected.
pub fn validate_confidence(value: f64) -> Result<f64, ScanError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ScanError::InvalidConfidence { value })
    }
}
