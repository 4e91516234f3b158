//! Error types for Agentroute

use thiserror::Error;

/// Result type alias using Agentroute's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Agentroute error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (E100-E199)
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid embedding: {0}")]
    InvalidInput(String),

    // Persistence errors (E200-E299)
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Snapshot format version {found} is not compatible with {expected}")]
    VersionMismatch { found: String, expected: String },

    #[error("Snapshot is corrupt: {0}")]
    CorruptSnapshot(String),

    #[error("Snapshot does not match this engine: {0}")]
    SnapshotMismatch(String),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::DimensionMismatch { .. } => "E100",
            Self::InvalidConfig(_) => "E101",
            Self::InvalidInput(_) => "E102",
            Self::Io(_) => "E200",
            Self::Serialization(_) => "E201",
            Self::VersionMismatch { .. } => "E202",
            Self::CorruptSnapshot(_) => "E203",
            Self::SnapshotMismatch(_) => "E204",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::DimensionMismatch { expected, .. } => Some(format!(
                "Produce embeddings of length {} or set gating.input_dim to match",
                expected
            )),
            Self::InvalidConfig(_) => {
                Some("Run `agentroute config list` to review current values".to_string())
            }
            Self::VersionMismatch { .. } | Self::CorruptSnapshot(_) => {
                Some("Delete the snapshot file to start from a fresh model".to_string())
            }
            Self::SnapshotMismatch(_) => Some(
                "Point persistence_path at a snapshot written with the same routes".to_string(),
            ),
            _ => None,
        }
    }

    /// Whether this error belongs to the persistence family.
    ///
    /// Engines never surface these to callers; they are logged and the
    /// in-memory state is kept.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Serialization(_)
                | Self::VersionMismatch { .. }
                | Self::CorruptSnapshot(_)
                | Self::SnapshotMismatch(_)
        )
    }
}
