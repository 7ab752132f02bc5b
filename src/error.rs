//! Crate-wide error type.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias for results carrying [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while selecting waveforms and computing matches.
#[derive(Debug, Error)]
pub enum Error {
    /// A catalog manifest row could not be parsed.
    #[error("malformed manifest {path}: line {line}: {reason}")]
    MalformedManifest {
        /// Manifest file that failed to parse.
        path: PathBuf,
        /// 1-based line number of the offending row.
        line: usize,
        /// What was wrong with the row.
        reason: String,
    },

    /// A run-configuration file is missing, unreadable, or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A waveform could not be synthesized for the requested parameters.
    #[error("waveform generation failed: {0}")]
    Waveform(String),

    /// The selected catalog contains no simulations to sweep over.
    #[error("no simulations selected (bounds too tight or empty manifest)")]
    EmptyCatalog,

    /// Result bundle (de)serialization failure.
    #[error("result serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Process exit code for fatal errors reported by the command-line driver.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 2,
            Error::Io(_) | Error::Serialization(_) => 3,
            Error::MalformedManifest { .. } => 2,
            Error::Waveform(_) => 4,
            Error::EmptyCatalog => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_error_names_the_line() {
        let err = Error::MalformedManifest {
            path: "README.txt".into(),
            line: 7,
            reason: "expected 14 columns, found 12".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("line 7"));
        assert!(msg.contains("14 columns"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert_eq!(err.exit_code(), 3);
    }
}
