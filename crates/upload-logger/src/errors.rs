// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors returned by the logger itself (local buffering and lifecycle).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Logger is closed")]
    Closed,

    #[error("Upload worker failed: {0}")]
    Worker(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors reported to the [`crate::UploadNotifier`] when a segment could not be shipped.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to read segment {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to compress segment {}: {source}", .path.display())]
    Compress {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to upload {key}: {message}")]
    Store { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::InvalidConfig("num_workers must be positive".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: num_workers must be positive"
        );
        assert_eq!(Error::Closed.to_string(), "Logger is closed");
    }

    #[test]
    fn test_upload_error_display() {
        let error = UploadError::Store {
            key: "2024-01-01/1704067200.node.00.log.gz".to_string(),
            message: "access denied".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to upload 2024-01-01/1704067200.node.00.log.gz: access denied"
        );
    }
}
