// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Capabilities the logger is configured with.
//!
//! Both traits are called from the upload workers, never from the code path that appends lines.
//! Implementations must be cheap and must not block: a slow notifier stalls the worker that
//! called it.

use std::path::{Path, PathBuf};

use crate::errors::UploadError;

/// Names the object a rotated segment is uploaded to. Called once per segment.
pub trait KeyNameGenerator: Send + Sync {
    fn key_name(&self, segment: &Path) -> String;
}

/// Describes a segment that reached object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Local segment the upload was produced from (already removed from disk).
    pub path: PathBuf,
    /// Key the compressed segment was stored under.
    pub key_name: String,
}

/// Receives the outcome of every upload attempt.
pub trait UploadNotifier: Send + Sync {
    fn on_upload_success(&self, receipt: &UploadReceipt);

    /// The segment stays on local disk; no retry is attempted by the worker.
    fn on_upload_failure(&self, error: &UploadError);
}
