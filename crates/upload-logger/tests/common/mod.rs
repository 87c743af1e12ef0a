// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared capabilities for upload logger integration tests

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Mutex;
use upload_logger::{KeyNameGenerator, UploadError, UploadNotifier, UploadReceipt, Uploader};

/// Names every object after the local segment it came from
pub struct SegmentNameKeys {
    pub prefix: String,
}

impl KeyNameGenerator for SegmentNameKeys {
    fn key_name(&self, segment: &Path) -> String {
        let name = segment.file_name().unwrap().to_str().unwrap();
        format!("{}{name}.gz", self.prefix)
    }
}

/// Notifier that keeps every callback for later assertions
#[derive(Default)]
pub struct RecordingNotifier {
    pub receipts: Mutex<Vec<UploadReceipt>>,
    pub failures: Mutex<Vec<String>>,
}

impl UploadNotifier for RecordingNotifier {
    fn on_upload_success(&self, receipt: &UploadReceipt) {
        self.receipts.lock().unwrap().push(receipt.clone());
    }

    fn on_upload_failure(&self, error: &UploadError) {
        self.failures.lock().unwrap().push(error.to_string());
    }
}

/// Uploader whose backend is always unavailable
pub struct FailingUploader;

#[async_trait]
impl Uploader for FailingUploader {
    async fn upload(&self, key: &str, _body: Bytes) -> Result<(), UploadError> {
        Err(UploadError::Store {
            key: key.to_string(),
            message: "backend unavailable".to_string(),
        })
    }
}
