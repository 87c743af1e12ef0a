// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use tracing::debug;

use crate::errors::{Error, UploadError};

/// Ships one compressed segment to its final location.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, key: &str, body: Bytes) -> Result<(), UploadError>;
}

/// [`Uploader`] backed by any `object_store` implementation.
#[derive(Debug, Clone)]
pub struct ObjectStoreUploader {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        ObjectStoreUploader { store }
    }

    /// Builds an S3 backed uploader. Credentials are read from the standard `AWS_*`
    /// environment variables.
    pub fn s3(region: &str, bucket: &str) -> Result<Self, Error> {
        let store = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build S3 client: {e}")))?;
        Ok(Self::new(Arc::new(store)))
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl Uploader for ObjectStoreUploader {
    async fn upload(&self, key: &str, body: Bytes) -> Result<(), UploadError> {
        let location = ObjectPath::parse(key).map_err(|e| UploadError::Store {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        let size = body.len();
        self.store
            .put(&location, PutPayload::from(body))
            .await
            .map_err(|e| UploadError::Store {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        debug!("Stored {size} bytes at {key}");
        Ok(())
    }
}
