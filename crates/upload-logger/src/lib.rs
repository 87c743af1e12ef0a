// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable, asynchronously uploading line logger.
//!
//! Lines are appended to a local segment file. Once the segment reaches a line count or an age
//! threshold it is rotated, gzip compressed and uploaded to object storage by a pool of workers.
//! Naming of the uploaded objects and reporting of upload outcomes are delegated to the
//! [`KeyNameGenerator`] and [`UploadNotifier`] capabilities supplied at construction.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod errors;
pub mod logger;
pub mod notifier;
pub mod rotation;
pub mod segment;
pub mod uploader;
mod worker;

pub use errors::{Error, UploadError};
pub use logger::{UploadLogger, UploadLoggerConfig};
pub use notifier::{KeyNameGenerator, UploadNotifier, UploadReceipt};
pub use rotation::RotateCoordinator;
pub use uploader::{ObjectStoreUploader, Uploader};
