// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc::UnboundedReceiver, Mutex};
use tracing::{debug, warn};

use crate::errors::UploadError;
use crate::notifier::{KeyNameGenerator, UploadNotifier, UploadReceipt};
use crate::uploader::Uploader;

pub(crate) type SegmentQueue = Arc<Mutex<UnboundedReceiver<PathBuf>>>;

/// Pulls rotated segments off the shared queue until it is closed and drained.
pub(crate) struct UploadWorker {
    pub id: usize,
    pub queue: SegmentQueue,
    pub uploader: Arc<dyn Uploader>,
    pub key_namer: Arc<dyn KeyNameGenerator>,
    pub notifier: Arc<dyn UploadNotifier>,
}

impl UploadWorker {
    pub async fn run(self) {
        debug!("Upload worker {} started", self.id);
        loop {
            // The lock is only held while waiting for the next segment, not while uploading it.
            let next = self.queue.lock().await.recv().await;
            let Some(path) = next else {
                break;
            };
            match self.ship(&path).await {
                Ok(receipt) => self.notifier.on_upload_success(&receipt),
                Err(e) => self.notifier.on_upload_failure(&e),
            }
        }
        debug!("Upload worker {} stopped", self.id);
    }

    async fn ship(&self, path: &Path) -> Result<UploadReceipt, UploadError> {
        let owned = path.to_path_buf();
        let body = match tokio::task::spawn_blocking(move || compress_segment(&owned)).await {
            Ok(res) => res?,
            Err(e) => {
                return Err(UploadError::Compress {
                    path: path.to_path_buf(),
                    source: std::io::Error::other(e.to_string()),
                })
            }
        };

        let key_name = self.key_namer.key_name(path);
        self.uploader.upload(&key_name, body).await?;

        if let Err(e) = tokio::fs::remove_file(path).await {
            // Already uploaded: a leftover file only means a duplicate upload after restart.
            warn!("Failed to remove uploaded segment {}: {e}", path.display());
        }
        Ok(UploadReceipt {
            path: path.to_path_buf(),
            key_name,
        })
    }
}

/// Syncs a segment to disk, then returns its gzip compressed contents. Rotation only flushes,
/// so this is where a rotated segment becomes durable.
pub(crate) fn compress_segment(path: &Path) -> Result<Bytes, UploadError> {
    let read_err = |source| UploadError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(read_err)?;
    file.sync_all().map_err(read_err)?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw).map_err(read_err)?;

    let compress_err = |source| UploadError::Compress {
        path: path.to_path_buf(),
        source,
    };
    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 4), Compression::default());
    encoder.write_all(&raw).map_err(compress_err)?;
    let compressed = encoder.finish().map_err(compress_err)?;
    Ok(Bytes::from(compressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{self, Segment};
    use flate2::read::GzDecoder;

    #[test]
    fn test_compress_segment_round_trips_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.1.0.log");
        std::fs::write(&path, "{\"a\":\"1\"}\n").unwrap();

        let compressed = compress_segment(&path).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "{\"a\":\"1\"}\n");
    }

    #[test]
    fn test_compress_flushed_but_unsynced_segment() {
        let dir = tempfile::tempdir().unwrap();
        let mut active = Segment::create(segment::active_path(dir.path(), "svc")).unwrap();
        active.append(r#"{"a":"1"}"#).unwrap();
        active.append(r#"{"b":"2"}"#).unwrap();
        active.flush().unwrap();
        let rotated = segment::rotated_path(dir.path(), "svc", 0);
        std::fs::rename(active.path(), &rotated).unwrap();
        drop(active);

        let compressed = compress_segment(&rotated).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "{\"a\":\"1\"}\n{\"b\":\"2\"}\n");
    }

    #[test]
    fn test_compress_missing_segment() {
        let err = compress_segment(Path::new("/nonexistent/svc.1.0.log")).unwrap_err();
        assert!(matches!(err, UploadError::Read { .. }));
    }
}
