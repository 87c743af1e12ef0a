// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::{Mutex as TokioMutex, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::Error;
use crate::notifier::{KeyNameGenerator, UploadNotifier};
use crate::rotation::RotateCoordinator;
use crate::segment::{self, Segment};
use crate::uploader::Uploader;
use crate::worker::UploadWorker;

#[derive(Debug, Clone)]
pub struct UploadLoggerConfig {
    /// Directory holding the active segment and rotated segments waiting for upload.
    pub logging_dir: PathBuf,
    /// Used to name local segment files.
    pub service_name: String,
    pub rotate: RotateCoordinator,
    pub num_workers: usize,
}

impl UploadLoggerConfig {
    fn validate(&self) -> Result<(), Error> {
        if self.num_workers == 0 {
            return Err(Error::InvalidConfig(
                "num_workers must be at least 1".to_string(),
            ));
        }
        if self.rotate.max_lines == 0 {
            return Err(Error::InvalidConfig(
                "max_lines must be at least 1".to_string(),
            ));
        }
        if self.rotate.max_age.is_zero() {
            return Err(Error::InvalidConfig(
                "max_age must be greater than zero".to_string(),
            ));
        }
        if self.service_name.is_empty() || self.service_name.contains(['/', '\\']) {
            return Err(Error::InvalidConfig(format!(
                "invalid service name {:?}",
                self.service_name
            )));
        }
        Ok(())
    }
}

struct State {
    segment: Option<Segment>,
    queue: Option<UnboundedSender<PathBuf>>,
    seq: u64,
    closed: bool,
}

struct Inner {
    config: UploadLoggerConfig,
    state: Mutex<State>,
    workers: TokioMutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    close_result: OnceCell<Result<(), String>>,
}

/// Handle to a running upload logger. Cheap to clone; all clones share the same segment.
#[derive(Clone)]
pub struct UploadLogger {
    inner: Arc<Inner>,
}

impl UploadLogger {
    /// Opens the active segment, re-queues segments left behind by a previous process and spawns
    /// the upload workers and the age-rotation ticker. Must be called from within a tokio runtime.
    pub fn start(
        config: UploadLoggerConfig,
        uploader: Arc<dyn Uploader>,
        key_namer: Arc<dyn KeyNameGenerator>,
        notifier: Arc<dyn UploadNotifier>,
    ) -> Result<Self, Error> {
        config.validate()?;
        fs::create_dir_all(&config.logging_dir).map_err(|e| Error::io(&config.logging_dir, e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut seq = 0;

        for leftover in segment::leftover_segments(&config.logging_dir, &config.service_name)? {
            info!("Re-queueing leftover segment {}", leftover.display());
            let _ = tx.send(leftover);
        }

        let active = segment::active_path(&config.logging_dir, &config.service_name);
        if fs::metadata(&active).map(|m| m.len() > 0).unwrap_or(false) {
            let rotated = segment::rotated_path(&config.logging_dir, &config.service_name, seq);
            seq += 1;
            fs::rename(&active, &rotated).map_err(|e| Error::io(&active, e))?;
            info!("Re-queueing leftover active segment as {}", rotated.display());
            let _ = tx.send(rotated);
        }

        let segment = Segment::create(active)?;

        let queue = Arc::new(TokioMutex::new(rx));
        let workers = (0..config.num_workers)
            .map(|id| {
                let worker = UploadWorker {
                    id,
                    queue: Arc::clone(&queue),
                    uploader: Arc::clone(&uploader),
                    key_namer: Arc::clone(&key_namer),
                    notifier: Arc::clone(&notifier),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                segment: Some(segment),
                queue: Some(tx),
                seq,
                closed: false,
            }),
            workers: TokioMutex::new(workers),
            cancel: CancellationToken::new(),
            close_result: OnceCell::new(),
            config,
        });

        tokio::spawn(Inner::run_rotation_ticker(Arc::clone(&inner)));

        debug!(
            "Upload logger started in {} with {} workers",
            inner.config.logging_dir.display(),
            inner.config.num_workers
        );
        Ok(UploadLogger { inner })
    }

    /// Appends one line to the active segment. `line` must not contain a newline.
    ///
    /// The call only touches local disk; rotation hands the segment to the upload workers.
    pub fn log(&self, line: &str) -> Result<(), Error> {
        let mut state = self.inner.lock_state();
        if state.closed {
            return Err(Error::Closed);
        }
        if state.segment.is_none() {
            // A previous rotation could not reopen the active segment.
            state.segment = Some(Segment::create(segment::active_path(
                &self.inner.config.logging_dir,
                &self.inner.config.service_name,
            ))?);
        }
        let Some(segment) = state.segment.as_mut() else {
            return Err(Error::Closed);
        };
        segment.append(line)?;

        if self.inner.config.rotate.lines_exceeded(segment.lines()) {
            // The line is already buffered; a failed rotation is retried on the next trigger.
            if let Err(e) = self.inner.rotate_locked(&mut state) {
                error!("Failed to rotate segment: {e}");
            }
        }
        Ok(())
    }

    /// Lines in the active segment that have not been rotated yet.
    pub fn buffered_lines(&self) -> usize {
        self.inner
            .lock_state()
            .segment
            .as_ref()
            .map_or(0, Segment::lines)
    }

    /// Rotates the active segment if it holds any line.
    pub fn rotate(&self) -> Result<(), Error> {
        let mut state = self.inner.lock_state();
        if state.closed {
            return Err(Error::Closed);
        }
        self.inner.rotate_locked(&mut state)
    }

    /// Rotates the active segment, stops accepting lines and waits until every queued segment
    /// has been uploaded or left on local disk after a failed upload.
    ///
    /// Safe to call more than once and from several tasks: the drain runs once and every caller
    /// observes its outcome.
    pub async fn close(&self) -> Result<(), Error> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .close_result
            .get_or_init(|| async move { inner.drain().await.map_err(|e| e.to_string()) })
            .await
            .clone()
            .map_err(Error::Worker)
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rotate_locked(&self, state: &mut State) -> Result<(), Error> {
        let Some(segment) = state.segment.as_mut() else {
            return Ok(());
        };
        if segment.lines() == 0 {
            return Ok(());
        }
        segment.flush()?;

        let rotated =
            segment::rotated_path(&self.config.logging_dir, &self.config.service_name, state.seq);
        state.seq += 1;
        fs::rename(segment.path(), &rotated).map_err(|e| Error::io(segment.path(), e))?;
        debug!("Rotated {} lines into {}", segment.lines(), rotated.display());

        // The old handle now points at the rotated file and must not receive more lines.
        state.segment = None;
        let queued = match &state.queue {
            Some(queue) => queue.send(rotated).is_ok(),
            None => false,
        };
        if !queued {
            warn!("Upload queue closed, rotated segment stays on disk");
        }

        state.segment = Some(Segment::create(segment::active_path(
            &self.config.logging_dir,
            &self.config.service_name,
        ))?);
        Ok(())
    }

    async fn run_rotation_ticker(inner: Arc<Inner>) {
        let rotate = inner.config.rotate;
        let mut interval = tokio::time::interval(rotate.tick_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = inner.cancel.cancelled() => break,
                _ = interval.tick() => {
                    let mut state = inner.lock_state();
                    let aged = state
                        .segment
                        .as_ref()
                        .is_some_and(|s| rotate.age_exceeded(s.lines(), s.age()));
                    if aged {
                        if let Err(e) = inner.rotate_locked(&mut state) {
                            error!("Failed to rotate aged segment: {e}");
                        }
                    }
                }
            }
        }
        debug!("Rotation ticker stopped");
    }

    async fn drain(&self) -> Result<(), Error> {
        info!("Closing upload logger");
        self.cancel.cancel();

        let rotate_result = {
            let mut state = self.lock_state();
            state.closed = true;
            let res = self.rotate_locked(&mut state);
            if let Some(segment) = state.segment.take() {
                if segment.lines() == 0 {
                    let _ = fs::remove_file(segment.path());
                }
            }
            // Dropping the sender lets the workers exit once the queue is empty.
            state.queue = None;
            res
        };

        let workers = std::mem::take(&mut *self.workers.lock().await);
        let mut failures = Vec::new();
        for handle in workers {
            if let Err(e) = handle.await {
                failures.push(e.to_string());
            }
        }

        rotate_result?;
        if !failures.is_empty() {
            return Err(Error::Worker(failures.join("; ")));
        }
        info!("Upload logger closed");
        Ok(())
    }
}
