// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, warn};
use upload_logger::UploadLogger;

/// Prefix of every line written to the diagnostic stream in debug mode.
pub const DEBUG_MARKER: &str = "logging in debug mode: ";

/// What the event logger needs from the durable writer.
#[async_trait]
pub trait DurableLog: Send + Sync {
    /// Appends one line. Must not wait on network I/O.
    fn log(&self, line: &str) -> Result<(), upload_logger::Error>;

    /// Flushes everything buffered and blocks until it is uploaded or persisted locally.
    async fn close(&self) -> Result<(), upload_logger::Error>;
}

#[async_trait]
impl DurableLog for UploadLogger {
    fn log(&self, line: &str) -> Result<(), upload_logger::Error> {
        UploadLogger::log(self, line)
    }

    async fn close(&self) -> Result<(), upload_logger::Error> {
        UploadLogger::close(self).await
    }
}

/// Routes canonical event lines either to a local diagnostic stream or to the durable writer.
///
/// The destination is picked at construction and never changes, so a line is never sent to
/// both.
pub enum EventLogger {
    Debug { stream: Mutex<Box<dyn Write + Send>> },
    Durable { log: Arc<dyn DurableLog> },
}

impl EventLogger {
    /// Debug mode writing to stderr.
    pub fn debug() -> Self {
        Self::debug_to(Box::new(io::stderr()))
    }

    pub fn debug_to(stream: Box<dyn Write + Send>) -> Self {
        EventLogger::Debug {
            stream: Mutex::new(stream),
        }
    }

    pub fn durable(log: Arc<dyn DurableLog>) -> Self {
        EventLogger::Durable { log }
    }

    pub fn is_debug(&self) -> bool {
        matches!(self, EventLogger::Debug { .. })
    }

    pub fn log(&self, line: &str) {
        match self {
            EventLogger::Debug { stream } => {
                let mut stream = stream.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(e) = writeln!(stream, "{DEBUG_MARKER}{line}") {
                    warn!("Failed to write event to diagnostic stream: {e}");
                }
            }
            EventLogger::Durable { log } => {
                if let Err(e) = log.log(line) {
                    error!("Failed to log event: {e}");
                }
            }
        }
    }

    /// Same as [`EventLogger::log`] for a format template, e.g.
    /// `logger.log_args(format_args!("{{\"id\":{id}}}"))`.
    pub fn log_args(&self, args: fmt::Arguments<'_>) {
        match args.as_str() {
            Some(line) => self.log(line),
            None => self.log(&args.to_string()),
        }
    }

    /// Drains the durable writer. In debug mode only the diagnostic stream is flushed.
    pub async fn close(&self) -> Result<(), upload_logger::Error> {
        match self {
            EventLogger::Debug { stream } => {
                debug!("Debug mode, nothing to drain");
                let mut stream = stream.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(e) = stream.flush() {
                    warn!("Failed to flush diagnostic stream: {e}");
                }
                Ok(())
            }
            EventLogger::Durable { log } => log.close().await,
        }
    }
}
