// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Test doubles shared by the unit-test modules of this crate.

use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::dispatch::DurableLog;

/// Durable writer that keeps lines in memory and counts drains.
#[derive(Default)]
pub(crate) struct RecordingLog {
    lines: Mutex<Vec<String>>,
    closes: AtomicUsize,
    close_delay: Option<Duration>,
}

impl RecordingLog {
    /// A writer whose `close` takes `delay`, like a drain that still has segments to upload.
    pub(crate) fn slow(delay: Duration) -> Self {
        RecordingLog {
            close_delay: Some(delay),
            ..Default::default()
        }
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DurableLog for RecordingLog {
    fn log(&self, line: &str) -> Result<(), upload_logger::Error> {
        self.lines.lock().unwrap().push(line.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<(), upload_logger::Error> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

/// Diagnostic stream shared with the test.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
