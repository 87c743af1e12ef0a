// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Local segment files.
//!
//! The active segment lives at `<dir>/<service>.current.log`. Rotation renames it to
//! `<dir>/<service>.<unix_nanos>.<seq>.log`, which is the name the upload workers and the
//! startup recovery scan look for.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::errors::Error;

const ACTIVE_SUFFIX: &str = "current.log";
const SEGMENT_EXTENSION: &str = "log";

pub fn active_path(dir: &Path, service: &str) -> PathBuf {
    dir.join(format!("{service}.{ACTIVE_SUFFIX}"))
}

pub fn rotated_path(dir: &Path, service: &str, seq: u64) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    dir.join(format!("{service}.{nanos}.{seq}.{SEGMENT_EXTENSION}"))
}

/// True for segments rotated by a logger of `service`, excluding the active one.
pub fn is_rotated_segment(path: &Path, service: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Some(rest) = name.strip_prefix(service).and_then(|r| r.strip_prefix('.')) else {
        return false;
    };
    if rest == ACTIVE_SUFFIX {
        return false;
    }
    let is_number = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    let parts: Vec<&str> = rest.split('.').collect();
    matches!(parts.as_slice(), [nanos, seq, ext]
        if *ext == SEGMENT_EXTENSION && is_number(nanos) && is_number(seq))
}

/// Lists rotated segments of `service` left in `dir`, oldest name first.
pub fn leftover_segments(dir: &Path, service: &str) -> Result<Vec<PathBuf>, Error> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut segments = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if is_rotated_segment(&path, service) {
            segments.push(path);
        }
    }
    segments.sort();
    Ok(segments)
}

/// The segment currently receiving lines.
#[derive(Debug)]
pub struct Segment {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
    opened_at: Instant,
}

impl Segment {
    /// Opens a fresh active segment, truncating whatever was at `path`.
    pub fn create(path: PathBuf) -> Result<Segment, Error> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        Ok(Segment {
            path,
            writer: BufWriter::new(file),
            lines: 0,
            opened_at: Instant::now(),
        })
    }

    /// Appends one line. The line and its terminator go out in a single buffered write.
    pub fn append(&mut self, line: &str) -> Result<(), Error> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.writer
            .write_all(&buf)
            .map_err(|e| Error::io(&self.path, e))?;
        self.lines += 1;
        Ok(())
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hands buffered lines to the OS. Syncing to disk is left to the upload worker so the
    /// caller holding the logger state never waits on it.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.writer.flush().map_err(|e| Error::io(&self.path, e))
    }
}
