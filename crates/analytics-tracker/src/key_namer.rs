// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Object keys for uploaded log segments.
//!
//! A key looks like `<prefix><YYYY-MM-DD>/<unix seconds>.<node>.<16 hex chars>.log.gz`. The
//! random nonce keeps keys unique even when two segments from the same node are rotated
//! within the same second.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::TryRngCore;
use std::path::Path;
use tracing::error;
use upload_logger::KeyNameGenerator;

const NONCE_LEN: usize = 8;

/// Identity of this process, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub service: String,
    pub node: String,
}

impl InstanceInfo {
    /// Uses `node_override` when set, otherwise the host name. Characters that would break the
    /// key layout are replaced with `_`.
    pub fn resolve(service: &str, node_override: Option<String>) -> anyhow::Result<Self> {
        let node = match node_override.filter(|n| !n.trim().is_empty()) {
            Some(node) => node,
            None => hostname::get()
                .map_err(|e| anyhow::anyhow!("Unable to resolve host name: {e}"))?
                .to_string_lossy()
                .into_owned(),
        };
        let node = sanitize_node(&node);
        if node.is_empty() {
            anyhow::bail!("Node identifier is empty");
        }
        Ok(InstanceInfo {
            service: service.to_string(),
            node,
        })
    }
}

fn sanitize_node(node: &str) -> String {
    node.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '.' | ' ' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Builds a key for `node` under `prefix`, using the current time and a fresh nonce.
pub fn generate_key(node: &str, prefix: &str) -> String {
    format_key(prefix, node, Utc::now(), random_nonce())
}

fn format_key(prefix: &str, node: &str, now: DateTime<Utc>, nonce: [u8; NONCE_LEN]) -> String {
    format!(
        "{prefix}{}/{}.{node}.{}.log.gz",
        now.format("%Y-%m-%d"),
        now.timestamp(),
        hex::encode(nonce)
    )
}

/// Reads the nonce from the operating system RNG. A broken random source aborts the process:
/// a predictable key could silently overwrite another segment.
fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    if let Err(e) = OsRng.try_fill_bytes(&mut nonce) {
        error!("Random source failed while naming an upload, aborting: {e}");
        std::process::abort();
    }
    nonce
}

/// [`KeyNameGenerator`] handed to the upload logger.
#[derive(Debug, Clone)]
pub struct KeyNamer {
    pub info: InstanceInfo,
    pub prefix: String,
}

impl KeyNameGenerator for KeyNamer {
    fn key_name(&self, _segment: &Path) -> String {
        generate_key(&self.info.node, &self.prefix)
    }
}
