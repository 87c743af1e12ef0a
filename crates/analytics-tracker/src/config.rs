// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use upload_logger::{RotateCoordinator, UploadLoggerConfig};

pub const SERVICE_NAME: &str = "analyticsd";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_LOG_LINES: usize = 100_000;
const DEFAULT_MAX_LOG_AGE_SECS: u64 = 60;
const DEFAULT_MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024; // 10MB in Bytes

/// Regions the object storage backend accepts.
const KNOWN_AWS_REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ca-central-1",
    "ca-west-1",
    "cn-north-1",
    "cn-northwest-1",
    "eu-central-1",
    "eu-central-2",
    "eu-north-1",
    "eu-south-1",
    "eu-south-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "il-central-1",
    "me-central-1",
    "me-south-1",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-gov-east-1",
    "us-gov-west-1",
    "us-west-1",
    "us-west-2",
];

#[derive(Debug, Clone)]
pub struct Config {
    /// log events to stderr instead of uploading them
    pub debug: bool,
    pub host: String,
    pub port: u16,
    pub num_workers: usize,
    pub logging_dir: PathBuf,
    pub aws_region: String,
    pub bucket: String,
    pub key_prefix: String,
    pub max_log_lines: usize,
    pub max_log_age: Duration,
    /// return the tracking pixel on tracking paths without the `.gif` suffix too
    pub pixel_on_track_path: bool,
    pub max_request_content_length: usize,
    /// node identifier in upload keys, the host name when unset
    pub node: Option<String>,
}

impl Config {
    pub fn new() -> anyhow::Result<Config> {
        let debug = parse_bool_var("ANALYTICSD_DEBUG", true)?;

        let aws_region =
            env::var("ANALYTICSD_AWS_REGION").unwrap_or_else(|_| "us-west-1".to_string());
        if !KNOWN_AWS_REGIONS.contains(&aws_region.as_str()) {
            anyhow::bail!("Unknown AWS region {aws_region}");
        }

        if !debug {
            for var in ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"] {
                if env::var(var).map(|v| v.is_empty()).unwrap_or(true) {
                    anyhow::bail!("{var} environment variable is not set");
                }
            }
        }

        let max_log_age_secs = parse_var("ANALYTICSD_MAX_LOG_AGE_SECS", DEFAULT_MAX_LOG_AGE_SECS)?;

        Ok(Config {
            debug,
            host: env::var("ANALYTICSD_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("ANALYTICSD_PORT", DEFAULT_PORT)?,
            num_workers: parse_var("ANALYTICSD_NUM_WORKERS", 1)?,
            logging_dir: env::var("ANALYTICSD_LOGGING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            aws_region,
            bucket: env::var("ANALYTICSD_BUCKET").unwrap_or_else(|_| "logs".to_string()),
            key_prefix: env::var("ANALYTICSD_KEY_PREFIX").unwrap_or_default(),
            max_log_lines: parse_var("ANALYTICSD_MAX_LOG_LINES", DEFAULT_MAX_LOG_LINES)?,
            max_log_age: Duration::from_secs(max_log_age_secs),
            pixel_on_track_path: parse_bool_var("ANALYTICSD_PIXEL_ON_TRACK_PATH", false)?,
            max_request_content_length: parse_var(
                "ANALYTICSD_MAX_REQUEST_BYTES",
                DEFAULT_MAX_REQUEST_BYTES,
            )?,
            node: env::var("ANALYTICSD_NODE").ok(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upload_logger_config(&self) -> UploadLoggerConfig {
        UploadLoggerConfig {
            logging_dir: self.logging_dir.clone(),
            service_name: SERVICE_NAME.to_string(),
            rotate: RotateCoordinator::new(self.max_log_lines, self.max_log_age),
            num_workers: self.num_workers,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid value {value:?} for {name}: {e}")),
        Err(_) => Ok(default),
    }
}

fn parse_bool_var(name: &str, default: bool) -> anyhow::Result<bool> {
    match env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(anyhow::anyhow!("Invalid value {value:?} for {name}")),
        },
        Err(_) => Ok(default),
    }
}
