// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process, sync::Arc};
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use analytics_tracker::{
    config::{self, Config},
    dispatch::EventLogger,
    key_namer::{InstanceInfo, KeyNamer},
    shutdown::ShutdownCoordinator,
    telemetry::{Telemetry, TelemetryNotifier},
    tracker::Tracker,
};
use upload_logger::{ObjectStoreUploader, UploadLogger};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("ANALYTICSD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match Config::new() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on analyticsd startup: {e}");
            process::exit(1);
        }
    };

    let telemetry = Arc::new(Telemetry::default());

    let event_logger = match start_event_logger(&config, &telemetry) {
        Ok(event_logger) => Arc::new(event_logger),
        Err(e) => {
            error!("Failed starting event logger: {e}");
            process::exit(1);
        }
    };

    let listener = match TcpListener::bind(config.bind_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Error binding HTTP server to {}: {e}", config.bind_addr());
            process::exit(1);
        }
    };

    let coordinator = Arc::new(ShutdownCoordinator::new(Arc::clone(&event_logger)));
    let tracker = Arc::new(Tracker::new(
        Arc::clone(&config),
        event_logger,
        Arc::clone(&telemetry),
    ));
    let server = tracker.serve(listener, coordinator.cancellation_token());

    let res = coordinator.supervise(server).await;
    info!("Final telemetry: {}", telemetry.snapshot());
    if let Err(e) = res {
        error!("{e}");
        process::exit(1);
    }
}

fn start_event_logger(
    config: &Config,
    telemetry: &Arc<Telemetry>,
) -> Result<EventLogger, Box<dyn std::error::Error>> {
    if config.debug {
        info!("Debug mode, events are written to stderr and never uploaded");
        return Ok(EventLogger::debug());
    }

    let info = InstanceInfo::resolve(config::SERVICE_NAME, config.node.clone())?;
    info!(
        "Uploading events to bucket {} in {} as node {}",
        config.bucket, config.aws_region, info.node
    );
    let uploader = ObjectStoreUploader::s3(&config.aws_region, &config.bucket)?;
    let upload_logger = UploadLogger::start(
        config.upload_logger_config(),
        Arc::new(uploader),
        Arc::new(KeyNamer {
            info,
            prefix: config.key_prefix.clone(),
        }),
        Arc::new(TelemetryNotifier::new(Arc::clone(telemetry))),
    )?;
    Ok(EventLogger::durable(Arc::new(upload_logger)))
}
