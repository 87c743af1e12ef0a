// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use analytics_tracker::config::Config;
use analytics_tracker::dispatch::EventLogger;
use analytics_tracker::telemetry::Telemetry;
use analytics_tracker::tracker::{ServeResult, Tracker};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub fn test_config(logging_dir: PathBuf) -> Config {
    Config {
        debug: false,
        host: "127.0.0.1".to_string(),
        port: 0,
        num_workers: 2,
        logging_dir,
        aws_region: "us-west-1".to_string(),
        bucket: "logs".to_string(),
        key_prefix: "events/".to_string(),
        max_log_lines: 1000,
        max_log_age: Duration::from_secs(60),
        pixel_on_track_path: false,
        max_request_content_length: 1024,
        node: Some("test-node".to_string()),
    }
}

/// Starts a tracker on an ephemeral local port and returns the port with the server task.
pub async fn start_tracker(
    config: Config,
    event_logger: Arc<EventLogger>,
    telemetry: Arc<Telemetry>,
    cancel: CancellationToken,
) -> (u16, JoinHandle<ServeResult>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let tracker = Arc::new(Tracker::new(Arc::new(config), event_logger, telemetry));
    let handle = tokio::spawn(tracker.serve(listener, cancel));
    (port, handle)
}

/// Send an HTTP request over TCP and return the response
pub async fn send_tcp_request(
    port: u16,
    uri: &str,
    method: &str,
    body: Option<Vec<u8>>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error>> {
    let stream = timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port)),
    )
    .await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Host", format!("127.0.0.1:{port}"));

    let request = if let Some(body_data) = body {
        request_builder = request_builder
            .header("Content-Type", "application/json")
            .header("Content-Length", body_data.len().to_string());
        request_builder.body(Full::new(Bytes::from(body_data)))?
    } else {
        request_builder.body(Full::new(Bytes::new()))?
    };

    let response = timeout(Duration::from_secs(2), sender.send_request(request)).await??;
    Ok(response)
}

pub async fn read_body(response: Response<hyper::body::Incoming>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}
