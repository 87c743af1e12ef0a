// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hyper::body::Body;
use hyper::service::service_fn;
use hyper::{http, Method, Request, StatusCode};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::dispatch::EventLogger;
use crate::errors::TrackError;
use crate::http_utils::{
    create_empty_response, create_json_response, create_pixel_response, is_local_request,
    log_and_create_error_response, HttpResponse,
};
use crate::ingest;
use crate::telemetry::Telemetry;

const ROOT_PATH: &str = "/";
const TRACK_PATH: &str = "/track";
const TRACK_GIF_PATH: &str = "/track.gif";
const ENCODED_PATH: &str = "/track/encoded";
const ENCODED_GIF_PATH: &str = "/track/encoded.gif";
const DEBUG_VARS_PATH: &str = "/debug/vars";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackKind {
    QueryParams,
    PostedBody,
    EncodedQueryParam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Track(TrackKind),
    DebugVars,
    MethodNotAllowed,
    NotFound,
}

fn route(method: &Method, path: &str) -> Route {
    match (method, path) {
        (&Method::GET, ROOT_PATH | TRACK_PATH | TRACK_GIF_PATH) => {
            Route::Track(TrackKind::QueryParams)
        }
        (&Method::POST, ROOT_PATH | TRACK_PATH | TRACK_GIF_PATH) => {
            Route::Track(TrackKind::PostedBody)
        }
        (&Method::GET, ENCODED_PATH | ENCODED_GIF_PATH) => {
            Route::Track(TrackKind::EncodedQueryParam)
        }
        (&Method::GET, DEBUG_VARS_PATH) => Route::DebugVars,
        (
            _,
            ROOT_PATH | TRACK_PATH | TRACK_GIF_PATH | ENCODED_PATH | ENCODED_GIF_PATH
            | DEBUG_VARS_PATH,
        ) => Route::MethodNotAllowed,
        _ => Route::NotFound,
    }
}

/// What the accept loop returns once it stops.
pub type ServeResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// The HTTP front of the service: routes tracking requests to the ingestion handlers and turns
/// their outcome into a response.
pub struct Tracker {
    pub config: Arc<Config>,
    pub event_logger: Arc<EventLogger>,
    pub telemetry: Arc<Telemetry>,
}

impl Tracker {
    pub fn new(
        config: Arc<Config>,
        event_logger: Arc<EventLogger>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Tracker {
            config,
            event_logger,
            telemetry,
        }
    }

    /// Handles one request. Tracking requests are counted and timed here, and this is the only
    /// place a [`TrackError`] becomes a response.
    pub async fn handle<B>(
        &self,
        req: Request<B>,
        remote_addr: SocketAddr,
    ) -> http::Result<HttpResponse>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let kind = match route(req.method(), req.uri().path()) {
            Route::Track(kind) => kind,
            Route::DebugVars => return self.debug_vars(&remote_addr),
            Route::MethodNotAllowed => {
                return create_empty_response(StatusCode::METHOD_NOT_ALLOWED)
            }
            Route::NotFound => return create_empty_response(StatusCode::NOT_FOUND),
        };

        let start = Instant::now();
        self.telemetry.record_request();
        let pixel = self.config.pixel_on_track_path || req.uri().path().ends_with(".gif");

        let response = match self.track(kind, req).await {
            Ok(()) if pixel => create_pixel_response(),
            Ok(()) => create_empty_response(StatusCode::NO_CONTENT),
            Err(err) => log_and_create_error_response(&err),
        };
        self.telemetry.record_response_time(start.elapsed());
        response
    }

    async fn track<B>(&self, kind: TrackKind, req: Request<B>) -> Result<(), TrackError>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match kind {
            TrackKind::QueryParams => {
                ingest::track_query_params(&self.event_logger, req.uri().query())
            }
            TrackKind::EncodedQueryParam => {
                ingest::track_encoded_query_param(&self.event_logger, req.uri().query())
            }
            TrackKind::PostedBody => {
                let (parts, body) = req.into_parts();
                ingest::track_posted_body(
                    &self.event_logger,
                    &parts.headers,
                    body,
                    self.config.max_request_content_length,
                )
                .await
            }
        }
    }

    fn debug_vars(&self, remote_addr: &SocketAddr) -> http::Result<HttpResponse> {
        if !is_local_request(remote_addr) {
            debug!("Refusing {DEBUG_VARS_PATH} to {remote_addr}");
            return create_empty_response(StatusCode::FORBIDDEN);
        }
        match serde_json::to_string(&self.telemetry.snapshot()) {
            Ok(body) => create_json_response(StatusCode::OK, body),
            Err(e) => log_and_create_error_response(&TrackError::Serialize(e)),
        }
    }

    /// Accepts connections until `cancel` fires. Each connection is served on its own task;
    /// connections still open when the loop stops are dropped.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> ServeResult {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        if let Ok(addr) = listener.local_addr() {
            info!("HTTP server listening on {addr}");
        }

        loop {
            let (conn, remote_addr) = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(
                        "Stopped accepting connections, dropping {} open connections",
                        joinset.len()
                    );
                    return Ok(());
                },
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok(accepted) => accepted,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };

            let tracker = Arc::clone(&self);
            let service = service_fn(move |req| {
                let tracker = Arc::clone(&tracker);
                async move { tracker.handle(req, remote_addr).await }
            });
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    debug!("Connection error: {e}");
                }
            });
        }
    }
}
