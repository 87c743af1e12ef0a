// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    header,
    http::{self, HeaderMap},
    Response, StatusCode,
};
use serde_json::json;
use std::net::SocketAddr;
use tracing::{debug, error};

use crate::errors::TrackError;

pub type HttpResponse = Response<Full<Bytes>>;

/// Single-frame 1x1 transparent GIF returned by pixel paths.
pub const EMPTY_GIF: &[u8; 43] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\xff\xff\xff\x00\x00\x00!\xf9\x04\x00\x00\x00\x00\x00,\x00\x00\x00\x00\x01\x00\x01\x00\x00\x02\x02D\x01\x00;";

/// Does two things:
/// 1. Logs the error. Client errors are logged at debug level, internal ones as errors.
/// 2. Returns the client facing message in the body of a JSON response with the error's status.
///
/// Response body format:
/// {
///     "error": message
/// }
pub fn log_and_create_error_response(err: &TrackError) -> http::Result<HttpResponse> {
    let status = err.status();
    if status.is_server_error() {
        error!("{err}");
    } else {
        debug!("Rejected tracking request: {err}");
    }
    let body = json!({ "error": err.client_message() }).to_string();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
}

/// 200 with the transparent GIF.
pub fn create_pixel_response() -> http::Result<HttpResponse> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/gif")
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Full::new(Bytes::from_static(EMPTY_GIF)))
}

pub fn create_empty_response(status: StatusCode) -> http::Result<HttpResponse> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
}

pub fn create_json_response(status: StatusCode, body: String) -> http::Result<HttpResponse> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
}

/// Rejects requests whose declared "content-length" is unparsable or larger than
/// `max_content_length`. A missing header is accepted; the collected body is checked again
/// by the caller.
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: usize,
) -> Result<(), TrackError> {
    let Some(content_length_header) = header_map.get(header::CONTENT_LENGTH) else {
        return Ok(());
    };
    let content_length = content_length_header
        .to_str()
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .ok_or_else(|| TrackError::Body("invalid Content-Length header".to_string()))?;
    if content_length > max_content_length {
        return Err(TrackError::PayloadTooLarge);
    }
    Ok(())
}

/// True if the peer connected from the loopback interface.
pub fn is_local_request(remote_addr: &SocketAddr) -> bool {
    remote_addr.ip().is_loopback()
}
