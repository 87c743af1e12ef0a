// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Normalization of the three request encodings into a canonical event line.
//!
//! A canonical line is always produced by re-serializing a decoded structure, never by copying
//! client bytes. Each `track_*` function either hands exactly one line to the [`EventLogger`] or
//! returns a [`TrackError`] without logging anything.

use base64::Engine;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::HeaderMap;
use std::collections::BTreeMap;
use tracing::debug;

use crate::dispatch::EventLogger;
use crate::errors::TrackError;
use crate::http_utils::verify_request_content_length;

/// Query parameter carrying the base64 payload.
pub const DATA_PARAM: &str = "data";

/// Rejects a `%` that is not followed by two hex digits.
fn validate_escapes(query: &str) -> Result<(), TrackError> {
    let bytes = query.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(TrackError::MalformedQuery(format!(
                    "invalid escape {:?}",
                    String::from_utf8_lossy(&bytes[i..end])
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

/// Parses a URL query into a flat map, keeping the first value of every key. `+` decodes to a
/// space and invalid UTF-8 is replaced with U+FFFD.
pub fn parse_query(query: &str) -> Result<BTreeMap<String, String>, TrackError> {
    validate_escapes(query)?;
    let mut params = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    Ok(params)
}

pub fn canonical_from_query(query: Option<&str>) -> Result<String, TrackError> {
    let params = parse_query(query.unwrap_or_default())?;
    serde_json::to_string(&params).map_err(TrackError::UnserializableQuery)
}

/// Deepest array/object nesting accepted in a JSON event.
pub const MAX_JSON_DEPTH: usize = 100;

/// True when `json` opens more than `limit` arrays or objects at once. Brackets inside strings
/// are skipped.
fn nesting_exceeds(json: &[u8], limit: usize) -> bool {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for &byte in json {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                if depth > limit {
                    return true;
                }
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    false
}

/// Numbers keep their original text (`arbitrary_precision`), so big integers and values outside
/// the `f64` range come out exactly as they went in.
pub fn canonical_from_json(body: &[u8]) -> Result<String, TrackError> {
    if nesting_exceeds(body, MAX_JSON_DEPTH) {
        return Err(TrackError::NestingTooDeep(MAX_JSON_DEPTH));
    }
    let value: serde_json::Value = serde_json::from_slice(body).map_err(TrackError::InvalidJson)?;
    serde_json::to_string(&value).map_err(TrackError::Serialize)
}

/// First value of `name` in `query`. Only that pair has its escapes checked; other parameters
/// are never looked at.
fn first_param(query: &str, name: &str) -> Result<Option<String>, TrackError> {
    for pair in query.split('&') {
        let Some((key, value)) = url::form_urlencoded::parse(pair.as_bytes()).next() else {
            continue;
        };
        if key == name {
            validate_escapes(pair)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

pub fn canonical_from_encoded(query: Option<&str>) -> Result<String, TrackError> {
    let data = first_param(query.unwrap_or_default(), DATA_PARAM)?
        .filter(|data| !data.is_empty())
        .ok_or(TrackError::MissingParameter(DATA_PARAM))?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(data.as_bytes())
        .map_err(TrackError::InvalidBase64)?;
    canonical_from_json(&decoded)
}

/// `GET` with flat query parameters.
pub fn track_query_params(logger: &EventLogger, query: Option<&str>) -> Result<(), TrackError> {
    let line = canonical_from_query(query)?;
    logger.log(&line);
    Ok(())
}

/// `POST` with a JSON body of at most `max_bytes`.
pub async fn track_posted_body<B>(
    logger: &EventLogger,
    headers: &HeaderMap,
    body: B,
    max_bytes: usize,
) -> Result<(), TrackError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    verify_request_content_length(headers, max_bytes)?;

    let bytes = Limited::new(body, max_bytes)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                TrackError::PayloadTooLarge
            } else {
                TrackError::Body(e.to_string())
            }
        })?
        .to_bytes();
    debug!("Received JSON event of {} bytes", bytes.len());

    let line = canonical_from_json(&bytes)?;
    logger.log(&line);
    Ok(())
}

/// `GET` with base64-encoded JSON in the `data` parameter.
pub fn track_encoded_query_param(
    logger: &EventLogger,
    query: Option<&str>,
) -> Result<(), TrackError> {
    let line = canonical_from_encoded(query)?;
    logger.log(&line);
    Ok(())
}
