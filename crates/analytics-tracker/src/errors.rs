// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hyper::StatusCode;

/// Why a tracking request was rejected. Nothing is logged for a request that ends in one of
/// these.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("malformed query string: {0}")]
    MalformedQuery(String),

    #[error("failed to serialize query parameters: {0}")]
    UnserializableQuery(#[source] serde_json::Error),

    #[error("missing parameter {0}")]
    MissingParameter(&'static str),

    #[error("failed to parse base64-encoded data")]
    InvalidBase64(#[source] base64::DecodeError),

    #[error("failed to parse JSON data: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("JSON nesting exceeds {0} levels")]
    NestingTooDeep(usize),

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("failed to serialize event: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl TrackError {
    pub fn status(&self) -> StatusCode {
        match self {
            TrackError::MalformedQuery(_)
            | TrackError::UnserializableQuery(_)
            | TrackError::MissingParameter(_)
            | TrackError::InvalidBase64(_)
            | TrackError::InvalidJson(_)
            | TrackError::NestingTooDeep(_)
            | TrackError::Body(_) => StatusCode::BAD_REQUEST,
            TrackError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            TrackError::Serialize(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the client. Internal failures carry no detail.
    pub fn client_message(&self) -> String {
        match self {
            TrackError::Serialize(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn test_missing_parameter_names_it() {
        let error = TrackError::MissingParameter("data");
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.client_message(), "missing parameter data");
    }

    #[test]
    fn test_base64_and_json_errors_are_distinct() {
        let b64 = TrackError::InvalidBase64(
            base64::engine::general_purpose::STANDARD
                .decode("!!!")
                .unwrap_err(),
        );
        let json = TrackError::InvalidJson(serde_json::from_str::<u8>("nope").unwrap_err());
        assert_eq!(b64.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json.status(), StatusCode::BAD_REQUEST);
        assert_eq!(b64.client_message(), "failed to parse base64-encoded data");
        assert!(json.client_message().starts_with("failed to parse JSON data"));
    }

    #[test]
    fn test_nesting_error_names_limit() {
        let error = TrackError::NestingTooDeep(100);
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.client_message(), "JSON nesting exceeds 100 levels");
    }

    #[test]
    fn test_serialize_error_hides_detail() {
        let inner = serde_json::from_str::<u8>("nope").unwrap_err();
        let error = TrackError::Serialize(inner);
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.client_message(), "internal server error");
    }
}
