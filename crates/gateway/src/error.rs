//! Mapping of domain errors onto HTTP responses.
//!
//! Every failure body is `{error, reason_code, retry_after_secs?}`.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use memoria_core::error::Error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub reason_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// A domain error on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(Error::InvalidRequest(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Storage(_) | Error::Routing(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Model(_) => StatusCode::BAD_GATEWAY,
            Error::Config { .. } | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after_secs = self.0.retry_after_secs();
        if status.is_server_error() {
            tracing::warn!(reason_code = self.0.reason_code(), error = %self.0, "Request failed");
        }

        let body = ErrorResponse {
            error: self.0.to_string(),
            reason_code: self.0.reason_code().to_string(),
            retry_after_secs,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after_secs
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::error::{RoutingError, StorageError};

    #[test]
    fn status_mapping() {
        let storage = ApiError(Error::Storage(StorageError::Unavailable {
            key: "turns/a".into(),
            reason: "disk".into(),
        }));
        assert_eq!(storage.status(), StatusCode::SERVICE_UNAVAILABLE);

        let routing = ApiError(Error::Routing(RoutingError::NoModelAvailable {
            category: "coding".into(),
            retry_after_secs: 30,
        }));
        assert_eq!(routing.status(), StatusCode::SERVICE_UNAVAILABLE);

        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn retry_after_header_set() {
        let response = ApiError(Error::Routing(RoutingError::AllModelsFailed {
            attempts: 3,
            last_error: "boom".into(),
            retry_after_secs: 30,
        }))
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    }
}
