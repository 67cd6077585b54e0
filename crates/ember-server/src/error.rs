use bytes::Bytes;
use ember_core::api::ErrorBody;
use ember_core::{ErrorCode, ProtocolError};
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue, RETRY_AFTER};
use hyper::{Response, StatusCode};
use serde::Serialize;

/// A request failure on its way to becoming an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    #[must_use]
    pub fn route_not_found(method: &hyper::Method, path: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("no route for {method} {path}"))
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Render as `{"error": {...}}`, adding `Retry-After` for rate limits.
    #[must_use]
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let status = self.status();
        let retry_after = self.retry_after_secs;
        let body = ErrorBody::new(self.code, self.message, retry_after);
        let mut response = json_response(status, &body);
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        let code = err.code();
        if code.http_status() >= 500 {
            tracing::error!(code = %code, error = %err, "request failed");
        } else {
            tracing::debug!(code = %code, error = %err, "request rejected");
        }
        Self {
            code,
            retry_after_secs: err.retry_after_secs(),
            message: err.to_string(),
        }
    }
}

/// Serialize `body` as a JSON response.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => raw_json(status, bytes),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode response body");
            let fallback = format!(
                r#"{{"error":{{"code":"{}","message":"{}"}}}}"#,
                ErrorCode::InternalError,
                ErrorCode::InternalError.message()
            );
            raw_json(StatusCode::INTERNAL_SERVER_ERROR, fallback.into_bytes())
        }
    }
}

fn raw_json(status: StatusCode, bytes: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
