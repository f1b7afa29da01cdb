//! Response transformation.
//!
//! # Responsibilities
//! - Turn routed upstream responses into client responses
//! - Add routing metadata headers
//! - Render proxy errors as JSON
//!
//! # Design Decisions
//! - Bodies are streamed through untouched
//! - Hop-by-hop headers and `Content-Length` are recomputed by the server

use axum::body::Body;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::ProxyError;
use crate::http::request::strip_hop_by_hop;
use crate::routing::{ResponseBody, RoutedResponse};

pub const X_FAILOVER_PROVIDER: &str = "x-failover-provider";
pub const X_FAILOVER_ATTEMPTS: &str = "x-failover-attempts";

impl IntoResponse for RoutedResponse {
    fn into_response(self) -> Response {
        let mut headers = self.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);
        if let Ok(value) = HeaderValue::from_str(&self.provider_id) {
            headers.insert(X_FAILOVER_PROVIDER, value);
        }
        headers.insert(X_FAILOVER_ATTEMPTS, HeaderValue::from(self.attempts));

        let body = match self.body {
            ResponseBody::Full(bytes) => Body::from(bytes),
            ResponseBody::Stream(stream) => Body::from_stream(stream),
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        });
        if let ProxyError::QueueExhausted {
            attempts,
            last_error,
            ..
        } = &self
        {
            body["error"]["attempts"] = json!(attempts);
            if let Some(err) = last_error {
                body["error"]["lastError"] = json!(err.to_string());
            }
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppType;
    use crate::error::UpstreamError;
    use axum::http::{HeaderMap, StatusCode};

    #[tokio::test]
    async fn test_metadata_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("999"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        let routed = RoutedResponse {
            status: StatusCode::OK,
            headers,
            body: ResponseBody::Full("hello".into()),
            provider_id: "backup".into(),
            attempts: 2,
        };

        let response = routed.into_response();
        assert_eq!(response.headers()[X_FAILOVER_PROVIDER], "backup");
        assert_eq!(response.headers()[X_FAILOVER_ATTEMPTS], "2");
        assert!(response.headers().get(header::TRANSFER_ENCODING).is_none());
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn test_exhausted_error_body() {
        let err = ProxyError::QueueExhausted {
            app: AppType::Claude,
            attempts: 3,
            last_error: Some(UpstreamError::Connect("connection refused".into())),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["type"], "queue_exhausted");
        assert_eq!(value["error"]["attempts"], 3);
    }
}
