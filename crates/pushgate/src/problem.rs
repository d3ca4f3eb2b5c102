//! RFC 9457 Problem Details error responses.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// RFC 9457 Problem Details response.
#[derive(Debug, Clone, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub error_type: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProblemDetails {
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new("not-found", "Not Found", StatusCode::NOT_FOUND, Some(detail.into()))
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new("bad-request", "Bad Request", StatusCode::BAD_REQUEST, Some(detail.into()))
    }

    pub fn method_not_allowed() -> Self {
        Self::new(
            "method-not-allowed",
            "Method Not Allowed",
            StatusCode::METHOD_NOT_ALLOWED,
            None,
        )
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            "payload-too-large",
            "Payload Too Large",
            StatusCode::PAYLOAD_TOO_LARGE,
            Some(format!("request body exceeds {limit} bytes")),
        )
    }

    pub fn internal_error() -> Self {
        Self::new(
            "internal",
            "Internal Server Error",
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
        )
    }

    fn new(kind: &str, title: &str, status: StatusCode, detail: Option<String>) -> Self {
        Self {
            error_type: format!("urn:pushgate:error:{kind}"),
            title: title.to_string(),
            status: status.as_u16(),
            detail,
        }
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_vec(&self).unwrap_or_default();
        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(PROBLEM_CONTENT_TYPE));
        response
    }
}

/// Build a plain response with a static content type.
pub fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_serialization_skips_empty_detail() {
        let json = serde_json::to_value(ProblemDetails::method_not_allowed()).unwrap();
        assert_eq!(json["type"], "urn:pushgate:error:method-not-allowed");
        assert_eq!(json["status"], 405);
        assert!(json.get("detail").is_none());
    }

    #[test]
    fn problem_response_has_status_and_type() {
        let response = ProblemDetails::not_found("webhook plugin not found: x").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], PROBLEM_CONTENT_TYPE);
    }
}
