//! HTTP response building helpers
//!
//! Keeps error formatting consistent across handlers.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::MatchError;

pub type JsonResponse = Response<Full<Bytes>>;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> JsonResponse {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// 200 OK
pub fn ok<T: Serialize>(body: &T) -> JsonResponse {
    json_response(StatusCode::OK, body)
}

/// 201 Created
pub fn created<T: Serialize>(body: &T) -> JsonResponse {
    json_response(StatusCode::CREATED, body)
}

pub fn not_found(message: &str) -> JsonResponse {
    json_response(StatusCode::NOT_FOUND, &serde_json::json!({ "error": message }))
}

pub fn bad_request(message: &str) -> JsonResponse {
    json_response(StatusCode::BAD_REQUEST, &serde_json::json!({ "error": message }))
}

pub fn method_not_allowed() -> JsonResponse {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method not allowed" }),
    )
}

/// HTTP status for a service error
pub fn status_for(error: &MatchError) -> StatusCode {
    match error {
        MatchError::Validation(_) | MatchError::Json(_) => StatusCode::BAD_REQUEST,
        MatchError::NotFound(_) => StatusCode::NOT_FOUND,
        MatchError::DuplicateRequest { .. }
        | MatchError::InvalidStateTransition { .. }
        | MatchError::AlreadyMatched { .. }
        | MatchError::CapacityExceeded(_) => StatusCode::CONFLICT,
        MatchError::Database(_)
        | MatchError::Io(_)
        | MatchError::Config(_)
        | MatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Machine-readable error kind for clients
fn error_kind(error: &MatchError) -> &'static str {
    match error {
        MatchError::Validation(_) => "validation",
        MatchError::NotFound(_) => "not_found",
        MatchError::DuplicateRequest { .. } => "duplicate_request",
        MatchError::InvalidStateTransition { .. } => "invalid_state_transition",
        MatchError::AlreadyMatched { .. } => "already_matched",
        MatchError::CapacityExceeded(_) => "capacity_exceeded",
        MatchError::Json(_) => "invalid_json",
        _ => "internal",
    }
}

/// Convert a MatchError to an appropriate HTTP response
pub fn error_response(error: MatchError) -> JsonResponse {
    let status = status_for(&error);
    if status.is_server_error() {
        error!(error = %error, "Request failed");
    }
    json_response(
        status,
        &serde_json::json!({ "error": error.to_string(), "kind": error_kind(&error) }),
    )
}

/// Wrap a service result into an HTTP response
pub fn from_result<T: Serialize>(result: Result<T, MatchError>) -> JsonResponse {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

/// Wrap a create result into an HTTP response with 201 Created
pub fn from_create_result<T: Serialize>(result: Result<T, MatchError>) -> JsonResponse {
    match result {
        Ok(value) => created(&value),
        Err(e) => error_response(e),
    }
}
