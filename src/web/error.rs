//! Response types for the HTTP surface.
//!
//! Documented failures are answered with a CGI record and status 200. Only
//! requests that cannot be read at all get a bare status code.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::cgi::CgiResponse;

/// Content type of every CGI record.
pub const CGI_CONTENT_TYPE: &str = "text/plain;charset=utf-8";

/// A bare HTTP status with an empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
}

impl ApiError {
    /// Create an error with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }

    /// 400, for unreadable forms and malformed webhook input.
    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST)
    }

    /// 500, for webhook failures after the input was accepted.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get the HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.status.into_response()
    }
}

impl IntoResponse for CgiResponse {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, CGI_CONTENT_TYPE)], self.encode()).into_response()
    }
}
