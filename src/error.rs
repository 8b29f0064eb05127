//! Error model for the content pipeline and its mapping to the request layer.
//! `ContentError` is what the pipeline raises; `AppError` is the serializable shape
//! handed to HTTP frontends (code + message + status).

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::io;

/// Failures raised while building parameters, dispatching filters or streaming content.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// A recognized parameter carried a value that cannot be used.
    #[error("invalid value '{value}' for parameter '{name}': {reason}")]
    InvalidParameter { name: String, value: String, reason: String },

    /// No registered filter supports the requested type.
    #[error("unsupported filter type '{0}'")]
    UnsupportedFilterType(String),

    /// I/O, decode or archive-format failure while streaming or estimating.
    #[error("content filter failed: {0}")]
    ContentFilter(#[from] io::Error),
}

impl ContentError {
    pub fn invalid_number(name: &str, value: &str) -> Self {
        ContentError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected a numeric value".to_string(),
        }
    }

    /// Wrap a foreign decode/format error as a content filter failure.
    pub fn format<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        ContentError::ContentFilter(io::Error::new(io::ErrorKind::InvalidData, err))
    }

    /// True when the failure came from the output sink going away (client disconnect).
    pub fn is_sink_closed(&self) -> bool {
        match self {
            ContentError::ContentFilter(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

pub type ContentResult<T> = Result<T, ContentError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<ContentError> for AppError {
    fn from(err: ContentError) -> Self {
        let message = err.to_string();
        match err {
            ContentError::InvalidParameter { .. } => AppError::user("invalid_parameter".to_string(), message),
            ContentError::UnsupportedFilterType(_) => AppError::user("unsupported_filter_type".to_string(), message),
            ref e if e.is_sink_closed() => AppError::io("sink_closed".to_string(), message),
            ContentError::ContentFilter(_) => AppError::internal("content_filter_error".to_string(), message),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(AppError::io("io", "io").http_status(), 503);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn content_errors_map_to_client_and_server_statuses() {
        let bad = AppError::from(ContentError::invalid_number("startEntryIndex", "abc"));
        assert_eq!(bad.http_status(), 400);
        assert_eq!(bad.code_str(), "invalid_parameter");
        assert!(bad.message().contains("startEntryIndex"));

        let unsupported = AppError::from(ContentError::UnsupportedFilterType("FOO".into()));
        assert_eq!(unsupported.http_status(), 400);

        let broken = AppError::from(ContentError::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone")));
        assert_eq!(broken.http_status(), 503);

        let corrupt = AppError::from(ContentError::format("bad zip"));
        assert_eq!(corrupt.http_status(), 500);
        assert_eq!(corrupt.code_str(), "content_filter_error");
    }

    #[test]
    fn serializes_with_type_tag() {
        let v = serde_json::to_value(AppError::user("invalid_parameter", "x")).unwrap();
        assert_eq!(v["type"], "user_input");
        assert_eq!(v["code"], "invalid_parameter");
    }
}
