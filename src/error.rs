use std::time::Duration;

use http::Method;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    Network,
    Timeout,
    HttpStatus,
    Unauthorized,
    InvalidHeaderName,
    InvalidHeaderValue,
    SerializeJson,
    Deserialize,
    MissingBaseUrl,
    InvalidBaseUrl,
    TlsInit,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::Unauthorized => "unauthorized",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::SerializeJson => "serialize_json",
            Self::Deserialize => "deserialize",
            Self::MissingBaseUrl => "missing_base_url",
            Self::InvalidBaseUrl => "invalid_base_url",
            Self::TlsInit => "tls_init",
        }
    }
}

/// Every failure a call can surface.
///
/// `Clone` so that all callers joined on one deduplicated request observe the
/// same error value.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("network error ({kind}) for {method} {uri}: {message}")]
    Network {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        message: String,
    },
    #[error("request timed out after {}s for {method} {uri}", seconds(.timeout))]
    Timeout {
        timeout: Duration,
        method: Method,
        uri: String,
    },
    #[error("http status {status} for {method} {uri}: {message}")]
    Http {
        status: u16,
        method: Method,
        uri: String,
        message: String,
    },
    #[error("unauthorized for {method} {uri}: {message}")]
    Unauthorized {
        method: Method,
        uri: String,
        message: String,
    },
    #[error("invalid header name {name}: {message}")]
    InvalidHeaderName { name: String, message: String },
    #[error("invalid header value for {name}: {message}")]
    InvalidHeaderValue { name: String, message: String },
    #[error("failed to serialize request json: {message}")]
    SerializeJson { message: String },
    #[error("failed to decode response payload: {message}")]
    Deserialize { message: String },
    #[error("api base url is not configured")]
    MissingBaseUrl,
    #[error("invalid api base url {url}: {message}")]
    InvalidBaseUrl { url: String, message: String },
    #[error("failed to initialize tls: {message}")]
    TlsInit { message: String },
}

fn seconds(timeout: &Duration) -> f64 {
    timeout.as_secs_f64()
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Network { .. } => ErrorCode::Network,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Http { .. } => ErrorCode::HttpStatus,
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::SerializeJson { .. } => ErrorCode::SerializeJson,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::MissingBaseUrl => ErrorCode::MissingBaseUrl,
            Self::InvalidBaseUrl { .. } => ErrorCode::InvalidBaseUrl,
            Self::TlsInit { .. } => ErrorCode::TlsInit,
        }
    }

    /// Status code of an `Http` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-provided message for `Http` and `Unauthorized` errors.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Http { message, .. } | Self::Unauthorized { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Configured timeout of a `Timeout` error.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Self::Timeout { timeout, .. } => Some(*timeout),
            _ => None,
        }
    }
}
