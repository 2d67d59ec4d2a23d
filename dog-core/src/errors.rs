//! # Errors
//!
//! Structured, transport-agnostic errors for DogRS. Each crate keeps its own
//! typed error enum and converts into a [`DogError`] at the edge, so every
//! transport sees the same status codes and class names:
//! - `NotAuthenticated` (401) when no tenant can be resolved
//! - `Forbidden` (403) for cross-tenant access attempts
//! - `Unavailable` (503) for transient routing failures
//!
//! With feature `serde`, `data` is a `serde_json::Value` and
//! [`DogError::to_json`] renders a client payload.
//!
//! A `DogError` can travel inside an `anyhow::Error` and be recovered with
//! [`DogError::from_anyhow`] or [`DogError::normalize`].

use std::fmt;

use anyhow::Error as AnyError;

/// A convenience result type for DogRS core APIs.
///
/// Typed on [`DogError`] rather than `anyhow::Error`: the tenancy crates
/// always hand transports a structured error.
pub type DogResult<T> = std::result::Result<T, DogError>;

/// Error class names + HTTP-equivalent status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,       // 400
    NotAuthenticated, // 401
    Forbidden,        // 403
    NotFound,         // 404
    Timeout,          // 408
    Conflict,         // 409
    GeneralError,     // 500
    Unavailable,      // 503
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotAuthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Timeout => 408,
            ErrorKind::Conflict => 409,
            ErrorKind::GeneralError => 500,
            ErrorKind::Unavailable => 503,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotAuthenticated => "NotAuthenticated",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::GeneralError => "GeneralError",
            ErrorKind::Unavailable => "Unavailable",
        }
    }

    /// Kebab-cased class name (e.g. "not-authenticated").
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::NotAuthenticated => "not-authenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Conflict => "conflict",
            ErrorKind::GeneralError => "general-error",
            ErrorKind::Unavailable => "unavailable",
        }
    }

    /// Whether a caller may retry the same request later.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::Unavailable)
    }
}

#[cfg(feature = "serde")]
pub type ErrorValue = serde_json::Value;

#[cfg(not(feature = "serde"))]
pub type ErrorValue = String;

/// A structured DogRS error.
#[derive(Debug)]
pub struct DogError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<ErrorValue>,
    pub source: Option<AnyError>,
}

impl DogError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: ErrorValue) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_source(mut self, source: impl Into<AnyError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    /// Convert into `anyhow::Error`.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Downcast an `anyhow::Error` to a `DogError` if possible.
    pub fn from_anyhow(err: &AnyError) -> Option<&DogError> {
        err.downcast_ref::<DogError>()
    }

    /// Keep a `DogError` as is, wrap anything else as `GeneralError`.
    pub fn normalize(err: AnyError) -> DogError {
        match err.downcast::<DogError>() {
            Ok(dog) => dog,
            Err(other) => DogError::general_error(other.to_string()).with_source(other),
        }
    }

    /// A copy suitable for returning to clients: the inner `source` is
    /// dropped so backend details never leak.
    pub fn sanitize_for_client(&self) -> DogError {
        DogError {
            kind: self.kind,
            message: self.message.clone(),
            data: self.data.clone(),
            source: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }
    pub fn not_authenticated(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotAuthenticated, msg)
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, msg)
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, msg)
    }
    pub fn general_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, msg)
    }
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, msg)
    }
}

impl fmt::Display for DogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for DogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(feature = "serde")]
impl DogError {
    /// Client-facing JSON payload.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });

        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_status_codes() {
        assert_eq!(DogError::not_authenticated("x").code(), 401);
        assert_eq!(DogError::forbidden("x").code(), 403);
        assert_eq!(DogError::unavailable("x").code(), 503);
        assert_eq!(ErrorKind::Conflict.class_name(), "conflict");
    }

    #[test]
    fn sanitize_drops_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = DogError::general_error("store failed").with_source(io);
        assert!(std::error::Error::source(&err).is_some());

        let safe = err.sanitize_for_client();
        assert!(safe.source.is_none());
        assert_eq!(safe.message, "store failed");
    }

    #[test]
    fn anyhow_round_trip_keeps_the_kind() {
        let wrapped = DogError::forbidden("tenant t2").into_anyhow();
        assert_eq!(DogError::from_anyhow(&wrapped).map(|e| e.code()), Some(403));

        let dog = DogError::normalize(wrapped);
        assert_eq!(dog.kind, ErrorKind::Forbidden);

        let foreign = DogError::normalize(anyhow::anyhow!("socket closed"));
        assert_eq!(foreign.kind, ErrorKind::GeneralError);
        assert_eq!(foreign.message, "socket closed");
        assert!(foreign.source.is_some());
    }

    #[test]
    fn only_timeouts_and_unavailable_are_transient() {
        assert!(ErrorKind::Unavailable.is_transient());
        assert!(ErrorKind::Timeout.is_transient());
        assert!(!ErrorKind::Forbidden.is_transient());
    }
}
