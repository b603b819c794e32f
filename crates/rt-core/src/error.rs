//! The error taxonomy shared across all runtime crates (`spec.md` §7).
//!
//! `ocl::error::Error` wraps a handful of sibling error enums
//! (`DeviceError`, `KernelError`, `PlatformError`, ...) behind one
//! `thiserror` enum with `#[from]` conversions. We follow the same shape,
//! but with a single flat `ErrorKind` since the spec defines one closed
//! taxonomy rather than per-subsystem ones.

use std::fmt;

/// Result alias used throughout the runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// One of the error kinds named by `spec.md` §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    OutOfRange,
    FailedPrecondition,
    NotFound,
    AlreadyExists,
    ResourceExhausted,
    Unimplemented,
    Unavailable,
    DeadlineExceeded,
    Cancelled,
    Aborted,
    DataLoss,
    Internal,
    Unknown,
    PermissionDenied,
    Unauthenticated,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::OutOfRange => "OUT_OF_RANGE",
            ErrorKind::FailedPrecondition => "FAILED_PRECONDITION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorKind::Unimplemented => "UNIMPLEMENTED",
            ErrorKind::Unavailable => "UNAVAILABLE",
            ErrorKind::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Aborted => "ABORTED",
            ErrorKind::DataLoss => "DATA_LOSS",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::Unknown => "UNKNOWN",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
        };
        f.write_str(s)
    }
}

/// A typed error carrying an append-only message chain.
///
/// Host applications see the outermost error with the full chain attached
/// (`spec.md` §7: "augmented with a message chain; append-only; no loss of
/// the original code"). The *kind* never changes as the error bubbles up
/// frame-by-frame; only the message chain grows.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    messages: Vec<String>,
}

impl std::error::Error for Error {}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Appends a message fragment without discarding the original kind or
    /// any prior message, used as the VM stack unwinds (`spec.md` §7).
    pub fn augment(mut self, message: impl Into<String>) -> Error {
        self.messages.push(message.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for m in &self.messages {
            write!(f, ": {m}")?;
        }
        Ok(())
    }
}

/// Accumulates message fragments before finalizing to an [`Error`]
/// (`spec.md` §9: "the builder is a constructor that accumulates message
/// fragments and then finalizes to an error value").
pub struct ErrorBuilder {
    kind: ErrorKind,
    messages: Vec<String>,
}

impl ErrorBuilder {
    pub fn new(kind: ErrorKind) -> ErrorBuilder {
        ErrorBuilder {
            kind,
            messages: Vec::new(),
        }
    }

    pub fn with(mut self, message: impl Into<String>) -> ErrorBuilder {
        self.messages.push(message.into());
        self
    }

    pub fn build(self) -> Error {
        Error {
            kind: self.kind,
            messages: self.messages,
        }
    }
}

/// Shorthand for `ErrorBuilder::new(kind).with(message).build()`.
pub fn err(kind: ErrorKind, message: impl Into<String>) -> Error {
    ErrorBuilder::new(kind).with(message).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn augment_preserves_kind_and_appends_messages() {
        let e = err(ErrorKind::NotFound, "no device registered");
        let e = e.augment("while resolving placement");
        assert_eq!(e.kind(), ErrorKind::NotFound);
        let rendered = e.to_string();
        assert!(rendered.contains("NOT_FOUND"));
        assert!(rendered.contains("no device registered"));
        assert!(rendered.contains("while resolving placement"));
    }
}
