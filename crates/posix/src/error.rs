//! Error types for POSIX primitive operations
//!
//! Every native-call path classifies its failure into one of a few kinds:
//!
//! - [`PosixError::Unsupported`]: the primitive has no implementation on the
//!   active backend. Never worth retrying.
//! - [`PosixError::NativeFailure`]: the call ran and the OS reported an error.
//!   The raw code is kept and can be turned into text.
//! - [`PosixError::InvalidArgument`]: a helper rejected an outcome or an input
//!   that makes no sense for the caller (bad CPU index, non-zero affinity
//!   return, path with an interior NUL).
//!
//! Silent success on stubbed advisory primitives is not an error and has no
//! variant here.

use std::io;

use thiserror::Error;

/// Errors that can occur while talking to the operating system
#[derive(Error, Debug)]
pub enum PosixError {
    /// The active backend has no implementation for this primitive
    #[error("Not supported on this platform: {operation}")]
    Unsupported {
        /// Name of the primitive
        operation: &'static str,
    },

    /// The call executed and the OS reported an error code
    #[error("{operation} failed [{code}]: {message}")]
    NativeFailure {
        /// Name of the primitive
        operation: &'static str,
        /// Raw OS error code (errno / GetLastError)
        code: i32,
        /// Human-readable text for `code`
        message: String,
    },

    /// A caller-facing argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A process map listing contained a line that could not be parsed
    #[error("Malformed process map line {line:?}: {reason}")]
    MapParse {
        /// The offending line, verbatim
        line: String,
        /// What was wrong with it
        reason: String,
    },

    /// I/O error while reading a procfs listing or file metadata
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for POSIX operations
pub type PosixResult<T> = std::result::Result<T, PosixError>;

/// Shorthand kept for parity with the other nebula crates
pub type Result<T> = PosixResult<T>;

impl PosixError {
    /// Primitive not available on the active backend
    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    /// Native failure carrying `code`, with the message resolved through the OS
    pub fn native_failure(operation: &'static str, code: i32) -> Self {
        Self::NativeFailure {
            operation,
            code,
            message: io::Error::from_raw_os_error(code).to_string(),
        }
    }

    /// Caller-facing argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Process map parse failure
    pub fn map_parse(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MapParse { line: line.into(), reason: reason.into() }
    }

    /// Build from an OS error, keeping the raw code when there is one
    pub fn from_os_error(operation: &'static str, err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => Self::NativeFailure { operation, code, message: err.to_string() },
            None => Self::InvalidArgument(format!("{operation}: {err}")),
        }
    }

    /// True when the primitive is simply not available
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Raw OS error code, if this error carries one
    pub fn os_error_code(&self) -> Option<i32> {
        match self {
            Self::NativeFailure { code, .. } => Some(*code),
            Self::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }

    /// Check if the error is transient and the call may succeed when repeated
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NativeFailure { code, .. } => is_transient_code(*code),
            Self::Io(err) => matches!(err.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock),
            _ => false,
        }
    }
}

fn is_transient_code(code: i32) -> bool {
    code == libc::EINTR || code == libc::EAGAIN
}

/// Turn a raw `-1` return into a [`PosixError::NativeFailure`].
///
/// `last_error` is only consulted on failure and must be read before anything
/// else can clobber the thread's error slot.
pub fn check<T>(operation: &'static str, ret: T, last_error: impl FnOnce() -> i32) -> PosixResult<T>
where
    T: PartialEq + From<i8>,
{
    if ret == T::from(-1) {
        Err(PosixError::native_failure(operation, last_error()))
    } else {
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_passes_through_success() {
        assert_eq!(check("close", 0_i32, || unreachable!()).unwrap(), 0);
        assert_eq!(check("lseek", 4096_i64, || unreachable!()).unwrap(), 4096);
    }

    #[test]
    fn test_check_classifies_minus_one() {
        let err = check("close", -1_i32, || libc::EBADF).unwrap_err();
        assert_eq!(err.os_error_code(), Some(libc::EBADF));
        assert!(err.to_string().starts_with("close failed ["));
    }

    #[test]
    fn test_unsupported_is_not_recoverable() {
        let err = PosixError::unsupported("mlock2");
        assert!(err.is_unsupported());
        assert!(!err.is_recoverable());
        assert_eq!(err.os_error_code(), None);
    }

    #[test]
    fn test_interrupted_is_recoverable() {
        assert!(PosixError::native_failure("read", libc::EINTR).is_recoverable());
        assert!(!PosixError::native_failure("read", libc::EBADF).is_recoverable());
    }
}
