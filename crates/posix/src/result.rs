//! Result extension traits for POSIX operations

use std::io;

use crate::error::{PosixError, PosixResult};

/// Extension trait for foreign `Result` types
pub trait PosixResultExt<T> {
    /// Replace the error with an [`PosixError::InvalidArgument`] carrying `msg`
    fn or_invalid_argument<S: Into<String>>(self, msg: S) -> PosixResult<T>;
}

impl<T, E> PosixResultExt<T> for Result<T, E>
where
    E: std::error::Error,
{
    fn or_invalid_argument<S: Into<String>>(self, msg: S) -> PosixResult<T> {
        self.map_err(|_| PosixError::InvalidArgument(msg.into()))
    }
}

/// Extension trait specifically for IO results
pub trait PosixIoResultExt<T> {
    /// Attach the primitive name, keeping the raw OS code when there is one
    fn with_operation(self, operation: &'static str) -> PosixResult<T>;
}

impl<T> PosixIoResultExt<T> for io::Result<T> {
    fn with_operation(self, operation: &'static str) -> PosixResult<T> {
        self.map_err(|e| match e.raw_os_error() {
            Some(_) => PosixError::from_os_error(operation, &e),
            None => PosixError::Io(e),
        })
    }
}
