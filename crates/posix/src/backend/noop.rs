//! Backend that never touches the OS

use libc::{c_int, c_void};

use super::{BackendKind, RawBackend};
use crate::error::PosixResult;

/// Disabled-default backend
///
/// Advisory primitives (`madvise`, `msync`, `mlockall`) report success;
/// everything else is [`Unsupported`](crate::PosixError::Unsupported). No
/// method ever returns `-1`, so nothing built on top of it can surface a
/// native failure.
#[derive(Debug, Clone)]
pub struct NoOpBackend {
    reason: String,
}

impl NoOpBackend {
    /// Reason used by [`use_noop_posix`](crate::use_noop_posix)
    pub const EXPLICITLY_DISABLED: &'static str = "Explicitly disabled";

    /// Create a no-op backend, recording why it is in use
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl RawBackend for NoOpBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NoOp
    }

    fn reason(&self) -> Option<&str> {
        Some(&self.reason)
    }

    unsafe fn madvise(&self, _addr: *mut c_void, _length: usize, _advice: c_int) -> PosixResult<c_int> {
        Ok(0)
    }

    unsafe fn msync(&self, _addr: *mut c_void, _length: usize, _flags: c_int) -> PosixResult<c_int> {
        Ok(0)
    }

    fn mlockall(&self, _flags: c_int) -> PosixResult<c_int> {
        Ok(0)
    }
}
