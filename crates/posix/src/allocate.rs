//! File-space preallocation
//!
//! Support for `fallocate` varies by kernel, libc and filesystem, so
//! [`SpaceAllocator::preallocate`] walks a cascade and stops at the first
//! strategy that succeeds:
//!
//! 1. `fallocate64` on 64-bit targets. Any failure is swallowed.
//! 2. `fallocate`. If the primitive is missing and `mode != 0` the error is
//!    returned, since no fallback can honour a non-default mode.
//! 3. With `mode == 0` only: take an exclusive `flock` on the descriptor and
//!    call `posix_fallocate`. The lock is released on every path. Targets
//!    without `flock` skip this step.
//! 4. Otherwise report [`Preallocation::Exhausted`] without raising.
//!
//! The advisory lock only keeps out processes that take it too; a writer that
//! ignores it can still race `posix_fallocate`'s write-based emulation.

use libc::c_int;
use tracing::debug;
#[cfg(unix)]
use tracing::warn;

use crate::backend::{IS_64_BIT, RawBackend};
use crate::error::{PosixError, PosixResult};

/// `flock` operations taken by [`AdvisoryLock`]
#[cfg(unix)]
pub use libc::{LOCK_EX, LOCK_UN};

/// Which strategy satisfied a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Large-file-aware `fallocate64`
    Fallocate64,
    /// Plain `fallocate`
    Fallocate,
    /// `posix_fallocate` under an advisory lock
    PortableFallback,
}

/// Outcome of [`SpaceAllocator::preallocate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preallocation {
    /// Space is reserved
    Allocated(Strategy),
    /// Every strategy failed or was unavailable
    Exhausted,
}

impl Preallocation {
    /// Generic status code: 0 on success, -1 when exhausted
    pub fn code(self) -> c_int {
        match self {
            Self::Allocated(_) => 0,
            Self::Exhausted => -1,
        }
    }

    /// Whether space was reserved
    pub fn is_allocated(self) -> bool {
        matches!(self, Self::Allocated(_))
    }
}

/// Exclusive `flock` held for the guard's lifetime
#[cfg(unix)]
#[derive(Debug)]
pub struct AdvisoryLock<'a> {
    backend: &'a dyn RawBackend,
    fd: c_int,
}

#[cfg(unix)]
impl<'a> AdvisoryLock<'a> {
    /// Block until an exclusive lock on `fd` is held
    pub fn acquire(backend: &'a dyn RawBackend, fd: c_int) -> PosixResult<Self> {
        if backend.flock(fd, LOCK_EX)? != 0 {
            return Err(PosixError::native_failure("flock", backend.last_error()));
        }
        Ok(Self { backend, fd })
    }
}

#[cfg(unix)]
impl Drop for AdvisoryLock<'_> {
    fn drop(&mut self) {
        match self.backend.flock(self.fd, LOCK_UN) {
            Ok(0) => {}
            Ok(_) => warn!(fd = self.fd, errno = self.backend.last_error(), "failed to release advisory lock"),
            Err(err) => warn!(fd = self.fd, error = %err, "failed to release advisory lock"),
        }
    }
}

/// Preallocation cascade over a backend
#[derive(Debug)]
pub struct SpaceAllocator<'a> {
    backend: &'a dyn RawBackend,
    wide_addressing: bool,
}

impl<'a> SpaceAllocator<'a> {
    /// Allocator over `backend`, trying `fallocate64` on 64-bit targets
    pub fn new(backend: &'a dyn RawBackend) -> Self {
        Self { backend, wide_addressing: IS_64_BIT }
    }

    /// Override whether `fallocate64` is attempted
    pub fn with_wide_addressing(mut self, enabled: bool) -> Self {
        self.wide_addressing = enabled;
        self
    }

    /// Reserve `length` bytes at `offset` in `fd`
    pub fn preallocate(&self, fd: c_int, mode: c_int, offset: i64, length: i64) -> PosixResult<Preallocation> {
        if self.wide_addressing {
            match self.backend.fallocate64(fd, mode, offset, length) {
                Ok(0) => return Ok(Preallocation::Allocated(Strategy::Fallocate64)),
                Ok(_) => debug!(fd, errno = self.backend.last_error(), "fallocate64 failed, falling back"),
                Err(err) => debug!(fd, error = %err, "fallocate64 unavailable, falling back"),
            }
        }

        match self.backend.fallocate(fd, mode, offset, length) {
            Ok(0) => return Ok(Preallocation::Allocated(Strategy::Fallocate)),
            Ok(_) => debug!(fd, errno = self.backend.last_error(), "fallocate failed"),
            Err(err) if mode != 0 => return Err(err),
            Err(err) => debug!(fd, error = %err, "fallocate unavailable"),
        }

        if mode == 0 {
            match self.portable_fallback(fd, offset, length) {
                Ok(true) => return Ok(Preallocation::Allocated(Strategy::PortableFallback)),
                Ok(false) => {}
                Err(err) => debug!(fd, error = %err, "portable preallocation unavailable"),
            }
        }

        debug!(fd, mode, offset, length, "every preallocation strategy failed");
        Ok(Preallocation::Exhausted)
    }

    #[cfg(unix)]
    fn portable_fallback(&self, fd: c_int, offset: i64, length: i64) -> PosixResult<bool> {
        let _lock = AdvisoryLock::acquire(self.backend, fd)?;
        let ret = self.backend.posix_fallocate(fd, offset, length)?;
        if ret != 0 {
            // posix_fallocate reports the error number directly
            debug!(fd, errno = ret, "posix_fallocate failed");
        }
        Ok(ret == 0)
    }

    #[cfg(not(unix))]
    fn portable_fallback(&self, _fd: c_int, _offset: i64, _length: i64) -> PosixResult<bool> {
        Err(PosixError::unsupported("flock"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NoOpBackend;

    #[test]
    fn test_codes() {
        assert_eq!(Preallocation::Allocated(Strategy::Fallocate).code(), 0);
        assert_eq!(Preallocation::Exhausted.code(), -1);
    }

    #[test]
    fn test_noop_mode_zero_never_raises() {
        let backend = NoOpBackend::new("test");
        let result = SpaceAllocator::new(&backend).preallocate(3, 0, 0, 4096).unwrap();
        assert_eq!(result, Preallocation::Exhausted);
    }

    #[test]
    fn test_noop_nonzero_mode_propagates() {
        let backend = NoOpBackend::new("test");
        let err = SpaceAllocator::new(&backend).preallocate(3, 1, 0, 4096).unwrap_err();
        assert!(err.is_unsupported());
    }
}
