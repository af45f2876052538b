//! Raw backends
//!
//! A backend issues exactly one native call per method and hands back the raw
//! return value. Classifying `-1` returns is left to the caller through
//! [`check`](crate::error::check) and [`RawBackend::last_error`].
//!
//! Every method has a default body that reports
//! [`PosixError::Unsupported`], so a backend only implements what its
//! platform actually links. The closed set of backends is:
//!
//! - [`UnixBackend`]: libc on Linux, macOS and the BSDs
//! - `WindowsBackend`: the CRT plus Kernel32 (Windows only)
//! - [`NoOpBackend`]: touches nothing, used when resolution fails or is
//!   disabled
//!
//! [`TracingBackend`] composes around any of them.

mod noop;
mod trace;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

use std::ffi::CStr;
use std::fmt;

use libc::{c_int, c_uint, c_void};

use crate::error::{PosixError, PosixResult};

pub use noop::NoOpBackend;
pub use trace::TracingBackend;
#[cfg(unix)]
pub use unix::UnixBackend;
#[cfg(windows)]
pub use windows::WindowsBackend;

/// Backend family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// libc on a Unix-like system
    Unix,
    /// CRT and Kernel32 on Windows
    Windows,
    /// Disabled-default stand-in
    NoOp,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix => f.write_str("unix"),
            Self::Windows => f.write_str("windows"),
            Self::NoOp => f.write_str("noop"),
        }
    }
}

/// Optional capabilities a backend may offer
///
/// Composite operations consult these to pick a strategy without probing:
/// `lock_all_mapped` needs `process_maps`, on-fault locking needs
/// `mlock_on_fault`, the allocator only tries `fallocate64` with
/// `wide_fallocate` and the `sched_*` calls need `affinity`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `/proc/<pid>/maps` can be read for this process
    pub process_maps: bool,
    /// The fault-deferred `mlock2` variant exists
    pub mlock_on_fault: bool,
    /// A large-file-aware `fallocate64` exists
    pub wide_fallocate: bool,
    /// Thread affinity can be set and queried
    pub affinity: bool,
}

/// One native call per method, raw results
///
/// `Ok(-1)` means the call ran and failed; read [`last_error`] right away.
/// `Err` is reserved for primitives that are not available at all.
///
/// [`last_error`]: RawBackend::last_error
#[allow(unused_variables)]
pub trait RawBackend: Send + Sync + fmt::Debug {
    /// Backend family
    fn kind(&self) -> BackendKind;

    /// Optional capabilities
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Why this backend was chosen, for diagnostics
    fn reason(&self) -> Option<&str> {
        None
    }

    /// `open(2)`
    fn open(&self, path: &CStr, flags: c_int, perm: c_int) -> PosixResult<c_int> {
        Err(PosixError::unsupported("open"))
    }

    /// `close(2)`
    fn close(&self, fd: c_int) -> PosixResult<c_int> {
        Err(PosixError::unsupported("close"))
    }

    /// `lseek(2)`, always with a 64-bit offset
    fn lseek(&self, fd: c_int, offset: i64, whence: c_int) -> PosixResult<i64> {
        Err(PosixError::unsupported("lseek"))
    }

    /// `ftruncate(2)`
    fn ftruncate(&self, fd: c_int, length: i64) -> PosixResult<c_int> {
        Err(PosixError::unsupported("ftruncate"))
    }

    /// `lockf(3)`
    fn lockf(&self, fd: c_int, cmd: c_int, length: i64) -> PosixResult<c_int> {
        Err(PosixError::unsupported("lockf"))
    }

    /// `flock(2)`
    fn flock(&self, fd: c_int, operation: c_int) -> PosixResult<c_int> {
        Err(PosixError::unsupported("flock"))
    }

    /// `mmap(2)`; a failed call yields `MAP_FAILED`
    ///
    /// # Safety
    ///
    /// `addr` must be null or a hint the caller is allowed to map over.
    unsafe fn mmap(
        &self,
        addr: *mut c_void,
        length: usize,
        prot: c_int,
        flags: c_int,
        fd: c_int,
        offset: i64,
    ) -> PosixResult<*mut c_void> {
        Err(PosixError::unsupported("mmap"))
    }

    /// `munmap(2)`
    ///
    /// # Safety
    ///
    /// The range must have been returned by `mmap` and must not be used after.
    unsafe fn munmap(&self, addr: *mut c_void, length: usize) -> PosixResult<c_int> {
        Err(PosixError::unsupported("munmap"))
    }

    /// `madvise(2)`
    ///
    /// # Safety
    ///
    /// The range must lie within a live mapping.
    unsafe fn madvise(&self, addr: *mut c_void, length: usize, advice: c_int) -> PosixResult<c_int> {
        Err(PosixError::unsupported("madvise"))
    }

    /// `msync(2)`
    ///
    /// # Safety
    ///
    /// The range must lie within a live mapping.
    unsafe fn msync(&self, addr: *mut c_void, length: usize, flags: c_int) -> PosixResult<c_int> {
        Err(PosixError::unsupported("msync"))
    }

    /// `mlock(2)`
    ///
    /// # Safety
    ///
    /// The range must lie within mappings owned by this process.
    unsafe fn mlock(&self, addr: *const c_void, length: usize) -> PosixResult<c_int> {
        Err(PosixError::unsupported("mlock"))
    }

    /// `mlock2(2)`
    ///
    /// # Safety
    ///
    /// The range must lie within mappings owned by this process.
    unsafe fn mlock2(&self, addr: *const c_void, length: usize, flags: c_uint) -> PosixResult<c_int> {
        Err(PosixError::unsupported("mlock2"))
    }

    /// `mlockall(2)`
    fn mlockall(&self, flags: c_int) -> PosixResult<c_int> {
        Err(PosixError::unsupported("mlockall"))
    }

    /// `fallocate64(2)`
    fn fallocate64(&self, fd: c_int, mode: c_int, offset: i64, length: i64) -> PosixResult<c_int> {
        Err(PosixError::unsupported("fallocate64"))
    }

    /// `fallocate(2)`
    fn fallocate(&self, fd: c_int, mode: c_int, offset: i64, length: i64) -> PosixResult<c_int> {
        Err(PosixError::unsupported("fallocate"))
    }

    /// `posix_fallocate(3)`; returns the error number directly, 0 on success
    fn posix_fallocate(&self, fd: c_int, offset: i64, length: i64) -> PosixResult<c_int> {
        Err(PosixError::unsupported("posix_fallocate"))
    }

    /// `read(2)`
    ///
    /// # Safety
    ///
    /// `buf` must be valid for `length` bytes of writes.
    unsafe fn read(&self, fd: c_int, buf: *mut c_void, length: usize) -> PosixResult<isize> {
        Err(PosixError::unsupported("read"))
    }

    /// `write(2)`
    ///
    /// # Safety
    ///
    /// `buf` must be valid for `length` bytes of reads.
    unsafe fn write(&self, fd: c_int, buf: *const c_void, length: usize) -> PosixResult<isize> {
        Err(PosixError::unsupported("write"))
    }

    /// `gettimeofday(2)` into a native `timeval`
    ///
    /// # Safety
    ///
    /// `timeval` must point to at least [`TIME_STRUCT_SIZE`] writable bytes.
    unsafe fn gettimeofday(&self, timeval: *mut c_void) -> PosixResult<c_int> {
        Err(PosixError::unsupported("gettimeofday"))
    }

    /// `clock_gettime(2)` into a native `timespec`
    ///
    /// # Safety
    ///
    /// `timespec` must point to at least [`TIME_STRUCT_SIZE`] writable bytes.
    unsafe fn clock_gettime(&self, clock_id: c_int, timespec: *mut c_void) -> PosixResult<c_int> {
        Err(PosixError::unsupported("clock_gettime"))
    }

    /// `sched_setaffinity(2)`; `pid == 0` is the calling thread
    ///
    /// # Safety
    ///
    /// `mask` must be valid for `size` bytes of reads.
    unsafe fn sched_setaffinity(&self, pid: c_int, size: usize, mask: *const c_void) -> PosixResult<c_int> {
        Err(PosixError::unsupported("sched_setaffinity"))
    }

    /// `sched_getaffinity(2)`; `pid == 0` is the calling thread
    ///
    /// # Safety
    ///
    /// `mask` must be valid for `size` bytes of writes.
    unsafe fn sched_getaffinity(&self, pid: c_int, size: usize, mask: *mut c_void) -> PosixResult<c_int> {
        Err(PosixError::unsupported("sched_getaffinity"))
    }

    /// Online processors
    fn get_nprocs(&self) -> PosixResult<c_int> {
        Err(PosixError::unsupported("get_nprocs"))
    }

    /// Configured processors
    fn get_nprocs_conf(&self) -> PosixResult<c_int> {
        Err(PosixError::unsupported("get_nprocs_conf"))
    }

    /// Process id
    fn getpid(&self) -> PosixResult<c_int> {
        Err(PosixError::unsupported("getpid"))
    }

    /// Kernel thread id of the calling thread
    fn gettid(&self) -> PosixResult<c_int> {
        Err(PosixError::unsupported("gettid"))
    }

    /// `malloc(3)`; null on failure
    fn malloc(&self, size: usize) -> PosixResult<*mut c_void> {
        Err(PosixError::unsupported("malloc"))
    }

    /// `free(3)`
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`malloc`](RawBackend::malloc) on this backend and
    /// must not be freed twice.
    unsafe fn free(&self, ptr: *mut c_void) -> PosixResult<()> {
        Err(PosixError::unsupported("free"))
    }

    /// Text for an error number
    fn strerror(&self, code: c_int) -> Option<String> {
        None
    }

    /// Error number left by the most recent failed call on this thread
    fn last_error(&self) -> c_int {
        0
    }
}

/// Bytes reserved for a native `timeval` / `timespec`
///
/// Both are two machine words; 16 covers every supported target.
pub const TIME_STRUCT_SIZE: usize = 16;

/// Whether the target uses 64-bit addressing
pub const IS_64_BIT: bool = cfg!(target_pointer_width = "64");
