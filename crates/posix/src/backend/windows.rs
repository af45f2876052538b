//! CRT and Kernel32 backend for Windows
//!
//! Descriptor I/O goes through the C runtime so descriptors stay
//! interchangeable with the Unix backend's. Primitives Windows has no
//! equivalent for keep the trait default and report `Unsupported`, with two
//! exceptions: `madvise`/`msync` succeed silently and `fallocate` returns
//! `-1` so the allocator cascade can carry on.

use std::ffi::CStr;
use std::io;
use std::mem;
use std::ptr;
use std::time::{SystemTime, UNIX_EPOCH};

use libc::{c_int, c_long, c_uint, c_void};
use winapi::shared::ntdef::LARGE_INTEGER;
use winapi::um::fileapi::{SetEndOfFile, SetFilePointerEx};
use winapi::um::handleapi::INVALID_HANDLE_VALUE;
use winapi::um::processthreadsapi::{GetCurrentProcessId, GetCurrentThreadId};
use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};
use winapi::um::winbase::FILE_BEGIN;
use winapi::um::winnt::HANDLE;

use super::{BackendKind, Capabilities, RawBackend};
use crate::error::PosixResult;

/// Backend for Windows
#[derive(Debug, Clone)]
pub struct WindowsBackend {
    processors: c_int,
}

impl WindowsBackend {
    /// Query the processor count and build the backend
    pub fn new() -> PosixResult<Self> {
        Ok(Self { processors: processor_count() })
    }
}

fn processor_count() -> c_int {
    // SAFETY: SYSTEM_INFO is plain data
    let mut info: SYSTEM_INFO = unsafe { mem::zeroed() };
    // SAFETY: `info` is a valid out pointer
    unsafe { GetSystemInfo(&raw mut info) };
    (info.dwNumberOfProcessors as c_int).max(1)
}

fn since_epoch() -> (i64, u32) {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (now.as_secs() as i64, now.subsec_nanos())
}

impl RawBackend for WindowsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Windows
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn open(&self, path: &CStr, flags: c_int, perm: c_int) -> PosixResult<c_int> {
        // SAFETY: `path` is a valid NUL-terminated string for the call duration
        Ok(unsafe { libc::open(path.as_ptr(), flags, perm) })
    }

    fn close(&self, fd: c_int) -> PosixResult<c_int> {
        // SAFETY: closing an arbitrary descriptor is memory safe
        Ok(unsafe { libc::close(fd) })
    }

    fn lseek(&self, fd: c_int, offset: i64, whence: c_int) -> PosixResult<i64> {
        // SAFETY: no pointers involved; resolves to _lseeki64
        Ok(unsafe { libc::lseek64(fd, offset, whence) })
    }

    fn ftruncate(&self, fd: c_int, length: i64) -> PosixResult<c_int> {
        // SAFETY: get_osfhandle only inspects the CRT descriptor table
        let handle = unsafe { libc::get_osfhandle(fd) } as HANDLE;
        if handle == INVALID_HANDLE_VALUE {
            return Ok(-1);
        }

        // SAFETY: LARGE_INTEGER is a plain union
        let mut distance: LARGE_INTEGER = unsafe { mem::zeroed() };
        // SAFETY: every bit pattern is a valid QuadPart
        unsafe { *distance.QuadPart_mut() = length };

        // SAFETY: `handle` is a live file handle owned by the CRT
        let moved = unsafe { SetFilePointerEx(handle, distance, ptr::null_mut(), FILE_BEGIN) };
        if moved == 0 {
            return Ok(-1);
        }
        // SAFETY: same handle as above
        let truncated = unsafe { SetEndOfFile(handle) };
        Ok(if truncated == 0 { -1 } else { 0 })
    }

    unsafe fn madvise(&self, _addr: *mut c_void, _length: usize, _advice: c_int) -> PosixResult<c_int> {
        Ok(0)
    }

    unsafe fn msync(&self, _addr: *mut c_void, _length: usize, _flags: c_int) -> PosixResult<c_int> {
        Ok(0)
    }

    fn fallocate(&self, _fd: c_int, _mode: c_int, _offset: i64, _length: i64) -> PosixResult<c_int> {
        Ok(-1)
    }

    unsafe fn read(&self, fd: c_int, buf: *mut c_void, length: usize) -> PosixResult<isize> {
        let length = length.min(c_uint::MAX as usize) as c_uint;
        // SAFETY: caller guarantees `buf` is writable for `length` bytes
        Ok(unsafe { libc::read(fd, buf, length) } as isize)
    }

    unsafe fn write(&self, fd: c_int, buf: *const c_void, length: usize) -> PosixResult<isize> {
        let length = length.min(c_uint::MAX as usize) as c_uint;
        // SAFETY: caller guarantees `buf` is readable for `length` bytes
        Ok(unsafe { libc::write(fd, buf, length) } as isize)
    }

    unsafe fn gettimeofday(&self, timeval: *mut c_void) -> PosixResult<c_int> {
        let (secs, nanos) = since_epoch();
        let value = libc::timeval { tv_sec: secs as c_long, tv_usec: (nanos / 1_000) as c_long };
        // SAFETY: caller provides room for a timeval
        unsafe { timeval.cast::<libc::timeval>().write_unaligned(value) };
        Ok(0)
    }

    // Both supported clocks are derived from the wall clock.
    unsafe fn clock_gettime(&self, clock_id: c_int, timespec: *mut c_void) -> PosixResult<c_int> {
        if !(0..=1).contains(&clock_id) {
            return Ok(-1);
        }
        let (secs, nanos) = since_epoch();
        let value = libc::timespec { tv_sec: secs as libc::time_t, tv_nsec: nanos as c_long };
        // SAFETY: caller provides room for a timespec
        unsafe { timespec.cast::<libc::timespec>().write_unaligned(value) };
        Ok(0)
    }

    fn get_nprocs(&self) -> PosixResult<c_int> {
        Ok(self.processors)
    }

    fn get_nprocs_conf(&self) -> PosixResult<c_int> {
        Ok(self.processors)
    }

    fn getpid(&self) -> PosixResult<c_int> {
        // SAFETY: no preconditions
        Ok(unsafe { GetCurrentProcessId() } as c_int)
    }

    fn gettid(&self) -> PosixResult<c_int> {
        // SAFETY: no preconditions
        Ok(unsafe { GetCurrentThreadId() } as c_int)
    }

    fn malloc(&self, size: usize) -> PosixResult<*mut c_void> {
        // SAFETY: malloc has no preconditions
        Ok(unsafe { libc::malloc(size) })
    }

    unsafe fn free(&self, ptr: *mut c_void) -> PosixResult<()> {
        // SAFETY: caller guarantees `ptr` came from malloc and is freed once
        unsafe { libc::free(ptr) };
        Ok(())
    }

    fn strerror(&self, code: c_int) -> Option<String> {
        Some(io::Error::from_raw_os_error(code).to_string())
    }

    fn last_error(&self) -> c_int {
        io::Error::last_os_error().raw_os_error().unwrap_or(0)
    }
}
