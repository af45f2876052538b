//! Call-tracing middleware

use std::cell::Cell;
use std::ffi::CStr;
use std::fmt;
use std::sync::Arc;

use libc::{c_int, c_uint, c_void};
use tracing::trace;

use super::{BackendKind, Capabilities, RawBackend};
use crate::error::PosixResult;

thread_local! {
    static CAPTURED_ERROR: Cell<c_int> = const { Cell::new(0) };
}

/// Wraps a backend and emits one `trace!` event per primitive call
///
/// Events go to the `nebula_posix::calls` target so they can be switched on
/// independently, e.g. `RUST_LOG=nebula_posix::calls=trace`.
///
/// The inner error number is captured before anything is logged, so
/// [`last_error`](RawBackend::last_error) still reports the traced call.
#[derive(Debug, Clone)]
pub struct TracingBackend {
    inner: Arc<dyn RawBackend>,
}

impl TracingBackend {
    /// Wrap `inner`
    pub fn new(inner: Arc<dyn RawBackend>) -> Self {
        Self { inner }
    }

    /// The wrapped backend
    pub fn inner(&self) -> &Arc<dyn RawBackend> {
        &self.inner
    }

    fn traced<T: fmt::Debug>(&self, op: &'static str, args: fmt::Arguments<'_>, result: PosixResult<T>) -> PosixResult<T> {
        let code = self.inner.last_error();
        CAPTURED_ERROR.with(|slot| slot.set(code));
        match &result {
            Ok(value) => trace!(target: "nebula_posix::calls", backend = %self.inner.kind(), "{op}({args}) returned {value:?}"),
            Err(err) => trace!(target: "nebula_posix::calls", backend = %self.inner.kind(), "{op}({args}) threw {err}"),
        }
        result
    }
}

impl RawBackend for TracingBackend {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn reason(&self) -> Option<&str> {
        self.inner.reason()
    }

    fn open(&self, path: &CStr, flags: c_int, perm: c_int) -> PosixResult<c_int> {
        self.traced("open", format_args!("{path:?}, {flags:#x}, {perm:#o}"), self.inner.open(path, flags, perm))
    }

    fn close(&self, fd: c_int) -> PosixResult<c_int> {
        self.traced("close", format_args!("{fd}"), self.inner.close(fd))
    }

    fn lseek(&self, fd: c_int, offset: i64, whence: c_int) -> PosixResult<i64> {
        self.traced("lseek", format_args!("{fd}, {offset}, {whence}"), self.inner.lseek(fd, offset, whence))
    }

    fn ftruncate(&self, fd: c_int, length: i64) -> PosixResult<c_int> {
        self.traced("ftruncate", format_args!("{fd}, {length}"), self.inner.ftruncate(fd, length))
    }

    fn lockf(&self, fd: c_int, cmd: c_int, length: i64) -> PosixResult<c_int> {
        self.traced("lockf", format_args!("{fd}, {cmd}, {length}"), self.inner.lockf(fd, cmd, length))
    }

    fn flock(&self, fd: c_int, operation: c_int) -> PosixResult<c_int> {
        self.traced("flock", format_args!("{fd}, {operation}"), self.inner.flock(fd, operation))
    }

    unsafe fn mmap(
        &self,
        addr: *mut c_void,
        length: usize,
        prot: c_int,
        flags: c_int,
        fd: c_int,
        offset: i64,
    ) -> PosixResult<*mut c_void> {
        // SAFETY: forwarded contract
        let result = unsafe { self.inner.mmap(addr, length, prot, flags, fd, offset) };
        self.traced("mmap", format_args!("{addr:p}, {length}, {prot}, {flags}, {fd}, {offset}"), result)
    }

    unsafe fn munmap(&self, addr: *mut c_void, length: usize) -> PosixResult<c_int> {
        // SAFETY: forwarded contract
        let result = unsafe { self.inner.munmap(addr, length) };
        self.traced("munmap", format_args!("{addr:p}, {length}"), result)
    }

    unsafe fn madvise(&self, addr: *mut c_void, length: usize, advice: c_int) -> PosixResult<c_int> {
        // SAFETY: forwarded contract
        let result = unsafe { self.inner.madvise(addr, length, advice) };
        self.traced("madvise", format_args!("{addr:p}, {length}, {advice}"), result)
    }

    unsafe fn msync(&self, addr: *mut c_void, length: usize, flags: c_int) -> PosixResult<c_int> {
        // SAFETY: forwarded contract
        let result = unsafe { self.inner.msync(addr, length, flags) };
        self.traced("msync", format_args!("{addr:p}, {length}, {flags}"), result)
    }

    unsafe fn mlock(&self, addr: *const c_void, length: usize) -> PosixResult<c_int> {
        // SAFETY: forwarded contract
        let result = unsafe { self.inner.mlock(addr, length) };
        self.traced("mlock", format_args!("{addr:p}, {length}"), result)
    }

    unsafe fn mlock2(&self, addr: *const c_void, length: usize, flags: c_uint) -> PosixResult<c_int> {
        // SAFETY: forwarded contract
        let result = unsafe { self.inner.mlock2(addr, length, flags) };
        self.traced("mlock2", format_args!("{addr:p}, {length}, {flags}"), result)
    }

    fn mlockall(&self, flags: c_int) -> PosixResult<c_int> {
        self.traced("mlockall", format_args!("{flags}"), self.inner.mlockall(flags))
    }

    fn fallocate64(&self, fd: c_int, mode: c_int, offset: i64, length: i64) -> PosixResult<c_int> {
        self.traced(
            "fallocate64",
            format_args!("{fd}, {mode}, {offset}, {length}"),
            self.inner.fallocate64(fd, mode, offset, length),
        )
    }

    fn fallocate(&self, fd: c_int, mode: c_int, offset: i64, length: i64) -> PosixResult<c_int> {
        self.traced(
            "fallocate",
            format_args!("{fd}, {mode}, {offset}, {length}"),
            self.inner.fallocate(fd, mode, offset, length),
        )
    }

    fn posix_fallocate(&self, fd: c_int, offset: i64, length: i64) -> PosixResult<c_int> {
        self.traced(
            "posix_fallocate",
            format_args!("{fd}, {offset}, {length}"),
            self.inner.posix_fallocate(fd, offset, length),
        )
    }

    unsafe fn read(&self, fd: c_int, buf: *mut c_void, length: usize) -> PosixResult<isize> {
        // SAFETY: forwarded contract
        let result = unsafe { self.inner.read(fd, buf, length) };
        self.traced("read", format_args!("{fd}, {buf:p}, {length}"), result)
    }

    unsafe fn write(&self, fd: c_int, buf: *const c_void, length: usize) -> PosixResult<isize> {
        // SAFETY: forwarded contract
        let result = unsafe { self.inner.write(fd, buf, length) };
        self.traced("write", format_args!("{fd}, {buf:p}, {length}"), result)
    }

    unsafe fn gettimeofday(&self, timeval: *mut c_void) -> PosixResult<c_int> {
        // SAFETY: forwarded contract
        let result = unsafe { self.inner.gettimeofday(timeval) };
        self.traced("gettimeofday", format_args!("{timeval:p}"), result)
    }

    unsafe fn clock_gettime(&self, clock_id: c_int, timespec: *mut c_void) -> PosixResult<c_int> {
        // SAFETY: forwarded contract
        let result = unsafe { self.inner.clock_gettime(clock_id, timespec) };
        self.traced("clock_gettime", format_args!("{clock_id}, {timespec:p}"), result)
    }

    unsafe fn sched_setaffinity(&self, pid: c_int, size: usize, mask: *const c_void) -> PosixResult<c_int> {
        // SAFETY: forwarded contract
        let result = unsafe { self.inner.sched_setaffinity(pid, size, mask) };
        self.traced("sched_setaffinity", format_args!("{pid}, {size}, {mask:p}"), result)
    }

    unsafe fn sched_getaffinity(&self, pid: c_int, size: usize, mask: *mut c_void) -> PosixResult<c_int> {
        // SAFETY: forwarded contract
        let result = unsafe { self.inner.sched_getaffinity(pid, size, mask) };
        self.traced("sched_getaffinity", format_args!("{pid}, {size}, {mask:p}"), result)
    }

    fn get_nprocs(&self) -> PosixResult<c_int> {
        self.traced("get_nprocs", format_args!(""), self.inner.get_nprocs())
    }

    fn get_nprocs_conf(&self) -> PosixResult<c_int> {
        self.traced("get_nprocs_conf", format_args!(""), self.inner.get_nprocs_conf())
    }

    fn getpid(&self) -> PosixResult<c_int> {
        self.traced("getpid", format_args!(""), self.inner.getpid())
    }

    fn gettid(&self) -> PosixResult<c_int> {
        self.traced("gettid", format_args!(""), self.inner.gettid())
    }

    fn malloc(&self, size: usize) -> PosixResult<*mut c_void> {
        self.traced("malloc", format_args!("{size}"), self.inner.malloc(size))
    }

    unsafe fn free(&self, ptr: *mut c_void) -> PosixResult<()> {
        // SAFETY: forwarded contract
        let result = unsafe { self.inner.free(ptr) };
        self.traced("free", format_args!("{ptr:p}"), result)
    }

    fn strerror(&self, code: c_int) -> Option<String> {
        self.inner.strerror(code)
    }

    fn last_error(&self) -> c_int {
        CAPTURED_ERROR.with(Cell::get)
    }
}
