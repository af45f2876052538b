//! libc backend for Unix-like systems

use std::ffi::CStr;
use std::io;
use std::ptr;

use libc::{c_int, c_uint, c_void};

use super::{BackendKind, Capabilities, RawBackend};
use crate::error::{PosixError, PosixResult};

/// Backend calling straight into libc
#[derive(Debug, Clone)]
pub struct UnixBackend {
    capabilities: Capabilities,
}

impl UnixBackend {
    /// Probe the running system and build the backend
    ///
    /// Fails when even the processor count cannot be queried, which is
    /// taken as a sign the C library is not usable.
    pub fn new() -> PosixResult<Self> {
        // SAFETY: sysconf has no memory-safety preconditions
        let configured = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
        if configured <= 0 {
            return Err(PosixError::from_os_error("sysconf", &io::Error::last_os_error()));
        }

        Ok(Self { capabilities: detect_capabilities() })
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn detect_capabilities() -> Capabilities {
    Capabilities {
        process_maps: std::path::Path::new("/proc/self/maps").exists(),
        mlock_on_fault: cfg!(target_os = "linux"),
        wide_fallocate: cfg!(all(target_os = "linux", target_env = "gnu")),
        affinity: true,
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn detect_capabilities() -> Capabilities {
    Capabilities::default()
}

// off_t, clockid_t and the syscall return type differ in width between targets
#[allow(trivial_numeric_casts, clippy::cast_possible_truncation, clippy::unnecessary_cast)]
impl RawBackend for UnixBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Unix
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn open(&self, path: &CStr, flags: c_int, perm: c_int) -> PosixResult<c_int> {
        // SAFETY: `path` is a valid NUL-terminated string for the call duration
        Ok(unsafe { libc::open(path.as_ptr(), flags, perm as c_uint) })
    }

    fn close(&self, fd: c_int) -> PosixResult<c_int> {
        // SAFETY: closing an arbitrary descriptor is memory safe
        Ok(unsafe { libc::close(fd) })
    }

    fn lseek(&self, fd: c_int, offset: i64, whence: c_int) -> PosixResult<i64> {
        // SAFETY: no pointers involved
        Ok(unsafe { libc::lseek(fd, offset as libc::off_t, whence) } as i64)
    }

    fn ftruncate(&self, fd: c_int, length: i64) -> PosixResult<c_int> {
        // SAFETY: no pointers involved
        Ok(unsafe { libc::ftruncate(fd, length as libc::off_t) })
    }

    fn lockf(&self, fd: c_int, cmd: c_int, length: i64) -> PosixResult<c_int> {
        // SAFETY: no pointers involved
        Ok(unsafe { libc::lockf(fd, cmd, length as libc::off_t) })
    }

    fn flock(&self, fd: c_int, operation: c_int) -> PosixResult<c_int> {
        // SAFETY: no pointers involved
        Ok(unsafe { libc::flock(fd, operation) })
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
        // SAFETY: caller upholds the address hint contract
        Ok(unsafe { libc::mmap(addr, length, prot, flags, fd, offset as libc::off_t) })
    }

    unsafe fn munmap(&self, addr: *mut c_void, length: usize) -> PosixResult<c_int> {
        // SAFETY: caller guarantees the range came from mmap
        Ok(unsafe { libc::munmap(addr, length) })
    }

    unsafe fn madvise(&self, addr: *mut c_void, length: usize, advice: c_int) -> PosixResult<c_int> {
        // SAFETY: caller guarantees the range is mapped
        Ok(unsafe { libc::madvise(addr, length, advice) })
    }

    unsafe fn msync(&self, addr: *mut c_void, length: usize, flags: c_int) -> PosixResult<c_int> {
        // SAFETY: caller guarantees the range is mapped
        Ok(unsafe { libc::msync(addr, length, flags) })
    }

    unsafe fn mlock(&self, addr: *const c_void, length: usize) -> PosixResult<c_int> {
        // SAFETY: mlock only pins pages, the kernel validates the range
        Ok(unsafe { libc::mlock(addr, length) })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    unsafe fn mlock2(&self, addr: *const c_void, length: usize, flags: c_uint) -> PosixResult<c_int> {
        // Raw syscall: older glibc builds lack the wrapper.
        // SAFETY: same contract as mlock
        Ok(unsafe { libc::syscall(libc::SYS_mlock2, addr, length, flags) } as c_int)
    }

    fn mlockall(&self, flags: c_int) -> PosixResult<c_int> {
        // SAFETY: no pointers involved
        Ok(unsafe { libc::mlockall(flags) })
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn fallocate64(&self, fd: c_int, mode: c_int, offset: i64, length: i64) -> PosixResult<c_int> {
        // SAFETY: no pointers involved
        Ok(unsafe { libc::fallocate64(fd, mode, offset, length) })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn fallocate(&self, fd: c_int, mode: c_int, offset: i64, length: i64) -> PosixResult<c_int> {
        // SAFETY: no pointers involved
        Ok(unsafe { libc::fallocate(fd, mode, offset as libc::off_t, length as libc::off_t) })
    }

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    fn posix_fallocate(&self, fd: c_int, offset: i64, length: i64) -> PosixResult<c_int> {
        // SAFETY: no pointers involved
        Ok(unsafe { libc::posix_fallocate(fd, offset as libc::off_t, length as libc::off_t) })
    }

    unsafe fn read(&self, fd: c_int, buf: *mut c_void, length: usize) -> PosixResult<isize> {
        // SAFETY: caller guarantees `buf` is writable for `length` bytes
        Ok(unsafe { libc::read(fd, buf, length) })
    }

    unsafe fn write(&self, fd: c_int, buf: *const c_void, length: usize) -> PosixResult<isize> {
        // SAFETY: caller guarantees `buf` is readable for `length` bytes
        Ok(unsafe { libc::write(fd, buf, length) })
    }

    unsafe fn gettimeofday(&self, timeval: *mut c_void) -> PosixResult<c_int> {
        // SAFETY: caller provides room for a timeval
        Ok(unsafe { libc::gettimeofday(timeval.cast::<libc::timeval>(), ptr::null_mut()) })
    }

    unsafe fn clock_gettime(&self, clock_id: c_int, timespec: *mut c_void) -> PosixResult<c_int> {
        // SAFETY: caller provides room for a timespec
        Ok(unsafe { libc::clock_gettime(clock_id as libc::clockid_t, timespec.cast::<libc::timespec>()) })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    unsafe fn sched_setaffinity(&self, pid: c_int, size: usize, mask: *const c_void) -> PosixResult<c_int> {
        // SAFETY: caller guarantees `mask` is readable for `size` bytes
        Ok(unsafe { libc::sched_setaffinity(pid, size, mask.cast::<libc::cpu_set_t>()) })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    unsafe fn sched_getaffinity(&self, pid: c_int, size: usize, mask: *mut c_void) -> PosixResult<c_int> {
        // SAFETY: caller guarantees `mask` is writable for `size` bytes
        Ok(unsafe { libc::sched_getaffinity(pid, size, mask.cast::<libc::cpu_set_t>()) })
    }

    fn get_nprocs(&self) -> PosixResult<c_int> {
        // SAFETY: sysconf has no memory-safety preconditions
        Ok(unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) } as c_int)
    }

    fn get_nprocs_conf(&self) -> PosixResult<c_int> {
        // SAFETY: sysconf has no memory-safety preconditions
        Ok(unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) } as c_int)
    }

    fn getpid(&self) -> PosixResult<c_int> {
        // SAFETY: getpid cannot fail
        Ok(unsafe { libc::getpid() })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn gettid(&self) -> PosixResult<c_int> {
        // SAFETY: SYS_gettid takes no arguments
        Ok(unsafe { libc::syscall(libc::SYS_gettid) } as c_int)
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    fn gettid(&self) -> PosixResult<c_int> {
        let mut tid: u64 = 0;
        // SAFETY: a null thread means the calling thread, `tid` is a valid out pointer
        let ret = unsafe { libc::pthread_threadid_np(ptr::null_mut(), &raw mut tid) };
        if ret != 0 {
            return Ok(-1);
        }
        Ok(tid as c_int)
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
