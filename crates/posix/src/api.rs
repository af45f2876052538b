//! Uniform API over a resolved backend

use std::ffi::CString;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use libc::{c_int, c_void};
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::affinity::{self, AffinityMask};
use crate::allocate::{Preallocation, SpaceAllocator};
use crate::backend::{BackendKind, Capabilities, IS_64_BIT, NoOpBackend, RawBackend, TIME_STRUCT_SIZE};
use crate::config::PosixConfig;
use crate::error::{PosixError, PosixResult, check};
use crate::flags::{ClockId, LockfCmd, MAdvice, MMapFlag, MMapProt, MSyncFlags, MclFlags, OpenFlags, Whence};
use crate::mlock::{LockReport, MemoryLockEmulator, lock_range};
use crate::result::PosixResultExt;
use crate::staging::{StagingBuffer, field_width};

/// Context owning one backend and the state derived from it
///
/// Build one with [`CapabilityResolver`](crate::CapabilityResolver), or with
/// [`Posix::with_backend`] to inject a backend directly. The configured
/// processor count is read once per context and never refreshed.
#[derive(Debug)]
pub struct Posix {
    backend: Arc<dyn RawBackend>,
    config: PosixConfig,
    nprocs_conf: OnceCell<usize>,
}

impl Posix {
    /// Context over `backend` with default configuration
    pub fn with_backend(backend: Arc<dyn RawBackend>) -> Self {
        Self::with_config(backend, PosixConfig::default())
    }

    /// Context over `backend` with `config`
    pub fn with_config(backend: Arc<dyn RawBackend>, config: PosixConfig) -> Self {
        Self { backend, config, nprocs_conf: OnceCell::new() }
    }

    /// Context over the no-op backend
    pub fn noop(reason: impl Into<String>) -> Self {
        Self::with_backend(Arc::new(NoOpBackend::new(reason)))
    }

    /// The backend in use
    pub fn backend(&self) -> &dyn RawBackend {
        self.backend.as_ref()
    }

    /// Backend family
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Optional capabilities of the backend
    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    /// Why a no-op backend is in use
    pub fn reason(&self) -> Option<&str> {
        self.backend.reason()
    }

    /// Configuration this context was built with
    pub fn config(&self) -> &PosixConfig {
        &self.config
    }

    fn checked<T>(&self, operation: &'static str, ret: T) -> PosixResult<T>
    where
        T: PartialEq + From<i8>,
    {
        check(operation, ret, || self.backend.last_error())
    }

    // ==================== Descriptors ====================

    /// Open `path`, returning the descriptor
    pub fn open(&self, path: impl AsRef<Path>, flags: OpenFlags, perm: u32) -> PosixResult<c_int> {
        let path = path_to_cstring(path.as_ref())?;
        let fd = self.backend.open(&path, flags.to_native()?, perm as c_int)?;
        self.checked("open", fd)
    }

    /// Close `fd`
    pub fn close(&self, fd: c_int) -> PosixResult<()> {
        let ret = self.backend.close(fd)?;
        self.checked("close", ret).map(|_| ())
    }

    /// Reposition the offset of `fd`, returning the new offset
    pub fn lseek(&self, fd: c_int, offset: i64, whence: Whence) -> PosixResult<i64> {
        let ret = self.backend.lseek(fd, offset, whence.to_native()?)?;
        self.checked("lseek", ret)
    }

    /// Truncate or extend `fd` to `length` bytes
    pub fn ftruncate(&self, fd: c_int, length: i64) -> PosixResult<()> {
        let ret = self.backend.ftruncate(fd, length)?;
        self.checked("ftruncate", ret).map(|_| ())
    }

    /// Apply a `lockf` command to `length` bytes from the current offset
    pub fn lockf(&self, fd: c_int, cmd: LockfCmd, length: i64) -> PosixResult<()> {
        let ret = self.backend.lockf(fd, cmd.to_native(), length)?;
        self.checked("lockf", ret).map(|_| ())
    }

    /// Read into `buf`, returning the byte count (0 at end of file)
    pub fn read(&self, fd: c_int, buf: &mut [u8]) -> PosixResult<usize> {
        // SAFETY: `buf` is a live, exclusively borrowed slice of `buf.len()` bytes
        let ret = unsafe { self.backend.read(fd, buf.as_mut_ptr().cast(), buf.len()) }?;
        self.checked("read", ret).map(|n| n as usize)
    }

    /// Write `buf`, returning the byte count
    pub fn write(&self, fd: c_int, buf: &[u8]) -> PosixResult<usize> {
        // SAFETY: `buf` is a live slice of `buf.len()` bytes
        let ret = unsafe { self.backend.write(fd, buf.as_ptr().cast(), buf.len()) }?;
        self.checked("write", ret).map(|n| n as usize)
    }

    // ==================== Memory mapping ====================

    /// Map `length` bytes of `fd` at `offset`
    ///
    /// # Safety
    ///
    /// `addr` must be null or a hint the caller may map over. The returned
    /// mapping must be released with [`munmap`](Self::munmap).
    pub unsafe fn mmap(
        &self,
        addr: *mut c_void,
        length: usize,
        prot: MMapProt,
        flag: MMapFlag,
        fd: c_int,
        offset: i64,
    ) -> PosixResult<*mut c_void> {
        let (prot, flag) = (prot.to_native()?, flag.to_native()?);
        // SAFETY: forwarded contract
        let ptr = unsafe { self.backend.mmap(addr, length, prot, flag, fd, offset) }?;
        // MAP_FAILED is (void *) -1
        if ptr.addr() == usize::MAX {
            return Err(PosixError::native_failure("mmap", self.backend.last_error()));
        }
        Ok(ptr)
    }

    /// Unmap a range returned by [`mmap`](Self::mmap)
    ///
    /// # Safety
    ///
    /// No reference into the range may outlive this call.
    pub unsafe fn munmap(&self, addr: *mut c_void, length: usize) -> PosixResult<()> {
        // SAFETY: forwarded contract
        let ret = unsafe { self.backend.munmap(addr, length) }?;
        self.checked("munmap", ret).map(|_| ())
    }

    /// Advise the kernel about expected use of a range
    ///
    /// # Safety
    ///
    /// The range must lie within a live mapping. Destructive advice such as
    /// [`MAdvice::DontNeed`] discards private contents.
    pub unsafe fn madvise(&self, addr: *mut c_void, length: usize, advice: MAdvice) -> PosixResult<()> {
        let advice = advice.to_native()?;
        // SAFETY: forwarded contract
        let ret = unsafe { self.backend.madvise(addr, length, advice) }?;
        self.checked("madvise", ret).map(|_| ())
    }

    /// Flush a shared mapping to its file
    ///
    /// # Safety
    ///
    /// The range must lie within a live mapping.
    pub unsafe fn msync(&self, addr: *mut c_void, length: usize, flags: MSyncFlags) -> PosixResult<()> {
        let flags = flags.to_native()?;
        // SAFETY: forwarded contract
        let ret = unsafe { self.backend.msync(addr, length, flags) }?;
        self.checked("msync", ret).map(|_| ())
    }

    // ==================== Memory locking ====================

    /// Lock a range into RAM
    ///
    /// `Ok(false)` means the lock limit was reached.
    ///
    /// # Safety
    ///
    /// The range must belong to this process.
    pub unsafe fn mlock(&self, addr: *const c_void, length: usize) -> PosixResult<bool> {
        // SAFETY: forwarded contract
        unsafe { lock_range(self.backend(), addr, length, false) }
    }

    /// Lock a range, deferring population to first fault when `on_fault`
    ///
    /// Degrades to [`mlock`](Self::mlock) where the fault-deferred variant is
    /// unavailable.
    ///
    /// # Safety
    ///
    /// The range must belong to this process.
    pub unsafe fn mlock2(&self, addr: *const c_void, length: usize, on_fault: bool) -> PosixResult<bool> {
        // SAFETY: forwarded contract
        unsafe { lock_range(self.backend(), addr, length, on_fault) }
    }

    /// Lock the address space of the process
    ///
    /// `Current` and `CurrentOnFault` are emulated region by region when the
    /// process map is readable; region failures are logged, not returned.
    /// Other flags go to the native `mlockall`.
    pub fn mlockall(&self, flags: MclFlags) -> PosixResult<()> {
        if flags.is_current() && self.capabilities().process_maps {
            let report = self.lock_all_mapped(flags.on_fault())?;
            if !report.is_complete() {
                debug!(failed = report.failed(), locked = report.locked(), "mlockall emulation was partial");
            }
            return Ok(());
        }

        let ret = self.backend.mlockall(flags.to_native()?)?;
        self.checked("mlockall", ret).map(|_| ())
    }

    /// Lock every accessible region of the live process map
    ///
    /// `Unsupported` when the backend cannot read the process map, so the
    /// no-op backend never looks at `/proc`.
    pub fn lock_all_mapped(&self, on_fault: bool) -> PosixResult<LockReport> {
        if !self.capabilities().process_maps {
            return Err(PosixError::unsupported("lock_all_mapped"));
        }
        MemoryLockEmulator::new(self.backend())
            .with_dump(self.config.dump_lock_attempts)
            .lock_all_mapped(on_fault)
    }

    // ==================== Space allocation ====================

    /// Preallocate file space through the fallback cascade
    ///
    /// `fallocate64` is only tried on 64-bit targets whose backend links it.
    pub fn fallocate(&self, fd: c_int, mode: c_int, offset: i64, length: i64) -> PosixResult<Preallocation> {
        SpaceAllocator::new(self.backend())
            .with_wide_addressing(IS_64_BIT && self.capabilities().wide_fallocate)
            .preallocate(fd, mode, offset, length)
    }

    /// Storage allocated to `path`, in KiB
    #[cfg(unix)]
    pub fn disk_usage(&self, path: impl AsRef<Path>) -> PosixResult<u64> {
        use crate::result::PosixIoResultExt;
        use std::os::unix::fs::MetadataExt;

        let metadata = std::fs::metadata(path).with_operation("disk usage")?;
        Ok(metadata.blocks() * 512 / 1024)
    }

    /// Storage allocated to `path`, in KiB
    #[cfg(not(unix))]
    pub fn disk_usage(&self, _path: impl AsRef<Path>) -> PosixResult<u64> {
        Err(PosixError::unsupported("disk usage"))
    }

    // ==================== Time ====================

    /// Wall-clock time in microseconds since the epoch
    pub fn gettimeofday(&self) -> PosixResult<i64> {
        let mut buf = self.stage(TIME_STRUCT_SIZE.max(mem::size_of::<libc::timeval>()))?;
        // SAFETY: the buffer is large enough for a native timeval
        let ret = unsafe { self.backend.gettimeofday(buf.as_mut_ptr()) }?;
        self.checked("gettimeofday", ret)?;

        let secs = buf.read_signed(
            mem::offset_of!(libc::timeval, tv_sec),
            field_width(|tv: &libc::timeval| &tv.tv_sec),
        )?;
        let micros = buf.read_signed(
            mem::offset_of!(libc::timeval, tv_usec),
            field_width(|tv: &libc::timeval| &tv.tv_usec),
        )?;
        Ok(secs * 1_000_000 + micros)
    }

    /// Time of `clock` in nanoseconds
    pub fn clock_gettime(&self, clock: ClockId) -> PosixResult<i64> {
        let clock_id = clock.to_native()?;
        let mut buf = self.stage(TIME_STRUCT_SIZE.max(mem::size_of::<libc::timespec>()))?;
        // SAFETY: the buffer is large enough for a native timespec
        let ret = unsafe { self.backend.clock_gettime(clock_id, buf.as_mut_ptr()) }?;
        if ret != 0 {
            return Err(PosixError::invalid_argument(format!(
                "clock_gettime({clock:?}) failed: {}",
                self.last_error_str()
            )));
        }

        let secs = buf.read_signed(
            mem::offset_of!(libc::timespec, tv_sec),
            field_width(|ts: &libc::timespec| &ts.tv_sec),
        )?;
        let nanos = buf.read_signed(
            mem::offset_of!(libc::timespec, tv_nsec),
            field_width(|ts: &libc::timespec| &ts.tv_nsec),
        )?;
        Ok(secs * 1_000_000_000 + nanos)
    }

    /// Wall-clock time in nanoseconds
    pub fn clock_gettime_realtime(&self) -> PosixResult<i64> {
        self.clock_gettime(ClockId::Realtime)
    }

    // ==================== Affinity ====================

    /// Apply `mask` to thread `pid` (0 for the calling thread)
    pub fn sched_setaffinity(&self, pid: c_int, mask: &AffinityMask) -> PosixResult<()> {
        self.require_affinity("sched_setaffinity")?;
        let mut buf = self.stage(mask.len())?;
        buf.write_bytes(0, mask.as_bytes())?;
        // SAFETY: `buf` holds `mask.len()` initialized bytes
        let ret = unsafe { self.backend.sched_setaffinity(pid, buf.len(), buf.as_ptr()) }?;
        if ret != 0 {
            return Err(PosixError::invalid_argument(format!(
                "sched_setaffinity({pid}, {mask:?}) failed: {}",
                self.last_error_str()
            )));
        }
        Ok(())
    }

    /// Mask of thread `pid` (0 for the calling thread)
    pub fn sched_getaffinity(&self, pid: c_int) -> PosixResult<AffinityMask> {
        self.require_affinity("sched_getaffinity")?;
        let size = affinity::mask_size(self.get_nprocs_conf()?);
        let mut buf = self.stage(size)?;
        // SAFETY: `buf` is writable for `size` bytes
        let ret = unsafe { self.backend.sched_getaffinity(pid, size, buf.as_mut_ptr()) }?;
        if ret != 0 {
            return Err(PosixError::invalid_argument(format!(
                "sched_getaffinity({pid}) failed: {}",
                self.last_error_str()
            )));
        }
        Ok(AffinityMask::from_bytes(buf.as_slice().to_vec()))
    }

    /// Bind thread `pid` to a single CPU
    pub fn sched_setaffinity_as(&self, pid: c_int, cpu: usize) -> PosixResult<()> {
        self.require_affinity("sched_setaffinity")?;
        let mask = AffinityMask::single(self.get_nprocs_conf()?, cpu)?;
        self.sched_setaffinity(pid, &mask)
    }

    /// Bind thread `pid` to CPUs `from..=to`
    pub fn sched_setaffinity_range(&self, pid: c_int, from: usize, to: usize) -> PosixResult<()> {
        self.require_affinity("sched_setaffinity")?;
        let mask = AffinityMask::range(self.get_nprocs_conf()?, from, to)?;
        self.sched_setaffinity(pid, &mask)
    }

    fn require_affinity(&self, operation: &'static str) -> PosixResult<()> {
        if self.capabilities().affinity { Ok(()) } else { Err(PosixError::unsupported(operation)) }
    }

    /// Runs of CPUs thread `pid` may use, e.g. `"0-3,6-6"`
    ///
    /// Never fails: a failed query yields `"na: "` and the last error number.
    pub fn sched_getaffinity_summary(&self, pid: c_int) -> String {
        let queried = self
            .get_nprocs_conf()
            .and_then(|nprocs| self.sched_getaffinity(pid).map(|mask| mask.summary(nprocs)));
        match queried {
            Ok(summary) => summary,
            Err(err) => {
                debug!(pid, error = %err, "affinity query failed");
                format!("na: {}", self.last_error())
            }
        }
    }

    // ==================== Processes ====================

    /// Online processors
    pub fn get_nprocs(&self) -> PosixResult<usize> {
        let ret = self.backend.get_nprocs()?;
        positive("get_nprocs", ret, self.backend())
    }

    /// Configured processors, read once per context
    pub fn get_nprocs_conf(&self) -> PosixResult<usize> {
        self.nprocs_conf
            .get_or_try_init(|| {
                let ret = self.backend.get_nprocs_conf()?;
                positive("get_nprocs_conf", ret, self.backend())
            })
            .copied()
    }

    /// Process id
    pub fn getpid(&self) -> PosixResult<i32> {
        self.backend.getpid()
    }

    /// Kernel thread id of the calling thread
    pub fn gettid(&self) -> PosixResult<i32> {
        let tid = self.backend.gettid()?;
        if tid < 0 {
            return Err(PosixError::invalid_argument(format!("gettid failed: {}", self.last_error_str())));
        }
        Ok(tid)
    }

    // ==================== Buffers and errors ====================

    /// Zeroed scratch buffer from the backend allocator
    pub fn stage(&self, len: usize) -> PosixResult<StagingBuffer<'_>> {
        StagingBuffer::new(self.backend(), len)
    }

    /// Text for an error number
    pub fn strerror(&self, code: c_int) -> Option<String> {
        self.backend.strerror(code)
    }

    /// Error number of the most recent failed call on this thread
    pub fn last_error(&self) -> c_int {
        self.backend.last_error()
    }

    /// Text for [`last_error`](Self::last_error), empty when there is none
    pub fn last_error_str(&self) -> String {
        self.strerror(self.last_error()).unwrap_or_default()
    }
}

fn positive(operation: &'static str, ret: c_int, backend: &dyn RawBackend) -> PosixResult<usize> {
    usize::try_from(ret)
        .ok()
        .filter(|count| *count > 0)
        .ok_or_else(|| PosixError::native_failure(operation, backend.last_error()))
}

#[cfg(unix)]
fn path_to_cstring(path: &Path) -> PosixResult<CString> {
    use std::os::unix::ffi::OsStrExt;

    CString::new(path.as_os_str().as_bytes()).or_invalid_argument(format!("path {path:?} contains a NUL byte"))
}

#[cfg(not(unix))]
fn path_to_cstring(path: &Path) -> PosixResult<CString> {
    let text = path
        .to_str()
        .ok_or_else(|| PosixError::invalid_argument(format!("path {path:?} is not valid UTF-8")))?;
    CString::new(text).or_invalid_argument(format!("path {path:?} contains a NUL byte"))
}
