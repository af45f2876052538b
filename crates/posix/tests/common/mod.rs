//! Common test utilities for nebula-posix

#![allow(dead_code)]

use std::collections::HashSet;

use libc::{c_int, c_uint, c_void};
use nebula_posix::{BackendKind, Capabilities, PosixError, PosixResult, RawBackend};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Backend whose responses are fixed up front and whose calls are recorded
///
/// A `None` response means the primitive is unsupported.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    capabilities: Capabilities,
    fallocate64: Option<c_int>,
    fallocate: Option<c_int>,
    posix_fallocate: Option<c_int>,
    flock_lock: Option<c_int>,
    flock_unlock: Option<c_int>,
    mlockall: Option<c_int>,
    mlock2_supported: bool,
    nprocs_conf: Option<c_int>,
    affinity: Option<Vec<u8>>,
    failing_locks: HashSet<usize>,
    errno: c_int,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_fallocate64(mut self, ret: Option<c_int>) -> Self {
        self.fallocate64 = ret;
        self
    }

    pub fn with_fallocate(mut self, ret: Option<c_int>) -> Self {
        self.fallocate = ret;
        self
    }

    pub fn with_posix_fallocate(mut self, ret: Option<c_int>) -> Self {
        self.posix_fallocate = ret;
        self
    }

    pub fn with_flock(mut self, lock: Option<c_int>, unlock: Option<c_int>) -> Self {
        self.flock_lock = lock;
        self.flock_unlock = unlock;
        self
    }

    pub fn with_mlockall(mut self, ret: Option<c_int>) -> Self {
        self.mlockall = ret;
        self
    }

    pub fn with_mlock2(mut self, supported: bool) -> Self {
        self.mlock2_supported = supported;
        self
    }

    pub fn with_nprocs_conf(mut self, nprocs: c_int) -> Self {
        self.nprocs_conf = Some(nprocs);
        self
    }

    /// `sched_getaffinity` succeeds and fills the mask with `mask`
    pub fn with_affinity(mut self, mask: &[u8]) -> Self {
        self.affinity = Some(mask.to_vec());
        self
    }

    /// Make `mlock`/`mlock2` at `addr` fail with the configured errno
    pub fn failing_lock_at(mut self, addr: usize) -> Self {
        self.failing_locks.insert(addr);
        self
    }

    pub fn with_errno(mut self, errno: c_int) -> Self {
        self.errno = errno;
        self
    }

    /// Calls seen so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn respond(&self, operation: &'static str, ret: Option<c_int>) -> PosixResult<c_int> {
        ret.ok_or_else(|| PosixError::unsupported(operation))
    }

    fn lock_result(&self, addr: *const c_void) -> c_int {
        if self.failing_locks.contains(&addr.addr()) { -1 } else { 0 }
    }
}

impl RawBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NoOp
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    #[cfg(unix)]
    fn flock(&self, fd: c_int, operation: c_int) -> PosixResult<c_int> {
        self.record(format!("flock({fd}, {operation})"));
        if operation == nebula_posix::allocate::LOCK_UN {
            self.respond("flock", self.flock_unlock)
        } else {
            self.respond("flock", self.flock_lock)
        }
    }

    unsafe fn mlock(&self, addr: *const c_void, length: usize) -> PosixResult<c_int> {
        self.record(format!("mlock({:#x}, {length})", addr.addr()));
        Ok(self.lock_result(addr))
    }

    unsafe fn mlock2(&self, addr: *const c_void, length: usize, flags: c_uint) -> PosixResult<c_int> {
        self.record(format!("mlock2({:#x}, {length}, {flags})", addr.addr()));
        if !self.mlock2_supported {
            return Err(PosixError::unsupported("mlock2"));
        }
        Ok(self.lock_result(addr))
    }

    fn mlockall(&self, flags: c_int) -> PosixResult<c_int> {
        self.record(format!("mlockall({flags})"));
        self.respond("mlockall", self.mlockall)
    }

    fn fallocate64(&self, fd: c_int, mode: c_int, offset: i64, length: i64) -> PosixResult<c_int> {
        self.record(format!("fallocate64({fd}, {mode}, {offset}, {length})"));
        self.respond("fallocate64", self.fallocate64)
    }

    fn fallocate(&self, fd: c_int, mode: c_int, offset: i64, length: i64) -> PosixResult<c_int> {
        self.record(format!("fallocate({fd}, {mode}, {offset}, {length})"));
        self.respond("fallocate", self.fallocate)
    }

    fn posix_fallocate(&self, fd: c_int, offset: i64, length: i64) -> PosixResult<c_int> {
        self.record(format!("posix_fallocate({fd}, {offset}, {length})"));
        self.respond("posix_fallocate", self.posix_fallocate)
    }

    unsafe fn sched_getaffinity(&self, pid: c_int, size: usize, mask: *mut c_void) -> PosixResult<c_int> {
        self.record(format!("sched_getaffinity({pid}, {size})"));
        let Some(bytes) = &self.affinity else {
            return Err(PosixError::unsupported("sched_getaffinity"));
        };
        let count = bytes.len().min(size);
        // SAFETY: the caller provides `size` writable bytes
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), mask.cast::<u8>(), count) };
        Ok(0)
    }

    fn get_nprocs_conf(&self) -> PosixResult<c_int> {
        self.record("get_nprocs_conf()".to_owned());
        self.respond("get_nprocs_conf", self.nprocs_conf)
    }

    fn malloc(&self, size: usize) -> PosixResult<*mut c_void> {
        // SAFETY: malloc has no preconditions
        Ok(unsafe { libc::malloc(size) })
    }

    unsafe fn free(&self, ptr: *mut c_void) -> PosixResult<()> {
        // SAFETY: `ptr` came from `malloc` above
        unsafe { libc::free(ptr) };
        Ok(())
    }

    fn last_error(&self) -> c_int {
        self.errno
    }
}
