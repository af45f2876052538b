//! Whole-process memory locking emulated region by region
//!
//! Where `mlockall(MCL_CURRENT)` is missing or too coarse, the emulator reads
//! the live map of the process and locks each accessible region on its own.
//! One region failing never stops the scan and nothing is rolled back:
//! partial success is the normal outcome, reported in a [`LockReport`].

use libc::{c_int, c_uint, c_void};
use tracing::{debug, info};

use crate::backend::RawBackend;
use crate::error::{PosixError, PosixResult};
use crate::maps::{MemoryRegion, ProcMaps};

/// `MLOCK_ONFAULT`: populate pages on first touch instead of up front
#[cfg(target_os = "linux")]
pub use libc::MLOCK_ONFAULT;

#[cfg(target_os = "linux")]
const ON_FAULT_FLAG: Option<c_uint> = Some(MLOCK_ONFAULT);
#[cfg(not(target_os = "linux"))]
const ON_FAULT_FLAG: Option<c_uint> = None;

/// Lock `length` bytes at `addr`
///
/// `Ok(true)` when locked, `Ok(false)` when the OS refused for lack of
/// lockable memory (`ENOMEM`), `Err` for any other failure. With `on_fault`
/// the fault-deferred variant is tried first and eager locking is used when
/// the backend does not have it.
///
/// # Safety
///
/// The range must belong to this process. Locking does not touch the
/// memory, but the backend contract requires a range the caller owns.
pub unsafe fn lock_range(backend: &dyn RawBackend, addr: *const c_void, length: usize, on_fault: bool) -> PosixResult<bool> {
    let attempt = match ON_FAULT_FLAG {
        Some(flag) if on_fault && backend.capabilities().mlock_on_fault => {
            // SAFETY: forwarded contract
            match unsafe { backend.mlock2(addr, length, flag) } {
                Err(err) if err.is_unsupported() => None,
                other => Some(("mlock2", other?)),
            }
        }
        _ => None,
    };

    let (operation, ret) = match attempt {
        Some(found) => found,
        // SAFETY: forwarded contract
        None => ("mlock", unsafe { backend.mlock(addr, length) }?),
    };

    classify_lock(operation, ret, backend.last_error())
}

fn classify_lock(operation: &'static str, ret: c_int, last_error: c_int) -> PosixResult<bool> {
    match ret {
        0 => Ok(true),
        _ if last_error == libc::ENOMEM => Ok(false),
        _ => Err(PosixError::native_failure(operation, last_error)),
    }
}

/// What happened to one region
#[derive(Debug)]
pub enum LockOutcome {
    /// Region is now locked
    Locked,
    /// The lock limit was reached (`ENOMEM`)
    LimitReached,
    /// Not attempted: no-access guard region
    Skipped,
    /// The OS rejected the request
    Failed(PosixError),
}

/// One entry of a [`LockReport`]
#[derive(Debug)]
pub struct LockAttempt {
    /// Region start address
    pub start: usize,
    /// Region length
    pub length: usize,
    /// Backing path, if any
    pub path: Option<String>,
    /// Result of the attempt
    pub outcome: LockOutcome,
}

/// Per-region results of a scan
#[derive(Debug, Default)]
pub struct LockReport {
    /// Every region seen, in address order
    pub attempts: Vec<LockAttempt>,
}

impl LockReport {
    /// Regions that ended up locked
    pub fn locked(&self) -> usize {
        self.count(|outcome| matches!(outcome, LockOutcome::Locked))
    }

    /// Regions that were attempted and not locked
    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, LockOutcome::Failed(_) | LockOutcome::LimitReached))
    }

    /// Regions left alone
    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, LockOutcome::Skipped))
    }

    /// Bytes successfully locked
    pub fn locked_bytes(&self) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| matches!(attempt.outcome, LockOutcome::Locked))
            .map(|attempt| attempt.length)
            .sum()
    }

    /// True when every attempted region was locked
    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, predicate: impl Fn(&LockOutcome) -> bool) -> usize {
        self.attempts.iter().filter(|attempt| predicate(&attempt.outcome)).count()
    }
}

/// Locks every accessible mapping of the current process
#[derive(Debug)]
pub struct MemoryLockEmulator<'a> {
    backend: &'a dyn RawBackend,
    dump: bool,
}

impl<'a> MemoryLockEmulator<'a> {
    /// Emulator over `backend`
    pub fn new(backend: &'a dyn RawBackend) -> Self {
        Self { backend, dump: false }
    }

    /// Log every attempt at `info` instead of `debug`
    pub fn with_dump(mut self, dump: bool) -> Self {
        self.dump = dump;
        self
    }

    /// Read the live map of this process and lock each region
    ///
    /// Fails only if the map cannot be read or parsed.
    pub fn lock_all_mapped(&self, on_fault: bool) -> PosixResult<LockReport> {
        let maps = ProcMaps::for_self()?;
        Ok(self.lock_regions(maps.list(), on_fault))
    }

    /// Lock each of `regions`, skipping `---p` guards
    pub fn lock_regions(&self, regions: &[MemoryRegion], on_fault: bool) -> LockReport {
        let attempts = regions
            .iter()
            .map(|region| {
                let outcome = self.lock_one(region, on_fault);
                self.report(region, &outcome);
                LockAttempt { start: region.start, length: region.length, path: region.path.clone(), outcome }
            })
            .collect();

        let report = LockReport { attempts };
        debug!(
            locked = report.locked(),
            failed = report.failed(),
            skipped = report.skipped(),
            locked_kib = report.locked_bytes() / 1024,
            "memory lock scan finished"
        );
        report
    }

    fn lock_one(&self, region: &MemoryRegion, on_fault: bool) -> LockOutcome {
        if region.is_no_access() {
            return LockOutcome::Skipped;
        }
        let addr = std::ptr::with_exposed_provenance::<c_void>(region.start);
        // SAFETY: the region comes from this process's own map
        match unsafe { lock_range(self.backend, addr, region.length, on_fault) } {
            Ok(true) => LockOutcome::Locked,
            Ok(false) => LockOutcome::LimitReached,
            Err(err) => LockOutcome::Failed(err),
        }
    }

    fn report(&self, region: &MemoryRegion, outcome: &LockOutcome) {
        let kib = region.length / 1024;
        let path = region.path.as_deref().unwrap_or("");
        if self.dump {
            info!(start = format_args!("{:#x}", region.start), kib, path, ?outcome, "mlock region");
        } else {
            debug!(start = format_args!("{:#x}", region.start), kib, path, ?outcome, "mlock region");
        }
    }
}
