//! Typed flag tables
//!
//! Each type maps to the native constant of the running platform through
//! `to_native()`. A value the platform does not define resolves to
//! [`PosixError::Unsupported`] instead of a guessed number.

use bitflags::bitflags;
use libc::c_int;

use crate::error::{PosixError, PosixResult};

bitflags! {
    /// Flags accepted by [`Posix::open`](crate::Posix::open)
    ///
    /// `RDONLY` is the empty set, matching `O_RDONLY == 0`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        /// Write only
        const WRONLY = 1 << 0;
        /// Read and write
        const RDWR = 1 << 1;
        /// Non-blocking I/O
        const NONBLOCK = 1 << 2;
        /// Append on each write
        const APPEND = 1 << 3;
        /// Create if missing
        const CREAT = 1 << 4;
        /// Truncate to zero length
        const TRUNC = 1 << 5;
        /// Fail if the file exists (with `CREAT`)
        const EXCL = 1 << 6;
        /// Synchronous writes
        const SYNC = 1 << 7;
    }
}

impl OpenFlags {
    /// Read only
    pub const RDONLY: Self = Self::empty();

    /// Convert to the platform `open(2)` flags
    pub fn to_native(self) -> PosixResult<c_int> {
        let mut native = libc::O_RDONLY;
        let table: [(Self, Option<c_int>); 8] = [
            (Self::WRONLY, Some(libc::O_WRONLY)),
            (Self::RDWR, Some(libc::O_RDWR)),
            (Self::NONBLOCK, native_nonblock()),
            (Self::APPEND, Some(libc::O_APPEND)),
            (Self::CREAT, Some(libc::O_CREAT)),
            (Self::TRUNC, Some(libc::O_TRUNC)),
            (Self::EXCL, Some(libc::O_EXCL)),
            (Self::SYNC, native_sync()),
        ];
        for (flag, value) in table {
            if self.contains(flag) {
                native |= value.ok_or(PosixError::unsupported("open flag"))?;
            }
        }
        #[cfg(windows)]
        {
            native |= libc::O_BINARY;
        }
        Ok(native)
    }
}

#[cfg(unix)]
fn native_nonblock() -> Option<c_int> {
    Some(libc::O_NONBLOCK)
}

#[cfg(not(unix))]
fn native_nonblock() -> Option<c_int> {
    None
}

#[cfg(unix)]
fn native_sync() -> Option<c_int> {
    Some(libc::O_SYNC)
}

#[cfg(not(unix))]
fn native_sync() -> Option<c_int> {
    None
}

bitflags! {
    /// Flags accepted by `msync`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MSyncFlags: u32 {
        /// Schedule the write and return
        const ASYNC = 1 << 0;
        /// Invalidate other mappings of the same file
        const INVALIDATE = 1 << 1;
        /// Write and wait for completion
        const SYNC = 1 << 2;
    }
}

impl MSyncFlags {
    /// Convert to the platform `msync(2)` flags
    #[cfg(unix)]
    pub fn to_native(self) -> PosixResult<c_int> {
        let mut native = 0;
        if self.contains(Self::ASYNC) {
            native |= libc::MS_ASYNC;
        }
        if self.contains(Self::INVALIDATE) {
            native |= libc::MS_INVALIDATE;
        }
        if self.contains(Self::SYNC) {
            native |= libc::MS_SYNC;
        }
        Ok(native)
    }

    /// Convert to the platform `msync(2)` flags
    #[cfg(not(unix))]
    pub fn to_native(self) -> PosixResult<c_int> {
        Ok(self.bits() as c_int)
    }
}

/// Reference point for `lseek`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Whence {
    /// From the start of the file
    Set,
    /// From the current offset
    Cur,
    /// From the end of the file
    End,
    /// Next data region at or after the offset
    Data,
    /// Next hole at or after the offset
    Hole,
}

impl Whence {
    /// Convert to the platform `SEEK_*` constant
    pub fn to_native(self) -> PosixResult<c_int> {
        match self {
            Self::Set => Ok(libc::SEEK_SET),
            Self::Cur => Ok(libc::SEEK_CUR),
            Self::End => Ok(libc::SEEK_END),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Self::Data => Ok(libc::SEEK_DATA),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Self::Hole => Ok(libc::SEEK_HOLE),
            #[cfg(not(any(target_os = "linux", target_os = "android")))]
            Self::Data | Self::Hole => Err(PosixError::unsupported("lseek whence")),
        }
    }
}

/// Memory protection for `mmap`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MMapProt {
    /// Readable
    Read,
    /// Writable
    Write,
    /// Readable and writable
    ReadWrite,
    /// Executable
    Exec,
    /// Readable and executable
    ExecRead,
    /// No access
    None,
}

impl MMapProt {
    /// Convert to the platform `PROT_*` bits
    #[cfg(unix)]
    pub fn to_native(self) -> PosixResult<c_int> {
        use libc::{PROT_EXEC, PROT_NONE, PROT_READ, PROT_WRITE};

        Ok(match self {
            Self::Read => PROT_READ,
            Self::Write => PROT_WRITE,
            Self::ReadWrite => PROT_READ | PROT_WRITE,
            Self::Exec => PROT_EXEC,
            Self::ExecRead => PROT_EXEC | PROT_READ,
            Self::None => PROT_NONE,
        })
    }

    /// Convert to the platform `PROT_*` bits
    #[cfg(not(unix))]
    pub fn to_native(self) -> PosixResult<c_int> {
        Err(PosixError::unsupported("mmap protection"))
    }
}

/// Sharing mode for `mmap`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MMapFlag {
    /// Writes are visible to other mappings and carried to the file
    Shared,
    /// Copy-on-write private mapping
    Private,
}

impl MMapFlag {
    /// Convert to the platform `MAP_*` constant
    #[cfg(unix)]
    pub fn to_native(self) -> PosixResult<c_int> {
        Ok(match self {
            Self::Shared => libc::MAP_SHARED,
            Self::Private => libc::MAP_PRIVATE,
        })
    }

    /// Convert to the platform `MAP_*` constant
    #[cfg(not(unix))]
    pub fn to_native(self) -> PosixResult<c_int> {
        Err(PosixError::unsupported("mmap flag"))
    }
}

/// Advice for `madvise`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MAdvice {
    /// No special treatment
    Normal,
    /// Expect random page references
    Random,
    /// Expect sequential page references
    Sequential,
    /// Pages will be needed soon
    WillNeed,
    /// Pages will not be needed soon
    DontNeed,
    /// Pages may be freed lazily
    Free,
    /// Free the range and its backing store
    Remove,
    /// Do not inherit across fork
    DontFork,
    /// Undo `DontFork`
    DoFork,
    /// Candidate for same-page merging
    Mergeable,
    /// Undo `Mergeable`
    Unmergeable,
    /// Prefer transparent huge pages
    HugePage,
    /// Avoid transparent huge pages
    NoHugePage,
    /// Exclude from core dumps
    DontDump,
    /// Undo `DontDump`
    DoDump,
    /// Zero-fill in the child after fork
    WipeOnFork,
    /// Undo `WipeOnFork`
    KeepOnFork,
}

impl MAdvice {
    /// Convert to the platform `MADV_*` constant
    pub fn to_native(self) -> PosixResult<c_int> {
        self.native().ok_or(PosixError::unsupported("madvise advice"))
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn native(self) -> Option<c_int> {
        Some(match self {
            Self::Normal => libc::MADV_NORMAL,
            Self::Random => libc::MADV_RANDOM,
            Self::Sequential => libc::MADV_SEQUENTIAL,
            Self::WillNeed => libc::MADV_WILLNEED,
            Self::DontNeed => libc::MADV_DONTNEED,
            Self::Free => libc::MADV_FREE,
            Self::Remove => libc::MADV_REMOVE,
            Self::DontFork => libc::MADV_DONTFORK,
            Self::DoFork => libc::MADV_DOFORK,
            Self::Mergeable => libc::MADV_MERGEABLE,
            Self::Unmergeable => libc::MADV_UNMERGEABLE,
            Self::HugePage => libc::MADV_HUGEPAGE,
            Self::NoHugePage => libc::MADV_NOHUGEPAGE,
            Self::DontDump => libc::MADV_DONTDUMP,
            Self::DoDump => libc::MADV_DODUMP,
            Self::WipeOnFork => libc::MADV_WIPEONFORK,
            Self::KeepOnFork => libc::MADV_KEEPONFORK,
        })
    }

    #[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
    fn native(self) -> Option<c_int> {
        match self {
            Self::Normal => Some(libc::MADV_NORMAL),
            Self::Random => Some(libc::MADV_RANDOM),
            Self::Sequential => Some(libc::MADV_SEQUENTIAL),
            Self::WillNeed => Some(libc::MADV_WILLNEED),
            Self::DontNeed => Some(libc::MADV_DONTNEED),
            _ => None,
        }
    }

    // Advice is accepted and ignored where madvise is stubbed.
    #[cfg(not(unix))]
    fn native(self) -> Option<c_int> {
        Some(self as c_int)
    }
}

/// Command for `lockf`
///
/// The XSI values are the same on every Unix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LockfCmd {
    /// Unlock a section
    Unlock = 0,
    /// Lock a section, blocking
    Lock = 1,
    /// Lock a section, failing if already locked
    TryLock = 2,
    /// Test a section for locks held by other processes
    Test = 3,
}

impl LockfCmd {
    /// Native `F_*` value
    pub fn to_native(self) -> c_int {
        self as c_int
    }
}

/// Flags for `mlockall`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MclFlags {
    /// Lock every page currently mapped
    Current,
    /// Lock every page mapped in the future
    Future,
    /// `Current`, populating pages on first fault
    CurrentOnFault,
    /// `Future`, populating pages on first fault
    FutureOnFault,
}

impl MclFlags {
    /// Whether the request only concerns pages mapped right now
    pub fn is_current(self) -> bool {
        matches!(self, Self::Current | Self::CurrentOnFault)
    }

    /// Whether pages should be populated lazily
    pub fn on_fault(self) -> bool {
        matches!(self, Self::CurrentOnFault | Self::FutureOnFault)
    }

    /// Convert to the platform `MCL_*` bits
    pub fn to_native(self) -> PosixResult<c_int> {
        let base = match self {
            Self::Current | Self::CurrentOnFault => mcl_current(),
            Self::Future | Self::FutureOnFault => mcl_future(),
        }
        .ok_or(PosixError::unsupported("mlockall"))?;
        if self.on_fault() {
            return Ok(base | mcl_onfault().ok_or(PosixError::unsupported("mlockall on fault"))?);
        }
        Ok(base)
    }
}

#[cfg(unix)]
fn mcl_current() -> Option<c_int> {
    Some(libc::MCL_CURRENT)
}

#[cfg(unix)]
fn mcl_future() -> Option<c_int> {
    Some(libc::MCL_FUTURE)
}

#[cfg(not(unix))]
fn mcl_current() -> Option<c_int> {
    None
}

#[cfg(not(unix))]
fn mcl_future() -> Option<c_int> {
    None
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn mcl_onfault() -> Option<c_int> {
    Some(libc::MCL_ONFAULT)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn mcl_onfault() -> Option<c_int> {
    None
}

/// Clock sources for `clock_gettime`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockId {
    /// Wall clock
    Realtime,
    /// Monotonic clock, slewed by NTP
    Monotonic,
    /// CPU time consumed by the process
    ProcessCpuTime,
    /// CPU time consumed by the calling thread
    ThreadCpuTime,
    /// Monotonic clock without NTP slewing
    MonotonicRaw,
    /// Low-resolution wall clock
    RealtimeCoarse,
    /// Low-resolution monotonic clock
    MonotonicCoarse,
    /// Monotonic clock including suspend time
    Boottime,
    /// `Realtime` that wakes a suspended system
    RealtimeAlarm,
    /// `Boottime` that wakes a suspended system
    BoottimeAlarm,
}

impl ClockId {
    /// Convert to the platform clock id
    pub fn to_native(self) -> PosixResult<c_int> {
        self.native().ok_or(PosixError::unsupported("clock_gettime clock"))
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn native(self) -> Option<c_int> {
        Some(match self {
            Self::Realtime => libc::CLOCK_REALTIME,
            Self::Monotonic => libc::CLOCK_MONOTONIC,
            Self::ProcessCpuTime => libc::CLOCK_PROCESS_CPUTIME_ID,
            Self::ThreadCpuTime => libc::CLOCK_THREAD_CPUTIME_ID,
            Self::MonotonicRaw => libc::CLOCK_MONOTONIC_RAW,
            Self::RealtimeCoarse => libc::CLOCK_REALTIME_COARSE,
            Self::MonotonicCoarse => libc::CLOCK_MONOTONIC_COARSE,
            Self::Boottime => libc::CLOCK_BOOTTIME,
            Self::RealtimeAlarm => libc::CLOCK_REALTIME_ALARM,
            Self::BoottimeAlarm => libc::CLOCK_BOOTTIME_ALARM,
        })
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    fn native(self) -> Option<c_int> {
        match self {
            Self::Realtime => Some(libc::CLOCK_REALTIME as c_int),
            Self::Monotonic => Some(libc::CLOCK_MONOTONIC as c_int),
            Self::ProcessCpuTime => Some(libc::CLOCK_PROCESS_CPUTIME_ID as c_int),
            Self::ThreadCpuTime => Some(libc::CLOCK_THREAD_CPUTIME_ID as c_int),
            Self::MonotonicRaw => Some(libc::CLOCK_MONOTONIC_RAW as c_int),
            _ => None,
        }
    }

    #[cfg(all(
        unix,
        not(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios"))
    ))]
    fn native(self) -> Option<c_int> {
        match self {
            Self::Realtime => Some(libc::CLOCK_REALTIME as c_int),
            Self::Monotonic => Some(libc::CLOCK_MONOTONIC as c_int),
            _ => None,
        }
    }

    // The Windows backend synthesizes both clocks from the system time.
    #[cfg(not(unix))]
    fn native(self) -> Option<c_int> {
        match self {
            Self::Realtime => Some(0),
            Self::Monotonic => Some(1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rdonly_is_zero() {
        assert_eq!(OpenFlags::RDONLY.to_native().unwrap() & (libc::O_WRONLY | libc::O_RDWR), 0);
    }

    #[test]
    fn test_lockf_values() {
        assert_eq!(LockfCmd::Unlock.to_native(), 0);
        assert_eq!(LockfCmd::Test.to_native(), 3);
    }

    #[test]
    fn test_mcl_classification() {
        assert!(MclFlags::Current.is_current());
        assert!(MclFlags::CurrentOnFault.is_current());
        assert!(MclFlags::CurrentOnFault.on_fault());
        assert!(!MclFlags::Future.is_current());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_native_values() {
        assert_eq!(
            (OpenFlags::CREAT | OpenFlags::RDWR).to_native().unwrap(),
            libc::O_CREAT | libc::O_RDWR
        );
        assert_eq!(Whence::Hole.to_native().unwrap(), libc::SEEK_HOLE);
        assert_eq!(MclFlags::CurrentOnFault.to_native().unwrap(), libc::MCL_CURRENT | libc::MCL_ONFAULT);
        assert_eq!(ClockId::Boottime.to_native().unwrap(), libc::CLOCK_BOOTTIME);
        assert_eq!(
            (MSyncFlags::SYNC | MSyncFlags::INVALIDATE).to_native().unwrap(),
            libc::MS_SYNC | libc::MS_INVALIDATE
        );
    }
}
