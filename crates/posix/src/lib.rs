//! Cross-platform POSIX primitives for Nebula ecosystem
//!
//! This crate provides one uniform surface for:
//! - File descriptor I/O (open, seek, truncate, read, write, lockf)
//! - Memory mapping, advice, syncing and locking
//! - Whole-process memory locking emulated from the process map
//! - File-space preallocation with a fallback cascade
//! - CPU affinity masks and human-readable summaries
//! - High-resolution clocks, process and thread ids
//!
//! The backend is picked once per context: libc on Unix-likes, the CRT and
//! Kernel32 on Windows, and a no-op stand-in when neither can be used or
//! when `NEBULA_POSIX_NOOP=true`. Primitives a backend lacks report
//! [`PosixError::Unsupported`] instead of failing the process.
//!
//! # Configuration
//!
//! - `NEBULA_POSIX_NOOP`: force the no-op backend
//! - `NEBULA_POSIX_TRACE`: emit a `trace!` event per primitive call
//! - `NEBULA_POSIX_MLOCK_DUMP`: log each region locked by `mlockall`
//!
//! # Example
//!
//! ```no_run
//! use nebula_posix::{ClockId, OpenFlags};
//!
//! fn main() -> nebula_posix::Result<()> {
//!     let posix = nebula_posix::posix();
//!
//!     let fd = posix.open("/tmp/data.bin", OpenFlags::CREAT | OpenFlags::RDWR, 0o644)?;
//!     let allocated = posix.fallocate(fd, 0, 0, 1 << 20)?;
//!     println!("preallocated: {allocated:?}");
//!     posix.close(fd)?;
//!
//!     posix.sched_setaffinity_range(0, 0, 1)?;
//!     println!("running on CPUs {}", posix.sched_getaffinity_summary(0));
//!     println!("now: {} ns", posix.clock_gettime(ClockId::Monotonic)?);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![allow(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod affinity;
pub mod allocate;
pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod flags;
pub mod maps;
pub mod mlock;
pub mod prelude;
pub mod resolver;
pub mod result;
pub mod staging;

// Re-exports
pub use affinity::AffinityMask;
pub use allocate::{Preallocation, SpaceAllocator, Strategy};
pub use api::Posix;
pub use backend::{BackendKind, Capabilities, NoOpBackend, RawBackend, TracingBackend};
pub use config::PosixConfig;
pub use error::{PosixError, PosixResult, Result};
pub use flags::{ClockId, LockfCmd, MAdvice, MMapFlag, MMapProt, MSyncFlags, MclFlags, OpenFlags, Whence};
pub use maps::{MemoryRegion, ProcMaps};
pub use mlock::{LockOutcome, LockReport, MemoryLockEmulator};
pub use resolver::{CapabilityResolver, PlatformFamily, posix, use_noop_posix};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
