//! Prelude module for convenient imports
//!
//! # Example
//!
//! ```rust
//! use nebula_posix::prelude::*;
//!
//! fn main() -> PosixResult<()> {
//!     let posix = CapabilityResolver::new(PosixConfig::new().with_force_noop(true)).resolve();
//!     assert_eq!(posix.kind(), BackendKind::NoOp);
//!     Ok(())
//! }
//! ```

// Core types
pub use crate::error::{PosixError, PosixResult};
pub use crate::result::{PosixIoResultExt, PosixResultExt};

// Context and resolution
pub use crate::api::Posix;
pub use crate::backend::{BackendKind, Capabilities, RawBackend};
pub use crate::config::PosixConfig;
pub use crate::resolver::{CapabilityResolver, posix, use_noop_posix};

// Flags
pub use crate::flags::{ClockId, LockfCmd, MAdvice, MMapFlag, MMapProt, MSyncFlags, MclFlags, OpenFlags, Whence};

// Composite operations
pub use crate::affinity::AffinityMask;
pub use crate::allocate::Preallocation;
pub use crate::maps::{MemoryRegion, ProcMaps};
pub use crate::mlock::LockReport;
