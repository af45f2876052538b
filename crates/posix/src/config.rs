//! Runtime configuration for backend resolution

use crate::error::{PosixError, PosixResult};

/// Environment variable that forces the no-op backend
pub const ENV_FORCE_NOOP: &str = "NEBULA_POSIX_NOOP";
/// Environment variable that wraps the backend in call tracing
pub const ENV_TRACE_CALLS: &str = "NEBULA_POSIX_TRACE";
/// Environment variable that surfaces every per-region lock attempt
pub const ENV_DUMP_LOCK_ATTEMPTS: &str = "NEBULA_POSIX_MLOCK_DUMP";

/// Configuration consumed by [`CapabilityResolver`](crate::CapabilityResolver)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PosixConfig {
    /// Skip native detection and use the no-op backend
    pub force_noop: bool,
    /// Emit a `trace!` event for every primitive call
    pub trace_calls: bool,
    /// Log every region attempted by the memory-lock emulator at `info`
    pub dump_lock_attempts: bool,
}

impl PosixConfig {
    /// Create default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> PosixResult<Self> {
        let mut config = Self::default();

        if let Some(value) = read_flag(ENV_FORCE_NOOP)? {
            config.force_noop = value;
        }
        if let Some(value) = read_flag(ENV_TRACE_CALLS)? {
            config.trace_calls = value;
        }
        if let Some(value) = read_flag(ENV_DUMP_LOCK_ATTEMPTS)? {
            config.dump_lock_attempts = value;
        }

        Ok(config)
    }

    /// Force the no-op backend
    pub fn with_force_noop(mut self, enabled: bool) -> Self {
        self.force_noop = enabled;
        self
    }

    /// Enable call tracing
    pub fn with_trace_calls(mut self, enabled: bool) -> Self {
        self.trace_calls = enabled;
        self
    }

    /// Enable per-region lock attempt logging
    pub fn with_dump_lock_attempts(mut self, enabled: bool) -> Self {
        self.dump_lock_attempts = enabled;
        self
    }
}

fn read_flag(name: &str) -> PosixResult<Option<bool>> {
    match std::env::var(name) {
        Ok(raw) => parse_flag(&raw)
            .map(Some)
            .ok_or_else(|| PosixError::invalid_argument(format!("Invalid {name}: {raw:?}"))),
        Err(_) => Ok(None),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
