//! Backend selection and the process-wide handle

use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::api::Posix;
use crate::backend::{NoOpBackend, RawBackend, TracingBackend};
use crate::config::PosixConfig;
use crate::error::{PosixError, PosixResult};

/// Platform family used to pick a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformFamily {
    /// Linux, macOS, the BSDs and other Unix-likes
    Unix,
    /// Microsoft Windows
    Windows,
    /// Anything else
    Unknown,
}

impl PlatformFamily {
    /// Family of the running target
    pub fn current() -> Self {
        match std::env::consts::FAMILY {
            "unix" => Self::Unix,
            "windows" => Self::Windows,
            _ => Self::Unknown,
        }
    }
}

/// Picks exactly one backend for a [`Posix`] context
///
/// Native instantiation failures never escape: the resolver falls back to
/// [`NoOpBackend`] and keeps the failure text as its reason.
#[derive(Debug, Clone, Default)]
pub struct CapabilityResolver {
    config: PosixConfig,
}

impl CapabilityResolver {
    /// Resolver with explicit configuration
    pub fn new(config: PosixConfig) -> Self {
        Self { config }
    }

    /// Resolver configured from `NEBULA_POSIX_*` variables
    ///
    /// An unparsable variable is logged and the defaults are used.
    pub fn from_env() -> Self {
        let config = PosixConfig::from_env().unwrap_or_else(|err| {
            warn!(error = %err, "ignoring invalid POSIX configuration");
            PosixConfig::default()
        });
        Self::new(config)
    }

    /// Configuration in use
    pub fn config(&self) -> &PosixConfig {
        &self.config
    }

    /// Detect the platform and build a context
    pub fn resolve(&self) -> Posix {
        let family = PlatformFamily::current();
        let backend: Arc<dyn RawBackend> = if self.config.force_noop {
            Arc::new(NoOpBackend::new(NoOpBackend::EXPLICITLY_DISABLED))
        } else {
            match instantiate(family) {
                Ok(backend) => backend,
                Err(err) => {
                    warn!(?family, error = %err, "native POSIX backend unavailable, using no-op");
                    Arc::new(NoOpBackend::new(err.to_string()))
                }
            }
        };

        info!(?family, backend = %backend.kind(), reason = backend.reason(), "resolved POSIX backend");

        let backend: Arc<dyn RawBackend> =
            if self.config.trace_calls { Arc::new(TracingBackend::new(backend)) } else { backend };
        Posix::with_config(backend, self.config.clone())
    }
}

fn instantiate(family: PlatformFamily) -> PosixResult<Arc<dyn RawBackend>> {
    match family {
        #[cfg(unix)]
        PlatformFamily::Unix => Ok(Arc::new(crate::backend::UnixBackend::new()?)),
        #[cfg(windows)]
        PlatformFamily::Windows => Ok(Arc::new(crate::backend::WindowsBackend::new()?)),
        _ => Err(PosixError::unsupported("native backend")),
    }
}

static GLOBAL_POSIX: LazyLock<RwLock<Option<Arc<Posix>>>> = LazyLock::new(|| RwLock::new(None));

/// Process-wide context, resolved from the environment on first use
pub fn posix() -> Arc<Posix> {
    if let Some(posix) = GLOBAL_POSIX.read().as_ref() {
        return Arc::clone(posix);
    }
    let mut slot = GLOBAL_POSIX.write();
    Arc::clone(slot.get_or_insert_with(|| Arc::new(CapabilityResolver::from_env().resolve())))
}

/// Replace the process-wide context with the no-op backend
///
/// Takes effect for every later [`posix()`] call; handles already cloned
/// keep their backend.
pub fn use_noop_posix() {
    *GLOBAL_POSIX.write() = Some(Arc::new(Posix::noop(NoOpBackend::EXPLICITLY_DISABLED)));
}
