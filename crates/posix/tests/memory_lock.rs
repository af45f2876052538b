//! Integration tests for region-by-region memory locking.

mod common;

use std::sync::Arc;

use common::{ScriptedBackend, init_tracing};
use nebula_posix::{Capabilities, LockOutcome, MclFlags, MemoryLockEmulator, Posix, ProcMaps};
use pretty_assertions::assert_eq;

const MAPS: &str = "\
00400000-00401000 r-xp 00000000 08:01 1048602    /usr/bin/app
00401000-00403000 rw-p 00001000 08:01 1048602    /usr/bin/app
00403000-00404000 ---p 00000000 00:00 0
00404000-00408000 rw-p 00000000 00:00 0          [heap]
";

fn regions() -> ProcMaps {
    ProcMaps::parse(MAPS).unwrap()
}

#[cfg(target_os = "linux")]
fn on_fault_capable() -> Capabilities {
    Capabilities { mlock_on_fault: true, ..Capabilities::default() }
}

/// Guard regions are skipped and every other region is attempted
#[test]
fn test_skips_no_access_regions() {
    init_tracing();
    let backend = ScriptedBackend::new();

    let report = MemoryLockEmulator::new(&backend).lock_regions(regions().list(), false);

    assert_eq!(report.attempts.len(), 4);
    assert_eq!(report.locked(), 3);
    assert_eq!(report.skipped(), 1);
    assert!(matches!(report.attempts[2].outcome, LockOutcome::Skipped));
    assert_eq!(report.locked_bytes(), 0x1000 + 0x2000 + 0x4000);
    assert_eq!(
        backend.calls(),
        vec!["mlock(0x400000, 4096)", "mlock(0x401000, 8192)", "mlock(0x404000, 16384)"]
    );
}

/// One rejected region does not stop the scan
#[test]
fn test_failure_does_not_abort() {
    let backend = ScriptedBackend::new().failing_lock_at(0x40_1000).with_errno(libc::EPERM);

    let report = MemoryLockEmulator::new(&backend).lock_regions(regions().list(), false);

    assert_eq!(report.locked(), 2);
    assert_eq!(report.failed(), 1);
    assert!(!report.is_complete());
    match &report.attempts[1].outcome {
        LockOutcome::Failed(err) => assert_eq!(err.os_error_code(), Some(libc::EPERM)),
        other => panic!("expected a failure, got {other:?}"),
    }
    assert!(matches!(report.attempts[3].outcome, LockOutcome::Locked));
}

/// ENOMEM is reported as the lock limit, not as a failure of the scan
#[test]
fn test_limit_reached() {
    let backend = ScriptedBackend::new().failing_lock_at(0x40_4000).with_errno(libc::ENOMEM);

    let report = MemoryLockEmulator::new(&backend).lock_regions(regions().list(), false);

    assert!(matches!(report.attempts[3].outcome, LockOutcome::LimitReached));
    assert_eq!(report.attempts[3].path.as_deref(), Some("[heap]"));
    assert_eq!(report.locked(), 2);
}

/// On-fault locking uses mlock2 when the backend has it
#[cfg(target_os = "linux")]
#[test]
fn test_on_fault_uses_mlock2() {
    let backend = ScriptedBackend::new().with_capabilities(on_fault_capable()).with_mlock2(true);
    let maps = ProcMaps::parse("00400000-00401000 r--p 00000000 00:00 0\n").unwrap();

    let report = MemoryLockEmulator::new(&backend).lock_regions(maps.list(), true);

    assert_eq!(report.locked(), 1);
    assert_eq!(backend.calls(), vec![format!("mlock2(0x400000, 4096, {})", libc::MLOCK_ONFAULT)]);
}

/// On-fault locking degrades to mlock when mlock2 is missing
#[cfg(target_os = "linux")]
#[test]
fn test_on_fault_falls_back_to_mlock() {
    let backend = ScriptedBackend::new().with_capabilities(on_fault_capable()).with_mlock2(false);
    let maps = ProcMaps::parse("00400000-00401000 r--p 00000000 00:00 0\n").unwrap();

    let report = MemoryLockEmulator::new(&backend).lock_regions(maps.list(), true);

    assert_eq!(report.locked(), 1);
    assert_eq!(
        backend.calls(),
        vec![format!("mlock2(0x400000, 4096, {})", libc::MLOCK_ONFAULT), "mlock(0x400000, 4096)".to_owned()]
    );
}

/// Without the capability mlock2 is never tried
#[test]
fn test_on_fault_without_capability() {
    let backend = ScriptedBackend::new().with_mlock2(true);
    let maps = ProcMaps::parse("00400000-00401000 r--p 00000000 00:00 0\n").unwrap();

    MemoryLockEmulator::new(&backend).lock_regions(maps.list(), true);

    assert_eq!(backend.calls(), vec!["mlock(0x400000, 4096)"]);
}

/// Without a readable process map mlockall goes to the native call
#[cfg(unix)]
#[test]
fn test_mlockall_without_maps_is_native() {
    let backend = Arc::new(ScriptedBackend::new().with_mlockall(Some(0)));
    let posix = Posix::with_backend(backend.clone());

    posix.mlockall(MclFlags::Current).unwrap();

    assert_eq!(backend.calls(), vec![format!("mlockall({})", libc::MCL_CURRENT)]);
}

/// Future locking never goes through the emulator
#[cfg(unix)]
#[test]
fn test_mlockall_future_is_native() {
    let capabilities = Capabilities { process_maps: true, ..Capabilities::default() };
    let backend = Arc::new(ScriptedBackend::new().with_capabilities(capabilities).with_mlockall(Some(0)));
    let posix = Posix::with_backend(backend.clone());

    posix.mlockall(MclFlags::Future).unwrap();

    assert_eq!(backend.calls(), vec![format!("mlockall({})", libc::MCL_FUTURE)]);
}

/// A native mlockall failure surfaces with its error number
#[cfg(unix)]
#[test]
fn test_mlockall_native_failure() {
    let backend = Arc::new(ScriptedBackend::new().with_mlockall(Some(-1)).with_errno(libc::EPERM));
    let posix = Posix::with_backend(backend);

    let err = posix.mlockall(MclFlags::Current).unwrap_err();

    assert_eq!(err.os_error_code(), Some(libc::EPERM));
}

/// Emulating over the live map of this process reports every region
#[cfg(target_os = "linux")]
#[test]
fn test_lock_all_mapped_live() {
    init_tracing();
    let posix = nebula_posix::CapabilityResolver::default().resolve();

    let report = posix.lock_all_mapped(true).unwrap();

    assert!(!report.attempts.is_empty());
    assert_eq!(report.locked() + report.failed() + report.skipped(), report.attempts.len());
    assert!(report.attempts.windows(2).all(|pair| pair[0].start < pair[1].start));
}

/// Without a readable process map there is nothing to scan
#[test]
fn test_lock_all_mapped_needs_process_maps() {
    let backend = Arc::new(ScriptedBackend::new());
    let posix = Posix::with_backend(backend.clone());

    let err = posix.lock_all_mapped(false).unwrap_err();

    assert!(err.is_unsupported());
    assert!(backend.calls().is_empty());
}
