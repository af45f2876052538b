//! Integration tests for the disabled-default backend.
//!
//! Every operation either succeeds trivially or reports that it is
//! unsupported; none may surface a native failure.

use std::ptr;

use nebula_posix::{
    AffinityMask, BackendKind, ClockId, LockfCmd, NoOpBackend, OpenFlags, Posix, PosixError, Preallocation, Whence,
};
use rstest::rstest;

fn noop() -> Posix {
    Posix::noop(NoOpBackend::EXPLICITLY_DISABLED)
}

fn assert_disabled<T: std::fmt::Debug>(result: nebula_posix::Result<T>) {
    match result {
        Err(PosixError::Unsupported { .. }) => {}
        other => panic!("expected an unsupported primitive, got {other:?}"),
    }
}

/// Descriptor operations are unsupported
#[test]
fn test_descriptor_ops_unsupported() {
    let posix = noop();
    let mut buf = [0_u8; 8];

    assert_disabled(posix.open("/tmp/nothing", OpenFlags::RDONLY, 0));
    assert_disabled(posix.close(3));
    assert_disabled(posix.lseek(3, 0, Whence::Set));
    assert_disabled(posix.ftruncate(3, 0));
    assert_disabled(posix.lockf(3, LockfCmd::Lock, 0));
    assert_disabled(posix.read(3, &mut buf));
    assert_disabled(posix.write(3, b"data"));
}

/// Mapping is unsupported, advice and sync succeed trivially
#[cfg(unix)]
#[test]
fn test_mapping_ops() {
    use nebula_posix::{MAdvice, MMapFlag, MMapProt, MSyncFlags};

    let posix = noop();
    // SAFETY: the no-op backend never dereferences its arguments
    unsafe {
        assert_disabled(posix.mmap(ptr::null_mut(), 4096, MMapProt::ReadWrite, MMapFlag::Shared, 3, 0));
        assert_disabled(posix.munmap(ptr::null_mut(), 4096));
        posix.madvise(ptr::null_mut(), 4096, MAdvice::Normal).unwrap();
        posix.msync(ptr::null_mut(), 4096, MSyncFlags::SYNC).unwrap();
    }
}

/// Range locking is unsupported, whole-process locking succeeds trivially
#[cfg(unix)]
#[test]
fn test_locking_ops() {
    use nebula_posix::MclFlags;

    let posix = noop();
    // SAFETY: the no-op backend never dereferences its arguments
    unsafe {
        assert_disabled(posix.mlock(ptr::null(), 4096));
        assert_disabled(posix.mlock2(ptr::null(), 4096, true));
    }
    posix.mlockall(MclFlags::Current).unwrap();
    posix.mlockall(MclFlags::Future).unwrap();
    assert_disabled(posix.lock_all_mapped(false));
    assert_disabled(posix.lock_all_mapped(true));
}

/// Preallocation with mode 0 never raises
#[rstest]
#[case(0, 0)]
#[case(4096, 1 << 20)]
fn test_fallocate_exhausted(#[case] offset: i64, #[case] length: i64) {
    assert_eq!(noop().fallocate(3, 0, offset, length).unwrap(), Preallocation::Exhausted);
}

/// Clocks and staging need malloc, which is unavailable
#[test]
fn test_clocks_unsupported() {
    let posix = noop();

    assert_disabled(posix.gettimeofday());
    assert_disabled(posix.clock_gettime(ClockId::Monotonic));
    assert_disabled(posix.clock_gettime_realtime());
    assert_disabled(posix.stage(16));
}

/// Affinity and process queries degrade without failing natively
#[test]
fn test_process_queries() {
    let posix = noop();

    assert_disabled(posix.get_nprocs());
    assert_disabled(posix.get_nprocs_conf());
    assert_disabled(posix.getpid());
    assert_disabled(posix.gettid());
    assert_disabled(posix.sched_getaffinity(0));
    assert_disabled(posix.sched_setaffinity_as(0, 0));
    assert_disabled(posix.sched_setaffinity(0, &AffinityMask::empty(1)));
    assert_eq!(posix.sched_getaffinity_summary(0), "na: 0");
}

/// Error helpers have nothing to report
#[test]
fn test_error_helpers() {
    let posix = noop();

    assert_eq!(posix.last_error(), 0);
    assert_eq!(posix.strerror(libc::ENOENT), None);
    assert_eq!(posix.last_error_str(), "");
    assert!(!posix.capabilities().process_maps);
}

/// The process-wide handle can be switched to the no-op backend
#[test]
fn test_use_noop_posix() {
    nebula_posix::use_noop_posix();

    let posix = nebula_posix::posix();

    assert_eq!(posix.kind(), BackendKind::NoOp);
    assert_eq!(posix.reason(), Some(NoOpBackend::EXPLICITLY_DISABLED));
}
