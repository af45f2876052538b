//! Integration tests for clocks and process queries on the native backend.

#![cfg(unix)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use nebula_posix::{CapabilityResolver, ClockId, Posix, PosixConfig};

fn native() -> Arc<Posix> {
    Arc::new(CapabilityResolver::new(PosixConfig::new()).resolve())
}

fn now_nanos() -> i64 {
    i64::try_from(SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos()).unwrap()
}

/// Both wall clocks agree with the standard library to within a second
#[test]
fn test_wall_clocks_agree() {
    let posix = native();

    let micros = posix.gettimeofday().unwrap();
    let nanos = posix.clock_gettime_realtime().unwrap();
    let reference = now_nanos();

    assert!((nanos - micros * 1_000).abs() < 1_000_000_000);
    assert!((reference - nanos).abs() < 1_000_000_000);
}

/// The monotonic clock never goes backwards
#[test]
fn test_monotonic_clock() {
    let posix = native();

    let first = posix.clock_gettime(ClockId::Monotonic).unwrap();
    let second = posix.clock_gettime(ClockId::Monotonic).unwrap();

    assert!(first > 0);
    assert!(second >= first);
}

/// Per-thread CPU time is available where the platform defines it
#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
#[test]
fn test_thread_cpu_clock() {
    assert!(native().clock_gettime(ClockId::ThreadCpuTime).unwrap() >= 0);
}

/// Processor counts are positive and online never exceeds configured
#[test]
fn test_processor_counts() {
    let posix = native();

    let online = posix.get_nprocs().unwrap();
    let configured = posix.get_nprocs_conf().unwrap();

    assert!(online > 0);
    assert!(online <= configured);
    assert_eq!(posix.get_nprocs_conf().unwrap(), configured);
}

/// Every thread sees the same process id and the standard library agrees
#[test]
fn test_getpid_shared_across_threads() {
    let posix = native();
    let pid = posix.getpid().unwrap();

    let worker = Arc::clone(&posix);
    let from_thread = std::thread::spawn(move || worker.getpid().unwrap()).join().unwrap();

    assert_eq!(pid, from_thread);
    assert_eq!(u32::try_from(pid).unwrap(), std::process::id());
}

/// Thread ids are unique among live threads
#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
#[test]
fn test_gettid_unique_per_thread() {
    let posix = native();
    let barrier = Arc::new(std::sync::Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let posix = Arc::clone(&posix);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let tid = posix.gettid().unwrap();
                // keep every thread alive until all ids are taken
                barrier.wait();
                tid
            })
        })
        .collect();
    let tids: HashSet<i32> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

    assert_eq!(tids.len(), 4);
    assert!(tids.iter().all(|tid| *tid > 0));
}

/// Error text is resolved through the OS
#[test]
fn test_strerror() {
    let text = native().strerror(libc::ENOENT).unwrap();
    assert!(text.contains("No such file"), "{text}");
}
