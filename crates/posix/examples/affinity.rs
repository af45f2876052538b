//! Pin worker threads to CPUs and report where they run

use nebula_posix::{ClockId, posix};
use std::thread;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("nebula_posix=debug").init();

    let posix = posix();
    println!("backend: {}", posix.kind());

    let nprocs = posix.get_nprocs_conf()?;
    println!("configured CPUs: {nprocs}, online: {}", posix.get_nprocs()?);
    println!("main thread may run on: {}", posix.sched_getaffinity_summary(0));

    let workers: Vec<_> = (0..nprocs.min(4))
        .map(|cpu| {
            let posix = posix.clone();
            thread::spawn(move || -> nebula_posix::Result<String> {
                posix.sched_setaffinity_as(0, cpu)?;
                let started = posix.clock_gettime(ClockId::Monotonic)?;
                let spins = (0..1_000_000_u64).fold(0_u64, |acc, x| acc.wrapping_add(x * x));
                let elapsed = posix.clock_gettime(ClockId::Monotonic)? - started;
                Ok(format!(
                    "tid {} pinned to {} spun {spins} in {elapsed} ns",
                    posix.gettid()?,
                    posix.sched_getaffinity_summary(0)
                ))
            })
        })
        .collect();

    for worker in workers {
        match worker.join() {
            Ok(Ok(line)) => println!("{line}"),
            Ok(Err(err)) => println!("worker failed: {err}"),
            Err(_) => println!("worker panicked"),
        }
    }

    Ok(())
}
