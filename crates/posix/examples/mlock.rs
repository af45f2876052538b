//! Lock the current address space region by region and print the outcome

use nebula_posix::{CapabilityResolver, LockOutcome, PosixConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("nebula_posix=info").init();

    let config = PosixConfig::from_env()?.with_dump_lock_attempts(true);
    let posix = CapabilityResolver::new(config).resolve();

    if !posix.capabilities().process_maps {
        println!("process map unavailable on the {} backend", posix.kind());
        return Ok(());
    }

    let report = posix.lock_all_mapped(true)?;
    for attempt in report.attempts.iter().filter(|a| !matches!(a.outcome, LockOutcome::Locked)) {
        println!(
            "{:#014x} {:>8} KiB {:<40} {:?}",
            attempt.start,
            attempt.length / 1024,
            attempt.path.as_deref().unwrap_or(""),
            attempt.outcome
        );
    }

    println!(
        "locked {} regions ({} KiB), {} failed, {} skipped",
        report.locked(),
        report.locked_bytes() / 1024,
        report.failed(),
        report.skipped()
    );
    Ok(())
}
