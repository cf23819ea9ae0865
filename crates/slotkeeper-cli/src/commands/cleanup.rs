use super::{core_err, json_pretty, EXIT_SUCCESS};
use chrono::Utc;
use slotkeeper_core::{CleanupJob, EngineConfig, ReservationEngine};
use std::sync::Arc;

pub fn run(
    engine: &ReservationEngine,
    config: &EngineConfig,
    dry_run: bool,
    json: bool,
) -> Result<u8, String> {
    let job = CleanupJob::from_config(Arc::clone(engine.backend()), &config.cleanup);
    let now = Utc::now();
    let report = if dry_run {
        job.dry_run(now)
    } else {
        job.run(now)
    }
    .map_err(|e| core_err(&e))?;

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        let prefix = if dry_run { "would remove" } else { "removed" };
        println!(
            "cleanup: {prefix} {} unverified accounts older than {} days",
            report.count, config.cleanup.grace_days
        );
        if dry_run {
            for id in &report.ids {
                println!("  {id}");
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
