use super::{json_pretty, EXIT_STORE_ERROR, EXIT_SUCCESS};
use slotkeeper_core::EngineConfig;
use slotkeeper_store::{verify_store_integrity, StoreLayout};

pub fn run(config: &EngineConfig, json: bool) -> Result<u8, String> {
    let layout = StoreLayout::new(&config.store_root);
    let report = verify_store_integrity(&layout).map_err(|e| format!("store error: {e}"))?;

    if json {
        let collections: serde_json::Map<String, serde_json::Value> = report
            .collections
            .iter()
            .map(|(c, (checked, passed))| {
                (
                    c.to_string(),
                    serde_json::json!({ "checked": checked, "passed": passed }),
                )
            })
            .collect();
        let payload = serde_json::json!({
            "checked": report.checked,
            "passed": report.passed,
            "failed": report.failed.len(),
            "collections": collections,
            "ledger_checked": report.ledger_checked,
            "ledger_passed": report.ledger_passed,
            "incomplete_commits": report.incomplete_commits,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "store integrity: {}/{} records passed, {}/{} ledger entries consistent",
            report.passed, report.checked, report.ledger_passed, report.ledger_checked
        );
        if report.incomplete_commits > 0 {
            println!(
                "  {} incomplete commits awaiting recovery",
                report.incomplete_commits
            );
        }
        for f in &report.failed {
            println!("  FAIL {}: {}", f.record, f.reason);
        }
    }

    if report.is_clean() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_STORE_ERROR)
    }
}
