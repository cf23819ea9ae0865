use super::{colorize_usage, core_err, json_pretty, EXIT_SUCCESS};
use chrono::{DateTime, Utc};
use slotkeeper_core::ReservationEngine;
use slotkeeper_schema::{occurrence, ActivityId, Occurrence, OccurrenceId, Specification};

pub fn add(
    engine: &ReservationEngine,
    activity_id: &str,
    starts_at: DateTime<Utc>,
    capacity: u32,
    pending: bool,
    json: bool,
) -> Result<u8, String> {
    let occ = engine
        .schedule_occurrence(ActivityId::new(activity_id), starts_at, capacity, pending)
        .map_err(|e| core_err(&e))?;
    if json {
        println!("{}", json_pretty(&occ)?);
    } else {
        println!("scheduled occurrence {}", occ.id);
        if pending {
            println!("awaiting approval: slotkeeper occurrence approve {}", occ.id);
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn approve(engine: &ReservationEngine, occurrence_id: &str, json: bool) -> Result<u8, String> {
    let occ = engine
        .approve_occurrence(&OccurrenceId::new(occurrence_id))
        .map_err(|e| core_err(&e))?;
    if json {
        println!("{}", json_pretty(&occ)?);
    } else {
        println!("approved occurrence {}", occ.id);
    }
    Ok(EXIT_SUCCESS)
}

pub fn show(engine: &ReservationEngine, occurrence_id: &str, json: bool) -> Result<u8, String> {
    let id = OccurrenceId::new(occurrence_id);
    let occ = engine.occurrence(&id).map_err(|e| core_err(&e))?;
    let usage = engine.availability(&id).map_err(|e| core_err(&e))?;
    if json {
        let payload = serde_json::json!({
            "occurrence": occ,
            "used_capacity": usage.used,
            "maximum_capacity": usage.maximum,
            "remaining": usage.remaining(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("occurrence_id: {}", occ.id);
        println!("activity_id:   {}", occ.activity_id);
        println!("starts_at:     {}", occ.starts_at);
        println!("capacity:      {}", colorize_usage(usage.used, usage.maximum));
        println!("remaining:     {}", usage.remaining());
        println!("pending:       {}", occ.pending);
        if let Some(at) = occ.deleted_at {
            println!("deleted_at:    {at}");
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn list(engine: &ReservationEngine, activity: Option<&str>, json: bool) -> Result<u8, String> {
    let mut spec = Specification::<Occurrence>::not_deleted();
    if let Some(activity) = activity {
        spec = spec & occurrence::for_activity(&ActivityId::new(activity));
    }
    let occurrences = engine.occurrences(&spec).map_err(|e| core_err(&e))?;

    if json {
        println!("{}", json_pretty(&occurrences)?);
    } else if occurrences.is_empty() {
        println!("no occurrences found");
    } else {
        println!(
            "{:<30} {:<16} {:<26} {:<9} PENDING",
            "OCCURRENCE_ID", "ACTIVITY", "STARTS_AT", "USED"
        );
        for occ in &occurrences {
            let usage = engine.availability(&occ.id).map_err(|e| core_err(&e))?;
            println!(
                "{:<30} {:<16} {:<26} {:<9} {}",
                occ.id.as_str(),
                occ.activity_id.as_str(),
                occ.starts_at.to_rfc3339(),
                format!("{}/{}", usage.used, usage.maximum),
                occ.pending
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
