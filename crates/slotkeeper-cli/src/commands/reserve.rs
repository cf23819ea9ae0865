use super::{
    colorize_state, core_err, json_pretty, spin_done, spinner, EXIT_CAPACITY_EXCEEDED,
    EXIT_SUCCESS,
};
use chrono::Utc;
use slotkeeper_core::ReservationEngine;
use slotkeeper_schema::{
    reservation, OccurrenceId, Reservation, ReservationId, ReservationState, Specification, UserId,
};

fn report(r: &Reservation, verb: &str, json: bool) -> Result<u8, String> {
    if json {
        println!("{}", json_pretty(r)?);
    } else {
        println!(
            "{verb} reservation {} ({} on {}, {})",
            r.id,
            r.amount,
            r.occurrence_id,
            colorize_state(&r.state.to_string())
        );
    }
    Ok(EXIT_SUCCESS)
}

pub fn create(
    engine: &ReservationEngine,
    user_id: &str,
    occurrence_id: &str,
    amount: u32,
    comment: &str,
    json: bool,
) -> Result<u8, String> {
    let r = engine
        .create(
            &UserId::new(user_id),
            &OccurrenceId::new(occurrence_id),
            amount,
            comment,
        )
        .map_err(|e| core_err(&e))?;
    report(&r, "created", json)
}

pub fn book(
    engine: &ReservationEngine,
    user_id: &str,
    occurrence_id: &str,
    amount: u32,
    comment: &str,
    json: bool,
) -> Result<u8, String> {
    let r = engine
        .book(
            &UserId::new(user_id),
            &OccurrenceId::new(occurrence_id),
            amount,
            comment,
        )
        .map_err(|e| core_err(&e))?;
    report(&r, "booked", json)
}

pub fn confirm(engine: &ReservationEngine, reservation_id: &str, json: bool) -> Result<u8, String> {
    let r = engine
        .confirm(&ReservationId::new(reservation_id))
        .map_err(|e| core_err(&e))?;
    report(&r, "confirmed", json)
}

pub fn confirm_all(engine: &ReservationEngine, occurrence_id: &str, json: bool) -> Result<u8, String> {
    let id = OccurrenceId::new(occurrence_id);
    let pb = (!json).then(|| spinner(&format!("confirming pending reservations on {id}")));
    let result = engine.confirm_pending(&id);
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_done(pb, false, "batch confirm failed");
            }
            return Err(core_err(&e));
        }
    };

    if let Some(pb) = &pb {
        spin_done(
            pb,
            report.rejected.is_empty(),
            &format!(
                "{} confirmed, {} left pending, {} skipped",
                report.confirmed.len(),
                report.rejected.len(),
                report.skipped.len()
            ),
        );
    }
    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        for r in &report.rejected {
            println!("  no room for {r}");
        }
        for (r, why) in &report.skipped {
            println!("  skipped {r}: {why}");
        }
        if report.interrupted {
            println!("interrupted; remaining reservations were left pending");
        }
    }

    if report.rejected.is_empty() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_CAPACITY_EXCEEDED)
    }
}

pub fn cancel(engine: &ReservationEngine, reservation_id: &str, json: bool) -> Result<u8, String> {
    let r = engine
        .cancel(&ReservationId::new(reservation_id))
        .map_err(|e| core_err(&e))?;
    report(&r, "cancelled", json)
}

pub fn complete(engine: &ReservationEngine, reservation_id: &str, json: bool) -> Result<u8, String> {
    let r = engine
        .complete(&ReservationId::new(reservation_id))
        .map_err(|e| core_err(&e))?;
    report(&r, "completed", json)
}

pub fn complete_elapsed(engine: &ReservationEngine, json: bool) -> Result<u8, String> {
    let done = engine
        .complete_elapsed(Utc::now())
        .map_err(|e| core_err(&e))?;
    if json {
        println!("{}", json_pretty(&serde_json::json!({ "completed": done }))?);
    } else {
        println!("completed {} reservations", done.len());
    }
    Ok(EXIT_SUCCESS)
}

pub fn delete(engine: &ReservationEngine, reservation_id: &str, json: bool) -> Result<u8, String> {
    let id = ReservationId::new(reservation_id);
    engine.delete(&id).map_err(|e| core_err(&e))?;
    if json {
        println!("{}", json_pretty(&serde_json::json!({ "deleted": id }))?);
    } else {
        println!("deleted reservation {id}");
    }
    Ok(EXIT_SUCCESS)
}

pub fn list(
    engine: &ReservationEngine,
    occurrence: Option<&str>,
    user: Option<&str>,
    state: Option<ReservationState>,
    json: bool,
) -> Result<u8, String> {
    let mut spec = Specification::<Reservation>::not_deleted();
    if let Some(occ) = occurrence {
        spec = spec & reservation::for_occurrence(&OccurrenceId::new(occ));
    }
    if let Some(u) = user {
        spec = spec & reservation::for_user(&UserId::new(u));
    }
    if let Some(s) = state {
        spec = spec & reservation::in_state(s);
    }
    let reservations = engine.reservations(&spec).map_err(|e| core_err(&e))?;

    if json {
        println!("{}", json_pretty(&reservations)?);
    } else if reservations.is_empty() {
        println!("no reservations found");
    } else {
        println!(
            "{:<30} {:<30} {:<6} {:<10} USER_ID",
            "RESERVATION_ID", "OCCURRENCE_ID", "AMOUNT", "STATE"
        );
        for r in &reservations {
            let state = r.state.to_string();
            let padding = " ".repeat(10usize.saturating_sub(state.len()));
            println!(
                "{:<30} {:<30} {:<6} {}{padding} {}",
                r.id.as_str(),
                r.occurrence_id.as_str(),
                r.amount,
                colorize_state(&state),
                r.user_id
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
