pub mod cleanup;
pub mod completions;
pub mod man_pages;
pub mod occurrence;
pub mod reserve;
pub mod user;
pub mod verify_store;

use indicatif::{ProgressBar, ProgressStyle};
use slotkeeper_core::CoreError;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CAPACITY_EXCEEDED: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_INVALID_STATE: u8 = 4;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Render an engine error so `main` can map it to an exit code by prefix.
pub fn core_err(e: &CoreError) -> String {
    match e {
        CoreError::Store(inner) if e.is_transient() => {
            format!("store error: {inner} (safe to retry)")
        }
        other => other.to_string(),
    }
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_done(pb: &ProgressBar, ok: bool, msg: &str) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    let mark = if ok { "✓" } else { "✗" };
    pb.finish_with_message(format!("{mark} {msg}"));
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "confirmed" => Style::new().green().apply_to(state).to_string(),
        "pending" => Style::new().yellow().apply_to(state).to_string(),
        "completed" => Style::new().blue().apply_to(state).to_string(),
        "cancelled" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

/// `used/maximum` with the figure colored by how full the occurrence is.
pub fn colorize_usage(used: u32, maximum: u32) -> String {
    use console::Style;
    let text = format!("{used}/{maximum}");
    if used >= maximum {
        Style::new().red().bold().apply_to(text).to_string()
    } else if u64::from(used) * 5 >= u64::from(maximum) * 4 {
        Style::new().yellow().apply_to(text).to_string()
    } else {
        text
    }
}
