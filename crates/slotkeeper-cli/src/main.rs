mod commands;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{
    EXIT_CAPACITY_EXCEEDED, EXIT_FAILURE, EXIT_INVALID_STATE, EXIT_STORE_ERROR,
};
use slotkeeper_core::config::expand_home;
use slotkeeper_core::{install_signal_handler, EngineConfig, ReservationEngine};
use slotkeeper_schema::ReservationState;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "slotkeeper",
    version,
    about = "Capacity-safe reservations for scheduled activities"
)]
struct Cli {
    /// Path to the Slotkeeper store directory (overrides the config file).
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Path to a config file (default: ~/.config/slotkeeper/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register and verify user accounts.
    #[command(subcommand)]
    User(UserCommand),
    /// Schedule, approve and inspect activity occurrences.
    #[command(subcommand)]
    Occurrence(OccurrenceCommand),
    /// Create and move reservations through their lifecycle.
    #[command(subcommand)]
    Reserve(ReserveCommand),
    /// Soft-delete accounts left unverified past the grace period.
    Cleanup {
        /// Only list the accounts that would be removed.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Verify record checksums and ledger consistency.
    VerifyStore,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    /// Register a new account.
    Add {
        email: String,
        /// Display name (defaults to the email's local part).
        #[arg(long)]
        name: Option<String>,
    },
    /// Mark an account's email address as confirmed.
    Verify { user_id: String },
    /// List accounts.
    List {
        /// Only accounts that never confirmed their email.
        #[arg(long, default_value_t = false)]
        unverified: bool,
        /// Include soft-deleted accounts.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

#[derive(Debug, Subcommand)]
enum OccurrenceCommand {
    /// Schedule an occurrence of an activity.
    Add {
        activity_id: String,
        /// Start time, RFC 3339 (e.g. 2026-11-02T09:30:00Z).
        #[arg(long, value_parser = parse_timestamp)]
        starts_at: DateTime<Utc>,
        /// Maximum number of places.
        #[arg(long)]
        capacity: u32,
        /// Propose the occurrence; nothing is admitted until it is approved.
        #[arg(long, default_value_t = false)]
        pending: bool,
    },
    /// Approve a pending occurrence.
    Approve { occurrence_id: String },
    /// Show an occurrence with its current usage.
    Show { occurrence_id: String },
    /// List occurrences.
    List {
        /// Only occurrences of this activity.
        #[arg(long)]
        activity: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum ReserveCommand {
    /// Request places; the reservation stays pending until confirmed.
    Create {
        user_id: String,
        occurrence_id: String,
        #[arg(long, default_value_t = 1)]
        amount: u32,
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// Create and confirm in one step.
    Book {
        user_id: String,
        occurrence_id: String,
        #[arg(long, default_value_t = 1)]
        amount: u32,
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// Confirm a pending reservation if its places are still available.
    Confirm { reservation_id: String },
    /// Confirm every pending reservation of an occurrence, oldest first.
    ConfirmAll { occurrence_id: String },
    /// Cancel (decline) a reservation, releasing its places.
    Cancel { reservation_id: String },
    /// Mark a confirmed reservation as completed.
    Complete { reservation_id: String },
    /// Complete every confirmed reservation whose occurrence has started.
    CompleteElapsed,
    /// Remove a completed or cancelled reservation.
    Delete { reservation_id: String },
    /// List reservations.
    List {
        #[arg(long)]
        occurrence: Option<String>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long, value_parser = parse_state)]
        state: Option<ReservationState>,
    },
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{s}': {e}"))
}

fn parse_state(s: &str) -> Result<ReservationState, String> {
    s.parse()
}

fn load_config(cli: &Cli) -> Result<EngineConfig, String> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::load_default(),
    }
    .map_err(|e| e.to_string())?;
    if let Some(store) = &cli.store {
        config.store_root = expand_home(store);
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<u8, String> {
    let json = cli.json;
    match cli.command {
        Commands::Completions { shell } => return commands::completions::run::<Cli>(shell),
        Commands::ManPages { ref dir } => return commands::man_pages::run::<Cli>(dir),
        _ => {}
    }

    let config = load_config(&cli)?;
    let engine = ReservationEngine::open(&config).map_err(|e| e.to_string())?;

    match cli.command {
        Commands::User(cmd) => match cmd {
            UserCommand::Add { email, name } => {
                commands::user::add(&engine, &email, name.as_deref(), json)
            }
            UserCommand::Verify { user_id } => commands::user::verify(&engine, &user_id, json),
            UserCommand::List { unverified, all } => {
                commands::user::list(&engine, unverified, all, json)
            }
        },
        Commands::Occurrence(cmd) => match cmd {
            OccurrenceCommand::Add {
                activity_id,
                starts_at,
                capacity,
                pending,
            } => commands::occurrence::add(&engine, &activity_id, starts_at, capacity, pending, json),
            OccurrenceCommand::Approve { occurrence_id } => {
                commands::occurrence::approve(&engine, &occurrence_id, json)
            }
            OccurrenceCommand::Show { occurrence_id } => {
                commands::occurrence::show(&engine, &occurrence_id, json)
            }
            OccurrenceCommand::List { activity } => {
                commands::occurrence::list(&engine, activity.as_deref(), json)
            }
        },
        Commands::Reserve(cmd) => match cmd {
            ReserveCommand::Create {
                user_id,
                occurrence_id,
                amount,
                comment,
            } => commands::reserve::create(&engine, &user_id, &occurrence_id, amount, &comment, json),
            ReserveCommand::Book {
                user_id,
                occurrence_id,
                amount,
                comment,
            } => commands::reserve::book(&engine, &user_id, &occurrence_id, amount, &comment, json),
            ReserveCommand::Confirm { reservation_id } => {
                commands::reserve::confirm(&engine, &reservation_id, json)
            }
            ReserveCommand::ConfirmAll { occurrence_id } => {
                commands::reserve::confirm_all(&engine, &occurrence_id, json)
            }
            ReserveCommand::Cancel { reservation_id } => {
                commands::reserve::cancel(&engine, &reservation_id, json)
            }
            ReserveCommand::Complete { reservation_id } => {
                commands::reserve::complete(&engine, &reservation_id, json)
            }
            ReserveCommand::CompleteElapsed => commands::reserve::complete_elapsed(&engine, json),
            ReserveCommand::Delete { reservation_id } => {
                commands::reserve::delete(&engine, &reservation_id, json)
            }
            ReserveCommand::List {
                occurrence,
                user,
                state,
            } => commands::reserve::list(
                &engine,
                occurrence.as_deref(),
                user.as_deref(),
                state,
                json,
            ),
        },
        Commands::Cleanup { dry_run } => commands::cleanup::run(&engine, &config, dry_run, json),
        Commands::VerifyStore => commands::verify_store::run(&config, json),
        Commands::Completions { .. } | Commands::ManPages { .. } => Ok(commands::EXIT_SUCCESS),
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SLOTKEEPER_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("capacity exceeded") {
                EXIT_CAPACITY_EXCEEDED
            } else if msg.starts_with("invalid state") {
                EXIT_INVALID_STATE
            } else if msg.starts_with("store error:") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
