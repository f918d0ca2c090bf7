//! shiftclock - shift task clock-in kiosk and admin console
//!
//! Workers scan their id and pick a task; administrators watch the live
//! board, export CSV reports and archive the day into history.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/shiftclock/data.db (~/.local/share/shiftclock/data.db)
//! - Logs: $XDG_STATE_HOME/shiftclock/ (~/.local/state/shiftclock/)
//! - Config: $XDG_CONFIG_HOME/shiftclock/config.toml (~/.config/shiftclock/config.toml)

mod output;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use shiftclock_core::{
    hash_secret, AccessPolicy, AdminSession, Catalog, Clock, Config, Database, DateRange,
    IntervalManager, RetryPolicy, RowFilter, SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "shiftclock")]
#[command(about = "Shift task clock-in kiosk and admin console")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Select a task for a scanned employee id
    Scan {
        /// Employee id (firstname.lastname or firstname.lastname2)
        id: String,

        /// Department the task belongs to
        #[arg(short, long)]
        department: String,

        /// Task to start ("Shift End" ends the shift)
        #[arg(short, long)]
        task: String,
    },

    /// List departments and their tasks
    Catalog {
        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show what an employee is currently doing
    Status {
        /// Employee id
        id: String,
    },

    /// Show everyone with an open task (admin)
    Live {
        #[command(flatten)]
        admin: AdminArgs,

        #[command(flatten)]
        filter: FilterArgs,

        /// Keep refreshing until Ctrl+C
        #[arg(long)]
        follow: bool,

        /// Refresh interval in milliseconds (only with --follow)
        #[arg(long, default_value = "1000")]
        interval: u64,

        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Export completed logs as CSV (admin)
    Export {
        #[command(flatten)]
        admin: AdminArgs,

        /// Output path (defaults to task-report.csv in the current directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Move completed logs into history and clear active tasks (admin)
    Archive {
        #[command(flatten)]
        admin: AdminArgs,
    },

    /// Query merged history for a date range (admin)
    History {
        #[command(flatten)]
        admin: AdminArgs,

        /// First day (YYYY-MM-DD, inclusive)
        #[arg(long)]
        from: NaiveDate,

        /// Last day (YYYY-MM-DD, inclusive)
        #[arg(long)]
        to: NaiveDate,

        #[command(flatten)]
        filter: FilterArgs,

        /// Roll totals up to weeks starting on Monday
        #[arg(long)]
        weekly: bool,

        /// Write the result as CSV to this path instead of printing it
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,

        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Load completed logs from a JSON array file (admin)
    Import {
        #[command(flatten)]
        admin: AdminArgs,

        /// JSON file holding an array of completed-log documents
        file: PathBuf,
    },

    /// Delete all history (admin)
    ClearHistory {
        #[command(flatten)]
        admin: AdminArgs,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Delete all completed logs and active tasks (admin)
    Clear {
        #[command(flatten)]
        admin: AdminArgs,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Print the SHA-256 digest to put in admin.secret_sha256
    HashSecret {
        secret: String,
    },
}

#[derive(clap::Args)]
struct AdminArgs {
    /// Administrator employee id
    #[arg(long = "admin", value_name = "ID")]
    id: String,

    /// Shared admin secret, when one is configured
    #[arg(long, env = "SHIFTCLOCK_ADMIN_SECRET", hide_env_values = true)]
    secret: Option<String>,
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Employee id terms (comma or space separated, substring match)
    #[arg(long)]
    employee: Option<String>,

    /// Exact department
    #[arg(long)]
    department: Option<String>,

    /// Exact task (requires --department)
    #[arg(long, requires = "department")]
    task: Option<String>,

    /// Exact day (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Minimum duration in minutes
    #[arg(long)]
    min_minutes: Option<u64>,
}

impl FilterArgs {
    fn to_filter(&self) -> RowFilter {
        RowFilter {
            employee: self.employee.clone(),
            department: self.department.clone(),
            task: self.task.clone(),
            date: self.date,
            min_minutes: self.min_minutes,
        }
    }
}

/// Shared state every command runs against.
struct App {
    config: Config,
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let db_path = Config::database_path();
        tracing::info!(path = %db_path.display(), "Opening database");

        let db = Database::open(&db_path).context("failed to open database")?;
        db.migrate().context("failed to run database migrations")?;

        Ok(Self {
            config,
            db: Arc::new(db),
            clock: Arc::new(SystemClock),
        })
    }

    fn catalog(&self) -> Result<Catalog> {
        Catalog::from_config(&self.config.catalog.departments).context("invalid task catalog")
    }

    fn kiosk(&self) -> Result<IntervalManager> {
        Ok(IntervalManager::new(self.db.clone(), self.catalog()?)
            .with_clock(self.clock.clone())
            .with_store_config(&self.config.store))
    }

    fn admin(&self, args: &AdminArgs) -> Result<AdminSession> {
        let session = AccessPolicy::from_config(&self.config.admin)
            .authorize(&args.id, args.secret.as_deref(), self.db.clone())
            .context("admin access denied")?;
        Ok(session
            .with_catalog(self.catalog()?)
            .with_clock(self.clock.clone())
            .with_retry(RetryPolicy::from_config(&self.config.store)))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // hash-secret needs neither config nor database
    if let Command::HashSecret { secret } = &args.command {
        println!("{}", hash_secret(secret));
        return Ok(());
    }

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        shiftclock_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("shiftclock starting");

    let ctx = App::open(config)?;
    run(&ctx, args.command)
}

fn run(ctx: &App, command: Command) -> Result<()> {
    match command {
        Command::Scan {
            id,
            department,
            task,
        } => {
            let mut kiosk = ctx.kiosk()?;
            let selection = kiosk
                .select_task(&id, &department, &task)
                .context("selection not saved")?;
            output::print_selection(&selection);
        }

        Command::Catalog { format } => {
            let catalog = ctx.catalog()?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&catalog)?);
            } else {
                output::print_catalog(&catalog);
            }
        }

        Command::Status { id } => {
            let kiosk = ctx.kiosk()?;
            let state = kiosk.status(&id)?;
            output::print_status(&id, &state, ctx.clock.now());
        }

        Command::Live {
            admin,
            filter,
            follow,
            interval,
            format,
        } => {
            let session = ctx.admin(&admin)?;
            let filter = filter.to_filter();
            if follow {
                follow_live(ctx, &session, &filter, Duration::from_millis(interval))?;
            } else {
                let board = session.open_live_board();
                let rows = board.filtered(&filter, ctx.clock.now());
                if format == "json" {
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else {
                    output::print_live(&rows, ctx.clock.now());
                }
            }
        }

        Command::Export { admin, out } => {
            let session = ctx.admin(&admin)?;
            let export = session.export_current()?;
            let path = out.unwrap_or_else(|| PathBuf::from(export.file_name));
            write_file(&path, &export.bytes)?;
            println!("Wrote {}", path.display());
        }

        Command::Archive { admin } => {
            let session = ctx.admin(&admin)?;
            let outcome = session.archive().context("archive failed")?;
            output::print_archive(&outcome);
        }

        Command::History {
            admin,
            from,
            to,
            filter,
            weekly,
            csv,
            format,
        } => {
            if from > to {
                anyhow::bail!("--from {} is after --to {}", from, to);
            }
            let session = ctx.admin(&admin)?;
            let range = DateRange::new(from, to);
            let filter = filter.to_filter();

            if let Some(path) = csv {
                let export = if weekly {
                    session.export_weekly(&range, &filter)?
                } else {
                    session.export_history(&range, &filter)?
                };
                write_file(&path, &export.bytes)?;
                println!("Wrote {}", path.display());
            } else if weekly {
                let totals = session.weekly(&range, &filter)?;
                if format == "json" {
                    println!("{}", serde_json::to_string_pretty(&totals)?);
                } else {
                    output::print_weekly(&totals);
                }
            } else {
                let records = session.history(&range, &filter)?;
                if format == "json" {
                    println!("{}", serde_json::to_string_pretty(&records)?);
                } else {
                    output::print_history(&records);
                }
            }
        }

        Command::Import { admin, file } => {
            let session = ctx.admin(&admin)?;
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let docs: Vec<serde_json::Value> = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a JSON array", file.display()))?;
            let report = session.import_logs(&docs)?;
            output::print_import(&report);
        }

        Command::ClearHistory { admin, yes } => {
            require_confirmation(yes, "clear-history")?;
            let session = ctx.admin(&admin)?;
            let removed = session.clear_history()?;
            println!("Removed {} history row(s)", removed);
        }

        Command::Clear { admin, yes } => {
            require_confirmation(yes, "clear")?;
            let session = ctx.admin(&admin)?;
            let counts = session.clear_current()?;
            println!(
                "Removed {} completed log(s) and {} active task(s)",
                counts.logs, counts.active
            );
        }

        Command::HashSecret { secret } => println!("{}", hash_secret(&secret)),
    }

    Ok(())
}

fn require_confirmation(yes: bool, command: &str) -> Result<()> {
    if !yes {
        anyhow::bail!("{} deletes data permanently; re-run with --yes to confirm", command);
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

/// Redraw the live board until Ctrl+C.
fn follow_live(
    ctx: &App,
    session: &AdminSession,
    filter: &RowFilter,
    interval: Duration,
) -> Result<()> {
    // Set up signal handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let mut board = session.open_live_board();
    println!("Live board (refresh every {}ms). Press Ctrl+C to stop.", interval.as_millis());

    while running.load(Ordering::SeqCst) {
        // Kiosks in other processes write the same file
        if let Err(e) = ctx.db.poll_active_changes() {
            tracing::warn!(error = %e, "Live board poll failed");
        }
        if board.refresh() {
            tracing::debug!(workers = board.len(), "Live board snapshot updated");
        }

        let now = ctx.clock.now();
        println!();
        println!("[{}]", now.with_timezone(&chrono::Local).format("%H:%M:%S"));
        output::print_live(&board.filtered(filter, now), now);

        thread::sleep(interval);
    }

    println!("Live board stopped.");
    tracing::info!("shiftclock live board stopped");

    Ok(())
}
