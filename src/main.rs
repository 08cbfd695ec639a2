//! # VisaDesk: Deadline Reminder Service
//!
//! Stores client deadlines and e-mails the office a reminder, with WhatsApp
//! click-to-chat links, at each deadline's reminder time.
//!
//! Usage:
//!   visadesk                              # Start with ~/.visadesk/config.toml
//!   visadesk --config ./visadesk.toml     # Custom config file
//!   visadesk --port 8080 --db ./dev.db    # Override gateway port and database

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use visadesk_core::VisaDeskConfig;
use visadesk_gateway::{AppState, DeadlineDb, DeadlineService};
use visadesk_scheduler::{ReminderNotifier, ReminderScheduler, sender_from_config};

#[derive(Parser)]
#[command(
    name = "visadesk",
    version,
    about = "📅 VisaDesk: deadline reminders for visa consultancies"
)]
struct Cli {
    /// Config file (default: ~/.visadesk/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Gateway port
    #[arg(short, long)]
    port: Option<u16>,

    /// Gateway bind address
    #[arg(long)]
    host: Option<String>,

    /// Database path
    #[arg(long)]
    db: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "visadesk=debug,visadesk_core=debug,visadesk_scheduler=debug,visadesk_gateway=debug,tower_http=debug"
    } else {
        "visadesk=info,visadesk_scheduler=info,visadesk_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => VisaDeskConfig::load_from(&expand_path(path))
            .with_context(|| format!("loading config from {path}"))?,
        None => VisaDeskConfig::load().context("loading config")?,
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    let tz = config.timezone().context("organization.timezone")?;
    let db_path = config.database.resolved_path();
    let db = Arc::new(
        DeadlineDb::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?,
    );

    let mailer = sender_from_config(&config);
    let notifier = ReminderNotifier::from_config(&config, mailer);
    let reminder_log = notifier.log();
    let scheduler = ReminderScheduler::new(tz, Arc::new(notifier));
    let service = DeadlineService::new(db, scheduler);

    // Timers live in memory only; rebuild them from the store.
    let report = service.rehydrate().context("loading active deadlines")?;

    println!("📅 VisaDesk v{}", env!("CARGO_PKG_VERSION"));
    println!("   🏢 Organization: {}", config.organization.name);
    println!("   🕐 Timezone:     {}", tz.name());
    println!("   🗄️  Database:     {}", db_path.display());
    println!("   🔔 Reminders:    {} scheduled", report.scheduled);
    println!(
        "   🌐 API:          http://{}:{}/api/v1/deadlines",
        config.gateway.host, config.gateway.port
    );
    println!();

    let gateway = config.gateway.clone();
    let state = AppState::new(config, service, reminder_log);
    visadesk_gateway::start(&gateway, state).await
}
