//! Focus Guardian - local focus enforcement daemon
//!
//! Closes blocked apps after a short warning while a profile's schedule is
//! active, and redirects blocked websites through the hosts file.

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use focus_guardian::config::GuardianConfig;

mod cli;

/// Focus Guardian - keep distractions closed
#[derive(Parser)]
#[command(name = "focus-guardian")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the enforcement daemon in the foreground
    Start,

    /// Stop the running daemon
    Stop,

    /// Show daemon status, current profile and today's blocks
    Status,

    /// Classify current windows and processes without enforcing
    Scan,

    /// View recent block events
    Logs {
        /// Number of recent entries to show
        #[arg(short, long, default_value = "20")]
        tail: usize,

        /// Show today's summary instead of individual events
        #[arg(long)]
        today: bool,
    },

    /// Manage the current profile's blocked apps
    Apps {
        #[command(subcommand)]
        action: ListAction,
    },

    /// Manage whitelist entries
    Whitelist {
        #[command(subcommand)]
        action: ListAction,
    },

    /// Manage profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Manage per-day schedule overrides
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// Manage blocked websites
    Domains {
        #[command(subcommand)]
        action: DomainAction,
    },
}

#[derive(Subcommand)]
enum ListAction {
    /// Show entries
    List,
    /// Add an entry
    Add { entry: String },
    /// Remove an entry
    Remove { entry: String },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List profiles
    List,
    /// Switch the current profile
    Use { id: String },
    /// Create a profile
    Create {
        id: String,
        /// Display name (defaults to the id)
        #[arg(long)]
        name: Option<String>,
        /// First active hour
        #[arg(long, default_value = "0")]
        start: u8,
        /// Hour enforcement stops (exclusive)
        #[arg(long, default_value = "24")]
        end: u8,
    },
    /// Delete a profile
    Delete { id: String },
    /// Change a profile's default active hours
    Hours { id: String, start: u8, end: u8 },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Show overrides
    Show {
        /// Only this profile
        profile: Option<String>,
    },
    /// Override a profile's hours for one weekday
    Set {
        profile: String,
        day: String,
        start: u8,
        end: u8,
    },
    /// Turn enforcement off for one weekday
    Disable { profile: String, day: String },
    /// Remove a weekday override
    Clear { profile: String, day: String },
}

#[derive(Subcommand)]
enum DomainAction {
    /// List blocked domains
    List {
        /// Print `{"domains": [...]}`
        #[arg(long)]
        json: bool,
    },
    /// Block a domain
    Block { domain: String },
    /// Unblock a domain
    Unblock { domain: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over -v
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = GuardianConfig::load()?;

    match cli.command {
        Commands::Start => {
            info!("🛡️ Starting Focus Guardian daemon...");
            cli::start::run(&config).await?;
        }
        Commands::Stop => {
            cli::stop::run(&config).await?;
        }
        Commands::Status => {
            cli::status::run(&config).await?;
        }
        Commands::Scan => {
            cli::scan::run(&config).await?;
        }
        Commands::Logs { tail, today } => {
            cli::logs::run(&config, tail, today).await?;
        }
        Commands::Apps { action } => match action {
            ListAction::List => cli::apps::list(&config).await?,
            ListAction::Add { entry } => cli::apps::add(&config, &entry).await?,
            ListAction::Remove { entry } => cli::apps::remove(&config, &entry).await?,
        },
        Commands::Whitelist { action } => match action {
            ListAction::List => cli::apps::whitelist_list(&config).await?,
            ListAction::Add { entry } => cli::apps::whitelist_add(&config, &entry).await?,
            ListAction::Remove { entry } => cli::apps::whitelist_remove(&config, &entry).await?,
        },
        Commands::Profile { action } => match action {
            ProfileAction::List => cli::profile::list(&config).await?,
            ProfileAction::Use { id } => cli::profile::switch(&config, &id).await?,
            ProfileAction::Create {
                id,
                name,
                start,
                end,
            } => cli::profile::create(&config, &id, name.as_deref(), start, end).await?,
            ProfileAction::Delete { id } => cli::profile::delete(&config, &id).await?,
            ProfileAction::Hours { id, start, end } => {
                cli::profile::hours(&config, &id, start, end).await?
            }
        },
        Commands::Schedule { action } => match action {
            ScheduleAction::Show { profile } => {
                cli::profile::schedule_show(&config, profile.as_deref()).await?
            }
            ScheduleAction::Set {
                profile,
                day,
                start,
                end,
            } => cli::profile::schedule_set(&config, &profile, &day, start, end).await?,
            ScheduleAction::Disable { profile, day } => {
                cli::profile::schedule_disable(&config, &profile, &day).await?
            }
            ScheduleAction::Clear { profile, day } => {
                cli::profile::schedule_clear(&config, &profile, &day).await?
            }
        },
        Commands::Domains { action } => match action {
            DomainAction::List { json } => cli::domains::list(&config, json).await?,
            DomainAction::Block { domain } => cli::domains::block(&config, &domain).await?,
            DomainAction::Unblock { domain } => cli::domains::unblock(&config, &domain).await?,
        },
    }

    Ok(())
}
