mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_balance, cmd_close, cmd_delete, cmd_entries, cmd_food_add, cmd_food_list, cmd_levels,
    cmd_log, cmd_settings_reset, cmd_settings_set, cmd_settings_show, cmd_status, cmd_streak,
    cmd_target_clear, cmd_target_set, cmd_target_show,
};
use crate::config::Config;
use whey_core::service::WheyService;

#[derive(Parser)]
#[command(
    name = "whey",
    version,
    about = "A protein tracker with rollover targets and streaks",
    long_about = "\n\n  ██╗    ██╗██╗  ██╗███████╗██╗   ██╗
  ██║    ██║██║  ██║██╔════╝╚██╗ ██╔╝
  ██║ █╗ ██║███████║█████╗   ╚████╔╝
  ██║███╗██║██╔══██║██╔══╝    ╚██╔╝
  ╚███╔███╔╝██║  ██║███████╗   ██║
   ╚══╝╚══╝ ╚═╝  ╚═╝╚══════╝   ╚═╝
        hit your protein, keep your streak.
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a portion of a saved food, or a one-off entry with --protein
    Log {
        /// Food name (or a free label when --protein is given)
        food: String,
        /// Quantity in grams (e.g. "200" or "200g"; default: the food's serving)
        grams: Option<String>,
        /// Protein in grams for a one-off entry that isn't a saved food
        #[arg(long)]
        protein: Option<f64>,
        /// Date to log for (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Time eaten (HH:MM, default: now for today, noon otherwise)
        #[arg(long)]
        time: Option<String>,
        /// Log as planned instead of done
        #[arg(long)]
        planned: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change an entry's status: planned, done, skipped
    Status {
        /// Entry ID
        entry_id: i64,
        /// New status
        status: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an entry by ID
    Delete {
        /// Entry ID to delete
        entry_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what was eaten on a day (defaults to today)
    Entries {
        /// Date to show (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// List individual entries with IDs and status instead of grouping
        #[arg(short, long)]
        list: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a day's target, progress and rollover
    Balance {
        /// Date to show (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Show closed days from the last N days instead
        #[arg(short, long)]
        days: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Close a day: settle its rollover and update the streak
    Close {
        /// Date to close (YYYY-MM-DD or today/yesterday, default: today)
        date: Option<String>,
        /// Spend this week's streak saver if the target was missed
        #[arg(long)]
        saver: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the current streak, weekly progress and level
    Streak {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List levels and badges
    Levels {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
    /// Manage daily protein targets
    Target {
        #[command(subcommand)]
        command: TargetCommands,
    },
    /// Manage saved foods
    Food {
        #[command(subcommand)]
        command: FoodCommands,
    },
    /// Show or change rollover and streak settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand)]
enum TargetCommands {
    /// Set the daily protein target
    Set {
        /// Protein target in grams
        protein: f64,
        /// Day(s) to apply to: monday-sunday, mon-sun, weekdays, weekends, all (default: all)
        #[arg(long, default_value = "all")]
        day: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show all targets
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear target(s)
    Clear {
        /// Day(s) to clear: monday-sunday, mon-sun, weekdays, weekends, all (default: clear all)
        #[arg(long)]
        day: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum FoodCommands {
    /// Add a food
    Add {
        /// Food name
        name: String,
        /// Protein per 100g
        protein: f64,
        /// Default serving size in grams
        #[arg(long)]
        serving: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List/search saved foods
    List {
        /// Search query to filter foods
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show the current settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a setting: alpha, max_rollover, default_target_g, target_basis, week_start
    Set {
        key: String,
        value: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset a setting to its default
    Reset {
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let svc = WheyService::new(&config.db_path)?;

    match cli.command {
        Commands::Log {
            food,
            grams,
            protein,
            date,
            time,
            planned,
            json,
        } => cmd_log(
            &svc,
            &food,
            grams.as_deref(),
            protein,
            date,
            time.as_deref(),
            planned,
            json,
        ),
        Commands::Status {
            entry_id,
            status,
            json,
        } => cmd_status(&svc, entry_id, &status, json),
        Commands::Delete { entry_id, json } => cmd_delete(&svc, entry_id, json),
        Commands::Entries { date, list, json } => cmd_entries(&svc, date, list, json),
        Commands::Balance { date, days, json } => cmd_balance(&svc, date, days, json),
        Commands::Close { date, saver, json } => cmd_close(&svc, date, saver, json),
        Commands::Streak { json } => cmd_streak(&svc, json),
        Commands::Levels { json } => cmd_levels(&svc, json),
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let (api_key, new_api_key) = if no_auth {
                (None, false)
            } else {
                let (key, new) = config.load_or_create_api_key()?;
                (Some(key), new)
            };
            server::start_server(Arc::new(svc), port, &bind, api_key, new_api_key).await
        }
        Commands::Target { command } => match command {
            TargetCommands::Set { protein, day, json } => cmd_target_set(&svc, protein, &day, json),
            TargetCommands::Show { json } => cmd_target_show(&svc, json),
            TargetCommands::Clear { day, json } => cmd_target_clear(&svc, day.as_deref(), json),
        },
        Commands::Food { command } => match command {
            FoodCommands::Add {
                name,
                protein,
                serving,
                json,
            } => cmd_food_add(&svc, &name, protein, serving.as_deref(), json),
            FoodCommands::List { search, json } => cmd_food_list(&svc, search.as_deref(), json),
        },
        Commands::Settings { command } => match command {
            SettingsCommands::Show { json } => cmd_settings_show(&svc, json),
            SettingsCommands::Set { key, value, json } => cmd_settings_set(&svc, &key, &value, json),
            SettingsCommands::Reset { key, json } => cmd_settings_reset(&svc, &key, json),
        },
    }
}
