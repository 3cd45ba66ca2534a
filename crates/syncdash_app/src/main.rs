mod commands;
mod config;
mod persistence;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use syncdash_engine::ensure_state_dir;
use syncdash_logging::{LogDestination, DEFAULT_LOG_FILE};

use crate::commands::App;
use crate::config::{FileConfig, Overrides, Settings, CONFIG_FILENAME};

/// Follow WooCommerce/Odoo sync tasks and manage the active instance.
#[derive(Parser)]
#[command(name = "syncdash")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "SYNCDASH_URL", global = true)]
    url: Option<String>,

    /// Bearer token; overrides the one saved by `login`
    #[arg(long, env = "SYNCDASH_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Directory for state.ron and logs (default: ~/.syncdash)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Config file (default: <state dir>/config.ron)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to syncdash.log in the state directory
    #[arg(long, global = true)]
    log_file: bool,

    /// More log output; repeat for trace
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and remember the access token
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "SYNCDASH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the token and the cached instance selection
    Logout,
    /// Inspect or switch backend instances
    Instances {
        #[command(subcommand)]
        action: InstanceCommands,
    },
    /// Follow or cancel a sync task
    Task {
        #[command(subcommand)]
        action: TaskCommands,
    },
    /// Start a sync job and follow its task
    Sync {
        /// Endpoint path, e.g. /api/v1/sync/products
        endpoint: String,
        /// JSON request body
        #[arg(long)]
        payload: Option<String>,
        /// Print the task id and exit without following it
        #[arg(long)]
        detach: bool,
    },
    /// Worker and queue statistics
    Stats {
        /// Summary window in hours: 1, 24 or 168
        #[arg(long, default_value_t = 24)]
        hours: u32,
        /// Keep refreshing until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
    /// Keep running and report active instance changes
    Watch,
}

#[derive(Subcommand)]
enum InstanceCommands {
    List,
    Active,
    Activate { id: u64 },
}

#[derive(Subcommand)]
enum TaskCommands {
    Track { task_id: String },
    Cancel { task_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let state_dir = match cli.state_dir {
        Some(dir) => dir,
        None => dirs::home_dir()
            .context("could not determine home directory")?
            .join(".syncdash"),
    };
    let config_path = cli
        .config
        .unwrap_or_else(|| state_dir.join(CONFIG_FILENAME));
    let file_config = FileConfig::load(&config_path)?;
    let settings = Settings::resolve(
        state_dir,
        file_config,
        Overrides {
            base_url: cli.url,
            token: cli.token,
            verbose: cli.verbose,
            log_to_file: cli.log_file,
        },
    )?;

    let destination = if settings.log_to_file {
        ensure_state_dir(&settings.state_dir)?;
        LogDestination::Both(settings.state_dir.join(DEFAULT_LOG_FILE))
    } else {
        LogDestination::Terminal
    };
    syncdash_logging::initialize(destination, settings.log_level);

    let mut app = App::new(settings)?;
    let result = match cli.command {
        Commands::Login { username, password } => app.login(&username, &password).await,
        Commands::Logout => {
            app.logout();
            Ok(())
        }
        Commands::Instances { action } => match action {
            InstanceCommands::List => app.list_instances().await,
            InstanceCommands::Active => app.show_active().await,
            InstanceCommands::Activate { id } => app.activate(id).await,
        },
        Commands::Task { action } => match action {
            TaskCommands::Track { task_id } => app.track(&task_id).await,
            TaskCommands::Cancel { task_id } => app.cancel(&task_id).await,
        },
        Commands::Sync {
            endpoint,
            payload,
            detach,
        } => app.sync(&endpoint, payload.as_deref(), detach).await,
        Commands::Stats { hours, watch } => app.stats(hours, watch).await,
        Commands::Watch => app.watch().await,
    };
    app.shutdown();
    result
}
