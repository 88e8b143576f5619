//! tbrpc: ThingsBoard two-way RPC debugger
//!
//! Log in, pick a device, send RPC calls and review the history:
//! - `tbrpc login` / `tbrpc logout` / `tbrpc status`
//! - `tbrpc devices` / `tbrpc favorite` / `tbrpc select`
//! - `tbrpc probe` / `tbrpc invoke` / `tbrpc templates` / `tbrpc history`

mod app;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;

#[derive(Parser, Debug)]
#[command(name = "tbrpc", version, about = "ThingsBoard two-way RPC debugger")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in to a ThingsBoard server
    Login {
        /// Server base URL, e.g. https://tb.example.com
        #[arg(long)]
        server: Option<String>,

        #[arg(long, short)]
        username: Option<String>,

        /// Without a password the stored refresh token is tried first
        #[arg(long, env = "TBRPC_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Mark the session as not remembered
        #[arg(long)]
        no_remember: bool,
    },

    /// Forget the stored session
    Logout,

    /// Show the current session and selected device
    Status,

    /// List the tenant's devices, favorites first
    Devices {
        /// Filter by name or type
        #[arg(long, short)]
        search: Option<String>,
    },

    /// Toggle the favorite marker of a device (id)
    Favorite { device: String },

    /// Select a device (id or name) for RPC calls
    Select { device: String },

    /// Check that the selected device's server answers
    Probe,

    /// Send a two-way RPC call to the selected device
    Invoke {
        /// RPC method name
        method: Option<String>,

        /// Params as JSON text
        #[arg(long, short)]
        params: Option<String>,

        /// Timeout in milliseconds
        #[arg(long, short)]
        timeout: Option<String>,

        /// Take method and params from a saved template
        #[arg(long)]
        template: Option<String>,
    },

    /// List saved RPC templates
    Templates,

    /// Show recent RPC history
    History {
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "tbrpc=info,tbrpc_core=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load config
    let config = match &cli.config {
        Some(path) => tbrpc_core::config::Config::load_from(path)?,
        None => tbrpc_core::Config::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            tbrpc_core::Config::default()
        }),
    };

    let mut app = App::new(config)?;

    match cli.command {
        Command::Login {
            server,
            username,
            password,
            no_remember,
        } => {
            app.login(server, username, password, !no_remember).await
        }
        Command::Logout => app.logout(),
        Command::Status => {
            app.status();
            Ok(())
        }
        Command::Devices { search } => app.devices(search.as_deref()).await,
        Command::Favorite { device } => app.toggle_favorite(&device),
        Command::Select { device } => app.select(&device).await,
        Command::Probe => app.probe().await,
        Command::Invoke {
            method,
            params,
            timeout,
            template,
        } => {
            app.invoke(method, params, timeout, template).await
        }
        Command::Templates => app.templates(),
        Command::History { limit } => app.history(limit),
    }
}
