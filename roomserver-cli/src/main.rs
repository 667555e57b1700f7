use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use roomserver_core::config::Config;
use roomserver_core::core_room::{
    PerformPeekRequest, RoomAlias, RoomId, RoomPeeker, RoomSqlStore, ServerName, StaticDirectory,
};
use roomserver_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use roomserver_core::metrics::init_metrics;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "roomserver")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML); falls back to ROOMSERVER_* variables
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start peeking into a room as a local user
    Peek {
        /// Local user ID, e.g. @alice:example.org
        #[arg(long)]
        user: String,
        /// Room ID (!...) or alias (#...)
        #[arg(long)]
        room: String,
        #[arg(long, default_value = "CLI")]
        device: String,
        /// Extra candidate servers, in preference order
        #[arg(long = "via")]
        via: Vec<String>,
    },
    /// Point a local alias at a room
    Alias {
        #[arg(long)]
        alias: String,
        #[arg(long)]
        room: String,
    },
    /// Set a room's history visibility
    Visibility {
        #[arg(long)]
        room: String,
        /// e.g. world_readable, shared, invited, joined
        #[arg(long)]
        value: String,
    },
    /// Print output events after a sequence number
    Events {
        #[arg(long, default_value_t = 0)]
        since: i64,
    },
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let expanded = PathBuf::from(shellexpand::tilde(path).into_owned());
            Config::from_file(&expanded)
                .with_context(|| format!("loading configuration from {}", expanded.display()))?
        }
        None => Config::from_env().context("loading configuration from environment")?,
    };
    Ok(config)
}

fn open_store(config: &Config) -> Result<RoomSqlStore> {
    let path = &config.store.database_path;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    RoomSqlStore::open(path).with_context(|| format!("opening room store {}", path.display()))
}

/// Logging settings from the configuration with command-line overrides applied
fn log_config(config: &Config, args: &Args) -> Result<LogConfig> {
    let mut log_config = LogConfig::from_config(&config.logging)?;
    if let Some(level) = &args.log_level {
        log_config.level = level.parse::<LogLevel>()?;
    }
    if args.json_logs {
        log_config.json_format = true;
    }
    Ok(log_config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    init_logging_with_config(log_config(&config, &args)?)?;
    init_metrics();

    let store = Arc::new(open_store(&config)?);
    info!(server_name = %config.server.server_name, "room server CLI started");

    match args.command {
        Command::Peek { user, room, device, via } => {
            // Remote directories are not reachable from the CLI; remote
            // aliases fail with an unreachable-server error.
            let directory = Arc::new(StaticDirectory::new());
            let peeker =
                RoomPeeker::from_config(&config.server, store.clone(), directory, store.clone());

            let response = peeker
                .perform_peek(PerformPeekRequest {
                    user_id: user,
                    room_id_or_alias: room,
                    device_id: device,
                    server_names: via.into_iter().map(ServerName::new).collect(),
                })
                .await;

            println!("{}", serde_json::to_string_pretty(&response)?);
            if let Some(err) = response.error {
                bail!("peek failed: {}", err);
            }
        }
        Command::Alias { alias, room } => {
            let alias = RoomAlias::parse(alias.as_str())
                .with_context(|| format!("invalid alias {:?}", alias))?;
            let room_id = RoomId::parse(room.as_str())
                .with_context(|| format!("invalid room ID {:?}", room))?;
            if !alias.is_owned_by(&config.server.server_name()) {
                bail!("alias {} is not owned by {}", alias, config.server.server_name);
            }
            store.set_alias(&alias, &room_id)?;
            info!(alias = %alias, room_id = %room_id, "alias set");
        }
        Command::Visibility { room, value } => {
            let room_id = RoomId::parse(room.as_str())
                .with_context(|| format!("invalid room ID {:?}", room))?;
            store.set_history_visibility(&room_id, &value)?;
            info!(room_id = %room_id, visibility = %value, "history visibility set");
        }
        Command::Events { since } => {
            for stored in store.output_events_since(since)? {
                println!("{}\t{}", stored.seq, serde_json::to_string(&stored.event)?);
            }
        }
    }

    Ok(())
}
