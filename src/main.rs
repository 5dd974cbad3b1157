use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use parley::apis::check_connection;
use parley::config::{DEFAULT_LOG_FILTER, ProbeConfig, StoreConfig};
use parley::{
    ApiVersionProbe, ConnectionState, ConnectionStateStore, DbController, HttpServerPolicyApi,
    ParleyError,
};
use serde::Serialize;
use tokio::runtime::Runtime;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "parley", version, about = "Manage chat servers and their connection state")]
struct Cli {
    #[command(flatten)]
    store: StoreConfig,

    #[command(flatten)]
    probe: ProbeConfig,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a server, or change the hostname of an existing one.
    Add {
        hostname: String,
        /// Identifier of the server. A random one is generated if omitted.
        #[arg(long)]
        id: Option<String>,
    },
    /// Remove a server and its state.
    Remove { id: String },
    /// List every configured server.
    List,
    /// Show one server.
    Show { id: String },
    /// Move a server to a connection state.
    State {
        id: String,
        #[arg(value_enum)]
        state: ConnectionState,
    },
    /// Record a connection error for a server.
    Error { id: String, message: String },
    /// Store the session token of a connected server.
    Session { id: String, token: String },
    /// End the session of a server.
    Disconnect { id: String },
    /// Check whether an address speaks https or http.
    Probe { address: String },
    /// Probe a configured server and track the outcome in its state.
    Connect { id: String },
}

fn print<T: Serialize>(json: bool, value: &T, human: impl FnOnce() -> String) -> Result<(), ParleyError> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", human());
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), ParleyError> {
    let db_path = cli.store.resolve_db_path()?;
    let store = ConnectionStateStore::new(
        DbController::open(&db_path, cli.store.max_connections).await?,
    );
    let json = cli.json;

    match cli.command {
        Command::Add { hostname, id } => {
            let hostname = parley::apis::normalize_hostname(&hostname)
                .ok_or_else(|| format!("Invalid server address: {}", hostname))?;
            let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
            store.save_server(&id, &hostname).await?;
            print(json, &id, || format!("Saved server {} ({})", id, hostname))?;
        }
        Command::Remove { id } => {
            if !store.delete(&id).await? {
                return Err(format!("Unknown server '{}'", id).into());
            }
            print(json, &id, || format!("Removed server {}", id))?;
        }
        Command::List => {
            let servers = store.list().await?;
            print(json, &servers, || {
                if servers.is_empty() {
                    "No servers configured.".to_string()
                } else {
                    servers
                        .iter()
                        .map(|x| x.to_short_id_string())
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            })?;
        }
        Command::Show { id } => {
            let config = store
                .get(&id)
                .await?
                .ok_or_else(|| format!("Unknown server '{}'", id))?;
            print(json, &config, || {
                format!(
                    "ID:         {}\nHostname:   {}\nState:      {}\nSecure:     {}\nSession:    {}\nError:      {}\nUpdated:    {}",
                    config.server_config_id,
                    config.hostname.as_deref().unwrap_or("-"),
                    config.state,
                    config.secure_connection,
                    if config.session.is_some() { "present" } else { "-" },
                    config.last_error().unwrap_or("-"),
                    config.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
                )
            })?;
        }
        Command::State { id, state } => {
            let written = store.try_set_state(&id, state).await?;
            print(json, &written, || {
                if written {
                    format!("{} is now {}", id, state)
                } else {
                    format!("{} is already {}", id, state)
                }
            })?;
        }
        Command::Error { id, message } => {
            store.try_record_connection_error(&id, &message).await?;
            print(json, &id, || format!("Recorded error for {}: {}", id, message))?;
        }
        Command::Session { id, token } => {
            store.set_session(&id, &token).await?;
            print(json, &id, || format!("Stored session for {}", id))?;
        }
        Command::Disconnect { id } => {
            store.disconnect(&id).await?;
            print(json, &id, || format!("{} disconnected", id))?;
        }
        Command::Probe { address } => {
            let probe = ApiVersionProbe::new(HttpServerPolicyApi::new(cli.probe.timeout())?);
            let info = probe.probe(&address).await?;
            print(json, &info, || {
                format!(
                    "{} is {} (version {})",
                    address,
                    if info.is_secure { "secure" } else { "insecure" },
                    info.version().unwrap_or("unknown")
                )
            })?;
        }
        Command::Connect { id } => {
            let config = store
                .get(&id)
                .await?
                .ok_or_else(|| format!("Unknown server '{}'", id))?;
            let hostname = config
                .hostname
                .ok_or_else(|| format!("Server '{}' has no hostname", id))?;
            let probe = ApiVersionProbe::new(HttpServerPolicyApi::new(cli.probe.timeout())?);

            // The outcome is tracked in the record, printed below.
            let _ = check_connection(&store, &probe, &id, &hostname).await;

            let config = store
                .get(&id)
                .await?
                .ok_or_else(|| format!("Unknown server '{}'", id))?;
            print(json, &config, || config.to_short_id_string())?;
        }
    }

    store.db().close().await;
    Ok(())
}

pub fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER))
        .init();

    let cli = Cli::parse();
    let json = cli.json;
    let rt = match Runtime::new() {
        Ok(rt) => Arc::new(rt),
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(cli)) {
        if json {
            println!("{}", serde_json::json!({ "error": e }));
        } else {
            eprintln!("*** {}", e);
        }
        process::exit(1);
    }
}
