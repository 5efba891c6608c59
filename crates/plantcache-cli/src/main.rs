//! plantcache - keep your plant collection readable offline.
//!
//! Signs an owner in, mirrors their remote plant document into a local
//! SQLite store, and serves reads and edits from that store.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use plantcache_core::{
    ApiClient, Config, NewPlant, OwnerProvider, PlantStore, ReplaceStrategy, Session, SessionData,
    SyncError, Synchronizer,
};

/// Directory for an additional rolling log file, if set
const LOG_DIR_ENV: &str = "PLANTCACHE_LOG_DIR";

const USAGE: &str = "\
Usage: plantcache <command>

Commands:
  login <owner-id> [token]                      Remember the owner to sync for
  logout                                        Forget the signed-in owner
  sync                                          Replace local plants with the remote set
  list [--json]                                 Show locally cached plants
  add <remote-id> <name> <description> <image>  Cache a single plant
  delete <remote-id>                            Remove a cached plant
  clear                                         Remove every cached plant";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Help,
    Login { owner_id: String, token: Option<String> },
    Logout,
    Store(StoreCommand),
}

/// Commands that need the local store open.
#[derive(Debug, PartialEq, Eq)]
enum StoreCommand {
    Sync,
    List { json: bool },
    Add(NewPlant),
    Delete(String),
    Clear,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let command = match args.as_slice() {
        [] | ["help"] | ["--help"] | ["-h"] => Command::Help,
        ["login", owner_id] => Command::Login {
            owner_id: owner_id.to_string(),
            token: None,
        },
        ["login", owner_id, token] => Command::Login {
            owner_id: owner_id.to_string(),
            token: Some(token.to_string()),
        },
        ["logout"] => Command::Logout,
        ["sync"] => Command::Store(StoreCommand::Sync),
        ["list"] => Command::Store(StoreCommand::List { json: false }),
        ["list", "--json"] => Command::Store(StoreCommand::List { json: true }),
        ["add", remote_id, name, description, image] => Command::Store(StoreCommand::Add(
            NewPlant::new(*remote_id, *name, *description, *image),
        )),
        ["delete", remote_id] => Command::Store(StoreCommand::Delete(remote_id.to_string())),
        ["clear"] => Command::Store(StoreCommand::Clear),
        _ => bail!("Unrecognized arguments: {}\n\n{}", args.join(" "), USAGE),
    };
    Ok(command)
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "plantcache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load()?;
    let mut session = Session::new(Config::data_dir()?);
    session.load()?;

    match command {
        Command::Help => Ok(()),
        Command::Login { owner_id, token } => {
            let Some(owner) = owner_id.owner_id() else {
                bail!("Owner id must not be blank");
            };
            if session.owner_id().is_some_and(|current| current != owner) {
                warn!(previous = ?session.owner_id(), owner = %owner, "Switching owner; run sync to replace cached plants");
            }
            session.update(SessionData::new(owner.clone(), token));
            session.save().context("Failed to save session")?;
            println!("Signed in as {}", owner);
            Ok(())
        }
        Command::Logout => {
            session.clear()?;
            println!("Signed out");
            Ok(())
        }
        Command::Store(command) => {
            let db_path = config.database_path()?;
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = PlantStore::open(&db_path)
                .await
                .with_context(|| format!("Failed to open plant store at {}", db_path.display()))?;
            info!(path = %db_path.display(), "Plant store ready");

            let result = run(command, &config, &session, &store).await;
            store.close().await;
            result
        }
    }
}

async fn run(command: StoreCommand, config: &Config, session: &Session, store: &PlantStore) -> Result<()> {
    match command {
        StoreCommand::Sync => {
            let mut client = ApiClient::with_timeout(config.api_base_url()?, config.request_timeout())?;
            if let Some(token) = session.token() {
                client.set_token(token.to_string());
            }
            let strategy = if config.atomic_sync {
                ReplaceStrategy::Atomic
            } else {
                ReplaceStrategy::Stepwise
            };
            let sync = Synchronizer::new(store.clone(), Arc::new(client))
                .with_deadline(config.sync_deadline())
                .with_strategy(strategy);

            match sync.sync_current(session).await {
                Ok(report) => {
                    println!(
                        "Synced {} plants for {} (replaced {})",
                        report.restored, report.owner_id, report.cleared
                    );
                    Ok(())
                }
                Err(e) => {
                    if e.cache_preserved() {
                        eprintln!("Sync failed; local plants were left unchanged.");
                    }
                    if let SyncError::RemoteFetch(ref api) = e {
                        if api.is_retryable() {
                            eprintln!("The remote store may be busy; try again shortly.");
                        }
                    }
                    Err(e.into())
                }
            }
        }
        StoreCommand::List { json } => {
            let plants = store.fetch_all().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plants)?);
            } else if plants.is_empty() {
                println!("No plants cached.");
            } else {
                for plant in &plants {
                    println!("{:>4}  {:<24} {} - {}", plant.local_id, plant.remote_id, plant.name, plant.description);
                }
            }
            Ok(())
        }
        StoreCommand::Add(plant) => {
            let outcome = store.insert(&plant).await?;
            println!("Cached {} as #{}", plant.remote_id, outcome.local_id);
            Ok(())
        }
        StoreCommand::Delete(remote_id) => {
            let deleted = store.delete_by_remote_id(&remote_id).await?;
            if deleted == 0 {
                println!("No cached plant with id {}", remote_id);
            } else {
                println!("Deleted {}", remote_id);
            }
            Ok(())
        }
        StoreCommand::Clear => {
            let cleared = store.clear().await?;
            println!("Removed {} cached plants", cleared);
            Ok(())
        }
    }
}
