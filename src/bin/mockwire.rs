use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mockwire::config::Config;
use mockwire::engine::Engine;
use mockwire::storage::journal::JournalStorage;
use mockwire::storage::sqlite::SqliteStorage;
use mockwire::storage::{self, Storage};

#[derive(Parser)]
#[command(name = "mockwire", version, about = "Record/replay/transform HTTP intermediary")]
struct Cli {
    /// Path to a YAML config file; missing fields fall back to documented defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Start {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        target: Option<String>,
        #[arg(long = "storage-path")]
        storage_path: Option<String>,
        #[arg(long = "matching-strategy")]
        matching_strategy: Option<String>,
    },
    /// List every recorded exchange
    List,
    /// Delete every recorded exchange
    Clear,
    /// Delete one recorded exchange by id
    Delete {
        id: String,
    },
    /// Export recorded exchanges to a JSON file
    Export {
        file: PathBuf,
    },
    /// Import recorded exchanges from a JSON file
    Import {
        file: PathBuf,
    },
}

fn load_config(path: &Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(p) => Config::load(p),
        None => Ok(Config::default()),
    }
}

async fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.storage.kind.as_str() {
        "sqlite" => Arc::new(SqliteStorage::connect(&config.storage.path).await?),
        _ => Arc::new(JournalStorage::new(config.storage.path.clone())),
    };
    storage.init().await?;
    Ok(storage)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mockwire::logging::init_tracing();
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;

    match cli.command {
        Commands::Start {
            port,
            mode,
            target,
            storage_path,
            matching_strategy,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(mode) = mode {
                config.server.mode = mode;
            }
            if let Some(target) = target {
                config.target.url = Some(target);
            }
            if let Some(path) = storage_path {
                config.storage.path = path;
            }
            if let Some(strategy) = matching_strategy {
                config.matching.strategy = strategy.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            }

            let storage = open_storage(&config).await?;
            let engine = Arc::new(Engine::new(storage, &config)?);
            let addr = format!("0.0.0.0:{}", config.server.port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            mockwire::serve(listener, engine).await;
            Ok(())
        }
        Commands::List => {
            let storage = open_storage(&config).await?;
            let entries = storage.list().await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
        Commands::Clear => {
            let storage = open_storage(&config).await?;
            storage.clear().await?;
            println!("cleared all recorded exchanges");
            Ok(())
        }
        Commands::Delete { id } => {
            let storage = open_storage(&config).await?;
            if storage.delete(&id).await? {
                println!("deleted {id}");
                Ok(())
            } else {
                anyhow::bail!("no recorded entry with id {id}")
            }
        }
        Commands::Export { file } => {
            let storage = open_storage(&config).await?;
            let bytes = storage::export_json(storage.as_ref()).await?;
            tokio::fs::write(&file, bytes).await?;
            println!("exported to {}", file.display());
            Ok(())
        }
        Commands::Import { file } => {
            let storage = open_storage(&config).await?;
            let bytes = tokio::fs::read(&file).await?;
            let count = storage::import_json(storage.as_ref(), &bytes).await?;
            println!("imported {count} recorded exchanges");
            Ok(())
        }
    }
}
