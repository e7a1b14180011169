use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use phonotek_server::catalog_store::{CatalogStore, SqliteCatalogStore};
use phonotek_server::config::FileConfig;
use phonotek_server::delivery::{
    spawn_retention_tasks, DeliveryEngine, DeliveryNotifier, NoopNotifier, WebhookNotifier,
};
use phonotek_server::server::state::ServerState;
use phonotek_server::server::{self, RequestsLoggingLevel, ServerConfig};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite music collection database file.
    #[clap(value_parser = parse_path)]
    pub catalog_db: PathBuf,

    /// Path to the server configuration TOML file.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3002)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            FileConfig::load(path)?
        }
        None => FileConfig::default(),
    };
    let delivery_settings = file_config.resolve_delivery()?;

    info!(
        "Opening SQLite collection database at {:?}...",
        cli_args.catalog_db
    );
    let catalog_store: Arc<dyn CatalogStore> =
        Arc::new(SqliteCatalogStore::new(&cli_args.catalog_db)?);

    info!("Initializing metrics...");
    server::metrics::init_metrics();
    server::metrics::init_catalog_metrics(
        catalog_store.artist_count(),
        catalog_store.album_count(),
        catalog_store.song_count(),
    );

    let notifier: Arc<dyn DeliveryNotifier> = match file_config
        .notifier
        .as_ref()
        .and_then(|n| n.url.clone())
    {
        Some(url) => {
            info!("Notifier configured at {}", url);
            Arc::new(WebhookNotifier::new(url))
        }
        None => Arc::new(NoopNotifier),
    };

    info!(
        "Delivery mode: {} (library root {:?}, downloads {:?})",
        delivery_settings.mode.as_str(),
        delivery_settings.music_library_root,
        delivery_settings.downloads_dir,
    );
    let retention = delivery_settings.retention;
    let delivery_engine = Arc::new(DeliveryEngine::new(
        catalog_store.clone(),
        notifier.clone(),
        delivery_settings,
    ));

    let _retention_handles = spawn_retention_tasks(
        delivery_engine.registry(),
        delivery_engine.deletions(),
        notifier,
        retention,
    );

    let config = ServerConfig {
        requests_logging_level: cli_args.logging_level,
        port: file_config.port.unwrap_or(cli_args.port),
        frontend_dir_path: file_config
            .frontend_dir_path
            .or(cli_args.frontend_dir_path),
    };

    let state = ServerState {
        config,
        start_time: Instant::now(),
        catalog_store,
        delivery_engine,
        hash: env!("GIT_HASH").to_string(),
    };

    info!("Ready to serve at port {}!", state.config.port);
    server::run_server(state).await
}
