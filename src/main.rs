use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use condoconnect::api::RequestExecutor;
use condoconnect::auth::{Anonymous, AuthProvider, StaticToken};
use condoconnect::config::{Config, ConfigFile, Environment};
use condoconnect::realtime::{LogBridge, MessageHandlers, RealtimeChannel, WebSocketConnector};
use condoconnect::sync::{OfflineSyncEngine, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "condoconnect")]
#[command(about = "Offline sync and realtime agent for CondoconnectAI")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/condoconnect/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Deployment environment, overriding the config file
  #[arg(short, long, value_enum)]
  environment: Option<Environment>,

  /// Answer requests from canned data instead of the network
  #[arg(long)]
  mock: bool,

  /// Run a single sync cycle and exit
  #[arg(long)]
  once: bool,

  /// Write daily rolling log files here instead of stderr
  #[arg(long)]
  log_dir: Option<PathBuf>,
}

fn init_tracing(log_dir: Option<&PathBuf>) -> tracing_appender::non_blocking::WorkerGuard {
  let (writer, guard) = match log_dir {
    Some(dir) => tracing_appender::non_blocking(tracing_appender::rolling::daily(
      dir,
      "condoconnect.log",
    )),
    None => tracing_appender::non_blocking(std::io::stderr()),
  };

  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("condoconnect=info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(log_dir.is_none())
    .init();

  guard
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing(args.log_dir.as_ref());

  // Load configuration
  let mut config: Config = ConfigFile::load(args.config.as_deref())?.resolve(args.environment);
  if args.mock {
    config.api.mock_mode = true;
  }

  let auth: Arc<dyn AuthProvider> = match Config::session_token() {
    Some(token) => Arc::new(StaticToken::new(token)),
    None => {
      warn!("no session token in environment, requests are unauthenticated");
      Arc::new(Anonymous)
    }
  };

  let executor = RequestExecutor::from_config(&config.api, Arc::clone(&auth))?;
  info!(
    environment = ?config.environment,
    base_url = executor.base_url(),
    mock = executor.is_mock(),
    "api client ready"
  );

  let store = match &config.sync.database {
    Some(path) => SqliteStore::open(path)?,
    None => SqliteStore::open_default()?,
  };
  let engine = OfflineSyncEngine::new(executor, Arc::new(store), &config.sync);

  if args.once {
    let report = engine.perform_sync().await;
    for failed in report.failed_tables() {
      warn!(table = failed, "table did not sync");
    }
    return Ok(());
  }

  let channel = config.realtime.enabled.then(|| {
    let handlers = MessageHandlers::new()
      .with_notifications(Arc::new(LogBridge))
      .with_updates(Arc::new(engine.clone()));
    let channel = RealtimeChannel::new(
      &config.realtime,
      Arc::clone(&auth),
      Arc::new(WebSocketConnector),
      handlers,
    );
    channel.connect();
    channel
  });

  if config.sync.enabled {
    engine.start()?;
  }

  tokio::signal::ctrl_c().await?;
  info!("shutting down");

  if let Some(channel) = channel {
    channel.disconnect();
  }
  engine.stop()?;

  Ok(())
}
