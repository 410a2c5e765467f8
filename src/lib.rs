pub mod activity;
pub mod chat;
pub mod config;
pub mod db;
pub mod engine;
pub mod metrics;
pub mod policy;
pub mod recorder;
pub mod sentiment;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{error, info, warn};

use chat::{ChatTransport, LineTransport, TwitchIrcTransport};
use config::EngineConfig;
use db::Database;
use engine::{Engine, EngineEvent};
use recorder::{CommandBackend, DryRunBackend, RecordingBackend};
use sentiment::{LexiconScorer, ScoreStore};

const DEFAULT_CONFIG_FILE: &str = "clipwatch.json";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub config: Option<PathBuf>,
    /// Read chat from stdin instead of Twitch
    pub stdin: bool,
    /// Log clip decisions instead of calling the recorder
    pub dry_run: bool,
}

impl Args {
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Args::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = args.next().context("--config needs a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--stdin" => parsed.stdin = true,
                "--dry-run" => parsed.dry_run = true,
                other => bail!("unrecognized argument '{other}'"),
            }
        }
        Ok(parsed)
    }

    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .or_else(EngineConfig::path_from_env)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }
}

pub async fn run(args: Args) -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("clipwatch v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = args.config_path();
    let config = EngineConfig::load(&config_path)
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;

    let backend: Arc<dyn RecordingBackend> = if args.dry_run || config.recorder.begin_command.is_empty() {
        if !args.dry_run {
            warn!("no recorder commands configured, running as a dry run");
        }
        Arc::new(DryRunBackend)
    } else {
        Arc::new(CommandBackend::new(
            config.recorder.begin_command.clone(),
            config.recorder.end_command.clone(),
        )?)
    };

    let store: Option<Arc<dyn ScoreStore>> = match &config.storage.score_db_path {
        Some(path) => Some(Arc::new(Database::new(path.clone())?)),
        None => None,
    };

    let transport: Box<dyn ChatTransport> = if args.stdin {
        Box::new(LineTransport::stdin())
    } else {
        if config.chat.irc.channels.is_empty() {
            bail!("no chat channels configured; set chat.irc.channels or use --stdin");
        }
        Box::new(TwitchIrcTransport::new(config.chat.irc.clone()))
    };

    let engine = Engine::new(&config, Arc::new(LexiconScorer::new()), backend, store);
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let EngineEvent::BackendFailed { .. } = &event {
                error!("operator alert: {}", serde_json::to_string(&event).unwrap_or_default());
            }
        }
    });

    let handle = engine.start(transport);
    let cancel_token = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            cancel_token.cancel();
        }
    });

    let result = handle.wait().await;
    match &result {
        Ok(snapshot) => info!(
            "final metrics: {}",
            serde_json::to_string(snapshot).unwrap_or_default()
        ),
        Err(err) => error!("engine stopped with an error: {err}"),
    }
    result?;
    Ok(())
}
