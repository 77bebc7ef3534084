use anyhow::{Context, bail};
use chat_relay::assistant::{Assistant, CompletionsAssistant, EchoAssistant, ThreadsAssistant};
use chat_relay::config::{self, AssistantProvider, RelayConfig, StorageBackend};
use chat_relay::logger::{self, LogLevel};
use chat_relay::server::{self, AppState};
use chat_relay::store::{FileRecords, MemoryRecords, ObjectRecords, RecordStore};
use chat_relay::{HistoryStore, Relay, RetryRecords};
use clap::Parser;
use std::fs::{File, OpenOptions};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// `relayd`: forwards questions to a hosted assistant and keeps per-user history
#[derive(Parser, Debug)]
#[command(name = "relayd", version, about = "Chat relay with per-user history")]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind, overriding the config file
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding the config file
    #[arg(long)]
    port: Option<u16>,

    /// Directory for the file storage backend, overriding the config file
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// API key for the assistant service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Logging verbosity when `RUST_LOG` is unset
    #[arg(long, default_value = "info")]
    log_level: LogLevel,

    /// Run as a background daemon
    #[arg(short = 'd', long)]
    daemon: bool,

    /// File receiving log output once daemonized
    #[arg(long, default_value = "relayd.log")]
    log_file: PathBuf,
}

/// Open `path` for appending as the daemon's stdout and stderr.
fn daemon_sink(path: &Path) -> std::io::Result<(File, File)> {
    let out = OpenOptions::new().create(true).append(true).open(path)?;
    let err = out.try_clone()?;
    Ok((out, err))
}

fn build_records(cfg: &RelayConfig, client: &reqwest::Client) -> anyhow::Result<Arc<dyn RecordStore>> {
    let records: Arc<dyn RecordStore> = match cfg.storage.backend {
        StorageBackend::File => Arc::new(RetryRecords::new(
            FileRecords::new(cfg.storage.dir.clone()),
            cfg.retry.clone(),
        )),
        StorageBackend::Object => {
            let endpoint = cfg
                .storage
                .endpoint
                .as_deref()
                .context("storage.endpoint is required for the object backend")?;
            let mut objects = ObjectRecords::new(client.clone(), endpoint, &cfg.storage.bucket);
            if let Some(token) = &cfg.storage.token {
                objects = objects.token(token);
            }
            Arc::new(RetryRecords::new(objects, cfg.retry.clone()))
        }
        StorageBackend::Memory => Arc::new(MemoryRecords::new()),
    };
    Ok(records)
}

fn build_assistant(cfg: &RelayConfig, client: &reqwest::Client) -> anyhow::Result<Arc<dyn Assistant>> {
    let a = &cfg.assistant;
    let api_key = || {
        a.api_key
            .as_deref()
            .context("an API key is required; set OPENAI_API_KEY")
    };
    let assistant: Arc<dyn Assistant> = match a.provider {
        AssistantProvider::Threads => {
            let Some(assistant_id) = a.assistant_id.as_deref() else {
                bail!("assistant.assistant_id is required for the threads provider");
            };
            Arc::new(
                ThreadsAssistant::new(client.clone(), &a.base_url, api_key()?, assistant_id)
                    .retry(cfg.retry.clone()),
            )
        }
        AssistantProvider::Completions => Arc::new(
            CompletionsAssistant::new(client.clone(), &a.base_url, api_key()?, &a.model)
                .retry(cfg.retry.clone()),
        ),
        AssistantProvider::Echo => Arc::new(EchoAssistant::new()),
    };
    Ok(assistant)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = configure(&cli).await?;
    let client = reqwest::Client::builder()
        .build()
        .context("building HTTP client")?;
    let records = build_records(&cfg, &client)?;
    let assistant = build_assistant(&cfg, &client)?;

    let history = HistoryStore::new(records)
        .titles(cfg.history.title_style())
        .collisions(cfg.history.collision);
    let relay = Relay::new(Arc::new(history), assistant)
        .window(cfg.history.context_window)
        .poll(cfg.polling.clone());

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.server.host, cfg.server.port))?;
    tracing::info!(
        storage = ?cfg.storage.backend,
        assistant = ?cfg.assistant.provider,
        window = cfg.history.context_window,
        "starting relay"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(server::shutdown_signal(shutdown.clone()));
    server::serve(addr, AppState::new(Arc::new(relay), shutdown)).await?;
    tracing::info!("relay stopped");
    Ok(())
}

async fn configure(cli: &Cli) -> anyhow::Result<RelayConfig> {
    let mut cfg = match &cli.config {
        Some(path) => config::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => RelayConfig::default(),
    };
    if let Some(host) = &cli.host {
        cfg.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        cfg.server.port = port;
    }
    if let Some(dir) = &cli.data_dir {
        cfg.storage.dir = dir.clone();
    }
    if cli.api_key.is_some() {
        cfg.assistant.api_key = cli.api_key.clone();
    }
    Ok(cfg)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::try_init(cli.log_level).map_err(|e| anyhow::anyhow!(e))?;

    // Detach before the runtime spawns its worker threads. The subscriber
    // writes to fd 1, which now points at the log file.
    if cli.daemon {
        let (stdout, stderr) = daemon_sink(&cli.log_file)
            .with_context(|| format!("opening {}", cli.log_file.display()))?;
        daemonize::Daemonize::new()
            .working_directory(std::env::current_dir()?)
            .stdout(stdout)
            .stderr(stderr)
            .start()
            .map_err(|e| anyhow::anyhow!(e))?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn daemon_sink_appends_to_log_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relayd.log");
        std::fs::write(&path, "earlier\n").unwrap();

        let (mut out, mut err) = daemon_sink(&path).unwrap();
        writeln!(out, "from stdout").unwrap();
        writeln!(err, "from stderr").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "earlier\nfrom stdout\nfrom stderr\n");
    }

    #[test]
    fn log_file_has_a_default() {
        let cli = Cli::parse_from(["relayd", "--daemon"]);
        assert!(cli.daemon);
        assert_eq!(cli.log_file, PathBuf::from("relayd.log"));
    }
}
