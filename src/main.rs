use chat_relay::config::config_search_paths;
use chat_relay::{build_router, AppState, ProxyConfig, SharedLogger};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "chat-relay",
    about = "Uniform chat endpoint in front of OpenAI-compatible or Gemini APIs",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Provider preset name (overrides config)
    #[arg(long)]
    provider: Option<String>,

    /// Request journal path
    #[arg(long, default_value = "chat-relay.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ref provider) = cli.provider {
        config.use_provider(provider);
    }

    let logger = SharedLogger::new(&cli.log_file)?;
    let credential = config.resolve_credential();

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .build()?;

    let state = AppState::new(config.clone(), credential, client, logger.clone())?;

    info!("chat-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("  Provider:  {}", config.provider.name);
    info!("  Base URL:  {}", state.base_url);
    info!("  Format:    {}", state.adapter.name());
    info!("  Model:     {} (default)", config.default_model());
    info!("  Port:      {}", config.port);
    info!("  Log file:  {}", cli.log_file.display());

    if !state.credential.is_present() {
        warn!(
            "{} is not set; /chat will answer 500 until it is",
            state.credential.env_var
        );
        logger.warn(
            "startup",
            format!("{} is not set", state.credential.env_var),
        );
    }

    logger.info(
        "startup",
        format!(
            "Starting chat-relay provider={} base_url={} port={} has_key={}",
            config.provider.name,
            state.base_url,
            config.port,
            state.credential.is_present()
        ),
    );

    let app = build_router(Arc::new(state));
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
