//! Whale Alert - Headless Server
//!
//! Receives ERC20 balance-change webhooks for tracked whale wallets and
//! forwards material moves to Telegram subscribers.

mod config;
mod routes;
mod state;

use clap::Parser;
use config::AppConfig;
use state::AppContext;
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Whale Alert CLI
#[derive(Parser, Debug)]
#[command(name = "whale-alert")]
#[command(about = "ERC20 whale movement alerts for Telegram", long_about = None)]
struct Args {
    /// HTTP port (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Token universe CSV (overrides TOKENS_CSV)
    #[arg(short, long)]
    tokens: Option<PathBuf>,
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    if let Err(e) = dotenvy::dotenv() {
        info!("No .env file loaded: {}", e);
    }

    let mut config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(tokens) = args.tokens {
        config.tokens_csv = tokens;
    }

    info!("🐋 Whale Alert starting");
    info!("  Port: {}", config.port);
    info!("  Upstream: {}", config.sim_api_url);
    info!("  Webhook base URL: {}", config.webhook_base_url);
    info!("  Token list: {}", config.tokens_csv.display());

    let port = config.port;
    let ctx = match AppContext::connect(config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let db = ctx.db.clone();
    let app = routes::router(ctx).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("🌐 Listening on {}", addr);

    let result = axum::serve(listener, app).await;
    db.close().await;
    if let Err(e) = result {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
