use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stagecheck_core::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod session;
mod util;

use util::exit_error;

#[derive(Parser)]
#[command(
    name = "stagecheck",
    version,
    about = "Staging backend checks: health, endpoint probes, E2E tokens and WebSocket chat validation"
)]
struct Cli {
    /// Env file to load (default: config/<environment>.env)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Target environment name
    #[arg(long, global = true, env = "ENVIRONMENT")]
    environment: Option<String>,

    /// API base URL
    #[arg(long, global = true, env = "STAGING_API_URL")]
    api_url: Option<String>,

    /// WebSocket URL for chat sessions
    #[arg(long, global = true, env = "STAGING_WS_URL")]
    ws_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check backend health
    Health,
    /// Check that API endpoints are mounted
    Probe(commands::probe::ProbeArgs),
    /// Mint an E2E token and show how it was built
    Token(commands::token::TokenArgs),
    /// Run a chat session and validate the event stream
    Chat(commands::chat::ChatArgs),
    /// Verify that unauthenticated WebSocket connections are refused
    AuthEnforced(commands::auth::AuthEnforcedArgs),
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stagecheck=info,stagecheck_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load_for(cli.environment.as_deref(), cli.env_file.as_deref()) {
        Ok(config) => config,
        Err(e) => exit_error(
            &e.to_string(),
            Some("Pass an existing --env-file or create config/<environment>.env"),
        ),
    };
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url.trim_end_matches('/').to_string();
    }
    if let Some(ws_url) = cli.ws_url {
        config.ws_url = ws_url;
    }
    tracing::debug!(
        environment = %config.environment,
        api_url = %config.api_url,
        ws_url = %config.ws_url,
        "configuration loaded"
    );

    let code = match cli.command {
        Commands::Health => commands::health::run(&config.api_url).await,
        Commands::Probe(args) => commands::probe::run(&config.api_url, args).await,
        Commands::Token(args) => commands::token::run(&config, args),
        Commands::Chat(args) => commands::chat::run(&config, args).await,
        Commands::AuthEnforced(args) => commands::auth::run(&config, args).await,
    };

    std::process::exit(code);
}
