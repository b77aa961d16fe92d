//! Shopfront - interactive terminal storefront.
//!
//! # Usage
//!
//! ```bash
//! # Point at the commerce service and start the shell
//! SHOPFRONT_API_URL=http://localhost:5000/api shopfront
//!
//! # Or pass the URL explicitly
//! shopfront --api-url http://localhost:5000/api
//! ```
//!
//! Type `help` at the prompt for the list of commands.

#![cfg_attr(not(test), forbid(unsafe_code))]

mod render;
mod shell;

use std::process::ExitCode;

use clap::Parser;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shopfront_client::{ClientConfig, LogFormat, Storefront};

#[derive(Parser)]
#[command(name = "shopfront")]
#[command(author, version, about = "Shopfront terminal storefront")]
struct Cli {
    /// Commerce service base URL (overrides `SHOPFRONT_API_URL`)
    #[arg(long)]
    api_url: Option<String>,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Install the tracing subscriber. Logs go to stderr so they never interleave
/// with shell output.
fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shopfront_client=info,shopfront_cli=info".into());

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter));

    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

fn load_config(cli: &Cli) -> Result<ClientConfig, shopfront_client::ConfigError> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    ClientConfig::from_lookup(|key| match (key, &cli.api_url) {
        ("SHOPFRONT_API_URL", Some(url)) => Some(url.clone()),
        _ => std::env::var(key).ok(),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::Pretty);
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);
    init_tracing(config.log_format);

    let shop = match Storefront::connect(&config) {
        Ok(shop) => shop,
        Err(e) => {
            tracing::error!("Failed to create commerce client: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(api_url = %config.api_url, "storefront ready");

    if let Err(e) = shell::run(&shop).await {
        tracing::error!("Shell failed: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
