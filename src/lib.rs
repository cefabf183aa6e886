use std::sync::Arc;

use self::cli::{Cli, Command};
use self::client::{HttpJobClient, SharedJobApi};
use self::detail::DetailView;
use self::job::JobId;
use self::routing::Route;
use self::shutdown::Shutdown;
use self::store::JobStore;
use self::toggle::ToggleController;
use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_error::ExtractSpanTrace;
use tracing_error::SpanTrace;

pub mod cli;
pub mod client;
pub mod config;
pub mod detail;
pub mod error;
pub mod job;
pub mod poller;
pub mod routing;
pub mod shutdown;
pub mod store;
pub mod toggle;
pub mod view;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to load config.\n{0}")]
    ConfigError(#[from] config::ConfigLoadError),

    #[error("Invalid command line override.\n{0}")]
    ConfigOverrideError(#[from] config::ConfigParseError),

    #[error("Failed to initialize HTTP client.\n{0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("List view stopped due to following error:\n{0}")]
    PollerError(#[from] poller::PollerError),

    #[error("{0}")]
    ToggleError(#[from] toggle::ToggleError),
}

impl ExtractSpanTrace for AppError {
    fn span_trace(&self) -> Option<&SpanTrace> {
        match self {
            AppError::ToggleError(e) => e.span_trace(),
            _ => None,
        }
    }
}

pub async fn app() -> Result<(), AppError> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::Config::new_from_file(path).await?,
        None => config::Config::default(),
    };
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url)?;
    }
    if let Some(interval) = cli.interval {
        config = config.with_poll_interval(interval)?;
    }

    info!("Config Loaded.");

    let client: SharedJobApi = Arc::new(HttpJobClient::new(&config.server)?);
    let store = JobStore::new();

    info!("Scheduler client initialized for {}.", config.server.base_url);

    match cli.command {
        Command::Open { route: Route::Home } => {
            let mut shutdown = Shutdown::new();
            view::run_list_view(client, store, config.polling, &mut shutdown).await?;
        }
        Command::Open {
            route: Route::Dag { name, tab },
        } => {
            let detail = DetailView::activate(client, store, name, tab).await;
            println!("{}", view::render_detail(&detail.compose().await));
        }
        Command::Toggle { name } => {
            let controller = ToggleController::new(client, store);
            let enabled = controller.toggle(&JobId::from(name.as_str())).await?;
            println!("{name}: {}", if enabled { "on" } else { "off" });
        }
    }

    Ok(())
}
