// src/main.rs - Print queue daemon entry point
use std::sync::Arc;

use booth_print::compositor::ImageCompositor;
use booth_print::config::{self, Config};
use booth_print::dispatch::{Collaborators, Dispatcher};
use booth_print::printer::LpGateway;
use booth_print::scheduler::{PrintQueue, SystemClock};
use booth_print::settings::JsonSettingsStore;
use booth_print::store::SqliteJobStore;
use booth_print::web::{self, queue_channel::QueueRequest};
use clap::Parser;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "booth-printd", version, about = "Photobooth print queue daemon")]
struct Args {
    /// TOML config file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Do not start the polling loop at boot
    #[arg(long)]
    no_autostart: bool,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => config::load_config(path).map_err(|e| {
            eprintln!("Failed to load config from '{}': {}", path, e);
            Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
        })?,
        None => Config::default(),
    };

    tracing_subscriber::fmt()
        .with_max_level(config.logging.max_level())
        .init();

    tracing::info!("Starting booth print daemon");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Database: {}", config.storage.database_path.display());
    tracing::info!("Projects: {}", config.storage.projects_base_path.display());
    tracing::info!("Settings: {}", config.settings.path.display());

    let store = Arc::new(SqliteJobStore::open(&config.storage.database_path)?);
    let collaborators = Collaborators {
        store: store.clone(),
        customers: store,
        compositor: Arc::new(ImageCompositor::new(&config.print.merge_dir)),
        printer: Arc::new(LpGateway::new(
            config.print.spool_command.clone(),
            config.print.list_command.clone(),
        )),
        settings: Arc::new(JsonSettingsStore::new(&config.settings.path)),
        clock: Arc::new(SystemClock),
    };
    let dispatcher = Arc::new(Dispatcher::new(
        collaborators,
        &config.storage.projects_base_path,
    ));

    let found = dispatcher
        .reconcile_interrupted(config.print.startup_reconcile)
        .await?;
    if found > 0 {
        tracing::warn!(
            "{} job(s) were mid-dispatch at last shutdown (policy: {:?})",
            found,
            config.print.startup_reconcile
        );
    }

    let queue = Arc::new(PrintQueue::new(dispatcher));
    if config.print.autostart && !args.no_autostart {
        queue.start().await;
    } else {
        tracing::info!("Autostart disabled; start the queue through the API");
    }

    // Set up a channel for communication between Axum handlers and the queue task.
    let (queue_tx, queue_rx) = mpsc::channel::<QueueRequest>(16);
    let control = tokio::spawn(web::queue_channel::serve_requests(queue.clone(), queue_rx));

    let app = web::api::create_router(queue_tx);
    let listener = tokio::net::TcpListener::bind(&config.api.bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and with it every sender) is gone; the control task drains and exits.
    if let Err(e) = control.await {
        tracing::warn!("Queue control task ended abnormally: {}", e);
    }
    queue.stop().await;
    tracing::info!("Print queue daemon stopped");
    Ok(())
}
