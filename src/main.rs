use std::sync::Arc;

use tokio_util::sync::CancellationToken;

mod app;
mod config;
mod db;
mod error;
mod feed;
mod models;
mod notify;
mod scheduler;
mod services;
mod updater;

use app::App;
use config::Config;
use db::{CatalogStore, Repository};
use error::Result;
use feed::{HistoryFetcher, HttpTransport, ReleaseFetcher, ReqwestTransport};
use notify::{history_caption, LogNotifier};
use scheduler::Scheduler;
use services::CoverClient;
use updater::{Updater, UpdaterSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (info and above by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let refresh_once = args.len() >= 2 && args[1] == "--refresh";
    let print_today = args.len() >= 2 && args[1] == "--today";

    // Load configuration
    let config = Config::load()?;

    // Shared services
    let store: Arc<dyn CatalogStore> = Arc::new(Repository::new(&config.db_path).await?);
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);

    let releases = ReleaseFetcher::new(transport.clone(), &config.release_api_url)?
        .with_cooldown(config.rate_limit_cooldown());
    let history = HistoryFetcher::new(transport.clone(), &config.history_url)?;
    let covers = CoverClient::new(transport, &config.cover_api_url)?;

    let updater = Arc::new(Updater::new(
        Arc::new(releases),
        store.clone(),
        Arc::new(covers),
        UpdaterSettings::from(&config),
    ));
    let app = Arc::new(App::new(&config, store.clone(), Arc::new(history), updater.clone())?);

    // Headless refresh: one cycle, then exit
    if refresh_once {
        let reports = updater.run_cycle().await;
        let inserted: usize = reports.iter().map(|r| r.inserted).sum();
        println!(
            "Refreshed {} years, {} new releases, {} in catalog",
            reports.len(),
            inserted,
            store.release_count().await?
        );
        store.close().await?;
        return Ok(());
    }

    if print_today {
        let today = app.today();
        let result = app.today_history(today).await;
        app.close().await;
        store.close().await?;
        for post in result? {
            println!("{}\n", history_caption(&post));
        }
        return Ok(());
    }

    let scheduler = Scheduler::new(&config, app, Arc::new(LogNotifier::new()))?;
    let cancel = CancellationToken::new();

    let updater_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { updater.run(cancel).await }
    });
    let scheduler_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });

    tracing::info!("Running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
    }

    tracing::info!("Shutting down");
    cancel.cancel();
    for (name, task) in [("updater", updater_task), ("scheduler", scheduler_task)] {
        if let Err(e) = task.await {
            tracing::error!("{} task failed: {}", name, e);
        }
    }

    store.close().await?;
    Ok(())
}
