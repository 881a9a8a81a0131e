use flowmentor_ai::StaticTextGenerator;
use flowmentor_core::UserId;
use flowmentor_integration::{DocumentStore, InMemoryDocumentStore, LogNotifier};
use flowmentor_scheduler::{DocumentFiringLedger, Scheduler, standard_triggers};
use flowmentor_server::config::ServerConfig;
use flowmentor_server::db::{PgDocumentStore, PgHistoryStore};
use flowmentor_server::error::StartupError;
use flowmentor_server::state::AppState;
use flowmentor_server::{build_runner, routes};
use flowmentor_workflow::{Clock, HistoryStore, InMemoryHistoryStore, SystemClock};
use rootcause::prelude::Report;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Report<StartupError>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().map_err(|e| StartupError::Config {
        reason: e.to_string(),
    })?;
    let scheduler_config = config
        .scheduler
        .scheduler_config()
        .map_err(|e| StartupError::Config {
            reason: e.to_string(),
        })?;
    let default_user = UserId::new(config.default_user.clone()).map_err(|e| {
        StartupError::Config {
            reason: format!("default_user: {e}"),
        }
    })?;
    tracing::info!("Loaded configuration");

    let (history, store): (Arc<dyn HistoryStore>, Arc<dyn DocumentStore>) =
        match &config.database_url {
            Some(url) => {
                let db_pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect(url)
                    .await
                    .map_err(|e| StartupError::Database {
                        reason: e.to_string(),
                    })?;

                tracing::info!("Running database migrations...");
                sqlx::migrate!("./migrations")
                    .run(&db_pool)
                    .await
                    .map_err(|e| StartupError::Database {
                        reason: e.to_string(),
                    })?;

                (
                    Arc::new(PgHistoryStore::new(db_pool.clone())) as Arc<dyn HistoryStore>,
                    Arc::new(PgDocumentStore::new(db_pool)) as Arc<dyn DocumentStore>,
                )
            }
            None => {
                tracing::warn!("no database_url configured; workflow state is kept in memory");
                (
                    Arc::new(InMemoryHistoryStore::new()) as Arc<dyn HistoryStore>,
                    Arc::new(InMemoryDocumentStore::new()) as Arc<dyn DocumentStore>,
                )
            }
        };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let runner = build_runner(
        history,
        store.clone(),
        Arc::new(LogNotifier::new()),
        Arc::new(StaticTextGenerator::sample()),
        clock.clone(),
    );

    runner.recover().await.map_err(|e| StartupError::Recovery {
        reason: e.to_string(),
    })?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stopped = |mut rx: watch::Receiver<bool>| async move {
        // An error means the sender is gone, which is shutdown too.
        let _ = rx.wait_for(|stop| *stop).await;
    };

    let timer_runner = runner.clone();
    let poll_interval = Duration::from_millis(config.timer.poll_interval_ms);
    let timer_task = tokio::spawn({
        let shutdown = stopped(shutdown_rx.clone());
        async move { timer_runner.run_timer_loop(poll_interval, shutdown).await }
    });

    let scheduler_task = if config.scheduler.enabled {
        let triggers = standard_triggers(&default_user).map_err(|e| StartupError::Triggers {
            reason: e.to_string(),
        })?;
        let scheduler = Scheduler::new(
            triggers,
            Arc::new(DocumentFiringLedger::new(store)),
            Arc::new(runner.clone()),
            scheduler_config,
        );
        let tick_interval = Duration::from_secs(config.scheduler.tick_interval_seconds);
        let shutdown = stopped(shutdown_rx.clone());
        let clock = clock.clone();
        tracing::info!(
            triggers = scheduler.triggers().len(),
            "Starting scheduler"
        );
        Some(tokio::spawn(async move {
            scheduler.run(clock, tick_interval, shutdown).await;
        }))
    } else {
        None
    };

    let app = routes::router(AppState::new(runner.clone(), default_user));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| StartupError::Serve {
            reason: format!("binding {}: {e}", config.bind_addr),
        })?;

    tracing::info!("listening on http://{}", config.bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "listening for shutdown signal failed");
            }
            tracing::info!("shutdown signal received");
        })
        .await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = timer_task.await {
        tracing::error!(error = %e, "timer loop panicked");
    }
    if let Some(task) = scheduler_task {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "scheduler panicked");
        }
    }
    runner.wait_idle().await;

    served.map_err(|e| StartupError::Serve {
        reason: e.to_string(),
    })?;
    Ok(())
}
