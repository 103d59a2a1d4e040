//! COLLECT - Inventory ingestion and change-detection service
//!
//! Main entry point. Startup order: logging, configuration, database, queue
//! broker, diff engine, worker manager, HTTP listener. Shutdown order is the
//! reverse: the listener closes first so queues stop growing, then the
//! worker fleet drains within its timeout.

use std::sync::Arc;

use collect::api::{create_router, AppState};
use collect::auth::CredentialVerifier;
use collect::config::Config;
use collect::db::Database;
use collect::diff::{DiffEngine, DiffLimits, RuleStore};
use collect::queue::QueueBroker;
use collect::workers::{LogTransport, NotificationTransport, WebhookTransport, WorkerManager};

/// Clean shutdown
const EXIT_OK: i32 = 0;

/// Fatal initialisation failure (config, database, broker, rules)
const EXIT_INIT_FAILURE: i32 = 1;

/// Worker manager failed to start
const EXIT_MANAGER_FAILURE: i32 = 2;

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = collect::VERSION, "collect starting");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            return EXIT_INIT_FAILURE;
        }
    };

    let db = match Database::connect(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "database connection failed");
            return EXIT_INIT_FAILURE;
        }
    };
    tracing::info!("database ready");

    let broker = match QueueBroker::connect(&config.queue).await {
        Ok(broker) => Arc::new(broker),
        Err(e) => {
            tracing::error!(error = %e, "queue broker connection failed");
            return EXIT_INIT_FAILURE;
        }
    };
    tracing::info!(redis_url = %config.queue.redis_url, "queue broker ready");

    let rules = match RuleStore::new(config.inventory.rules_path.clone()) {
        Ok(rules) => rules,
        Err(e) => {
            tracing::error!(error = %e, "diff rule loading failed");
            return EXIT_INIT_FAILURE;
        }
    };
    let engine = DiffEngine::new(
        rules,
        DiffLimits {
            max_depth: config.inventory.diff_depth,
            max_field_path: config.inventory.diff_max_field_path,
            max_changes: config.inventory.diff_max_changes,
        },
    );

    let transport: Arc<dyn NotificationTransport> = match &config.notifications.webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "alerts go to webhook");
            Arc::new(WebhookTransport::new(url.clone()))
        }
        None => Arc::new(LogTransport),
    };

    let manager = Arc::new(WorkerManager::new(
        &config,
        db.clone(),
        Arc::clone(&broker),
        Arc::clone(&engine),
        transport,
    ));
    if let Err(e) = manager.start() {
        tracing::error!(error = %e, "worker manager start failed");
        return EXIT_MANAGER_FAILURE;
    }

    // SIGHUP re-reads the diff rule file and swaps the compiled set
    #[cfg(unix)]
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut hangup =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
                    Ok(signal) => signal,
                    Err(_) => return,
                };
            while hangup.recv().await.is_some() {
                match engine.reload_rules() {
                    Ok(()) => tracing::info!("diff rules reloaded on SIGHUP"),
                    Err(e) => tracing::warn!(error = %e, "diff rule reload failed, keeping current set"),
                }
            }
        });
    }

    let verifier = CredentialVerifier::new(db.clone(), config.auth.clone());
    let listen_address = config.api.listen_address;
    let state = Arc::new(AppState {
        db,
        broker,
        verifier,
        manager: Arc::clone(&manager),
        config,
    });

    let router = create_router(state);

    let listener = match tokio::net::TcpListener::bind(listen_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %listen_address, error = %e, "listener bind failed");
            manager.stop().await;
            return EXIT_INIT_FAILURE;
        }
    };
    tracing::info!(address = %listen_address, "listening");

    let serve_result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Listener is closed: drain the fleet before reporting
    manager.stop().await;

    match serve_result {
        Ok(()) => {
            tracing::info!("collect shutdown complete");
            EXIT_OK
        }
        Err(e) => {
            tracing::error!(error = %e, "server error");
            EXIT_INIT_FAILURE
        }
    }
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
