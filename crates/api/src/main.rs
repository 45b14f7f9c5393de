//! Process entry point: HTTP server plus the saga consumers.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{AppState, SharedLedger};
use domain::{InMemoryInventoryLedger, PostgresInventoryLedger};
use event_bus::{BestEffortPublisher, BusConfig, InMemoryEventBus};
use saga::{Choreography, ConsumerConfig, ReconciliationSweep};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn open_ledger(config: &Config) -> SharedLedger {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to Postgres");
            let ledger = PostgresInventoryLedger::new(pool);
            ledger
                .run_migrations()
                .await
                .expect("failed to run inventory migrations");
            tracing::info!("using Postgres inventory ledger");
            Arc::new(ledger)
        }
        None => {
            tracing::info!("using in-memory inventory ledger");
            Arc::new(InMemoryInventoryLedger::new())
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Bus, ledger and services
    let bus = InMemoryEventBus::new(BusConfig {
        partitions: config.bus_partitions,
        redelivery_timeout: config.bus_redelivery_timeout,
    });
    let publisher = BestEffortPublisher::spawn(bus.clone());
    let ledger = open_ledger(&config).await;
    let state = Arc::new(AppState::new(ledger.clone(), publisher.clone()));

    // 4. Consumers for every participant, plus the optional sweep
    let consumer_config = ConsumerConfig {
        poll_timeout: config.consumer_poll_timeout,
        ..ConsumerConfig::default()
    };
    let workers = state
        .participants(config.reservation_policy)
        .workers(&bus, &config.instance_id, &consumer_config);
    let mut choreography = Choreography::start(workers);

    if let Some(every) = config.reconcile_interval {
        let grace = chrono::Duration::from_std(config.reconcile_grace)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let sweep = ReconciliationSweep::new(state.orders.clone(), ledger.clone(), grace)
            .with_dead_letters(state.dead_letters.clone());
        choreography.attach(sweep.spawn(every, choreography.shutdown_signal()));
        tracing::info!(interval_secs = every.as_secs(), "reconciliation enabled");
    }

    // 5. Build the application
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(
        %addr,
        policy = %config.reservation_policy,
        partitions = config.bus_partitions,
        "starting API server"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Drain outgoing events, then stop consumers
    publisher.flush().await;
    choreography.shutdown().await;

    tracing::info!("server shut down gracefully");
}
