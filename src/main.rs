//! payment-ingest entry point.
//!
//! Connects the record store, prepares the queue, publishes the seed
//! batch, starts the consumer and serves `/health` until Ctrl-C or
//! SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use payment_ingest::api;
use payment_ingest::app_state::AppState;
use payment_ingest::config::{IngestConfig, StoreBackend, TransportKind};
use payment_ingest::logging;
use payment_ingest::pipeline::{Consumer, PipelineStats, SEED_BATCH, publish_record, publish_seed};
use payment_ingest::storage::{InMemoryStore, PostgresGateway, RecordStore};
#[cfg(feature = "kafka")]
use payment_ingest::transport::KafkaTransport;
use payment_ingest::transport::{InMemoryQueue, QueueTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IngestConfig::from_env().context("invalid configuration")?;
    logging::init(&config.log).map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;
    tracing::info!(queue = %config.queue.name, "starting payment-ingest");

    match config.store.backend {
        StoreBackend::Postgres => {
            let gateway = PostgresGateway::bootstrap(&config.store)
                .await
                .context("failed to prepare postgres store")?;
            with_transport(config, Arc::new(gateway)).await
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory record store; nothing will be persisted");
            with_transport(config, Arc::new(InMemoryStore::new())).await
        }
    }
}

async fn with_transport<S>(config: IngestConfig, store: Arc<S>) -> anyhow::Result<()>
where
    S: RecordStore + 'static,
{
    match config.queue.transport {
        TransportKind::Memory => run(config, Arc::new(InMemoryQueue::new()), store).await,
        #[cfg(feature = "kafka")]
        TransportKind::Kafka => {
            let transport =
                KafkaTransport::new(&config.queue.kafka_brokers, &config.queue.kafka_group_id)
                    .context("failed to create kafka transport")?;
            run(config, Arc::new(transport), store).await
        }
        #[cfg(not(feature = "kafka"))]
        TransportKind::Kafka => {
            anyhow::bail!("QUEUE_TRANSPORT=kafka requires building with the `kafka` feature")
        }
    }
}

async fn run<T, S>(config: IngestConfig, transport: Arc<T>, store: Arc<S>) -> anyhow::Result<()>
where
    T: QueueTransport + 'static,
    S: RecordStore + 'static,
{
    let queue = config.queue.name.clone();
    transport
        .declare_queue(&queue)
        .await
        .context("failed to declare queue")?;
    tracing::info!(%queue, "queue declared");

    if config.queue.purge_on_start {
        let purged = transport
            .purge_queue(&queue)
            .await
            .context("failed to purge queue")?;
        tracing::info!(%queue, purged, "queue purged");
    }

    if config.seed_on_start {
        let producer_transport = Arc::clone(&transport);
        let producer_queue = queue.clone();
        let report =
            tokio::spawn(async move { publish_seed(&*producer_transport, &producer_queue).await })
                .await
                .context("producer task failed")?;
        tracing::info!(published = report.published, failed = report.failed, "initial messages published");
    }

    let stats = Arc::new(PipelineStats::new());
    let (stop_tx, stop_rx) = watch::channel(false);
    let consumer = Consumer::new(Arc::clone(&transport), queue.clone(), store)
        .with_stats(Arc::clone(&stats));
    let mut consumer_task = tokio::spawn(async move { consumer.run(stop_rx).await });

    if config.publish_duplicate_probe
        && let Some(probe) = SEED_BATCH.first()
    {
        match publish_record(&*transport, &queue, probe).await {
            Ok(()) => tracing::info!(record_id = probe.record_id, "duplicate probe published"),
            Err(e) => tracing::warn!(error = %e, "failed to publish duplicate probe"),
        }
    }

    let app = api::build_router()
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { stats });
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "health endpoint listening");
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    tokio::select! {
        finished = &mut consumer_task => {
            finished
                .context("consumer task failed")?
                .context("consumer could not subscribe")?;
            tracing::warn!("consumer finished before shutdown; serving health until signalled");
            server_task.await.context("health server task failed")??;
            return Ok(());
        }
        served = &mut server_task => {
            served.context("health server task failed")??;
        }
    }

    tracing::info!("shutting down gracefully");
    if stop_tx.send(true).is_err() {
        tracing::debug!("consumer already stopped");
    }
    consumer_task
        .await
        .context("consumer task failed")?
        .context("consumer could not subscribe")?;
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received terminate signal"),
    }
}
