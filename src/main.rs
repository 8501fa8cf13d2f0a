use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parley_server::analyzer::AnalyzerClient;
use parley_server::config::Config;
use parley_server::context::AppContext;
use parley_server::db;
use parley_server::kafka::types::{TOPIC_INBOUND, TOPIC_MODERATED};
use parley_server::kafka::{EventConsumer, EventProducer};
use parley_server::pipeline::{FanoutSink, PipelineProcessor};
use parley_server::routes;
use parley_server::store::KeyedStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = Arc::new(Config::from_env()?);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database
    let pool = db::create_pool(&config).await?;
    sqlx::migrate!().run(&pool).await?;
    tracing::info!("connected to database");

    // Keyed store
    let store = KeyedStore::connect(&config.redis_url).await?;
    tracing::info!("connected to store");

    // Broker
    let producer = EventProducer::new(&config.kafka)?;

    let ctx = Arc::new(AppContext::new(
        Arc::clone(&config),
        pool.clone(),
        store,
        producer.clone(),
    ));

    // Pipeline: two consumers sharing one processor; the gateway is the
    // injected fan-out sink
    let analyzer = AnalyzerClient::new(&config.analyzer)?;
    let sink: Arc<dyn FanoutSink> = ctx.gateway.clone();
    let processor = Arc::new(PipelineProcessor::new(
        pool.clone(),
        producer.clone(),
        analyzer,
        sink,
    ));

    let inbound_consumer = EventConsumer::new(&config.kafka, TOPIC_INBOUND)?;
    let moderated_consumer = EventConsumer::new(&config.kafka, TOPIC_MODERATED)?;

    let inbound_worker = {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move { processor.run_inbound(inbound_consumer).await })
    };
    let moderated_worker = {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move { processor.run_moderated(moderated_consumer).await })
    };

    // HTTP + WebSocket
    let app = routes::create_router(Arc::clone(&ctx));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "parley server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Drain the pipeline before exit
    inbound_worker.abort();
    moderated_worker.abort();
    if let Err(e) = producer.flush(Duration::from_secs(10)) {
        tracing::warn!(error = %e, "producer flush failed during shutdown");
    }
    tracing::info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
