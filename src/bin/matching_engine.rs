//! Matching Engine worker binary.

use std::time::Duration;

use anyhow::Context;
use tracing::info;

use music_usage_pipeline::{
    database, kafka::topics, shutdown, EventConsumer, EventProducer, MatchCascade, MatchingEngine,
    RetryConfig, Settings, UsageEventStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env("matching-worker-group").context("invalid configuration")?;
    music_usage_pipeline::init_tracing(&settings.log_level);

    info!(
        brokers = %settings.kafka.brokers,
        group = %settings.kafka.consumer_group,
        fuzzy_threshold = settings.matching.fuzzy_threshold,
        embedding_threshold = settings.matching.embedding_threshold,
        "matching engine starting"
    );

    let pool = database::create_pool(&settings.database)
        .await
        .context("failed to connect to database")?;
    database::run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;

    let producer =
        EventProducer::new(&settings.kafka.brokers).context("failed to create producer")?;
    let consumer = EventConsumer::new(
        &settings.kafka.brokers,
        &settings.kafka.consumer_group,
        &[topics::NORMALIZED],
    )
    .context("failed to create consumer")?;

    let shutdown = shutdown::install_signal_handler();
    let handler = MatchingEngine::new(
        MatchCascade::for_pool(pool.clone(), &settings.matching),
        UsageEventStore::new(pool.clone()),
        producer.clone(),
        RetryConfig::with_max_attempts(settings.max_retries),
        shutdown.clone(),
    );

    consumer.run(&handler, shutdown).await?;

    info!("draining producer and closing connections");
    producer.flush(Duration::from_secs(10));
    pool.close().await;

    info!("matching engine stopped");
    Ok(())
}
