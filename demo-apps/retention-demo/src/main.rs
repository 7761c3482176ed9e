use anyhow::{ensure, Context, Result};
use futures::future::join_all;
use retention_core::{BlockingQueue, CancelToken, PopError, RetentionConfig, RetentionEngine};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Settings read from the environment
struct DemoSettings {
    sweep_interval: Duration,
    consumers: usize,
    jobs: usize,
}

impl DemoSettings {
    fn from_env() -> Self {
        fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(default)
        }

        Self {
            sweep_interval: Duration::from_millis(var_or("RETENTION_SWEEP_INTERVAL_MS", 100)),
            consumers: var_or("RETENTION_CONSUMERS", 4usize).max(1),
            jobs: var_or("RETENTION_JOBS", 200usize),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "retention_demo=info,retention_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = DemoSettings::from_env();
    tracing::info!("Retention demo");
    tracing::info!("   Sweep interval: {:?}", settings.sweep_interval);
    tracing::info!("   Consumers: {}, jobs: {}", settings.consumers, settings.jobs);

    demo_queue_timeout().await?;
    demo_expiry_order(&settings).await?;
    demo_competing_consumers(&settings).await?;
    demo_destroy_while_blocked(&settings).await?;

    tracing::info!("All demos finished");
    Ok(())
}

/// A pop on an empty queue gives up once its token's deadline passes
async fn demo_queue_timeout() -> Result<()> {
    tracing::info!("Demo: queue pop with timeout");

    let queue: BlockingQueue<String> = BlockingQueue::new();
    let started = Instant::now();
    let result = queue.pop(&CancelToken::with_timeout(Duration::from_millis(150))).await;

    ensure!(result == Err(PopError::TimedOut), "expected timeout, got {:?}", result);
    tracing::info!("   pop timed out after {:?}", started.elapsed());
    Ok(())
}

/// Values surface roughly in deadline order, quantised to the sweep interval
async fn demo_expiry_order(settings: &DemoSettings) -> Result<()> {
    tracing::info!("Demo: expiry order");

    let engine = RetentionEngine::with_config(
        RetentionConfig::default().with_sweep_interval(settings.sweep_interval),
    );
    engine.add("short", Duration::from_millis(200));
    engine.add("long", Duration::from_millis(800));

    let (mut stream, cancel) = engine.consumer_stream().context("engine already destroyed")?;
    let started = Instant::now();

    for _ in 0..2 {
        let value = timeout(Duration::from_secs(2), stream.recv())
            .await
            .context("no value within 2s")?
            .context("stream closed early")?;
        tracing::info!("   {} expired after {:?}", value, started.elapsed());
    }

    cancel.cancel();
    engine.destroy();
    Ok(())
}

/// Several streams share the expired values: each job is delivered exactly once
async fn demo_competing_consumers(settings: &DemoSettings) -> Result<()> {
    tracing::info!(
        "Demo: {} jobs across {} competing consumers",
        settings.jobs,
        settings.consumers
    );

    let engine = RetentionEngine::with_config(
        RetentionConfig::default().with_sweep_interval(settings.sweep_interval),
    );

    let jobs: Vec<Uuid> = (0..settings.jobs).map(|_| Uuid::new_v4()).collect();
    for (i, job) in jobs.iter().enumerate() {
        // Spread deadlines over ~500ms
        let retain = Duration::from_millis((i % 50) as u64 * 10);
        engine.add(*job, retain);
    }

    let consumers: Vec<_> = (0..settings.consumers)
        .map(|id| -> Result<_> {
            let (mut stream, _cancel) = engine
                .consumer_stream()
                .context("engine already destroyed")?;
            Ok(tokio::spawn(async move {
                let mut received = Vec::new();
                while let Some(job) = stream.recv().await {
                    received.push(job);
                }
                tracing::debug!(consumer = id, count = received.len(), "consumer finished");
                received
            }))
        })
        .collect::<Result<_>>()?;

    // Wait until everything has expired and been picked up
    let deadline = Instant::now() + Duration::from_secs(5);
    while (engine.pending() > 0 || engine.ready() > 0) && Instant::now() < deadline {
        tokio::time::sleep(settings.sweep_interval).await;
    }
    // A sweep may be between draining the table and pushing to the ready queue
    tokio::time::sleep(settings.sweep_interval).await;
    engine.destroy();

    let mut delivered = HashSet::new();
    let mut total = 0;
    for (id, received) in join_all(consumers).await.into_iter().enumerate() {
        let received = received?;
        tracing::info!("   consumer {} received {} jobs", id, received.len());
        total += received.len();
        delivered.extend(received);
    }

    ensure!(total == jobs.len(), "delivered {} of {} jobs", total, jobs.len());
    ensure!(delivered.len() == total, "some jobs were delivered twice");
    tracing::info!("   all {} jobs delivered exactly once", total);
    Ok(())
}

/// Destroying the engine closes streams that are blocked waiting for values
async fn demo_destroy_while_blocked(settings: &DemoSettings) -> Result<()> {
    tracing::info!("Demo: destroy while consumers are blocked");

    let engine: RetentionEngine<u64> = RetentionEngine::with_config(
        RetentionConfig::default().with_sweep_interval(settings.sweep_interval),
    );
    engine.add(1, Duration::from_secs(3600));

    let streams: Vec<_> = (0..settings.consumers)
        .filter_map(|_| engine.consumer_stream())
        .collect();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    engine.destroy();

    let waits = streams
        .into_iter()
        .map(|(mut stream, _cancel)| async move { stream.recv().await.is_none() });
    let closed = timeout(Duration::from_secs(1), join_all(waits))
        .await
        .context("streams did not close after destroy")?
        .into_iter()
        .filter(|closed| *closed)
        .count();

    ensure!(
        closed == settings.consumers,
        "only {} of {} streams closed",
        closed,
        settings.consumers
    );
    ensure!(engine.consumer_stream().is_none(), "destroyed engine handed out a stream");
    tracing::info!("   {} streams closed in {:?}", settings.consumers, started.elapsed());
    Ok(())
}
