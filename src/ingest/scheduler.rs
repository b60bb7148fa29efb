// src/ingest/scheduler.rs
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SchedulerConfig;
use crate::ingest::Ingestor;

/// Spawn a background task that triggers one ingestion run per tick.
///
/// Failed runs are only logged; the next tick is the retry. The task exits
/// when `shutdown` flips to `true`.
pub fn spawn_ingest_scheduler(
    ingestor: Arc<Ingestor>,
    cfg: SchedulerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cfg.interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(target: "ingest", "scheduler stopping");
                        return;
                    }
                    continue;
                }
            }

            counter!("ingest_scheduled_runs_total").increment(1);
            match ingestor.run().await {
                Ok(report) => tracing::info!(
                    target: "ingest",
                    written = report.items_written,
                    metrics = report.metrics_written,
                    "scheduled ingest tick"
                ),
                Err(failure) => tracing::warn!(
                    target: "ingest",
                    error = %failure.error,
                    "scheduled ingest tick failed"
                ),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketSpec;
    use crate::feed::{RawItem, StaticFeed};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn ticks_until_shutdown() {
        let store = MemoryStore::new();
        let feed = StaticFeed::new(vec![RawItem {
            external_id: Some("1".into()),
            title: Some("Scheduled".into()),
            ..RawItem::default()
        }]);
        let ingestor = Arc::new(Ingestor::new(
            Arc::new(feed),
            Arc::new(store.clone()),
            BucketSpec::default(),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = spawn_ingest_scheduler(
            ingestor,
            SchedulerConfig {
                interval: Duration::from_secs(3600),
            },
            rx,
        );

        // The first tick fires immediately.
        for _ in 0..50 {
            if !store.cards().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.cards().len(), 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop")
            .unwrap();
    }
}
