use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bulletin_types::notification::NotificationEnvelope;
use bulletin_types::repository::ContentRepository;

use crate::dispatcher::NotificationDispatcher;

pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_secs(60);

/// Outcome of a single scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub found: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Watermark after the tick.
    pub watermark: DateTime<Utc>,
}

/// Periodically announces content created since the last scan.
///
/// The watermark only moves forward, and only to the newest `created_at`
/// actually seen, never to the wall clock. Items stamped exactly at the
/// watermark are not picked up again by later ticks.
pub struct WatermarkScanner {
    repo: Arc<dyn ContentRepository>,
    dispatcher: NotificationDispatcher,
    topic: String,
    period: Duration,
    watermark: DateTime<Utc>,
}

impl WatermarkScanner {
    /// The watermark starts at the current time.
    pub fn new(
        repo: Arc<dyn ContentRepository>,
        dispatcher: NotificationDispatcher,
        topic: impl Into<String>,
        period: Duration,
    ) -> Self {
        Self {
            repo,
            dispatcher,
            topic: topic.into(),
            period,
            watermark: Utc::now(),
        }
    }

    pub fn with_watermark(mut self, watermark: DateTime<Utc>) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark
    }

    /// Scan once and dispatch a broadcast for every new item.
    ///
    /// A failed dispatch is logged and skipped; the watermark still moves past it.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport {
            found: 0,
            delivered: 0,
            failed: 0,
            watermark: self.watermark,
        };

        let mut items = match self.repo.find_created_after(self.watermark).await {
            Ok(items) => items,
            Err(e) => {
                warn!(watermark = %self.watermark, "Scan query failed: {}", e);
                return report;
            }
        };
        items.sort_by_key(|item| (item.created_at, item.id));
        report.found = items.len();

        for item in &items {
            let envelope = NotificationEnvelope::new_content(item, &self.topic);
            match self.dispatcher.send(&envelope).await {
                Ok(receipt) => {
                    report.delivered += 1;
                    info!(
                        content_id = %item.id,
                        message_id = %receipt.message_id,
                        "Announced new article"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(content_id = %item.id, "Announcement failed: {}", e);
                }
            }
        }

        if let Some(newest) = items.last().map(|item| item.created_at) {
            self.watermark = self.watermark.max(newest);
        }
        report.watermark = self.watermark;
        report
    }

    /// Tick every `period` until `shutdown` fires.
    ///
    /// Ticks never overlap; a tick that overruns causes the missed ones to be
    /// skipped rather than queued. Shutdown abandons an in-flight batch
    /// without moving the watermark.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period = ?self.period, topic = %self.topic, "Watermark scanner started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown during scan, batch abandoned");
                    break;
                }
                report = self.tick() => {
                    if report.found > 0 {
                        info!(
                            found = report.found,
                            delivered = report.delivered,
                            failed = report.failed,
                            watermark = %report.watermark,
                            "Scan complete"
                        );
                    }
                }
            }
        }

        info!("Watermark scanner stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::testing::{Outcome, ScriptedProvider};
    use bulletin_db::Database;
    use bulletin_types::models::{ContentItem, NewContentItem};
    use bulletin_types::notification::DeliveryTarget;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    async fn publish(db: &Database, title: &str, secs: i64) -> ContentItem {
        db.insert_content(NewContentItem {
            title: title.to_string(),
            body: String::new(),
            attachment: None,
            group_id: None,
            created_at: at(secs),
        })
        .await
        .unwrap()
    }

    fn scanner(db: &Database, provider: &Arc<ScriptedProvider>, watermark: i64) -> WatermarkScanner {
        let dispatcher = NotificationDispatcher::new(
            provider.clone(),
            RetryPolicy {
                max_retries: 0,
                ..RetryPolicy::default()
            },
            Duration::from_secs(600),
        );
        WatermarkScanner::new(Arc::new(db.clone()), dispatcher, "all", DEFAULT_SCAN_PERIOD)
            .with_watermark(at(watermark))
    }

    #[tokio::test]
    async fn test_new_item_is_announced_and_watermark_advances() {
        let db = Database::open_in_memory().unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        publish(&db, "Hello", 100).await;

        let mut scanner = scanner(&db, &provider, 90);
        let report = scanner.tick().await;

        assert_eq!(report.found, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(scanner.watermark(), at(100));
        let sent = provider.delivered();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target, DeliveryTarget::Topic("all".into()));
        assert_eq!(sent[0].body, "Article 'Hello' was added.");
    }

    #[tokio::test]
    async fn test_items_are_dispatched_once_in_creation_order() {
        let db = Database::open_in_memory().unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        publish(&db, "third", 130).await;
        publish(&db, "first", 110).await;
        publish(&db, "second", 120).await;

        let mut scanner = scanner(&db, &provider, 100);
        scanner.tick().await;
        let again = scanner.tick().await;

        assert_eq!(again.found, 0);
        let bodies: Vec<_> = provider.delivered().into_iter().map(|e| e.body).collect();
        assert_eq!(
            bodies,
            vec![
                "Article 'first' was added.",
                "Article 'second' was added.",
                "Article 'third' was added.",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_dispatch_does_not_block_batch() {
        let db = Database::open_in_memory().unwrap();
        let provider = Arc::new(ScriptedProvider::new().with_outcomes([Outcome::Refused(400)]));
        publish(&db, "a", 110).await;
        publish(&db, "b", 120).await;

        let mut scanner = scanner(&db, &provider, 100);
        let report = scanner.tick().await;

        assert_eq!((report.found, report.delivered, report.failed), (2, 1, 1));
        assert_eq!(report.watermark, at(120));
        assert_eq!(scanner.tick().await.found, 0);
    }

    #[tokio::test]
    async fn test_watermark_never_moves_backwards() {
        let db = Database::open_in_memory().unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        let mut scanner = scanner(&db, &provider, 200);

        assert_eq!(scanner.tick().await.watermark, at(200));

        // Written late with an older stamp: invisible to the scanner.
        publish(&db, "late", 150).await;
        assert_eq!(scanner.tick().await.found, 0);
        assert_eq!(scanner.watermark(), at(200));

        publish(&db, "next", 250).await;
        assert_eq!(scanner.tick().await.watermark, at(250));
    }

    #[tokio::test]
    async fn test_items_at_watermark_are_not_rescanned() {
        let db = Database::open_in_memory().unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        publish(&db, "a", 100).await;
        let mut scanner = scanner(&db, &provider, 90);
        scanner.tick().await;

        publish(&db, "same-instant", 100).await;
        assert_eq!(scanner.tick().await.found, 0);
        assert_eq!(provider.delivered().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_tick_skips_instead_of_queueing() {
        let db = Database::open_in_memory().unwrap();
        // Each send waits out a fresh credential, so the first tick spans
        // several scan periods.
        let provider = Arc::new(ScriptedProvider::new().with_acquire_delay(Duration::from_secs(150)));
        let dispatcher = NotificationDispatcher::new(
            provider.clone(),
            RetryPolicy {
                max_retries: 0,
                deadline: Duration::from_secs(300),
                ..RetryPolicy::default()
            },
            Duration::from_secs(1),
        );
        publish(&db, "a", 110).await;
        publish(&db, "b", 120).await;
        publish(&db, "c", 130).await;

        let scanner = WatermarkScanner::new(Arc::new(db.clone()), dispatcher, "all", DEFAULT_SCAN_PERIOD)
            .with_watermark(at(100));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(scanner.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(1000)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let bodies: Vec<_> = provider.delivered().into_iter().map(|e| e.body).collect();
        assert_eq!(
            bodies,
            vec!["Article 'a' was added.", "Article 'b' was added.", "Article 'c' was added."]
        );
        assert_eq!(provider.acquisitions(), 3);
        assert_eq!(provider.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let db = Database::open_in_memory().unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        let scanner = scanner(&db, &provider, 0);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(scanner.run(shutdown.clone()));
        tokio::time::sleep(DEFAULT_SCAN_PERIOD * 2).await;
        shutdown.cancel();

        tokio::time::timeout(DEFAULT_SCAN_PERIOD, handle)
            .await
            .expect("scanner did not stop within one period")
            .unwrap();
    }
}
