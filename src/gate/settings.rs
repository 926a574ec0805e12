//! Maintenance settings store.
//!
//! Caches the singleton maintenance record process-wide. Concurrent loads
//! are coalesced into one underlying fetch, and any failure to read the
//! record resolves to the fail-open fallback so the storefront stays up
//! when the settings backend does not. Remote changes arrive over a
//! [`ChangeFeed`] and invalidate the cache.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Parsed, cached form of the maintenance configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct MaintenanceSettings {
    pub enabled: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub title: String,
    pub message: String,
    pub countdown_label: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MaintenanceSettings {
    /// The fallback used when the record is missing or unreadable. Disabled,
    /// so an unreachable settings backend never locks customers out.
    pub fn fail_open() -> Self {
        Self {
            enabled: false,
            starts_at: None,
            ends_at: None,
            title: String::new(),
            message: String::new(),
            countdown_label: String::new(),
            updated_at: None,
        }
    }

    pub fn from_record(record: SettingsRecord) -> Self {
        Self {
            enabled: record.enabled,
            starts_at: parse_bound("starts_at", record.starts_at.as_deref()),
            ends_at: parse_bound("ends_at", record.ends_at.as_deref()),
            title: record.title,
            message: record.message,
            countdown_label: record.countdown_label,
            updated_at: Some(record.updated_at),
        }
    }
}

/// A window bound is operator-entered text. Anything that does not parse as
/// RFC 3339 is treated as no boundary at all rather than failing the
/// decision path.
fn parse_bound(field: &'static str, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(err) => {
            warn!(field, raw, %err, "ignoring malformed maintenance window bound");
            None
        }
    }
}

/// Raw singleton row as stored by the settings backend.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct SettingsRecord {
    pub enabled: bool,
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
    pub title: String,
    pub message: String,
    pub countdown_label: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("settings backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SettingsFetcher: Send + Sync {
    /// Reads the singleton record. `Ok(None)` means the record does not
    /// exist, which callers treat the same as a fetch error: fail open.
    async fn fetch(&self) -> Result<Option<SettingsRecord>, SettingsError>;
}

pub struct PgSettingsFetcher {
    pool: PgPool,
}

impl PgSettingsFetcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsFetcher for PgSettingsFetcher {
    async fn fetch(&self) -> Result<Option<SettingsRecord>, SettingsError> {
        let record = sqlx::query_as::<_, SettingsRecord>(
            "SELECT enabled, starts_at, ends_at, title, message, countdown_label, updated_at \
             FROM maintenance_settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }
}

/// Source of change notifications for the settings record. Yields once per
/// mutation; `None` means the feed closed.
#[async_trait]
pub trait ChangeFeed: Send {
    async fn next_change(&mut self) -> Option<()>;
}

pub struct NatsChangeFeed {
    subscriber: async_nats::Subscriber,
}

impl NatsChangeFeed {
    pub async fn subscribe(
        client: &async_nats::Client,
        subject: &str,
    ) -> Result<Self, async_nats::SubscribeError> {
        let subscriber = client.subscribe(subject.to_string()).await?;
        Ok(Self { subscriber })
    }
}

#[async_trait]
impl ChangeFeed for NatsChangeFeed {
    async fn next_change(&mut self) -> Option<()> {
        self.subscriber.next().await.map(|_| ())
    }
}

type SharedLoad = Shared<BoxFuture<'static, Arc<MaintenanceSettings>>>;

struct StoreInner {
    cached: Option<Arc<MaintenanceSettings>>,
    inflight: Option<SharedLoad>,
    // Bumped by invalidate() so a fetch that started before the
    // invalidation cannot repopulate the cache with a stale record.
    epoch: u64,
}

/// Process-wide cache of the maintenance settings with explicit lifecycle:
/// load, cached, invalidate, subscribe.
pub struct SettingsStore {
    fetcher: Arc<dyn SettingsFetcher>,
    inner: Mutex<StoreInner>,
}

impl SettingsStore {
    pub fn new(fetcher: Arc<dyn SettingsFetcher>) -> Self {
        Self {
            fetcher,
            inner: Mutex::new(StoreInner { cached: None, inflight: None, epoch: 0 }),
        }
    }

    /// Returns the cached settings, joining an in-flight fetch when one
    /// exists and issuing at most one fetch process-wide otherwise.
    pub async fn load(&self) -> Arc<MaintenanceSettings> {
        let (load, epoch) = {
            let mut inner = self.inner.lock().expect("settings store lock");
            if let Some(cached) = &inner.cached {
                return Arc::clone(cached);
            }
            let load = match &inner.inflight {
                Some(load) => load.clone(),
                None => {
                    let load = fetch_or_fail_open(Arc::clone(&self.fetcher)).boxed().shared();
                    inner.inflight = Some(load.clone());
                    load
                }
            };
            (load, inner.epoch)
        };

        let settings = load.await;

        let mut inner = self.inner.lock().expect("settings store lock");
        if inner.epoch == epoch {
            inner.cached = Some(Arc::clone(&settings));
            inner.inflight = None;
        }
        settings
    }

    /// Lock-only read of the current cache. Used on the request hot path so
    /// a gate decision never waits on network I/O once settings are warm.
    pub fn cached(&self) -> Option<Arc<MaintenanceSettings>> {
        self.inner.lock().expect("settings store lock").cached.clone()
    }

    /// Drops the cache and detaches any in-flight fetch. The next `load`
    /// fetches fresh.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock().expect("settings store lock");
        inner.cached = None;
        inner.inflight = None;
        inner.epoch += 1;
    }

    /// Consumes a change feed: each notification runs invalidate, reload,
    /// then `on_change` with the fresh settings. The returned guard aborts
    /// the listener when dropped.
    pub fn subscribe<F>(self: Arc<Self>, mut feed: Box<dyn ChangeFeed>, on_change: F) -> SettingsSubscription
    where
        F: Fn(Arc<MaintenanceSettings>) + Send + Sync + 'static,
    {
        let task = tokio::spawn(async move {
            while feed.next_change().await.is_some() {
                self.invalidate();
                let settings = self.load().await;
                on_change(settings);
            }
            debug!("maintenance change feed closed");
        });
        SettingsSubscription { task }
    }
}

async fn fetch_or_fail_open(fetcher: Arc<dyn SettingsFetcher>) -> Arc<MaintenanceSettings> {
    match fetcher.fetch().await {
        Ok(Some(record)) => Arc::new(MaintenanceSettings::from_record(record)),
        Ok(None) => {
            warn!("maintenance settings record missing, treating maintenance as disabled");
            Arc::new(MaintenanceSettings::fail_open())
        }
        Err(err) => {
            warn!(%err, "maintenance settings fetch failed, treating maintenance as disabled");
            Arc::new(MaintenanceSettings::fail_open())
        }
    }
}

/// Scoped handle for a change-feed listener. Dropping it unsubscribes.
pub struct SettingsSubscription {
    task: JoinHandle<()>,
}

impl SettingsSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for SettingsSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::{mpsc, Notify};

    fn record(enabled: bool) -> SettingsRecord {
        SettingsRecord {
            enabled,
            starts_at: None,
            ends_at: None,
            title: "Maintenance".into(),
            message: "Back soon".into(),
            countdown_label: "Back in".into(),
            updated_at: Utc::now(),
        }
    }

    struct StaticFetcher {
        calls: AtomicUsize,
        delay: Option<Duration>,
        result: Result<Option<SettingsRecord>, String>,
    }

    impl StaticFetcher {
        fn ok(record: SettingsRecord) -> Self {
            Self { calls: AtomicUsize::new(0), delay: None, result: Ok(Some(record)) }
        }

        fn slow(record: SettingsRecord, delay: Duration) -> Self {
            Self { calls: AtomicUsize::new(0), delay: Some(delay), result: Ok(Some(record)) }
        }

        fn missing() -> Self {
            Self { calls: AtomicUsize::new(0), delay: None, result: Ok(None) }
        }

        fn failing(message: &str) -> Self {
            Self { calls: AtomicUsize::new(0), delay: None, result: Err(message.to_string()) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SettingsFetcher for StaticFetcher {
        async fn fetch(&self) -> Result<Option<SettingsRecord>, SettingsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.result {
                Ok(record) => Ok(record.clone()),
                Err(message) => Err(SettingsError::Unavailable(message.clone())),
            }
        }
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_fetch() {
        let fetcher = Arc::new(StaticFetcher::slow(record(true), Duration::from_millis(50)));
        let store = SettingsStore::new(fetcher.clone());

        let (a, b) = tokio::join!(store.load(), store.load());

        assert_eq!(fetcher.calls(), 1);
        assert!(a.enabled);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn cached_result_skips_further_fetches() {
        let fetcher = Arc::new(StaticFetcher::ok(record(true)));
        let store = SettingsStore::new(fetcher.clone());

        store.load().await;
        store.load().await;

        assert_eq!(fetcher.calls(), 1);
        assert!(store.cached().is_some());
    }

    #[tokio::test]
    async fn fetch_error_fails_open_and_is_cached() {
        let fetcher = Arc::new(StaticFetcher::failing("connection refused"));
        let store = SettingsStore::new(fetcher.clone());

        let settings = store.load().await;

        assert!(!settings.enabled);
        store.load().await;
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn missing_record_fails_open() {
        let store = SettingsStore::new(Arc::new(StaticFetcher::missing()));
        assert!(!store.load().await.enabled);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let fetcher = Arc::new(StaticFetcher::ok(record(true)));
        let store = SettingsStore::new(fetcher.clone());

        store.load().await;
        store.invalidate();
        assert!(store.cached().is_none());
        store.load().await;

        assert_eq!(fetcher.calls(), 2);
    }

    struct GatedFetcher {
        calls: AtomicUsize,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl SettingsFetcher for GatedFetcher {
        async fn fetch(&self) -> Result<Option<SettingsRecord>, SettingsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(Some(record(true)))
        }
    }

    #[tokio::test]
    async fn invalidate_during_inflight_fetch_discards_stale_result() {
        let release = Arc::new(Notify::new());
        let fetcher = Arc::new(GatedFetcher { calls: AtomicUsize::new(0), release: release.clone() });
        let store = Arc::new(SettingsStore::new(fetcher.clone()));

        let loading = tokio::spawn({
            let store = store.clone();
            async move { store.load().await }
        });
        tokio::task::yield_now().await;

        store.invalidate();
        release.notify_waiters();
        let stale = loading.await.unwrap();

        // The waiter still gets the fetch it joined, but the cache stays
        // cold so the next load re-fetches.
        assert!(stale.enabled);
        assert!(store.cached().is_none());
    }

    #[test]
    fn malformed_window_bound_is_ignored() {
        let mut raw = record(true);
        raw.starts_at = Some("not-a-timestamp".into());
        raw.ends_at = Some("2024-01-02T00:00:00Z".into());

        let settings = MaintenanceSettings::from_record(raw);

        assert!(settings.starts_at.is_none());
        assert!(settings.ends_at.is_some());
    }

    #[test]
    fn empty_window_bound_means_no_boundary() {
        let mut raw = record(true);
        raw.starts_at = Some("   ".into());
        let settings = MaintenanceSettings::from_record(raw);
        assert!(settings.starts_at.is_none());
    }

    struct ChannelFeed(mpsc::Receiver<()>);

    #[async_trait]
    impl ChangeFeed for ChannelFeed {
        async fn next_change(&mut self) -> Option<()> {
            self.0.recv().await
        }
    }

    #[tokio::test]
    async fn notification_reloads_and_notifies() {
        let fetcher = Arc::new(StaticFetcher::ok(record(true)));
        let store = Arc::new(SettingsStore::new(fetcher.clone()));
        store.load().await;

        let (notify_tx, mut notify_rx) = mpsc::channel(1);
        let (change_tx, change_rx) = mpsc::channel(1);
        let subscription = store.clone().subscribe(Box::new(ChannelFeed(change_rx)), move |settings| {
            let _ = notify_tx.try_send(settings);
        });

        change_tx.send(()).await.unwrap();
        let reloaded = notify_rx.recv().await.unwrap();

        assert!(reloaded.enabled);
        assert_eq!(fetcher.calls(), 2);
        subscription.unsubscribe();
    }

    #[tokio::test]
    async fn dropping_subscription_stops_listener() {
        let store = Arc::new(SettingsStore::new(Arc::new(StaticFetcher::ok(record(false)))));
        let (change_tx, change_rx) = mpsc::channel::<()>(1);

        let subscription = store.clone().subscribe(Box::new(ChannelFeed(change_rx)), |_| {});
        drop(subscription);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Listener is gone; the channel reports closure to the sender side.
        assert!(change_tx.is_closed());
    }
}
