//! Unread counter
//!
//! Derives a user's unread count by full recount. The fixed poll timer
//! and push invalidations both feed one debounced signal, so bursts
//! coalesce into a single recompute instead of racing timers.

use crate::cache::{CacheKey, QueryCache};
use crate::chat::messages::MessageRepository;
use crate::error::Result;
use crate::storage::Database;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// Coalescing invalidation signal
///
/// Triggers from any source (poll tick, change-feed event, explicit
/// invalidation) collapse into one stored permit; the consumer drains
/// the permit after its debounce window so a burst recomputes once.
#[derive(Debug, Default)]
pub struct InvalidationSignal {
    notify: Notify,
}

impl InvalidationSignal {
    /// Create a new signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a recompute; concurrent requests coalesce
    pub fn trigger(&self) {
        self.notify.notify_one();
    }

    /// Wait until at least one trigger arrives
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    /// Consume a stored permit without waiting, if one is pending
    pub async fn drain(&self) {
        let _ = tokio::time::timeout(Duration::ZERO, self.notify.notified()).await;
    }
}

/// Computes and caches a user's unread count
#[derive(Debug, Clone)]
pub struct UnreadCounter {
    db: Database,
    user_id: String,
    cache: Arc<QueryCache>,
}

impl UnreadCounter {
    /// Create a counter for one user
    pub fn new(db: Database, user_id: impl Into<String>, cache: Arc<QueryCache>) -> Self {
        Self {
            db,
            user_id: user_id.into(),
            cache,
        }
    }

    /// Recount from the database and refresh the cache entry
    pub async fn recount(&self) -> Result<i64> {
        let count = MessageRepository::new(&self.db).unread_count(&self.user_id).await?;
        self.cache.put(CacheKey::UnreadCount(self.user_id.clone()), &count);
        Ok(count)
    }

    /// Cached count, if one is present
    pub fn cached(&self) -> Option<i64> {
        self.cache.get(&CacheKey::UnreadCount(self.user_id.clone()))
    }

    /// Spawn the recount loop
    ///
    /// Recomputes once at start, then on each signal (debounced) and on
    /// the poll interval. The published value is observable through the
    /// returned watcher; dropping it stops the loop.
    pub fn spawn(
        self,
        signal: Arc<InvalidationSignal>,
        poll_interval: Duration,
        debounce: Duration,
    ) -> UnreadWatcher {
        let (tx, rx) = watch::channel(0i64);
        let recounts = Arc::new(AtomicU64::new(0));
        let recounts_task = recounts.clone();

        let handle = tokio::spawn(async move {
            loop {
                match self.recount().await {
                    Ok(count) => {
                        recounts_task.fetch_add(1, Ordering::Relaxed);
                        if tx.send(count).is_err() {
                            break; // watcher dropped
                        }
                    }
                    Err(e) => {
                        tracing::warn!(user_id = %self.user_id, error = %e, "unread recount failed");
                    }
                }

                tokio::select! {
                    _ = signal.wait() => {
                        // Let the burst settle, then drain anything that
                        // arrived during the window
                        tokio::time::sleep(debounce).await;
                        signal.drain().await;
                    }
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        });

        UnreadWatcher {
            rx,
            recounts,
            handle,
        }
    }
}

/// Handle over a running unread recount loop
#[derive(Debug)]
pub struct UnreadWatcher {
    rx: watch::Receiver<i64>,
    recounts: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl UnreadWatcher {
    /// Most recently published count
    pub fn current(&self) -> i64 {
        *self.rx.borrow()
    }

    /// Wait for the next published count
    pub async fn changed(&mut self) -> Option<i64> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow())
    }

    /// Total recounts performed since spawn
    pub fn recount_total(&self) -> u64 {
        self.recounts.load(Ordering::Relaxed)
    }
}

impl Drop for UnreadWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Session;
    use crate::catalog::{Service, ServiceRepository, User, UserRepository};
    use crate::chat::conversations::ConversationRepository;

    async fn seed() -> (Database, Session, Session, String) {
        let db = Database::in_memory().await.expect("Failed to create test database");
        let users = UserRepository::new(&db);
        let services = ServiceRepository::new(&db);

        let client = User::new("Client");
        let provider = User::new("Provider");
        users.create(&client).await.unwrap();
        users.create(&provider).await.unwrap();

        let service = Service::new(&provider.id, "Painting");
        services.create(&service).await.unwrap();

        let client_session = Session::new(&client.id, &client.display_name);
        let provider_session = Session::new(&provider.id, &provider.display_name);

        let conv = ConversationRepository::new(&db)
            .open(&client_session, &service.id, &provider.id)
            .await
            .unwrap();

        (db, client_session, provider_session, conv.id)
    }

    #[tokio::test]
    async fn test_recount_refreshes_cache() {
        let (db, client, provider, conv_id) = seed().await;
        let cache = Arc::new(QueryCache::new());
        let counter = UnreadCounter::new(db.clone(), &provider.user_id, cache.clone());

        assert_eq!(counter.recount().await.unwrap(), 0);

        MessageRepository::new(&db).send(&client, &conv_id, "hi").await.unwrap();

        assert_eq!(counter.recount().await.unwrap(), 1);
        assert_eq!(counter.cached(), Some(1));
    }

    #[tokio::test]
    async fn test_signal_drives_recount() {
        let (db, client, provider, conv_id) = seed().await;
        let cache = Arc::new(QueryCache::new());
        let counter = UnreadCounter::new(db.clone(), &provider.user_id, cache);
        let signal = Arc::new(InvalidationSignal::new());

        let mut watcher = counter.spawn(
            signal.clone(),
            Duration::from_secs(60),
            Duration::from_millis(10),
        );

        // Initial recount publishes zero
        let initial = watcher.changed().await.unwrap();
        assert_eq!(initial, 0);

        MessageRepository::new(&db).send(&client, &conv_id, "wake up").await.unwrap();
        signal.trigger();

        let updated = watcher.changed().await.unwrap();
        assert_eq!(updated, 1);
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_one_recount() {
        let (db, _client, provider, _conv_id) = seed().await;
        let cache = Arc::new(QueryCache::new());
        let counter = UnreadCounter::new(db, &provider.user_id, cache);
        let signal = Arc::new(InvalidationSignal::new());

        let mut watcher = counter.spawn(
            signal.clone(),
            Duration::from_secs(60),
            Duration::from_millis(100),
        );

        watcher.changed().await.unwrap();
        assert_eq!(watcher.recount_total(), 1);

        // A burst of invalidations inside one debounce window
        for _ in 0..5 {
            signal.trigger();
        }

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(
            watcher.recount_total(),
            2,
            "Burst should settle into a single extra recount"
        );
    }
}
