use crate::catalog::MovieSummary;
use crate::favorites::store::FavoritesStore;
use crate::favorites::types::{FavoriteRecord, StoreError};
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// How long `toggle` waits for its own write to come back through the
/// subscription before releasing the in-flight guard anyway.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a [`FavoriteSyncController::toggle`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// A `set` was accepted by the store.
    Added,
    /// A `remove` was accepted by the store.
    Removed,
    /// Another toggle for this movie is still settling; nothing was sent.
    InFlight,
    /// No snapshot has arrived yet, so the current state is unknown.
    NotReady,
}

/// Binds one movie's favorite status to a live store subscription.
///
/// The store is authoritative: `is_favorite` only changes when the
/// subscription delivers, never optimistically on toggle. Each controller
/// owns its subscription; dropping the controller releases it.
pub struct FavoriteSyncController {
    store: Arc<dyn FavoritesStore>,
    session: Option<Session>,
    movie: MovieSummary,
    settle_timeout: Duration,
    /// `None` until the first snapshot arrives.
    status: watch::Receiver<Option<bool>>,
    in_flight: Mutex<()>,
    pump: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for FavoriteSyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoriteSyncController")
            .field("movie_id", &self.movie.id)
            .field("session", &self.session)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl FavoriteSyncController {
    /// Subscribes to the movie's key for `session`.
    ///
    /// Without a session there is nothing to subscribe to: the movie reads as
    /// not favorited and every toggle fails with [`StoreError::AuthRequired`].
    ///
    /// Returns as soon as the subscription is open; use [`Self::ready`] to
    /// wait for the first snapshot.
    pub async fn bind(
        store: Arc<dyn FavoritesStore>,
        session: Option<Session>,
        movie: MovieSummary,
        settle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let (status, pump) = match &session {
            Some(session) => {
                let mut subscription = store.subscribe(session, &movie.id).await?;
                let (tx, rx) = watch::channel(None);
                let movie_id = movie.id.clone();
                let pump = tokio::spawn(async move {
                    while let Some(snapshot) = subscription.next().await {
                        tx.send_if_modified(|current| {
                            let next = Some(snapshot.exists());
                            let changed = *current != next;
                            *current = next;
                            changed
                        });
                    }
                    tracing::debug!(movie_id = %movie_id, "Favorite subscription ended");
                });
                (rx, Some(pump))
            }
            None => {
                let (_tx, rx) = watch::channel(Some(false));
                (rx, None)
            }
        };

        Ok(Self {
            store,
            session,
            movie,
            settle_timeout,
            status,
            in_flight: Mutex::new(()),
            pump,
        })
    }

    pub fn movie(&self) -> &MovieSummary {
        &self.movie
    }

    /// Last value delivered by the store; `false` before the first snapshot.
    pub fn is_favorite(&self) -> bool {
        self.status.borrow().unwrap_or(false)
    }

    /// Whether the first snapshot has arrived.
    pub fn is_ready(&self) -> bool {
        self.status.borrow().is_some()
    }

    /// Whether a toggle is currently waiting on the store.
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Observes status changes. `None` means no snapshot yet.
    pub fn watch(&self) -> watch::Receiver<Option<bool>> {
        self.status.clone()
    }

    /// Waits for the first snapshot and returns it.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] when the subscription ended before delivering.
    pub async fn ready(&self) -> Result<bool, StoreError> {
        let mut status = self.status.clone();
        let value = *status
            .wait_for(Option::is_some)
            .await
            .map_err(|_| StoreError::Closed)?;
        Ok(value.unwrap_or(false))
    }

    /// Flips the favorite status based on the last value the store reported.
    ///
    /// Issues exactly one `set` or `remove`. The in-flight guard stays held
    /// until the subscription reflects the write or the settle timeout
    /// elapses, so overlapping calls get [`ToggleOutcome::InFlight`] instead of
    /// racing a second mutation against a stale value.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AuthRequired`] without a session, or when the store
    ///   rejects it; no state changes
    /// - [`StoreError::Closed`] when the subscription has ended, since the
    ///   value to flip is no longer trustworthy
    /// - any transport error from the mutation itself
    pub async fn toggle(&self) -> Result<ToggleOutcome, StoreError> {
        let Some(session) = &self.session else {
            return Err(StoreError::AuthRequired);
        };
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!(movie_id = %self.movie.id, "Toggle ignored, previous one in flight");
            return Ok(ToggleOutcome::InFlight);
        };

        let current = *self.status.borrow();
        if self.status.has_changed().is_err() {
            return Err(StoreError::Closed);
        }
        let Some(current) = current else {
            return Ok(ToggleOutcome::NotReady);
        };

        let target = !current;
        if target {
            let record = FavoriteRecord::from(&self.movie);
            self.store.set(session, &self.movie.id, &record).await?;
        } else {
            self.store.remove(session, &self.movie.id).await?;
        }

        let mut status = self.status.clone();
        match tokio::time::timeout(self.settle_timeout, status.wait_for(|v| *v == Some(target)))
            .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => {
                tracing::warn!(movie_id = %self.movie.id, "Subscription closed before write was observed");
            }
            Err(_) => {
                tracing::warn!(
                    movie_id = %self.movie.id,
                    timeout_ms = self.settle_timeout.as_millis() as u64,
                    "Write not observed within settle timeout"
                );
            }
        }

        tracing::info!(movie_id = %self.movie.id, favorite = target, "Favorite toggled");
        Ok(if target {
            ToggleOutcome::Added
        } else {
            ToggleOutcome::Removed
        })
    }
}

impl Drop for FavoriteSyncController {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::favorites::memory::MemoryFavoritesStore;
    use crate::favorites::store::Subscription;
    use crate::favorites::types::{FavoriteSet, FavoriteSnapshot};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Memory store that records mutations and makes each one take a while.
    struct RecordingStore {
        inner: MemoryFavoritesStore,
        ops: std::sync::Mutex<Vec<&'static str>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        latency: Duration,
    }

    impl RecordingStore {
        fn new(inner: MemoryFavoritesStore) -> Self {
            Self {
                inner,
                ops: std::sync::Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                latency: Duration::from_millis(50),
            }
        }

        fn ops(&self) -> Vec<&'static str> {
            self.ops.lock().unwrap().clone()
        }

        async fn track(&self, op: &'static str) {
            self.ops.lock().unwrap().push(op);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl FavoritesStore for RecordingStore {
        async fn subscribe(
            &self,
            session: &Session,
            movie_id: &str,
        ) -> Result<Subscription<FavoriteSnapshot>, StoreError> {
            self.inner.subscribe(session, movie_id).await
        }

        async fn subscribe_all(
            &self,
            session: &Session,
        ) -> Result<Subscription<FavoriteSet>, StoreError> {
            self.inner.subscribe_all(session).await
        }

        async fn set(
            &self,
            session: &Session,
            movie_id: &str,
            record: &FavoriteRecord,
        ) -> Result<(), StoreError> {
            self.track("set").await;
            self.inner.set(session, movie_id, record).await
        }

        async fn remove(&self, session: &Session, movie_id: &str) -> Result<(), StoreError> {
            self.track("remove").await;
            self.inner.remove(session, movie_id).await
        }
    }

    /// Opens subscriptions that never deliver.
    #[derive(Default)]
    struct SilentStore {
        senders: std::sync::Mutex<Vec<mpsc::UnboundedSender<FavoriteSnapshot>>>,
    }

    #[async_trait]
    impl FavoritesStore for SilentStore {
        async fn subscribe(
            &self,
            _session: &Session,
            _movie_id: &str,
        ) -> Result<Subscription<FavoriteSnapshot>, StoreError> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().unwrap().push(tx);
            Ok(Subscription::new(rx, || {}))
        }

        async fn subscribe_all(
            &self,
            _session: &Session,
        ) -> Result<Subscription<FavoriteSet>, StoreError> {
            let (_tx, rx) = mpsc::unbounded_channel();
            Ok(Subscription::new(rx, || {}))
        }

        async fn set(
            &self,
            _session: &Session,
            _movie_id: &str,
            _record: &FavoriteRecord,
        ) -> Result<(), StoreError> {
            panic!("no write expected");
        }

        async fn remove(&self, _session: &Session, _movie_id: &str) -> Result<(), StoreError> {
            panic!("no write expected");
        }
    }

    fn movie() -> MovieSummary {
        MovieSummary {
            id: "tt0113277".into(),
            title: "Heat".into(),
            year: "1995".into(),
            poster_url: "N/A".into(),
            kind: "movie".into(),
        }
    }

    async fn bound(
        store: &Arc<RecordingStore>,
        session: Option<Session>,
    ) -> FavoriteSyncController {
        let store: Arc<dyn FavoritesStore> = Arc::clone(store) as Arc<dyn FavoritesStore>;
        FavoriteSyncController::bind(store, session, movie(), DEFAULT_SETTLE_TIMEOUT)
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_toggles_issue_one_mutation() {
        let memory = MemoryFavoritesStore::new();
        let session = memory.sign_in("u1");
        let store = Arc::new(RecordingStore::new(memory.clone()));
        let controller = bound(&store, Some(session)).await;
        assert!(!controller.ready().await.unwrap());

        let outcomes = futures::future::join_all((0..5).map(|_| controller.toggle())).await;
        let outcomes: Vec<ToggleOutcome> = outcomes.into_iter().map(Result::unwrap).collect();

        assert_eq!(
            outcomes.iter().filter(|o| **o == ToggleOutcome::Added).count(),
            1
        );
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == ToggleOutcome::InFlight)
                .count(),
            4
        );
        assert_eq!(store.ops(), vec!["set"]);
        assert!(controller.is_favorite());
        assert!(memory.contents("u1").contains_key("tt0113277"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_toggle_has_no_effect() {
        let memory = MemoryFavoritesStore::new();
        let store = Arc::new(RecordingStore::new(memory.clone()));
        let controller = bound(&store, None).await;

        let err = controller.toggle().await.unwrap_err();
        assert!(matches!(err, StoreError::AuthRequired));
        assert!(!controller.is_favorite());
        assert!(store.ops().is_empty());
        assert_eq!(memory.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_favorite_then_unfavorite_is_sequential() {
        let memory = MemoryFavoritesStore::new();
        let session = memory.sign_in("u1");
        let store = Arc::new(RecordingStore::new(memory.clone()));
        let controller = bound(&store, Some(session)).await;
        controller.ready().await.unwrap();

        assert_eq!(controller.toggle().await.unwrap(), ToggleOutcome::Added);
        assert!(controller.is_favorite());
        assert_eq!(controller.toggle().await.unwrap(), ToggleOutcome::Removed);
        assert!(!controller.is_favorite());

        assert_eq!(store.ops(), vec!["set", "remove"]);
        assert_eq!(store.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_controllers_on_same_key_converge() {
        let memory = MemoryFavoritesStore::new();
        let session = memory.sign_in("u1");
        let store = Arc::new(RecordingStore::new(memory.clone()));
        let card = bound(&store, Some(session.clone())).await;
        let detail = bound(&store, Some(session)).await;
        card.ready().await.unwrap();
        detail.ready().await.unwrap();

        card.toggle().await.unwrap();

        let mut watch = detail.watch();
        watch.wait_for(|v| *v == Some(true)).await.unwrap();
        assert!(detail.is_favorite());
    }

    #[tokio::test]
    async fn test_toggle_before_first_snapshot() {
        let store = Arc::new(SilentStore::default());
        let session = Session::new("u1", secrecy::SecretString::from("t"));
        let controller =
            FavoriteSyncController::bind(store, Some(session), movie(), DEFAULT_SETTLE_TIMEOUT)
                .await
                .unwrap();

        assert!(!controller.is_ready());
        assert_eq!(controller.toggle().await.unwrap(), ToggleOutcome::NotReady);
        assert!(!controller.is_favorite());
    }

    #[tokio::test]
    async fn test_toggle_after_subscription_closed() {
        let memory = MemoryFavoritesStore::new();
        let session = memory.sign_in("u1");
        let store: Arc<dyn FavoritesStore> = Arc::new(memory.clone());
        let controller =
            FavoriteSyncController::bind(store, Some(session.clone()), movie(), DEFAULT_SETTLE_TIMEOUT)
                .await
                .unwrap();
        controller.ready().await.unwrap();

        memory.sign_out(&session);
        let mut watch = controller.watch();
        while watch.changed().await.is_ok() {}

        let err = controller.toggle().await.unwrap_err();
        assert!(matches!(err, StoreError::Closed));
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let memory = MemoryFavoritesStore::new();
        let session = memory.sign_in("u1");
        let store: Arc<dyn FavoritesStore> = Arc::new(memory.clone());
        let controller =
            FavoriteSyncController::bind(store, Some(session), movie(), DEFAULT_SETTLE_TIMEOUT)
                .await
                .unwrap();
        controller.ready().await.unwrap();
        assert_eq!(memory.subscriber_count(), 1);

        drop(controller);
        for _ in 0..10 {
            if memory.subscriber_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(memory.subscriber_count(), 0);
    }
}
