use crate::favorites::store::{FavoritesStore, Subscription};
use crate::favorites::types::{
    validate_key, FavoriteRecord, FavoriteSet, FavoriteSnapshot, StoreError,
};
use crate::session::Session;
use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;

enum Watcher {
    Key {
        user_id: String,
        movie_id: String,
        tx: mpsc::UnboundedSender<FavoriteSnapshot>,
    },
    All {
        user_id: String,
        tx: mpsc::UnboundedSender<FavoriteSet>,
    },
}

impl Watcher {
    fn user_id(&self) -> &str {
        match self {
            Watcher::Key { user_id, .. } | Watcher::All { user_id, .. } => user_id,
        }
    }
}

#[derive(Default)]
struct Inner {
    favorites: HashMap<String, FavoriteSet>,
    /// user id -> token of the live session
    sessions: HashMap<String, String>,
    watchers: HashMap<u64, Watcher>,
    next_watcher: u64,
    next_token: u64,
}

impl Inner {
    fn authorize(&self, session: &Session) -> Result<(), StoreError> {
        match self.sessions.get(session.user_id()) {
            Some(token) if session.token_matches(token) => Ok(()),
            _ => Err(StoreError::AuthRequired),
        }
    }

    fn snapshot(&self, user_id: &str, movie_id: &str) -> FavoriteSnapshot {
        FavoriteSnapshot {
            movie_id: movie_id.to_string(),
            record: self
                .favorites
                .get(user_id)
                .and_then(|set| set.get(movie_id))
                .cloned(),
        }
    }

    fn set_for(&self, user_id: &str) -> FavoriteSet {
        self.favorites.get(user_id).cloned().unwrap_or_default()
    }

    fn register(&mut self, watcher: Watcher) -> u64 {
        let id = self.next_watcher;
        self.next_watcher += 1;
        self.watchers.insert(id, watcher);
        id
    }

    /// Pushes the new value of `(user_id, movie_id)` to every interested
    /// watcher. Runs under the store lock, so per-key order matches the order
    /// mutations were applied. Watchers whose receiver is gone are pruned.
    fn notify(&mut self, user_id: &str, movie_id: &str) {
        let snapshot = self.snapshot(user_id, movie_id);
        let set = self.set_for(user_id);

        self.watchers.retain(|_, watcher| match watcher {
            Watcher::Key {
                user_id: u,
                movie_id: m,
                tx,
            } if u.as_str() == user_id && m.as_str() == movie_id => {
                tx.send(snapshot.clone()).is_ok()
            }
            Watcher::All { user_id: u, tx } if u.as_str() == user_id => tx.send(set.clone()).is_ok(),
            Watcher::Key { tx, .. } => !tx.is_closed(),
            Watcher::All { tx, .. } => !tx.is_closed(),
        });
    }
}

/// In-process favorites store with push notifications.
///
/// Behaves like the remote store: sessions must be signed in, writes notify
/// subscribers only when a value actually changes, and notifications for one
/// key arrive in the order writes were applied. Clones share state, so two
/// clones act like two devices talking to the same backend.
#[derive(Clone, Default)]
pub struct MemoryFavoritesStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryFavoritesStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a session for `user_id`, replacing any previous one.
    pub fn sign_in(&self, user_id: &str) -> Session {
        let mut inner = self.lock();
        inner.next_token += 1;
        let token = format!("mem-{}-{}", user_id, inner.next_token);
        inner.sessions.insert(user_id.to_string(), token.clone());
        tracing::debug!(user_id = %user_id, "Signed in to memory store");
        Session::new(user_id, SecretString::from(token))
    }

    /// Ends the session. Open subscriptions of that user are closed, the
    /// way a remote store revokes listeners on sign-out.
    pub fn sign_out(&self, session: &Session) {
        let mut inner = self.lock();
        if inner.authorize(session).is_ok() {
            inner.sessions.remove(session.user_id());
            let user_id = session.user_id();
            inner.watchers.retain(|_, w| w.user_id() != user_id);
            tracing::debug!(user_id = %user_id, "Signed out of memory store");
        }
    }

    /// Number of live subscriptions across all users.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.watchers.retain(|_, w| match w {
            Watcher::Key { tx, .. } => !tx.is_closed(),
            Watcher::All { tx, .. } => !tx.is_closed(),
        });
        inner.watchers.len()
    }

    /// Favorites of `user_id` as currently stored, bypassing authorization.
    pub fn contents(&self, user_id: &str) -> FavoriteSet {
        self.lock().set_for(user_id)
    }

    fn release_hook(&self, id: u64) -> impl FnOnce() + Send + Sync + 'static {
        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .watchers
                    .remove(&id);
            }
        }
    }
}

#[async_trait]
impl FavoritesStore for MemoryFavoritesStore {
    async fn subscribe(
        &self,
        session: &Session,
        movie_id: &str,
    ) -> Result<Subscription<FavoriteSnapshot>, StoreError> {
        validate_key(movie_id)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let id = {
            let mut inner = self.lock();
            inner.authorize(session)?;
            // Initial snapshot goes out under the same lock that registers the
            // watcher, so no write can slip in between.
            let _ = tx.send(inner.snapshot(session.user_id(), movie_id));
            inner.register(Watcher::Key {
                user_id: session.user_id().to_string(),
                movie_id: movie_id.to_string(),
                tx,
            })
        };

        Ok(Subscription::new(rx, self.release_hook(id)))
    }

    async fn subscribe_all(
        &self,
        session: &Session,
    ) -> Result<Subscription<FavoriteSet>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let id = {
            let mut inner = self.lock();
            inner.authorize(session)?;
            let _ = tx.send(inner.set_for(session.user_id()));
            inner.register(Watcher::All {
                user_id: session.user_id().to_string(),
                tx,
            })
        };

        Ok(Subscription::new(rx, self.release_hook(id)))
    }

    async fn set(
        &self,
        session: &Session,
        movie_id: &str,
        record: &FavoriteRecord,
    ) -> Result<(), StoreError> {
        validate_key(movie_id)?;
        let mut inner = self.lock();
        inner.authorize(session)?;

        let user_id = session.user_id();
        let previous = inner
            .favorites
            .entry(user_id.to_string())
            .or_default()
            .insert(movie_id.to_string(), record.clone());

        if previous.as_ref() != Some(record) {
            inner.notify(user_id, movie_id);
        }
        Ok(())
    }

    async fn remove(&self, session: &Session, movie_id: &str) -> Result<(), StoreError> {
        validate_key(movie_id)?;
        let mut inner = self.lock();
        inner.authorize(session)?;

        let user_id = session.user_id();
        let removed = inner
            .favorites
            .get_mut(user_id)
            .and_then(|set| set.remove(movie_id));

        if removed.is_some() {
            inner.notify(user_id, movie_id);
        } else {
            tracing::debug!(movie_id = %movie_id, "Remove of absent favorite, nothing to do");
        }
        Ok(())
    }
}
