use crate::favorites::types::{FavoriteRecord, FavoriteSet, FavoriteSnapshot, StoreError};
use crate::session::Session;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Remote, push-notifying favorites store scoped per user.
///
/// Mutations and subscription delivery are independent: a `set` resolves
/// once the store accepted the write, and subscribers learn about it through
/// their own notification stream.
#[async_trait]
pub trait FavoritesStore: Send + Sync {
    /// Watches one key. The first item is the current snapshot; later items
    /// follow every change to that key in the order the store applied them.
    async fn subscribe(
        &self,
        session: &Session,
        movie_id: &str,
    ) -> Result<Subscription<FavoriteSnapshot>, StoreError>;

    /// Watches the user's whole favorite set, with the same contract.
    async fn subscribe_all(&self, session: &Session)
        -> Result<Subscription<FavoriteSet>, StoreError>;

    /// Upserts a record. Writing an identical record is a no-op.
    async fn set(
        &self,
        session: &Session,
        movie_id: &str,
        record: &FavoriteRecord,
    ) -> Result<(), StoreError>;

    /// Deletes a record. Removing an absent key succeeds.
    async fn remove(&self, session: &Session, movie_id: &str) -> Result<(), StoreError>;
}

type ReleaseFn = Box<dyn FnOnce() + Send + Sync>;

/// Live stream of snapshots from a store.
///
/// The binding is released by [`Subscription::release`] or by dropping the
/// value, whichever comes first. Once released no further items arrive. The
/// stream also ends when the store side closes (transport loss, revoked
/// access); it is never restarted.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    on_release: Option<ReleaseFn>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<T>,
        on_release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            rx,
            on_release: Some(Box::new(on_release)),
        }
    }

    /// Next snapshot, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next snapshot if one is already queued.
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Ends the subscription now.
    pub fn release(mut self) {
        self.release_inner();
    }

    pub fn is_released(&self) -> bool {
        self.on_release.is_none()
    }

    fn release_inner(&mut self) {
        if let Some(on_release) = self.on_release.take() {
            on_release();
        }
        self.rx.close();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.is_released())
            .finish()
    }
}
