//! Favorites store backed by a realtime JSON tree over HTTP.
//!
//! Records live at `{base}/favorites/{userId}/{movieId}.json`. Writes are
//! `PUT`/`DELETE` with the session token in the `auth` query parameter;
//! subscriptions hold a `text/event-stream` GET open on the same location.

use crate::favorites::event_stream::{apply, EventStreamParser, StoreEvent};
use crate::favorites::store::{FavoritesStore, Subscription};
use crate::favorites::types::{
    validate_key, FavoriteRecord, FavoriteSet, FavoriteSnapshot, StoreError,
};
use crate::session::Session;
use crate::util::RetryPolicy;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// The store sends `keep-alive` events every 30s; three missed ones mean the
/// connection is gone even if TCP has not noticed.
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone)]
pub struct RestFavoritesStore {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl std::fmt::Debug for RestFavoritesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestFavoritesStore")
            .field("base_url", &self.base_url.as_str())
            .field("retry", &self.retry)
            .finish()
    }
}

impl RestFavoritesStore {
    pub fn new(http: reqwest::Client, base_url: Url, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url,
            retry,
        }
    }

    /// URL of the user's favorites root, or of one record when `movie_id` is
    /// given. Carries the session token, so it must never be logged.
    fn location(&self, session: &Session, movie_id: Option<&str>) -> Result<Url, StoreError> {
        validate_key(session.user_id())?;
        if let Some(movie_id) = movie_id {
            validate_key(movie_id)?;
        }

        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::InvalidKey(self.base_url.to_string()))?;
            segments.pop_if_empty().push("favorites");
            match movie_id {
                Some(movie_id) => {
                    segments
                        .push(session.user_id())
                        .push(&format!("{movie_id}.json"));
                }
                None => {
                    segments.push(&format!("{}.json", session.user_id()));
                }
            }
        }
        url.query_pairs_mut()
            .append_pair("auth", session.token().expose_secret());
        Ok(url)
    }

    /// Sends a request, retrying transient failures with backoff. Auth
    /// rejections are returned immediately.
    async fn send(
        &self,
        build: impl Fn() -> RequestBuilder,
        target: &str,
    ) -> Result<Response, StoreError> {
        let mut retry_count = 0;
        loop {
            match self.attempt(build()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && self.retry.allows_retry(retry_count) => {
                    let delay = self.retry.delay_for(retry_count);
                    tracing::warn!(
                        target_key = %target,
                        error = %e,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Store request failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = tokio::time::timeout(self.retry.request_timeout, request.send())
            .await
            .map_err(|_| StoreError::Timeout)??;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::AuthRequired),
            status => Err(StoreError::HttpStatus(status.as_u16())),
        }
    }

    async fn write(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
        target: &str,
    ) -> Result<(), StoreError> {
        self.send(
            || {
                let request = self.http.request(method.clone(), url.as_str());
                match &body {
                    Some(body) => request
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(body.clone()),
                    None => request,
                }
            },
            target,
        )
        .await?;
        Ok(())
    }

    async fn open_stream(&self, url: &Url, target: &str) -> Result<Response, StoreError> {
        let response = self
            .send(
                || {
                    self.http
                        .get(url.as_str())
                        .header(header::ACCEPT, "text/event-stream")
                },
                target,
            )
            .await?;
        tracing::debug!(target_key = %target, "Store subscription opened");
        Ok(response)
    }
}

fn to_snapshot(movie_id: &str, tree: &Value) -> Result<FavoriteSnapshot, StoreError> {
    let record = match tree {
        Value::Null => None,
        other => Some(
            serde_json::from_value::<FavoriteRecord>(other.clone())
                .map_err(|e| StoreError::Decode(e.to_string()))?,
        ),
    };
    Ok(FavoriteSnapshot {
        movie_id: movie_id.to_string(),
        record,
    })
}

/// Malformed children are skipped so one bad record does not hide the rest.
fn to_set(tree: &Value) -> Result<FavoriteSet, StoreError> {
    let children = match tree {
        Value::Null => return Ok(FavoriteSet::new()),
        Value::Object(children) => children,
        other => {
            return Err(StoreError::Decode(format!(
                "expected an object of favorites, got {other}"
            )))
        }
    };

    let mut set = FavoriteSet::new();
    for (movie_id, value) in children {
        match serde_json::from_value::<FavoriteRecord>(value.clone()) {
            Ok(record) => {
                set.insert(movie_id.clone(), record);
            }
            Err(e) => {
                tracing::warn!(movie_id = %movie_id, error = %e, "Skipping malformed favorite");
            }
        }
    }
    Ok(set)
}

/// Mirrors the streamed location into a local tree and forwards each
/// distinct converted snapshot. Ends on transport loss, idle timeout,
/// `cancel`, `auth_revoked`, or when the subscriber goes away.
fn spawn_pump<T, F>(
    response: Response,
    tx: mpsc::UnboundedSender<T>,
    target: String,
    convert: F,
) -> tokio::task::JoinHandle<()>
where
    T: PartialEq + Clone + Send + 'static,
    F: Fn(&Value) -> Result<T, StoreError> + Send + 'static,
{
    tokio::spawn(async move {
        let mut stream = response.bytes_stream();
        let mut parser = EventStreamParser::default();
        let mut tree = Value::Null;
        let mut last: Option<T> = None;

        loop {
            let chunk = match tokio::time::timeout(STREAM_IDLE_TIMEOUT, stream.next()).await {
                Err(_) => {
                    tracing::warn!(target_key = %target, "Store subscription idle, closing");
                    return;
                }
                Ok(None) => {
                    tracing::debug!(target_key = %target, "Store subscription closed by server");
                    return;
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!(target_key = %target, error = %e, "Store subscription failed");
                    return;
                }
                Ok(Some(Ok(chunk))) => chunk,
            };

            for raw in parser.feed(&chunk) {
                let event = match StoreEvent::parse(&raw) {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(target_key = %target, error = %e, "Skipping malformed store event");
                        continue;
                    }
                };

                match event {
                    StoreEvent::KeepAlive => continue,
                    StoreEvent::Cancel(reason) => {
                        tracing::warn!(target_key = %target, reason = %reason, "Store cancelled subscription");
                        return;
                    }
                    StoreEvent::AuthRevoked => {
                        tracing::warn!(target_key = %target, "Store revoked subscription credentials");
                        return;
                    }
                    change => apply(&mut tree, change),
                }

                match convert(&tree) {
                    Ok(snapshot) if last.as_ref() == Some(&snapshot) => {}
                    Ok(snapshot) => {
                        if tx.send(snapshot.clone()).is_err() {
                            return;
                        }
                        last = Some(snapshot);
                    }
                    Err(e) => {
                        tracing::warn!(target_key = %target, error = %e, "Ignoring undecodable snapshot");
                    }
                }
            }
        }
    })
}

fn into_subscription<T>(
    rx: mpsc::UnboundedReceiver<T>,
    task: tokio::task::JoinHandle<()>,
) -> Subscription<T> {
    let abort = task.abort_handle();
    Subscription::new(rx, move || abort.abort())
}

#[async_trait]
impl FavoritesStore for RestFavoritesStore {
    async fn subscribe(
        &self,
        session: &Session,
        movie_id: &str,
    ) -> Result<Subscription<FavoriteSnapshot>, StoreError> {
        let url = self.location(session, Some(movie_id))?;
        let target = format!("favorites/{}/{}", session.user_id(), movie_id);
        let response = self.open_stream(&url, &target).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let movie_id = movie_id.to_string();
        let task = spawn_pump(response, tx, target, move |tree| {
            to_snapshot(&movie_id, tree)
        });
        Ok(into_subscription(rx, task))
    }

    async fn subscribe_all(
        &self,
        session: &Session,
    ) -> Result<Subscription<FavoriteSet>, StoreError> {
        let url = self.location(session, None)?;
        let target = format!("favorites/{}", session.user_id());
        let response = self.open_stream(&url, &target).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let task = spawn_pump(response, tx, target, to_set);
        Ok(into_subscription(rx, task))
    }

    async fn set(
        &self,
        session: &Session,
        movie_id: &str,
        record: &FavoriteRecord,
    ) -> Result<(), StoreError> {
        let url = self.location(session, Some(movie_id))?;
        let body = serde_json::to_vec(record).map_err(|e| StoreError::Decode(e.to_string()))?;
        let target = format!("favorites/{}/{}", session.user_id(), movie_id);
        self.write(Method::PUT, url, Some(body), &target).await?;
        tracing::debug!(target_key = %target, "Favorite stored");
        Ok(())
    }

    async fn remove(&self, session: &Session, movie_id: &str) -> Result<(), StoreError> {
        let url = self.location(session, Some(movie_id))?;
        let target = format!("favorites/{}/{}", session.user_id(), movie_id);
        self.write(Method::DELETE, url, None, &target).await?;
        tracing::debug!(target_key = %target, "Favorite removed");
        Ok(())
    }
}
