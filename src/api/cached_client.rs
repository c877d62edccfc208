//! API client with the transport cache interposed on reads.

use tracing::debug;

use crate::cache::{CacheBuckets, CacheSource, HttpCache};
use crate::push::Subscription;

use super::client::ApiClient;
use super::types::{LoginSession, NewStory, Story};
use super::{ApiError, StoryApi};

/// Story API client whose GET requests pass through the response cache.
///
/// Reads are served stale-while-revalidate, so a story list survives a dead
/// network as long as one earlier fetch succeeded. Writes and auth calls go
/// straight to the network.
pub struct CachedApiClient<S: CacheBuckets> {
  inner: ApiClient,
  cache: HttpCache<S>,
}

impl<S: CacheBuckets> CachedApiClient<S> {
  pub fn new(inner: ApiClient, cache: HttpCache<S>) -> Self {
    Self { inner, cache }
  }
}

impl<S: CacheBuckets> Clone for CachedApiClient<S> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
      cache: self.cache.clone(),
    }
  }
}

impl<S: CacheBuckets> StoryApi for CachedApiClient<S> {
  async fn login(&self, email: &str, password: &str) -> Result<LoginSession, ApiError> {
    self.inner.login(email, password).await
  }

  async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError> {
    self.inner.register(name, email, password).await
  }

  async fn list_stories(&self) -> Result<Vec<Story>, ApiError> {
    let url = self.inner.stories_url();
    let inner = self.inner.clone();
    let fetch_url = url.clone();

    let intercepted = self
      .cache
      .intercept("GET", &url, move || async move {
        Ok(inner.get_raw(&fetch_url).await?)
      })
      .await
      .map_err(|err| ApiError::Transport(err.to_string()))?;

    if intercepted.source == CacheSource::Cache {
      debug!(
        stored_at = %intercepted.response.stored_at,
        "story list served from cache, revalidating in the background"
      );
    }

    ApiClient::parse_story_list(&intercepted.response)
  }

  async fn create_story(&self, story: &NewStory) -> Result<(), ApiError> {
    self.inner.create_story(story).await
  }

  async fn subscribe(&self, subscription: &Subscription) -> Result<(), ApiError> {
    self.inner.subscribe(subscription).await
  }

  async fn unsubscribe(&self, endpoint: &str) -> Result<(), ApiError> {
    self.inner.unsubscribe(endpoint).await
  }
}
