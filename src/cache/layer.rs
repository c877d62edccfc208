//! Cache layer that intercepts outbound requests with a
//! stale-while-revalidate policy.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::storage::{CacheBuckets, RequestKey, StoredResponse};

/// Current cache generation. Bumped on every release that changes what the
/// cache may hold; superseded generations are deleted on activation.
pub const CACHE_GENERATION: &str = "storyfeed-v1";

/// Prefix marking buckets owned by this application. Buckets outside this
/// namespace are never deleted.
const CACHE_NAMESPACE: &str = "storyfeed-";

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh response from the network
  Network,
  /// Stored response; a background refresh may be in flight
  Cache,
  /// Request outside the cache policy, passed straight to the network
  Passthrough,
}

/// Result of an intercepted request.
#[derive(Debug)]
pub struct Intercepted {
  pub response: StoredResponse,
  pub source: CacheSource,
  /// In-flight background refresh, if one was started. Awaiting it extends
  /// the event lifetime until the cache write has completed; the refreshed
  /// entry is only visible to the next request for the same identity.
  pub revalidation: Option<JoinHandle<()>>,
}

/// Transport-level response cache.
///
/// Sits between the application and the network, serving stored responses
/// for idempotent reads while refreshing them in the background.
pub struct HttpCache<S: CacheBuckets> {
  storage: Arc<S>,
  generation: String,
}

impl<S: CacheBuckets> HttpCache<S> {
  /// Create a cache over the given bucket storage, using the current
  /// generation.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      generation: CACHE_GENERATION.to_string(),
    }
  }

  /// Override the generation name. Used by tests.
  #[cfg(test)]
  pub fn with_generation(mut self, generation: &str) -> Self {
    self.generation = generation.to_string();
    self
  }

  /// Open the current generation bucket and seed it with the application
  /// shell resources.
  ///
  /// Seeding is best-effort: a resource that cannot be fetched or stored is
  /// skipped with a warning and install still succeeds.
  pub async fn install<F, Fut>(&self, precache: &[String], fetch: F) -> Result<()>
  where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<StoredResponse>>,
  {
    self.storage.open(&self.generation)?;

    let fetches = precache.iter().map(|url| {
      let fut = fetch(url.clone());
      async move { (url.clone(), fut.await) }
    });

    for (url, result) in futures::future::join_all(fetches).await {
      match result {
        Ok(response) if response.is_success() => {
          let request = RequestKey::new("GET", &url);
          if let Err(err) = self.storage.put(&self.generation, &request, &response) {
            warn!(%url, "failed to store precached resource: {err:#}");
          }
        }
        Ok(response) => {
          warn!(%url, status = response.status, "precache skipped non-success response");
        }
        Err(err) => {
          warn!(%url, "precache fetch failed: {err:#}");
        }
      }
    }

    Ok(())
  }

  /// Delete every superseded generation this application owns.
  ///
  /// Buckets whose name is outside the application namespace are left
  /// untouched.
  pub fn activate(&self) -> Result<()> {
    for name in self.storage.bucket_names()? {
      if name != self.generation && name.starts_with(CACHE_NAMESPACE) {
        info!(bucket = %name, "deleting superseded cache generation");
        self.storage.delete_bucket(&name)?;
      }
    }
    Ok(())
  }

  /// Intercept an outbound request.
  ///
  /// Only GET requests over http(s) participate; anything else goes
  /// straight to the network uncached. For participating requests the
  /// policy is stale-while-revalidate:
  /// - stored response present: return it immediately and refresh the entry
  ///   in the background (refresh failures never surface);
  /// - no stored response: wait for the network, writing successful
  ///   responses through; a network failure here fails the request.
  pub async fn intercept<F, Fut>(&self, method: &str, url: &str, fetch: F) -> Result<Intercepted>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<StoredResponse>> + Send + 'static,
  {
    if !is_interceptable(method, url) {
      let response = fetch().await?;
      return Ok(Intercepted {
        response,
        source: CacheSource::Passthrough,
        revalidation: None,
      });
    }

    let request = RequestKey::new(method, url);

    // A storage failure must not take down a request the network can still
    // serve; treat it as a miss.
    let cached = match self.storage.lookup(&self.generation, &request) {
      Ok(found) => found,
      Err(err) => {
        warn!("cache lookup failed for {}: {err:#}", request.description());
        None
      }
    };

    match cached {
      Some(response) => {
        let storage = Arc::clone(&self.storage);
        let generation = self.generation.clone();
        let handle = tokio::spawn(async move {
          match fetch().await {
            Ok(fresh) if fresh.is_success() => {
              if let Err(err) = storage.put(&generation, &request, &fresh) {
                warn!("background cache write failed: {err:#}");
              }
            }
            Ok(fresh) => {
              debug!(status = fresh.status, "revalidation returned non-success, entry kept");
            }
            Err(err) => {
              debug!("background revalidation failed: {err:#}");
            }
          }
        });

        Ok(Intercepted {
          response,
          source: CacheSource::Cache,
          revalidation: Some(handle),
        })
      }
      None => {
        let response = fetch().await.map_err(|err| {
          eyre!(
            "network unavailable and no cached response for {}: {err}",
            request.description()
          )
        })?;

        if response.is_success() {
          if let Err(err) = self.storage.put(&self.generation, &request, &response) {
            warn!("cache write failed for {}: {err:#}", request.description());
          }
        }

        Ok(Intercepted {
          response,
          source: CacheSource::Network,
          revalidation: None,
        })
      }
    }
  }
}

impl<S: CacheBuckets> Clone for HttpCache<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      generation: self.generation.clone(),
    }
  }
}

/// GET over http(s) only; other methods and schemes this system does not
/// control are passed through.
fn is_interceptable(method: &str, url: &str) -> bool {
  if !method.eq_ignore_ascii_case("GET") {
    return false;
  }
  match Url::parse(url) {
    Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
    Err(_) => false,
  }
}
