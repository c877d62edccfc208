//! Story API client and the typed results it produces.

pub mod api_types;
mod cached_client;
mod client;
pub mod types;

pub use cached_client::CachedApiClient;
pub use client::ApiClient;

use thiserror::Error;

use types::{LoginSession, NewStory, Story};

use crate::push::Subscription;

/// Failures from the story API, normalized at the client boundary.
///
/// A transport failure means the network was unreachable and triggers the
/// offline fallbacks; a server error is a well-formed refusal whose message
/// is surfaced verbatim and never retried.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
  #[error("network request failed: {0}")]
  Transport(String),
  #[error("{0}")]
  Server(String),
}

impl ApiError {
  pub fn transport(err: impl std::fmt::Display) -> Self {
    Self::Transport(err.to_string())
  }
}

/// Operations the rest of the application needs from the story service.
#[allow(async_fn_in_trait)]
pub trait StoryApi: Clone + Send + Sync {
  async fn login(&self, email: &str, password: &str) -> Result<LoginSession, ApiError>;
  async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError>;
  async fn list_stories(&self) -> Result<Vec<Story>, ApiError>;
  async fn create_story(&self, story: &NewStory) -> Result<(), ApiError>;
  async fn subscribe(&self, subscription: &Subscription) -> Result<(), ApiError>;
  async fn unsubscribe(&self, endpoint: &str) -> Result<(), ApiError>;
}
