//! Reconciliation controller: decides, per user action, whether data comes
//! from the network, the local store, or both, and owns the session state.

use thiserror::Error;
use tracing::warn;

use crate::api::types::{Location, NewPhoto, NewStory, Story};
use crate::api::{ApiError, StoryApi};
use crate::auth::SharedAuth;
use crate::notice::{Notice, NoticeSender};
use crate::push::{PushManager, PushPlatform};
use crate::store::{StoreError, StoryStore};

/// Maximum accepted photo size for a new story.
pub const MAX_PHOTO_BYTES: usize = 1024 * 1024;

/// Which rendering mode is active. A load only applies its render when the
/// view it was started for is still the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
  #[default]
  LiveFeed,
  SavedStories,
  AddStory,
}

/// Where a rendered feed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
  /// Fresh list from the server
  Live,
  /// Previously saved stories, shown because live data is unavailable
  Saved,
}

/// A feed ready to render.
#[derive(Debug, Clone)]
pub struct FeedView {
  pub stories: Vec<Story>,
  pub source: FeedSource,
}

/// Outcome of a live-feed load cycle.
#[derive(Debug)]
pub enum FeedLoad {
  Rendered(FeedView),
  /// The user navigated away while the load was in flight; the result is
  /// discarded rather than overwriting the newer view.
  Superseded,
}

/// A rejected story submission, named after the violated constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("description must be at least 3 characters")]
  DescriptionTooShort,
  #[error("a photo is required")]
  PhotoMissing,
  #[error("photo must not exceed 1 MiB")]
  PhotoTooLarge,
}

#[derive(Debug, Error)]
pub enum SubmitError {
  #[error(transparent)]
  Validation(#[from] ValidationError),
  #[error(transparent)]
  Api(#[from] ApiError),
}

/// Orchestrates fetch-or-fallback for the live feed and the explicit
/// offline-persistence actions.
pub struct Controller<A: StoryApi, P: PushPlatform> {
  api: A,
  store: StoryStore,
  push: PushManager<P, A>,
  auth: SharedAuth,
  /// In-memory live list, server order. Cleared whenever live data is not
  /// currently loaded.
  stories: Vec<Story>,
  view: View,
  notices: NoticeSender,
}

impl<A: StoryApi, P: PushPlatform> Controller<A, P> {
  pub fn new(
    api: A,
    store: StoryStore,
    push: PushManager<P, A>,
    auth: SharedAuth,
    notices: NoticeSender,
  ) -> Self {
    Self {
      api,
      store,
      push,
      auth,
      stories: Vec::new(),
      view: View::default(),
      notices,
    }
  }

  pub fn navigate(&mut self, view: View) {
    self.view = view;
  }

  fn is_authenticated(&self) -> bool {
    self
      .auth
      .read()
      .map(|auth| auth.is_authenticated())
      .unwrap_or(false)
  }

  /// Log in and establish the session.
  ///
  /// Push registration runs after the auth state is set and is best-effort;
  /// it can never unwind a successful login.
  pub async fn login(&mut self, email: &str, password: &str) -> Result<(), ApiError> {
    let session = self.api.login(email, password).await?;

    let name = session.user.name.clone();
    if let Ok(mut auth) = self.auth.write() {
      auth.set(session.token, session.user);
    }
    let _ = self
      .notices
      .send(Notice::success(format!("Welcome back, {name}!")));

    self.push.on_authenticated().await;

    Ok(())
  }

  /// Log out. Push teardown is best-effort and runs first, while the
  /// session token is still available for the unregister call.
  pub async fn logout(&mut self) {
    self.push.on_deauthenticated().await;

    if let Ok(mut auth) = self.auth.write() {
      auth.clear();
    }
    self.stories.clear();
    let _ = self.notices.send(Notice::info("You have been logged out."));
  }

  pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError> {
    self.api.register(name, email, password).await?;
    let _ = self
      .notices
      .send(Notice::success("Registration successful. You can log in now."));
    Ok(())
  }

  /// Load the live feed.
  ///
  /// Unauthenticated sessions render an empty live list without touching
  /// the network. A fetch failure degrades to the saved-story set with an
  /// informational notice; the in-memory live list stays empty in that
  /// case, because no live list is currently loaded.
  pub async fn load_live_feed(&mut self) -> FeedLoad {
    if !self.is_authenticated() {
      self.stories.clear();
      return self.render_live();
    }

    match self.api.list_stories().await {
      Ok(stories) => {
        self.stories = stories;
        self.render_live()
      }
      Err(err) => {
        warn!("live feed fetch failed: {err}");
        self.stories.clear();

        if self.view != View::LiveFeed {
          return FeedLoad::Superseded;
        }
        let _ = self.notices.send(Notice::info(
          "You appear to be offline. Showing previously saved stories.",
        ));

        let saved = match self.store.get_all() {
          Ok(saved) => saved,
          Err(store_err) => {
            let _ = self
              .notices
              .send(Notice::error(format!("Could not read saved stories: {store_err}")));
            Vec::new()
          }
        };

        FeedLoad::Rendered(FeedView {
          stories: saved,
          source: FeedSource::Saved,
        })
      }
    }
  }

  fn render_live(&self) -> FeedLoad {
    if self.view != View::LiveFeed {
      return FeedLoad::Superseded;
    }
    FeedLoad::Rendered(FeedView {
      stories: self.stories.clone(),
      source: FeedSource::Live,
    })
  }

  /// The saved-stories view: always the store, never the network.
  pub fn load_saved(&self) -> Result<Vec<Story>, StoreError> {
    self.store.get_all().map_err(|err| {
      let _ = self
        .notices
        .send(Notice::error(format!("Could not read saved stories: {err}")));
      err
    })
  }

  /// Save a story from the current live list for offline reading.
  ///
  /// The lookup is against the in-memory list only; an id that is not
  /// currently loaded is a no-op, reported through the return value.
  pub fn save_for_offline(&self, id: &str) -> Result<bool, StoreError> {
    let Some(story) = self.stories.iter().find(|s| s.id == id) else {
      return Ok(false);
    };

    match self.store.upsert_one(story) {
      Ok(()) => {
        let _ = self
          .notices
          .send(Notice::success("Story saved for offline reading."));
        Ok(true)
      }
      Err(err) => {
        let _ = self
          .notices
          .send(Notice::error(format!("Could not save story: {err}")));
        Err(err)
      }
    }
  }

  /// Remove a story from offline storage and reload the saved view so the
  /// deletion is visible.
  pub fn remove_from_offline(&self, id: &str) -> Result<Vec<Story>, StoreError> {
    if let Err(err) = self.store.delete_one(id) {
      let _ = self
        .notices
        .send(Notice::error(format!("Could not remove saved story: {err}")));
      return Err(err);
    }

    let _ = self
      .notices
      .send(Notice::info("Story removed from offline storage."));
    self.load_saved()
  }

  /// Validate and submit a new story, then reload the live feed in full so
  /// the list carries the server-assigned fields.
  pub async fn submit_new_story(
    &mut self,
    description: &str,
    photo: Option<NewPhoto>,
    location: Option<Location>,
  ) -> Result<FeedLoad, SubmitError> {
    if description.chars().count() < 3 {
      return Err(ValidationError::DescriptionTooShort.into());
    }
    let photo = photo.ok_or(ValidationError::PhotoMissing)?;
    if photo.bytes.len() > MAX_PHOTO_BYTES {
      return Err(ValidationError::PhotoTooLarge.into());
    }

    let story = NewStory {
      description: description.to_string(),
      photo,
      location,
    };
    self.api.create_story(&story).await?;

    let _ = self.notices.send(Notice::success("Story shared!"));
    self.view = View::LiveFeed;
    Ok(self.load_live_feed().await)
  }
}
