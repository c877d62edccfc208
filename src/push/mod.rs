//! Push subscription lifecycle, kept aligned with authentication state.
//!
//! Everything here is best-effort: a failed subscription is a notice, never
//! an error that blocks login or logout.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::StoryApi;
use crate::notice::{Notice, NoticeSender};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
  pub p256dh: String,
  pub auth: String,
}

/// The device's registration with a push endpoint, in the exact shape the
/// origin server expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
  pub endpoint: String,
  pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
  Granted,
  Denied,
  Prompt,
  Unsupported,
}

/// Platform push capability: permission handling plus subscription
/// creation and teardown.
///
/// The platform is the source of truth for whether a subscription exists;
/// the origin server is the source of truth for whether it should deliver.
#[allow(async_fn_in_trait)]
pub trait PushPlatform: Send + Sync {
  fn permission(&self) -> PermissionState;
  async fn request_permission(&self) -> Result<PermissionState>;
  async fn subscription(&self) -> Result<Option<Subscription>>;
  async fn subscribe(&self, application_server_key: &str) -> Result<Subscription>;
  async fn unsubscribe(&self) -> Result<()>;
}

/// Platform without notification support. Every auth transition is a
/// silent no-op; wired by the terminal shell.
#[derive(Clone)]
pub struct UnsupportedPlatform;

impl PushPlatform for UnsupportedPlatform {
  fn permission(&self) -> PermissionState {
    PermissionState::Unsupported
  }

  async fn request_permission(&self) -> Result<PermissionState> {
    Ok(PermissionState::Unsupported)
  }

  async fn subscription(&self) -> Result<Option<Subscription>> {
    Ok(None)
  }

  async fn subscribe(&self, _application_server_key: &str) -> Result<Subscription> {
    Err(eyre!("notifications are not supported on this platform"))
  }

  async fn unsubscribe(&self) -> Result<()> {
    Ok(())
  }
}

/// Keeps the device's push registration in step with the session.
pub struct PushManager<P, A> {
  platform: P,
  api: A,
  application_server_key: String,
  notices: NoticeSender,
}

impl<P: PushPlatform, A: StoryApi> PushManager<P, A> {
  pub fn new(platform: P, api: A, application_server_key: String, notices: NoticeSender) -> Self {
    Self {
      platform,
      api,
      application_server_key,
      notices,
    }
  }

  /// Align push registration with a freshly authenticated session.
  ///
  /// Missing capability and denied permission are silent no-ops; an
  /// existing platform subscription means the device is already registered
  /// and nothing is sent. Failures become a notice and nothing more.
  pub async fn on_authenticated(&self) {
    if self.platform.permission() == PermissionState::Unsupported {
      return;
    }

    if let Err(err) = self.try_subscribe().await {
      warn!("push subscription failed: {err:#}");
      let _ = self
        .notices
        .send(Notice::info(format!("Push notifications are off: {err}")));
    }
  }

  async fn try_subscribe(&self) -> Result<()> {
    let permission = self.platform.request_permission().await?;
    if permission != PermissionState::Granted {
      info!(?permission, "notification permission not granted, skipping subscription");
      return Ok(());
    }

    if self.platform.subscription().await?.is_some() {
      debug!("platform subscription already exists, not re-subscribing");
      return Ok(());
    }

    let subscription = self.platform.subscribe(&self.application_server_key).await?;
    self
      .api
      .subscribe(&subscription)
      .await
      .map_err(|err| eyre!("server rejected the subscription: {err}"))?;

    let _ = self
      .notices
      .send(Notice::success("Push notifications enabled."));
    Ok(())
  }

  /// Tear down push registration on logout.
  ///
  /// Server unregistration runs before the platform subscription is
  /// removed. Failures are logged and never block the logout transition.
  pub async fn on_deauthenticated(&self) {
    if self.platform.permission() == PermissionState::Unsupported {
      return;
    }

    match self.platform.subscription().await {
      Ok(Some(subscription)) => {
        if let Err(err) = self.api.unsubscribe(&subscription.endpoint).await {
          warn!("failed to unregister push subscription with the server: {err}");
        }
        if let Err(err) = self.platform.unsubscribe().await {
          warn!("failed to remove the platform subscription: {err:#}");
        }
      }
      Ok(None) => {}
      Err(err) => {
        warn!("could not look up the platform subscription: {err:#}");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::{LoginSession, NewStory, Story};
  use crate::api::ApiError;
  use std::sync::{Arc, Mutex};

  fn subscription() -> Subscription {
    Subscription {
      endpoint: "https://push.example.test/sub-1".to_string(),
      keys: SubscriptionKeys {
        p256dh: "p256dh-key".to_string(),
        auth: "auth-secret".to_string(),
      },
    }
  }

  #[derive(Default)]
  struct PlatformState {
    permission: Option<PermissionState>,
    existing: Option<Subscription>,
    subscribe_calls: u32,
    unsubscribe_calls: u32,
  }

  #[derive(Clone, Default)]
  struct MockPlatform {
    state: Arc<Mutex<PlatformState>>,
  }

  impl MockPlatform {
    fn granted() -> Self {
      let platform = Self::default();
      platform.state.lock().unwrap().permission = Some(PermissionState::Granted);
      platform
    }

    fn with_existing(self, subscription: Subscription) -> Self {
      self.state.lock().unwrap().existing = Some(subscription);
      self
    }
  }

  impl PushPlatform for MockPlatform {
    fn permission(&self) -> PermissionState {
      self
        .state
        .lock()
        .unwrap()
        .permission
        .unwrap_or(PermissionState::Unsupported)
    }

    async fn request_permission(&self) -> Result<PermissionState> {
      Ok(self.permission())
    }

    async fn subscription(&self) -> Result<Option<Subscription>> {
      Ok(self.state.lock().unwrap().existing.clone())
    }

    async fn subscribe(&self, _application_server_key: &str) -> Result<Subscription> {
      let mut state = self.state.lock().unwrap();
      state.subscribe_calls += 1;
      let created = subscription();
      state.existing = Some(created.clone());
      Ok(created)
    }

    async fn unsubscribe(&self) -> Result<()> {
      let mut state = self.state.lock().unwrap();
      state.unsubscribe_calls += 1;
      state.existing = None;
      Ok(())
    }
  }

  #[derive(Default)]
  struct ApiCalls {
    subscribes: u32,
    unsubscribes: u32,
  }

  #[derive(Clone, Default)]
  struct MockApi {
    calls: Arc<Mutex<ApiCalls>>,
    fail_subscribe: bool,
  }

  impl StoryApi for MockApi {
    async fn login(&self, _email: &str, _password: &str) -> Result<LoginSession, ApiError> {
      unimplemented!("not used by push tests")
    }

    async fn register(
      &self,
      _name: &str,
      _email: &str,
      _password: &str,
    ) -> Result<(), ApiError> {
      unimplemented!("not used by push tests")
    }

    async fn list_stories(&self) -> Result<Vec<Story>, ApiError> {
      unimplemented!("not used by push tests")
    }

    async fn create_story(&self, _story: &NewStory) -> Result<(), ApiError> {
      unimplemented!("not used by push tests")
    }

    async fn subscribe(&self, _subscription: &Subscription) -> Result<(), ApiError> {
      self.calls.lock().unwrap().subscribes += 1;
      if self.fail_subscribe {
        return Err(ApiError::Server("subscription refused".to_string()));
      }
      Ok(())
    }

    async fn unsubscribe(&self, _endpoint: &str) -> Result<(), ApiError> {
      self.calls.lock().unwrap().unsubscribes += 1;
      Ok(())
    }
  }

  fn manager(platform: MockPlatform, api: MockApi) -> (PushManager<MockPlatform, MockApi>, crate::notice::NoticeReceiver) {
    let (tx, rx) = crate::notice::channel();
    (PushManager::new(platform, api, "server-key".to_string(), tx), rx)
  }

  #[tokio::test]
  async fn test_unsupported_platform_is_silent_noop() {
    let platform = MockPlatform::default();
    let api = MockApi::default();
    let (manager, mut notices) = manager(platform.clone(), api.clone());

    manager.on_authenticated().await;

    assert_eq!(platform.state.lock().unwrap().subscribe_calls, 0);
    assert_eq!(api.calls.lock().unwrap().subscribes, 0);
    assert!(notices.try_recv().is_err());
  }

  #[tokio::test]
  async fn test_denied_permission_skips_subscription() {
    let platform = MockPlatform::default();
    platform.state.lock().unwrap().permission = Some(PermissionState::Denied);
    let api = MockApi::default();
    let (manager, _notices) = manager(platform.clone(), api.clone());

    manager.on_authenticated().await;

    assert_eq!(platform.state.lock().unwrap().subscribe_calls, 0);
    assert_eq!(api.calls.lock().unwrap().subscribes, 0);
  }

  #[tokio::test]
  async fn test_dismissed_prompt_skips_subscription() {
    let platform = MockPlatform::default();
    platform.state.lock().unwrap().permission = Some(PermissionState::Prompt);
    let api = MockApi::default();
    let (manager, _notices) = manager(platform.clone(), api.clone());

    manager.on_authenticated().await;

    assert_eq!(platform.state.lock().unwrap().subscribe_calls, 0);
    assert_eq!(api.calls.lock().unwrap().subscribes, 0);
  }

  #[tokio::test]
  async fn test_fresh_login_subscribes_and_registers_once() {
    let platform = MockPlatform::granted();
    let api = MockApi::default();
    let (manager, _notices) = manager(platform.clone(), api.clone());

    manager.on_authenticated().await;

    assert_eq!(platform.state.lock().unwrap().subscribe_calls, 1);
    assert_eq!(api.calls.lock().unwrap().subscribes, 1);

    // Second login with the subscription still in place: nothing new.
    manager.on_authenticated().await;

    assert_eq!(platform.state.lock().unwrap().subscribe_calls, 1);
    assert_eq!(api.calls.lock().unwrap().subscribes, 1);
  }

  #[tokio::test]
  async fn test_server_rejection_is_nonfatal_notice() {
    let platform = MockPlatform::granted();
    let api = MockApi {
      fail_subscribe: true,
      ..Default::default()
    };
    let (manager, mut notices) = manager(platform, api);

    manager.on_authenticated().await;

    let notice = notices.try_recv().unwrap();
    assert!(notice.message.contains("Push notifications are off"));
  }

  #[tokio::test]
  async fn test_logout_unregisters_then_removes_subscription() {
    let platform = MockPlatform::granted().with_existing(subscription());
    let api = MockApi::default();
    let (manager, _notices) = manager(platform.clone(), api.clone());

    manager.on_deauthenticated().await;

    assert_eq!(api.calls.lock().unwrap().unsubscribes, 1);
    assert_eq!(platform.state.lock().unwrap().unsubscribe_calls, 1);
    assert!(platform.state.lock().unwrap().existing.is_none());
  }

  #[tokio::test]
  async fn test_logout_without_subscription_is_noop() {
    let platform = MockPlatform::granted();
    let api = MockApi::default();
    let (manager, _notices) = manager(platform.clone(), api.clone());

    manager.on_deauthenticated().await;

    assert_eq!(api.calls.lock().unwrap().unsubscribes, 0);
    assert_eq!(platform.state.lock().unwrap().unsubscribe_calls, 0);
  }
}
