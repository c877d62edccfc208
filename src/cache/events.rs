//! Push payload rendering and notification interactions.

use color_eyre::Result;
use serde::Deserialize;
use tracing::warn;

/// Title shown when a push payload is absent or malformed.
const DEFAULT_TITLE: &str = "New story on Story Feed";
/// Body shown when a push payload is absent or malformed.
const DEFAULT_BODY: &str = "A new story is waiting for you.";

/// Display options carried by a push payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotificationOptions {
  #[serde(default)]
  pub body: Option<String>,
  #[serde(default)]
  pub icon: Option<String>,
  #[serde(default)]
  pub badge: Option<String>,
}

/// Structured notification data sent by the push service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
  pub title: String,
  #[serde(default)]
  pub options: NotificationOptions,
}

impl PushPayload {
  fn fallback() -> Self {
    Self {
      title: DEFAULT_TITLE.to_string(),
      options: NotificationOptions {
        body: Some(DEFAULT_BODY.to_string()),
        icon: None,
        badge: None,
      },
    }
  }
}

/// Platform notification capability: display, dismissal, window focus.
pub trait NotificationHost: Send + Sync {
  fn show(&self, title: &str, options: &NotificationOptions) -> Result<()>;
  fn dismiss(&self);
  fn focus_window(&self) -> Result<()>;
}

/// Handle an incoming push message.
///
/// The payload is parsed as structured notification data; an absent or
/// malformed payload falls back to a fixed title and body. Display failures
/// are logged, never propagated.
pub fn handle_push(host: &impl NotificationHost, payload: Option<&[u8]>) {
  let payload = payload
    .and_then(|bytes| serde_json::from_slice::<PushPayload>(bytes).ok())
    .unwrap_or_else(PushPayload::fallback);

  if let Err(err) = host.show(&payload.title, &payload.options) {
    warn!("failed to display notification: {err:#}");
  }
}

/// Handle a click on a displayed notification: dismiss it and bring the
/// application window to the front.
pub fn handle_notification_click(host: &impl NotificationHost) {
  host.dismiss();
  if let Err(err) = host.focus_window() {
    warn!("failed to focus application window: {err:#}");
  }
}

/// Notification host that writes to the log. Used by the terminal shell,
/// which has no system notification surface.
pub struct LogNotifier;

impl NotificationHost for LogNotifier {
  fn show(&self, title: &str, options: &NotificationOptions) -> Result<()> {
    tracing::info!(
      title,
      body = options.body.as_deref().unwrap_or_default(),
      "notification"
    );
    Ok(())
  }

  fn dismiss(&self) {}

  fn focus_window(&self) -> Result<()> {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;
  use std::sync::Mutex;

  #[derive(Default)]
  struct RecordingHost {
    shown: Mutex<Vec<(String, NotificationOptions)>>,
    dismissed: Mutex<u32>,
    focused: Mutex<u32>,
    fail_show: bool,
  }

  impl NotificationHost for RecordingHost {
    fn show(&self, title: &str, options: &NotificationOptions) -> Result<()> {
      if self.fail_show {
        return Err(eyre!("display refused"));
      }
      self
        .shown
        .lock()
        .unwrap()
        .push((title.to_string(), options.clone()));
      Ok(())
    }

    fn dismiss(&self) {
      *self.dismissed.lock().unwrap() += 1;
    }

    fn focus_window(&self) -> Result<()> {
      *self.focused.lock().unwrap() += 1;
      Ok(())
    }
  }

  #[test]
  fn test_structured_payload_is_displayed() {
    let host = RecordingHost::default();
    let payload = br#"{"title":"Hello","options":{"body":"World"}}"#;

    handle_push(&host, Some(payload));

    let shown = host.shown.lock().unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].0, "Hello");
    assert_eq!(shown[0].1.body.as_deref(), Some("World"));
  }

  #[test]
  fn test_absent_payload_falls_back_to_defaults() {
    let host = RecordingHost::default();

    handle_push(&host, None);

    let shown = host.shown.lock().unwrap();
    assert_eq!(shown[0].0, DEFAULT_TITLE);
    assert_eq!(shown[0].1.body.as_deref(), Some(DEFAULT_BODY));
  }

  #[test]
  fn test_malformed_payload_falls_back_to_defaults() {
    let host = RecordingHost::default();

    handle_push(&host, Some(b"not json at all"));

    let shown = host.shown.lock().unwrap();
    assert_eq!(shown[0].0, DEFAULT_TITLE);
  }

  #[test]
  fn test_display_failure_does_not_panic() {
    let host = RecordingHost {
      fail_show: true,
      ..Default::default()
    };

    handle_push(&host, None);

    assert!(host.shown.lock().unwrap().is_empty());
  }

  #[test]
  fn test_click_dismisses_and_focuses() {
    let host = RecordingHost::default();

    handle_notification_click(&host);

    assert_eq!(*host.dismissed.lock().unwrap(), 1);
    assert_eq!(*host.focused.lock().unwrap(), 1);
  }
}
