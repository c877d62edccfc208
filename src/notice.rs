use tokio::sync::mpsc;

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
  Info,
  Success,
  Error,
}

/// A user-visible, non-fatal message produced by the core layers.
///
/// Lower layers never print; they emit notices and the shell decides how to
/// render them.
#[derive(Debug, Clone)]
pub struct Notice {
  pub level: NoticeLevel,
  pub message: String,
}

impl Notice {
  pub fn info(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Info,
      message: message.into(),
    }
  }

  pub fn success(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Success,
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Error,
      message: message.into(),
    }
  }
}

pub type NoticeSender = mpsc::UnboundedSender<Notice>;
pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;

/// Create a notice channel pair.
pub fn channel() -> (NoticeSender, NoticeReceiver) {
  mpsc::unbounded_channel()
}
