//! Transport-level response cache with offline support.
//!
//! This module intercepts outbound GET requests, serves stored responses
//! immediately while revalidating in the background, and prunes superseded
//! cache generations. It also renders incoming push payloads as
//! notifications. It runs behind its own interfaces and shares no mutable
//! state with the rest of the application.

mod events;
mod layer;
mod storage;

pub use events::{
  handle_notification_click, handle_push, LogNotifier, NotificationHost, NotificationOptions,
  PushPayload,
};
pub use layer::{CacheSource, HttpCache, Intercepted};
pub use storage::{CacheBuckets, RequestKey, SqliteBuckets, StoredResponse};
