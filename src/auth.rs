//! Authentication state shared between the controller, the API client and
//! the push subscription manager.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// The authenticated user, as returned by the login endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
  pub user_id: String,
  pub name: String,
}

/// Token + user for the current session.
///
/// Owned by the reconciliation controller and handed to collaborators as a
/// [`SharedAuth`]; nothing reads auth state from ambient process storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthContext {
  pub token: Option<String>,
  pub user: Option<UserProfile>,
}

impl AuthContext {
  pub fn is_authenticated(&self) -> bool {
    self.token.is_some()
  }

  pub fn set(&mut self, token: String, user: UserProfile) {
    self.token = Some(token);
    self.user = Some(user);
  }

  pub fn clear(&mut self) {
    self.token = None;
    self.user = None;
  }
}

/// Shared handle to the session's auth state.
pub type SharedAuth = Arc<RwLock<AuthContext>>;

pub fn shared(ctx: AuthContext) -> SharedAuth {
  Arc::new(RwLock::new(ctx))
}

/// Load a persisted session, or an empty one if none exists yet.
pub fn load_session(path: &Path) -> Result<AuthContext> {
  if !path.exists() {
    return Ok(AuthContext::default());
  }

  let contents = std::fs::read_to_string(path)
    .map_err(|e| eyre!("Failed to read session file {}: {}", path.display(), e))?;

  serde_yaml::from_str(&contents)
    .map_err(|e| eyre!("Failed to parse session file {}: {}", path.display(), e))
}

/// Persist the session to disk so subsequent invocations stay logged in.
pub fn save_session(path: &Path, ctx: &AuthContext) -> Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)
      .map_err(|e| eyre!("Failed to create session directory: {}", e))?;
  }

  let contents =
    serde_yaml::to_string(ctx).map_err(|e| eyre!("Failed to serialize session: {}", e))?;

  std::fs::write(path, contents)
    .map_err(|e| eyre!("Failed to write session file {}: {}", path.display(), e))
}
