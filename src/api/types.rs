use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::UserProfile;

/// A story as seen by the rest of the application.
///
/// `id` is assigned by the origin server and is the only identity; two
/// stories with the same id are the same story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
  pub id: String,
  pub author_name: String,
  pub description: String,
  pub photo_url: String,
  pub created_at: DateTime<Utc>,
  pub lat: Option<f64>,
  pub lon: Option<f64>,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginSession {
  pub token: String,
  pub user: UserProfile,
}

/// A photo attached to a new story submission.
#[derive(Debug, Clone)]
pub struct NewPhoto {
  pub file_name: String,
  pub mime_type: String,
  pub bytes: Vec<u8>,
}

/// Optional coordinates attached to a new story submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
  pub lat: f64,
  pub lon: f64,
}

/// A validated story submission, ready for the create endpoint.
#[derive(Debug, Clone)]
pub struct NewStory {
  pub description: String,
  pub photo: NewPhoto,
  pub location: Option<Location>,
}
