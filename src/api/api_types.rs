//! Raw response shapes from the story API.
//!
//! Every payload carries an `error` flag and a free-text `message`; the
//! client normalizes these into typed results before they reach the core.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::types::Story;

/// The flag + message pair present on every response.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiListStoriesResponse {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub list_story: Vec<ApiStory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStory {
  pub id: String,
  /// Author display name.
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub photo_url: String,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub lat: Option<f64>,
  #[serde(default)]
  pub lon: Option<f64>,
}

impl ApiStory {
  pub fn into_story(self) -> Story {
    Story {
      id: self.id,
      author_name: self.name,
      description: self.description,
      photo_url: self.photo_url,
      created_at: self.created_at,
      lat: self.lat,
      lon: self.lon,
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLoginResponse {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
  pub login_result: Option<ApiLoginResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLoginResult {
  pub user_id: String,
  pub name: String,
  pub token: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_list_response_parses() {
    let body = br#"{
      "error": false,
      "message": "Stories fetched successfully",
      "listStory": [
        {
          "id": "story-1",
          "name": "Ana",
          "description": "a walk in the park",
          "photoUrl": "https://cdn.example.test/1.jpg",
          "createdAt": "2024-01-05T08:30:00.000Z",
          "lat": -6.2,
          "lon": 106.8
        }
      ]
    }"#;

    let parsed: ApiListStoriesResponse = serde_json::from_slice(body).unwrap();
    assert!(!parsed.error);
    assert_eq!(parsed.list_story.len(), 1);

    let story = parsed.list_story.into_iter().next().unwrap().into_story();
    assert_eq!(story.id, "story-1");
    assert_eq!(story.author_name, "Ana");
    assert_eq!(story.lat, Some(-6.2));
  }

  #[test]
  fn test_story_without_location_parses() {
    let body = br#"{
      "id": "story-2",
      "name": "Ben",
      "description": "",
      "photoUrl": "https://cdn.example.test/2.jpg",
      "createdAt": "2024-01-06T10:00:00.000Z"
    }"#;

    let story: ApiStory = serde_json::from_slice(body).unwrap();
    assert_eq!(story.lat, None);
    assert_eq!(story.lon, None);
  }

  #[test]
  fn test_login_response_parses() {
    let body = br#"{
      "error": false,
      "message": "success",
      "loginResult": {"userId": "u1", "name": "Ana", "token": "t1"}
    }"#;

    let parsed: ApiLoginResponse = serde_json::from_slice(body).unwrap();
    let result = parsed.login_result.unwrap();
    assert_eq!(result.token, "t1");
    assert_eq!(result.name, "Ana");
  }

  #[test]
  fn test_envelope_defaults_when_fields_absent() {
    let parsed: ApiEnvelope = serde_json::from_slice(b"{}").unwrap();
    assert!(!parsed.error);
    assert!(parsed.message.is_empty());
  }
}
