use color_eyre::{eyre::eyre, Result};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use url::Url;

use crate::auth::SharedAuth;
use crate::cache::StoredResponse;
use crate::config::Config;

use super::api_types::{ApiEnvelope, ApiListStoriesResponse, ApiLoginResponse, ApiStory};
use super::types::{LoginSession, NewStory, Story};
use super::{ApiError, StoryApi};
use crate::auth::UserProfile;
use crate::push::Subscription;

/// Story API client.
///
/// Talks directly to the network; every failure is normalized into
/// [`ApiError`] at this boundary. The token travels with the shared auth
/// handle, never through ambient storage.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: String,
  auth: SharedAuth,
}

impl ApiClient {
  pub fn new(config: &Config, auth: SharedAuth) -> Result<Self> {
    let base_url = config.api.base_url.trim_end_matches('/').to_string();
    Url::parse(&base_url).map_err(|e| eyre!("Invalid API base URL {}: {}", base_url, e))?;

    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      auth,
    })
  }

  fn endpoint(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path)
  }

  /// The story list endpoint, page one with locations included.
  pub(crate) fn stories_url(&self) -> String {
    format!("{}/stories?location=1&size=20&page=1", self.base_url)
  }

  /// Resolve a path against the API origin (scheme + host, no version
  /// segment). Used for app-shell precaching.
  pub fn origin_url(&self, path: &str) -> String {
    match Url::parse(&self.base_url) {
      Ok(url) => format!("{}{}", url.origin().ascii_serialization(), path),
      Err(_) => path.to_string(),
    }
  }

  fn token(&self) -> Option<String> {
    self
      .auth
      .read()
      .ok()
      .and_then(|auth| auth.token.clone())
  }

  /// Issue a GET and snapshot the response. The transport error here is the
  /// uniform one; HTTP error statuses come back as snapshots.
  pub(crate) async fn get_raw(&self, url: &str) -> Result<StoredResponse, ApiError> {
    let mut request = self.http.get(url);
    if let Some(token) = self.token() {
      request = request.bearer_auth(token);
    }
    Self::snapshot(request).await
  }

  async fn post_json<T: Serialize + ?Sized>(
    &self,
    path: &str,
    body: &T,
    with_auth: bool,
  ) -> Result<StoredResponse, ApiError> {
    let mut request = self.http.post(self.endpoint(path)).json(body);
    if with_auth {
      if let Some(token) = self.token() {
        request = request.bearer_auth(token);
      }
    }
    Self::snapshot(request).await
  }

  async fn snapshot(request: reqwest::RequestBuilder) -> Result<StoredResponse, ApiError> {
    let response = request.send().await.map_err(ApiError::transport)?;
    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = response
      .bytes()
      .await
      .map_err(ApiError::transport)?
      .to_vec();

    Ok(StoredResponse::new(status, content_type, body))
  }

  /// Interpret a story-list snapshot.
  ///
  /// The server reports an empty collection as an error-flagged payload
  /// with a "Stories not found" message; that is a success with no items,
  /// not a failure.
  pub(crate) fn parse_story_list(response: &StoredResponse) -> Result<Vec<Story>, ApiError> {
    if !response.is_success() {
      return Err(Self::server_error(response));
    }

    let parsed: ApiListStoriesResponse = serde_json::from_slice(&response.body)
      .map_err(|e| ApiError::Server(format!("Malformed server response: {e}")))?;

    if parsed.error {
      if parsed.message == "Stories not found" {
        return Ok(Vec::new());
      }
      return Err(ApiError::Server(or_default(
        parsed.message,
        "Failed to load stories",
      )));
    }

    Ok(parsed.list_story.into_iter().map(ApiStory::into_story).collect())
  }

  /// Extract the server's message from a non-success snapshot.
  fn server_error(response: &StoredResponse) -> ApiError {
    let message = serde_json::from_slice::<ApiEnvelope>(&response.body)
      .ok()
      .map(|env| env.message)
      .filter(|m| !m.is_empty())
      .unwrap_or_else(|| format!("HTTP error, status {}", response.status));
    ApiError::Server(message)
  }

  /// Check a snapshot for success and an unset error flag.
  fn expect_ok(response: &StoredResponse, fallback: &str) -> Result<(), ApiError> {
    if !response.is_success() {
      return Err(Self::server_error(response));
    }
    let envelope: ApiEnvelope = serde_json::from_slice(&response.body)
      .map_err(|e| ApiError::Server(format!("Malformed server response: {e}")))?;
    if envelope.error {
      return Err(ApiError::Server(or_default(envelope.message, fallback)));
    }
    Ok(())
  }
}

fn or_default(message: String, fallback: &str) -> String {
  if message.is_empty() {
    fallback.to_string()
  } else {
    message
  }
}

impl StoryApi for ApiClient {
  async fn login(&self, email: &str, password: &str) -> Result<LoginSession, ApiError> {
    let body = serde_json::json!({ "email": email, "password": password });
    let response = self.post_json("login", &body, false).await?;

    if !response.is_success() {
      return Err(Self::server_error(&response));
    }
    let parsed: ApiLoginResponse = serde_json::from_slice(&response.body)
      .map_err(|e| ApiError::Server(format!("Malformed server response: {e}")))?;
    if parsed.error {
      return Err(ApiError::Server(or_default(parsed.message, "Login failed")));
    }

    let result = parsed
      .login_result
      .ok_or_else(|| ApiError::Server("Login response is missing the login result".to_string()))?;

    Ok(LoginSession {
      token: result.token,
      user: UserProfile {
        user_id: result.user_id,
        name: result.name,
      },
    })
  }

  async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError> {
    let body = serde_json::json!({ "name": name, "email": email, "password": password });
    let response = self.post_json("register", &body, false).await?;
    Self::expect_ok(&response, "Registration failed")
  }

  async fn list_stories(&self) -> Result<Vec<Story>, ApiError> {
    let response = self.get_raw(&self.stories_url()).await?;
    Self::parse_story_list(&response)
  }

  async fn create_story(&self, story: &NewStory) -> Result<(), ApiError> {
    let photo = reqwest::multipart::Part::bytes(story.photo.bytes.clone())
      .file_name(story.photo.file_name.clone())
      .mime_str(&story.photo.mime_type)
      .map_err(|e| ApiError::Server(format!("Invalid photo content type: {e}")))?;

    let mut form = reqwest::multipart::Form::new()
      .text("description", story.description.clone())
      .part("photo", photo);
    if let Some(location) = &story.location {
      form = form
        .text("lat", location.lat.to_string())
        .text("lon", location.lon.to_string());
    }

    let mut request = self.http.post(self.endpoint("stories")).multipart(form);
    if let Some(token) = self.token() {
      request = request.bearer_auth(token);
    }

    let response = Self::snapshot(request).await?;
    Self::expect_ok(&response, "Failed to share the story")
  }

  async fn subscribe(&self, subscription: &Subscription) -> Result<(), ApiError> {
    let response = self
      .post_json("notifications/subscribe", subscription, true)
      .await?;
    Self::expect_ok(&response, "Failed to subscribe to notifications")
  }

  async fn unsubscribe(&self, endpoint: &str) -> Result<(), ApiError> {
    let body = serde_json::json!({ "endpoint": endpoint });
    let mut request = self
      .http
      .delete(self.endpoint("notifications/subscribe"))
      .json(&body);
    if let Some(token) = self.token() {
      request = request.bearer_auth(token);
    }

    let response = Self::snapshot(request).await?;
    Self::expect_ok(&response, "Failed to unsubscribe from notifications")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::auth::AuthContext;

  fn client() -> ApiClient {
    let config = Config::default();
    ApiClient::new(&config, crate::auth::shared(AuthContext::default())).unwrap()
  }

  fn snapshot(status: u16, body: &str) -> StoredResponse {
    StoredResponse::new(status, Some("application/json".to_string()), body.into())
  }

  #[test]
  fn test_parse_story_list_success() {
    let body = r#"{"error":false,"message":"ok","listStory":[
      {"id":"s1","name":"Ana","description":"d","photoUrl":"p","createdAt":"2024-01-05T08:30:00.000Z"}
    ]}"#;
    let stories = ApiClient::parse_story_list(&snapshot(200, body)).unwrap();
    assert_eq!(stories.len(), 1);
    assert_eq!(stories[0].id, "s1");
  }

  #[test]
  fn test_empty_collection_flag_is_success() {
    let body = r#"{"error":true,"message":"Stories not found"}"#;
    let stories = ApiClient::parse_story_list(&snapshot(200, body)).unwrap();
    assert!(stories.is_empty());
  }

  #[test]
  fn test_other_error_flag_is_server_error() {
    let body = r#"{"error":true,"message":"token expired"}"#;
    let err = ApiClient::parse_story_list(&snapshot(200, body)).unwrap_err();
    assert!(matches!(err, ApiError::Server(message) if message == "token expired"));
  }

  #[test]
  fn test_http_error_surfaces_server_message() {
    let body = r#"{"error":true,"message":"Missing authentication"}"#;
    let err = ApiClient::parse_story_list(&snapshot(401, body)).unwrap_err();
    assert!(matches!(err, ApiError::Server(message) if message == "Missing authentication"));
  }

  #[test]
  fn test_http_error_without_payload_gets_generic_message() {
    let err = ApiClient::parse_story_list(&snapshot(502, "upstream died")).unwrap_err();
    assert!(matches!(err, ApiError::Server(message) if message.contains("502")));
  }

  #[test]
  fn test_origin_url_strips_version_segment() {
    let client = client();
    assert_eq!(
      client.origin_url("/index.html"),
      "https://story-api.dicoding.dev/index.html"
    );
  }

  #[test]
  fn test_stories_url_keeps_query() {
    let client = client();
    assert!(client.stories_url().ends_with("/stories?location=1&size=20&page=1"));
  }
}
