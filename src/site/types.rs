use bytes::Bytes;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Header map with lowercase names.
pub type Headers = BTreeMap<String, String>;

/// An outbound request as seen by the offline worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Headers,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Headers::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// Add a header. Names are stored lowercase.
  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self
      .headers
      .insert(name.to_ascii_lowercase(), value.to_string());
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(&name.to_ascii_lowercase())
      .map(String::as_str)
  }

  /// Whether the request asks for an HTML document.
  ///
  /// A request without an `Accept` header is not an HTML request.
  pub fn accepts_html(&self) -> bool {
    self
      .header("accept")
      .map(|accept| accept.contains("text/html"))
      .unwrap_or(false)
  }

  /// Identity of this request in the cache store.
  pub fn key(&self) -> RequestKey {
    RequestKey {
      method: self.method.clone(),
      url: self.url.clone(),
    }
  }
}

/// Request identity used as the cache key: method + absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: Method,
  pub url: Url,
}

impl RequestKey {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
    }
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// Where a response came from, in Fetch Standard terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
  /// Same-origin response
  Basic,
  /// Cross-origin response with readable body
  Cors,
  /// Cross-origin response without a readable body
  Opaque,
  /// Network error placeholder
  Error,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseType::Basic => "basic",
      ResponseType::Cors => "cors",
      ResponseType::Opaque => "opaque",
      ResponseType::Error => "error",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "basic" => Ok(ResponseType::Basic),
      "cors" => Ok(ResponseType::Cors),
      "opaque" => Ok(ResponseType::Opaque),
      "error" => Ok(ResponseType::Error),
      other => Err(eyre!("Unknown response type: {}", other)),
    }
  }
}

/// A captured HTTP response.
///
/// The body is a `Bytes` handle. Storing a response and returning it to the
/// caller needs an explicit `clone()` first; the clone shares the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub url: String,
  pub status: u16,
  pub status_text: String,
  pub response_type: ResponseType,
  pub redirected: bool,
  pub headers: Headers,
  pub body: Bytes,
}

impl Response {
  /// Build a same-origin response with the given status and body.
  pub fn basic(url: &str, status: u16, body: impl Into<Bytes>) -> Self {
    Self {
      url: url.to_string(),
      status,
      status_text: reason_phrase(status).to_string(),
      response_type: ResponseType::Basic,
      redirected: false,
      headers: Headers::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self
      .headers
      .insert(name.to_ascii_lowercase(), value.to_string());
    self
  }

  pub fn with_type(mut self, response_type: ResponseType) -> Self {
    self.response_type = response_type;
    self
  }

  /// Status in the 200-299 range.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Only plain same-origin 200 responses are stored.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.response_type == ResponseType::Basic && !self.redirected
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

fn reason_phrase(status: u16) -> &'static str {
  reqwest::StatusCode::from_u16(status)
    .ok()
    .and_then(|s| s.canonical_reason())
    .unwrap_or("")
}

/// A post card as listed by the blog's posts feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCard {
  #[serde(deserialize_with = "id_from_string_or_number")]
  pub id: String,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default, alias = "excerpt")]
  pub text: Option<String>,
  /// Page of the post, relative to the site origin
  #[serde(default)]
  pub url: Option<String>,
}

impl PostCard {
  /// Path of the post's detail page.
  pub fn path(&self) -> String {
    match &self.url {
      Some(url) => url.clone(),
      None => format!("/post/{}/", self.id),
    }
  }
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
  D: serde::Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Id {
    Text(String),
    Number(u64),
  }

  Ok(match Id::deserialize(deserializer)? {
    Id::Text(s) => s,
    Id::Number(n) => n.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_accepts_html() {
    let req = Request::get(url("http://blog.local/")).with_header(
      "Accept",
      "text/html,application/xhtml+xml,application/xml;q=0.9",
    );
    assert!(req.accepts_html());
  }

  #[test]
  fn test_missing_accept_is_not_html() {
    let req = Request::get(url("http://blog.local/static/js/index.js"));
    assert!(!req.accepts_html());
  }

  #[test]
  fn test_cacheable_requires_basic_200() {
    let ok = Response::basic("http://blog.local/", 200, "hi");
    assert!(ok.is_cacheable());

    let not_found = Response::basic("http://blog.local/x", 404, "");
    assert!(!not_found.is_cacheable());

    let cors = Response::basic("http://cdn.local/x", 200, "").with_type(ResponseType::Cors);
    assert!(!cors.is_cacheable());

    let mut redirected = Response::basic("http://blog.local/login/", 200, "");
    redirected.redirected = true;
    assert!(!redirected.is_cacheable());
  }

  #[test]
  fn test_request_key_display() {
    let key = Request::get(url("http://blog.local/offline/")).key();
    assert_eq!(key.to_string(), "GET http://blog.local/offline/");
  }

  #[test]
  fn test_post_card_accepts_excerpt_alias() {
    let card: PostCard =
      serde_json::from_str(r#"{"id":"7","title":"Intro to X","excerpt":"body"}"#).unwrap();
    assert_eq!(card.text.as_deref(), Some("body"));
  }

  #[test]
  fn test_post_card_numeric_id_and_path() {
    let card: PostCard = serde_json::from_str(r#"{"id":12,"title":"Y Basics"}"#).unwrap();
    assert_eq!(card.id, "12");
    assert_eq!(card.path(), "/post/12/");

    let card: PostCard =
      serde_json::from_str(r#"{"id":"3","url":"/post/intro-to-x/"}"#).unwrap();
    assert_eq!(card.path(), "/post/intro-to-x/");
  }
}
