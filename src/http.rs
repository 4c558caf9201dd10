//! Request and response descriptors passed between the dispatcher, the cache
//! store and the network client.

use bytes::Bytes;
use reqwest::Method;
use url::Url;

use crate::error::{Error, Result};

/// An intercepted request.
///
/// Headers travel with the request to the network but take no part in cache
/// matching; only the method and URL do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Vec::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// Build a GET request from a locator, resolving relative paths against
  /// `origin`.
  pub fn resolve(origin: &Url, locator: &str) -> Result<Self> {
    let url = origin.join(locator).map_err(|source| Error::InvalidUrl {
      locator: locator.to_string(),
      source,
    })?;
    Ok(Self::get(url))
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// URL used for matching: the fragment never reaches the server, so it is
  /// dropped.
  pub fn match_url(&self) -> String {
    let mut url = self.url.clone();
    url.set_fragment(None);
    url.to_string()
  }

  pub fn is_http(&self) -> bool {
    matches!(self.url.scheme(), "http" | "https")
  }
}

/// A response, either stored in a cache or fresh from the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  /// Final URL after redirects.
  pub url: String,
  pub body: Bytes,
}

impl Response {
  /// True for 2xx statuses.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}
