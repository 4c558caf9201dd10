//! Scripted network stub for worker tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::net::Fetch;

enum Reply {
  Status(u16, Bytes),
  Fail,
}

/// Answers from a fixed script and counts calls per URL.
///
/// URLs with no scripted reply fail like an unreachable host.
#[derive(Default)]
pub struct StubFetcher {
  replies: HashMap<String, Reply>,
  delay: Option<Duration>,
  calls: Mutex<HashMap<String, usize>>,
}

impl StubFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn reply(mut self, url: &str, status: u16, body: &str) -> Self {
    self.replies.insert(
      url.to_string(),
      Reply::Status(status, Bytes::copy_from_slice(body.as_bytes())),
    );
    self
  }

  pub fn fail(mut self, url: &str) -> Self {
    self.replies.insert(url.to_string(), Reply::Fail);
    self
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn calls(&self, url: &str) -> usize {
    self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
  }

  pub fn total_calls(&self) -> usize {
    self.calls.lock().unwrap().values().sum()
  }
}

#[async_trait]
impl Fetch for StubFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let url = request.url.to_string();
    *self.calls.lock().unwrap().entry(url.clone()).or_default() += 1;

    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    match self.replies.get(&url) {
      Some(Reply::Status(status, body)) => Ok(Response {
        status: *status,
        status_text: String::new(),
        headers: Vec::new(),
        url,
        body: body.clone(),
      }),
      Some(Reply::Fail) | None => Err(Error::Network {
        url,
        source: Box::new(std::io::Error::new(
          std::io::ErrorKind::ConnectionRefused,
          "unreachable",
        )),
      }),
    }
  }
}

pub fn request(url: &str) -> Request {
  Request::get(Url::parse(url).unwrap())
}

pub fn ok_response(url: &str, body: &str) -> Response {
  Response {
    status: 200,
    status_text: "OK".into(),
    headers: Vec::new(),
    url: url.to_string(),
    body: Bytes::copy_from_slice(body.as_bytes()),
  }
}
