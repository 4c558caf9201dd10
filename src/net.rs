//! Network access for the worker.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::http::{Request, Response};

/// Something that can perform a live fetch.
#[async_trait]
pub trait Fetch: Send + Sync {
  /// Fetch a request from the network.
  ///
  /// Resolves with whatever the server answered, error statuses included.
  /// Only failures to obtain a response at all are errors.
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// `reqwest`-backed network client.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("swcache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(Error::HttpClient)?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Fetch for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let network_err = |source: reqwest::Error| Error::Network {
      url: request.url.to_string(),
      source: Box::new(source),
    };

    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let resp = builder.send().await.map_err(network_err)?;

    let status = resp.status();
    let headers = resp
      .headers()
      .iter()
      .filter_map(|(k, v)| {
        v.to_str()
          .ok()
          .map(|v| (k.as_str().to_string(), v.to_string()))
      })
      .collect();
    let url = resp.url().to_string();
    let body = resp.bytes().await.map_err(network_err)?;

    debug!(method = %request.method, %url, status = status.as_u16(), bytes = body.len(), "network fetch");

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      url,
      body,
    })
  }
}
