//! HTTP access to the booking portal.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::extract::extract;
use super::gate::RefreshGate;
use super::types::ProgressRecord;

/// Status and body of a portal response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
  pub status: u16,
  pub body: String,
}

/// Why a fetch produced no answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  /// The portal answered with something other than 200
  #[error("portal answered with HTTP {0}")]
  Status(u16),
  /// DNS, TLS, connection or body read failure
  #[error("portal request failed: {0}")]
  Transport(String),
}

/// Network boundary, injected so the pipeline can be tested offline.
#[async_trait]
pub trait Transport: Send + Sync {
  /// GET `url`. Only transport failures are errors; any status is a response.
  async fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// reqwest-backed transport sending the portal session cookie.
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new(session_cookie: Option<&str>) -> Result<Self> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = session_cookie {
      let value =
        HeaderValue::from_str(cookie).map_err(|e| eyre!("Invalid portal session cookie: {}", e))?;
      headers.insert(COOKIE, value);
    }

    let client = reqwest::Client::builder()
      .user_agent(concat!("portal-progress/", env!("CARGO_PKG_VERSION")))
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| FetchError::Transport(e.to_string()))?;
    let status = response.status().as_u16();
    let body = response
      .text()
      .await
      .map_err(|e| FetchError::Transport(e.to_string()))?;
    Ok(HttpResponse { status, body })
  }
}

/// Issues portal requests and hands 200 bodies to the extractor.
#[derive(Clone)]
pub struct Fetcher {
  transport: Arc<dyn Transport>,
  gate: Arc<RefreshGate>,
}

impl Fetcher {
  pub fn new(transport: Arc<dyn Transport>, gate: Arc<RefreshGate>) -> Self {
    Self { transport, gate }
  }

  /// Fetch and extract progress for one ticket.
  ///
  /// A 200 advances the global refresh clock before extraction, so a page
  /// without data still counts as checked.
  pub async fn fetch(&self, url: &str, issue: &str) -> Result<Option<ProgressRecord>, FetchError> {
    let response = self.transport.get(url).await?;
    debug!(issue, status = response.status, "portal response");

    if response.status != 200 {
      warn!(issue, status = response.status, "portal answered with non-200");
      return Err(FetchError::Status(response.status));
    }
    self.gate.mark_refreshed();

    let record = extract(&response.body);
    match &record {
      Some(record) => debug!(issue, ?record, "progress data received"),
      None => info!(
        issue,
        "no progress data in portal page (login page or no bookings)"
      ),
    }
    Ok(record)
  }
}

#[cfg(test)]
pub mod testing {
  use super::*;
  use std::sync::Mutex;

  type Responder = dyn Fn(&str) -> Result<HttpResponse, FetchError> + Send + Sync;

  /// Transport answering from a closure and recording every requested URL.
  pub struct FakeTransport {
    responder: Box<Responder>,
    calls: Mutex<Vec<String>>,
  }

  impl FakeTransport {
    pub fn new(
      responder: impl Fn(&str) -> Result<HttpResponse, FetchError> + Send + Sync + 'static,
    ) -> Self {
      Self {
        responder: Box::new(responder),
        calls: Mutex::new(Vec::new()),
      }
    }

    /// Always answer with `status` and `body`.
    pub fn always(status: u16, body: &str) -> Self {
      let body = body.to_string();
      Self::new(move |_| {
        Ok(HttpResponse {
          status,
          body: body.clone(),
        })
      })
    }

    pub fn calls(&self) -> Vec<String> {
      self.calls.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl Transport for FakeTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
      self.calls.lock().unwrap().push(url.to_string());
      (self.responder)(url)
    }
  }
}
