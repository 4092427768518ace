//! HTTP adapter for the tracker REST API.
//!
//! Every request carries the bearer token of the current session. Without a
//! session the request is never sent; a 401 answer counts as a lost session.
//! Either way the [`AuthGuard`] clears the query cache and sends the user to
//! sign in.

use rand::Rng;
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::cache::QueryCache;
use crate::config::{Config, RetryConfig};
use crate::error::{ApiError, ApiResult};
use crate::session::{LoginRedirect, SessionProvider};

/// Upper bound for a single backoff delay
const MAX_BACKOFF_MS: u64 = 10_000;

/// Handles lost sessions: one cache wipe and one login redirect per rejected
/// token, however many requests fail with it.
pub struct AuthGuard {
  cache: QueryCache,
  redirect: Arc<dyn LoginRedirect>,
  /// Token whose rejection was already handled (`Some(None)` = no session)
  handled: Mutex<Option<Option<String>>>,
}

impl AuthGuard {
  pub fn new(cache: QueryCache, redirect: Arc<dyn LoginRedirect>) -> Self {
    Self {
      cache,
      redirect,
      handled: Mutex::new(None),
    }
  }

  /// Report that `token` (or the lack of one) was refused.
  ///
  /// Returns `true` if this call wiped the cache and redirected.
  pub fn session_rejected(&self, token: Option<&str>, return_to: Option<&str>) -> bool {
    let mut handled = self
      .handled
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    if handled.as_ref().map(|t| t.as_deref()) == Some(token) {
      return false;
    }
    *handled = Some(token.map(String::from));

    let touched = self.cache.invalidate_all();
    warn!(
      invalidated = touched.len(),
      has_token = token.is_some(),
      "Session rejected, redirecting to login"
    );
    self.redirect.redirect_to_login(return_to);
    true
  }
}

/// Tracker REST client
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
  base_url: Url,
  sessions: Arc<dyn SessionProvider>,
  guard: Arc<AuthGuard>,
  retry: RetryConfig,
}

impl HttpClient {
  pub fn new(
    config: &Config,
    sessions: Arc<dyn SessionProvider>,
    guard: Arc<AuthGuard>,
  ) -> ApiResult<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("kanbo/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self {
      client,
      base_url: base_url(&config.api.url)?,
      sessions,
      guard,
      retry: config.retry.clone(),
    })
  }

  fn url(&self, path: &str) -> ApiResult<Url> {
    Ok(self.base_url.join(path.trim_start_matches('/'))?)
  }

  /// GET with retries on transport errors, 429 and 5xx.
  pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
    let mut attempt = 0;
    loop {
      attempt += 1;
      match self.send(Method::GET, path, None).await {
        Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
          let delay = backoff_delay(self.retry.base_delay_ms, attempt);
          warn!(
            path,
            attempt,
            wait_ms = delay,
            error = %e,
            "Request failed, retrying after backoff"
          );
          tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        result => return result,
      }
    }
  }

  pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
    &self,
    path: &str,
    body: &B,
  ) -> ApiResult<T> {
    let body = serde_json::to_value(body)?;
    self.send(Method::POST, path, Some(&body)).await
  }

  pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
    &self,
    path: &str,
    body: &B,
  ) -> ApiResult<T> {
    let body = serde_json::to_value(body)?;
    self.send(Method::PUT, path, Some(&body)).await
  }

  pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
    &self,
    path: &str,
    body: &B,
  ) -> ApiResult<T> {
    let body = serde_json::to_value(body)?;
    self.send(Method::PATCH, path, Some(&body)).await
  }

  pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
    self.send(Method::DELETE, path, None).await
  }

  /// Send one request. An empty success body decodes as JSON `null`.
  pub async fn send<T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: Option<&Value>,
  ) -> ApiResult<T> {
    let Some(session) = self.sessions.session() else {
      self.guard.session_rejected(None, Some(path));
      return Err(ApiError::NoSession);
    };

    let url = self.url(path)?;
    debug!(%method, %url, "Sending request");

    let mut request = self
      .client
      .request(method.clone(), url)
      .bearer_auth(&session.access_token);
    if let Some(body) = body {
      request = request.json(body);
    }

    let response = request.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;

    if status.is_success() {
      debug!(%method, path, status = status.as_u16(), "Request succeeded");
      if bytes.is_empty() {
        return Ok(serde_json::from_value(Value::Null)?);
      }
      return Ok(serde_json::from_slice(&bytes)?);
    }

    let error_body: Option<Value> = serde_json::from_slice(&bytes).ok();
    warn!(%method, path, status = status.as_u16(), body = ?error_body, "Request failed");
    match status.as_u16() {
      401 => {
        self
          .guard
          .session_rejected(Some(&session.access_token), Some(path));
      }
      403 => warn!(path, "Access forbidden - insufficient permissions"),
      404 => warn!(path, "Resource not found"),
      _ => {}
    }

    Err(ApiError::Status {
      method: method.to_string(),
      path: path.to_string(),
      status: status.as_u16(),
      body: error_body,
    })
  }
}

/// Base URL with a trailing slash so relative paths join below it.
fn base_url(raw: &str) -> ApiResult<Url> {
  let mut raw = raw.trim().to_string();
  if !raw.ends_with('/') {
    raw.push('/');
  }
  Ok(Url::parse(&raw)?)
}

/// Exponential backoff with up to 10% jitter.
fn backoff_delay(base_ms: u64, attempt: u32) -> u64 {
  let exp = base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
  let delay = exp.min(MAX_BACKOFF_MS);
  let jitter = delay / 10;
  delay + rand::thread_rng().gen_range(0..=jitter)
}
