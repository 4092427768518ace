//! Error types surfaced by the tracker client.

use serde_json::Value;
use thiserror::Error;

use crate::validate::ValidationError;

/// Result alias for tracker operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Failure of a tracker request.
#[derive(Debug, Error)]
pub enum ApiError {
  /// No valid session when the request was about to be sent
  #[error("Not signed in. Run `kanbo login` first.")]
  NoSession,

  /// The backend answered with a non-success status
  #[error("{method} {path} failed with status {status}{}", detail_suffix(.body))]
  Status {
    method: String,
    path: String,
    status: u16,
    body: Option<Value>,
  },

  #[error("Network error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("Failed to decode response: {0}")]
  Decode(#[from] serde_json::Error),

  #[error("Invalid URL: {0}")]
  Url(#[from] url::ParseError),

  #[error(transparent)]
  Validation(#[from] ValidationError),

  /// A client-side permission check refused the action
  #[error("Not allowed: {0}")]
  Forbidden(String),
}

/// Coarse classification used by the command layer to pick a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Authentication,
  Authorization,
  NotFound,
  Validation,
  Transport,
  Server,
}

impl ApiError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::NoSession => ErrorKind::Authentication,
      Self::Status { status, .. } => match status {
        401 => ErrorKind::Authentication,
        403 => ErrorKind::Authorization,
        404 => ErrorKind::NotFound,
        400 | 409 | 422 => ErrorKind::Validation,
        _ => ErrorKind::Server,
      },
      Self::Transport(_) | Self::Decode(_) | Self::Url(_) => ErrorKind::Transport,
      Self::Validation(_) => ErrorKind::Validation,
      Self::Forbidden(_) => ErrorKind::Authorization,
    }
  }

  /// Whether an idempotent request may be retried after this error.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Transport(e) => !e.is_builder() && !e.is_decode(),
      Self::Status { status, .. } => *status == 429 || *status >= 500,
      _ => false,
    }
  }

  /// Whether the request never produced an answer from the backend.
  pub fn is_offline(&self) -> bool {
    matches!(self, Self::Transport(e) if e.is_connect() || e.is_timeout())
  }
}

/// Pull a human readable message out of an error body, if one is there.
fn detail_suffix(body: &Option<Value>) -> String {
  let Some(body) = body else {
    return String::new();
  };
  let message = body
    .get("message")
    .or_else(|| body.get("error"))
    .or_else(|| body.get("detail"))
    .and_then(Value::as_str);
  match message {
    Some(m) => format!(": {}", m),
    None => String::new(),
  }
}
