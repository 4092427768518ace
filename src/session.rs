//! Signed-in session: where the bearer token lives and what happens when
//! there is none.
//!
//! The token itself is issued by the OpenID Connect provider configured in
//! `auth`; this module only stores it and sends the user back to the
//! provider when it stops working.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{AuthConfig, Config};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub access_token: String,
  /// Absent when the provider did not say
  pub expires_at: Option<DateTime<Utc>>,
  /// Username of the signed-in user, used for client-side permission checks
  pub username: Option<String>,
}

impl Session {
  pub fn new(access_token: impl Into<String>) -> Self {
    Self {
      access_token: access_token.into(),
      expires_at: None,
      username: None,
    }
  }

  pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
    !self.access_token.is_empty() && self.expires_at.map_or(true, |exp| exp > now)
  }
}

/// Source of the current session for outgoing requests.
pub trait SessionProvider: Send + Sync {
  /// The current session, if one exists and has not expired.
  fn session(&self) -> Option<Session>;
}

/// Side effect run when the user has to sign in again.
pub trait LoginRedirect: Send + Sync {
  fn redirect_to_login(&self, return_to: Option<&str>);
}

/// Session persisted as JSON in the data directory.
pub struct SessionStore {
  path: PathBuf,
  env_token: Option<String>,
}

impl SessionStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      env_token: None,
    }
  }

  /// Store for the identity provider in `auth`, under the default data dir.
  ///
  /// Each authority/client pair gets its own file so switching providers
  /// never reuses a foreign token. `KANBO_TOKEN` takes precedence over the
  /// file.
  pub fn for_config(auth: &AuthConfig) -> Result<Self> {
    let path = Config::data_dir()?.join(session_file_name(auth));
    Ok(Self {
      env_token: Config::env_token(),
      ..Self::new(path)
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn load(&self) -> Option<Session> {
    let contents = match std::fs::read_to_string(&self.path) {
      Ok(c) => c,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "Failed to read session file");
        return None;
      }
    };
    match serde_json::from_str(&contents) {
      Ok(session) => Some(session),
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "Ignoring malformed session file");
        None
      }
    }
  }

  pub fn save(&self, session: &Session) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
    }
    let data = serde_json::to_string_pretty(session)?;
    std::fs::write(&self.path, data)
      .map_err(|e| eyre!("Failed to write session file {}: {}", self.path.display(), e))?;
    info!(path = %self.path.display(), "Session stored");
    Ok(())
  }

  /// Remove the stored session. Succeeds if there was none.
  pub fn clear(&self) -> Result<()> {
    match std::fs::remove_file(&self.path) {
      Ok(()) => {
        debug!(path = %self.path.display(), "Session removed");
        Ok(())
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!("Failed to remove session file {}: {}", self.path.display(), e)),
    }
  }
}

impl SessionProvider for SessionStore {
  fn session(&self) -> Option<Session> {
    if let Some(token) = &self.env_token {
      return Some(Session::new(token.clone()));
    }
    self.load().filter(|s| s.is_valid_at(Utc::now()))
  }
}

/// File name for the session of one identity provider registration.
fn session_file_name(auth: &AuthConfig) -> String {
  let mut hasher = Sha256::new();
  hasher.update(auth.authority.trim_end_matches('/').as_bytes());
  hasher.update(b"\n");
  hasher.update(auth.client_id.as_bytes());
  let digest = hex::encode(hasher.finalize());
  format!("session-{}.json", &digest[..16])
}

/// Authorization endpoint of the identity provider, ready to open in a browser.
pub fn sign_in_url(auth: &AuthConfig) -> std::result::Result<Url, url::ParseError> {
  let base = format!(
    "{}/protocol/openid-connect/auth",
    auth.authority.trim_end_matches('/')
  );
  Url::parse_with_params(
    &base,
    &[
      ("client_id", auth.client_id.as_str()),
      ("redirect_uri", auth.redirect_uri.as_str()),
      ("response_type", "code"),
      ("scope", "openid"),
    ],
  )
}

/// Sign-out endpoint of the identity provider.
pub fn sign_out_url(auth: &AuthConfig) -> std::result::Result<Url, url::ParseError> {
  let base = format!(
    "{}/protocol/openid-connect/logout",
    auth.authority.trim_end_matches('/')
  );
  let mut params = vec![("client_id", auth.client_id.as_str())];
  if let Some(uri) = &auth.post_logout_redirect_uri {
    params.push(("post_logout_redirect_uri", uri.as_str()));
  }
  Url::parse_with_params(&base, &params)
}

/// Terminal flavour of the login redirect: forget the stored token and tell
/// the user where to get a new one.
pub struct SignInPrompt {
  store: SessionStore,
  sign_in_url: Url,
}

impl SignInPrompt {
  pub fn new(auth: &AuthConfig) -> Result<Self> {
    let sign_in_url = sign_in_url(auth).map_err(|e| eyre!("Invalid auth.authority: {}", e))?;
    Ok(Self {
      store: SessionStore::for_config(auth)?,
      sign_in_url,
    })
  }
}

impl LoginRedirect for SignInPrompt {
  fn redirect_to_login(&self, return_to: Option<&str>) {
    if let Err(e) = self.store.clear() {
      warn!(error = %e, "Failed to clear stale session");
    }
    eprintln!("Your session is missing or has expired.");
    eprintln!("Sign in at: {}", self.sign_in_url);
    eprintln!("then run `kanbo login --token <ACCESS_TOKEN>`.");
    if let Some(path) = return_to {
      eprintln!("The request to {} was not completed.", path);
    }
  }
}
