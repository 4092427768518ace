//! Test helpers: a canned-response HTTP server and fake session plumbing.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::config::{ApiConfig, AuthConfig, CacheConfig, Config, RetryConfig};
use crate::session::{LoginRedirect, Session, SessionProvider};

pub fn test_config(server_url: &str) -> Config {
  Config {
    api: ApiConfig {
      url: format!("{}/api", server_url),
    },
    auth: AuthConfig {
      authority: "https://id.example.com/realms/tracker".into(),
      client_id: "tracker-cli".into(),
      redirect_uri: "http://localhost:5173/".into(),
      post_logout_redirect_uri: None,
    },
    default_project: None,
    cache: CacheConfig::default(),
    retry: RetryConfig {
      max_attempts: 3,
      base_delay_ms: 1,
    },
  }
}

pub struct StaticSession(Option<Session>);

impl StaticSession {
  pub fn token(token: &str) -> Self {
    Self(Some(Session::new(token)))
  }

  pub fn user(token: &str, username: &str) -> Self {
    let mut session = Session::new(token);
    session.username = Some(username.to_string());
    Self(Some(session))
  }

  pub fn none() -> Self {
    Self(None)
  }
}

impl SessionProvider for StaticSession {
  fn session(&self) -> Option<Session> {
    self.0.clone()
  }
}

#[derive(Default)]
pub struct CountingRedirect(AtomicU32);

impl CountingRedirect {
  pub fn count(&self) -> u32 {
    self.0.load(Ordering::SeqCst)
  }
}

impl LoginRedirect for CountingRedirect {
  fn redirect_to_login(&self, _return_to: Option<&str>) {
    self.0.fetch_add(1, Ordering::SeqCst);
  }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
  pub method: String,
  pub path: String,
  pub authorization: Option<String>,
  pub body: Value,
}

struct Route {
  method: String,
  path: String,
  /// The last response repeats once the queue is down to one
  responses: VecDeque<(u16, String)>,
}

#[derive(Default)]
struct ServerState {
  routes: Vec<Route>,
  requests: Vec<RecordedRequest>,
}

/// HTTP/1.1 server answering from per-route response queues.
/// Unknown routes get a 404.
pub struct MockServer {
  addr: std::net::SocketAddr,
  state: Arc<Mutex<ServerState>>,
}

impl MockServer {
  pub async fn start() -> Self {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(Mutex::new(ServerState::default()));

    let accept_state = Arc::clone(&state);
    tokio::spawn(async move {
      while let Ok((socket, _)) = listener.accept().await {
        let state = Arc::clone(&accept_state);
        tokio::spawn(handle(socket, state));
      }
    });

    Self { addr, state }
  }

  pub fn url(&self) -> String {
    format!("http://{}", self.addr)
  }

  /// Queue a JSON response for `method path`.
  pub fn route(self, method: &str, path: &str, status: u16, body: Value) -> Self {
    self.route_raw(method, path, status, &body.to_string())
  }

  pub fn route_raw(self, method: &str, path: &str, status: u16, body: &str) -> Self {
    {
      let mut state = self.state.lock().unwrap();
      let existing = state
        .routes
        .iter()
        .position(|r| r.method == method && r.path == path);
      match existing {
        Some(i) => state.routes[i].responses.push_back((status, body.to_string())),
        None => state.routes.push(Route {
          method: method.to_string(),
          path: path.to_string(),
          responses: VecDeque::from([(status, body.to_string())]),
        }),
      }
    }
    self
  }

  pub fn requests(&self) -> Vec<RecordedRequest> {
    self.state.lock().unwrap().requests.clone()
  }

  pub fn requests_to(&self, method: &str, path: &str) -> usize {
    self
      .requests()
      .iter()
      .filter(|r| r.method == method && r.path == path)
      .count()
  }
}

async fn handle(mut socket: TcpStream, state: Arc<Mutex<ServerState>>) {
  let mut buf = Vec::new();
  let mut chunk = [0u8; 4096];
  let (head_end, content_length) = loop {
    let n = match socket.read(&mut chunk).await {
      Ok(0) | Err(_) => return,
      Ok(n) => n,
    };
    buf.extend_from_slice(&chunk[..n]);
    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
      let head = String::from_utf8_lossy(&buf[..pos]).to_string();
      break (pos + 4, header(&head, "content-length").and_then(|v| v.parse().ok()).unwrap_or(0));
    }
  };
  while buf.len() < head_end + content_length {
    match socket.read(&mut chunk).await {
      Ok(0) | Err(_) => break,
      Ok(n) => buf.extend_from_slice(&chunk[..n]),
    }
  }

  let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
  let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
  let method = request_line.next().unwrap_or_default().to_string();
  let path = request_line.next().unwrap_or_default().to_string();
  let body_bytes = &buf[head_end..];
  let body = serde_json::from_slice(body_bytes).unwrap_or(Value::Null);

  let (status, response_body) = {
    let mut state = state.lock().unwrap();
    state.requests.push(RecordedRequest {
      method: method.clone(),
      path: path.clone(),
      authorization: header(&head, "authorization"),
      body,
    });
    match state
      .routes
      .iter_mut()
      .find(|r| r.method == method && r.path == path)
    {
      Some(route) if route.responses.len() > 1 => route.responses.pop_front().unwrap(),
      Some(route) => route.responses[0].clone(),
      None => (404, r#"{"message":"no such route"}"#.to_string()),
    }
  };

  let response = if status == 204 {
    "HTTP/1.1 204 No Content\r\nconnection: close\r\n\r\n".to_string()
  } else {
    format!(
      "HTTP/1.1 {} Mock\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
      status,
      response_body.len(),
      response_body
    )
  };
  let _ = socket.write_all(response.as_bytes()).await;
  let _ = socket.shutdown().await;
}

fn header(head: &str, name: &str) -> Option<String> {
  head.lines().skip(1).find_map(|line| {
    let (key, value) = line.split_once(':')?;
    key
      .trim()
      .eq_ignore_ascii_case(name)
      .then(|| value.trim().to_string())
  })
}
