//! A scripted HTTP/1.1 server for download and resolver tests.
//!
//! Each path maps to a queue of responses. Responses are served in order and
//! the last one repeats, so `[timeout-ish, timeout-ish, ok]` scripts a flaky
//! endpoint that eventually succeeds. Every connection is closed after one
//! response.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One scripted response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    /// Overrides `Content-Length`. `Some(None)` omits the header entirely.
    declared_length: Option<Option<u64>>,
    /// Send the body in pieces of this size with a pause between them.
    throttle: Option<(usize, Duration)>,
}

impl MockResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            declared_length: None,
            throttle: None,
        }
    }

    /// `200 OK` with a binary body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::status(200).content_type("application/vnd.android.package-archive").body(body)
    }

    /// `200 OK` HTML page.
    pub fn html(body: &str) -> Self {
        Self::status(200).content_type("text/html; charset=utf-8").body(body.as_bytes().to_vec())
    }

    /// `200 OK` JSON document.
    pub fn json(body: &serde_json::Value) -> Self {
        Self::status(200).content_type("application/json").body(body.to_string().into_bytes())
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self::status(status).header("Location", location)
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn content_type(self, value: &str) -> Self {
        self.header("Content-Type", value)
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Declare `length` bytes regardless of the real body size.
    #[must_use]
    pub fn declare_length(mut self, length: u64) -> Self {
        self.declared_length = Some(Some(length));
        self
    }

    /// Omit `Content-Length`; the body ends when the connection closes.
    #[must_use]
    pub fn without_length(mut self) -> Self {
        self.declared_length = Some(None);
        self
    }

    #[must_use]
    pub fn throttled(mut self, chunk_size: usize, pause: Duration) -> Self {
        self.throttle = Some((chunk_size.max(1), pause));
        self
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            404 => "Not Found",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    routes: HashMap<String, VecDeque<MockResponse>>,
    hits: HashMap<String, usize>,
    requests: Vec<String>,
}

impl ServerState {
    fn next_response(&mut self, target: &str) -> MockResponse {
        let path = target.split('?').next().unwrap_or(target).to_string();
        self.requests.push(target.to_string());
        *self.hits.entry(path.clone()).or_default() += 1;

        match self.routes.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| MockResponse::status(404)),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| MockResponse::status(404)),
            None => MockResponse::status(404),
        }
    }
}

/// Local HTTP server bound to an ephemeral port. Stops when dropped.
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(ServerState::default()));

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    /// Absolute URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Serve `response` for every request to `path`.
    pub fn route(&self, path: &str, response: MockResponse) {
        self.route_sequence(path, vec![response]);
    }

    /// Serve `responses` in order for `path`; the last one repeats.
    pub fn route_sequence(&self, path: &str, responses: Vec<MockResponse>) {
        if let Ok(mut state) = self.state.lock() {
            state.routes.insert(path.to_string(), responses.into());
        }
    }

    /// Number of requests received for `path`, ignoring the query string.
    pub fn hits(&self, path: &str) -> usize {
        self.state.lock().map(|s| s.hits.get(path).copied().unwrap_or(0)).unwrap_or(0)
    }

    /// Every request target received so far, query strings included.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().map(|s| s.requests.clone()).unwrap_or_default()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<ServerState>>) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&request);
    let target = head.lines().next().and_then(|line| line.split_whitespace().nth(1)).unwrap_or("/").to_string();

    let response = match state.lock() {
        Ok(mut state) => state.next_response(&target),
        Err(_) => MockResponse::status(500),
    };

    let mut out = format!("HTTP/1.1 {} {}\r\n", response.status, response.reason());
    for (name, value) in &response.headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    match response.declared_length {
        Some(Some(length)) => out.push_str(&format!("Content-Length: {length}\r\n")),
        Some(None) => {}
        None => out.push_str(&format!("Content-Length: {}\r\n", response.body.len())),
    }
    out.push_str("Connection: close\r\n\r\n");
    stream.write_all(out.as_bytes()).await?;

    match response.throttle {
        Some((chunk_size, pause)) => {
            for chunk in response.body.chunks(chunk_size) {
                stream.write_all(chunk).await?;
                stream.flush().await?;
                tokio::time::sleep(pause).await;
            }
        }
        None => stream.write_all(&response.body).await?,
    }

    stream.flush().await?;
    stream.shutdown().await
}
