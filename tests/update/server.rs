//! Minimal HTTP/1.1 fixture serving listing pages and archive bodies
//!
//! Every response closes the connection. Routes can be changed while the
//! server runs, so a test can publish a new release between two updates.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What the fixture answers for a path
#[derive(Debug, Clone)]
pub enum Route {
    /// 200 with the full body
    Body { body: Vec<u8>, content_type: &'static str },
    /// 200 announcing `declared` bytes, then closing after `body`
    Truncated { body: Vec<u8>, declared: usize },
    /// Bare status code
    Status(u16),
}

#[derive(Default)]
struct State {
    routes: HashMap<String, Route>,
    hits: HashMap<String, usize>,
}

/// In-process HTTP server bound to an ephemeral loopback port
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State::default()));

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(serve(stream, accept_state.clone()));
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Absolute URL of `path` on this server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn set_route(&self, path: &str, route: Route) {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(path.to_string(), route);
    }

    /// Publish an Apache-style directory listing linking `filenames`
    pub fn set_listing(&self, path: &str, filenames: &[&str]) {
        let mut html = String::from("<html><head><title>Index</title></head><body><pre>\n");
        html.push_str("<a href=\"../\">../</a>\n");
        for name in filenames {
            html.push_str(&format!("<a href=\"{0}\">{0}</a>  2024-01-01 00:00  1.0G\n", name));
        }
        html.push_str("</pre></body></html>\n");
        self.set_route(
            path,
            Route::Body {
                body: html.into_bytes(),
                content_type: "text/html",
            },
        );
    }

    pub fn set_file(&self, path: &str, body: Vec<u8>) {
        self.set_route(
            path,
            Route::Body {
                body,
                content_type: "application/octet-stream",
            },
        );
    }

    /// Number of requests received for `path`
    pub fn hits(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .hits
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<State>>) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                request.extend_from_slice(&buf[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }

    let request = String::from_utf8_lossy(&request);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .split('?')
        .next()
        .unwrap_or("/")
        .to_string();

    let route = {
        let mut state = state.lock().unwrap();
        *state.hits.entry(path.clone()).or_insert(0) += 1;
        state.routes.get(&path).cloned()
    };

    let (head, body) = match route {
        Some(Route::Body { body, content_type }) => (
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                content_type,
                body.len()
            ),
            body,
        ),
        Some(Route::Truncated { body, declared }) => (
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                declared
            ),
            body,
        ),
        Some(Route::Status(code)) => (
            format!(
                "HTTP/1.1 {} Fixture\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                code
            ),
            Vec::new(),
        ),
        None => (
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
            Vec::new(),
        ),
    };

    if stream.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    let _ = stream.write_all(&body).await;
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
}
