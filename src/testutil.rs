//! Loopback HTTP server used by scenario tests (§8 S1-S6) in place of a
//! mocking crate, since none appears in the teacher's dependency tree.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Clone)]
pub enum Body {
    Bytes(Vec<u8>),
    /// Returns `status` for every request until `flips_after` requests to
    /// this path have been served, then returns 200 with `bytes`.
    FlakyThenOk {
        status: u16,
        flips_after: u32,
        bytes: Vec<u8>,
    },
    Status(u16),
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Bytes(s.into_bytes())
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Bytes(b)
    }
}

pub struct LoopbackServer {
    addr: std::net::SocketAddr,
    pub request_count: Arc<Mutex<HashMap<String, u32>>>,
}

impl LoopbackServer {
    pub async fn start<B: Into<Body>>(routes: Vec<(&'static str, B)>) -> Self {
        let routes: HashMap<String, Body> = routes
            .into_iter()
            .map(|(path, body)| (path.to_string(), body.into()))
            .collect();
        Self::start_with_bodies(routes).await
    }

    pub async fn start_with_bodies(routes: HashMap<String, Body>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(routes);
        let request_count: Arc<Mutex<HashMap<String, u32>>> = Arc::new(Mutex::new(HashMap::new()));

        let routes_task = routes.clone();
        let counts_task = request_count.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                let routes = routes_task.clone();
                let counts = counts_task.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = match socket.read(&mut buf).await {
                        Ok(n) if n > 0 => n,
                        _ => return,
                    };
                    let request = String::from_utf8_lossy(&buf[..n]);
                    let path = request
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();

                    let mut count_guard = counts.lock().await;
                    let count = count_guard.entry(path.clone()).or_insert(0);
                    *count += 1;
                    let this_request_number = *count;
                    drop(count_guard);

                    let response = match routes.get(&path) {
                        Some(Body::Bytes(bytes)) => ok_response(bytes),
                        Some(Body::Status(status)) => status_response(*status),
                        Some(Body::FlakyThenOk {
                            status,
                            flips_after,
                            bytes,
                        }) => {
                            if this_request_number <= *flips_after {
                                status_response(*status)
                            } else {
                                ok_response(bytes)
                            }
                        }
                        None => status_response(404),
                    };

                    let _ = socket.write_all(&response).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, request_count }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn request_count_for(&self, path: &str) -> u32 {
        self.request_count
            .lock()
            .await
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

fn ok_response(bytes: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        bytes.len()
    )
    .into_bytes();
    out.extend_from_slice(bytes);
    out
}

fn status_response(status: u16) -> Vec<u8> {
    let reason = match status {
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Error",
    };
    format!("HTTP/1.1 {status} {reason}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").into_bytes()
}
