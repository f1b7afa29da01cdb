//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use failover_proxy::config::{AppProxyConfig, AppType, ProviderConfig, ProxyConfig};
use failover_proxy::control::DetachedRewriter;
use failover_proxy::ControlPlane;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What a mock backend does with a request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Plain response with a JSON content type.
    Status(u16, String),
    /// `text/event-stream` body written chunk by chunk, `gap` apart.
    Sse { chunks: Vec<String>, gap: Duration },
    /// Read the request, then never answer.
    Hang,
}

pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    /// Raw head and body of every request received so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Read one HTTP/1.1 request with a `Content-Length` body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

async fn write_reply(socket: &mut TcpStream, reply: Reply) {
    match reply {
        Reply::Status(status, body) => {
            let response = format!(
                "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
        Reply::Sse { chunks, gap } => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for (i, chunk) in chunks.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(gap).await;
                }
                if socket.write_all(chunk.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
            }
        }
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(120)).await;
        }
    }
    let _ = socket.shutdown().await;
}

/// Start a mock backend on an ephemeral port. `f` receives the 0-based hit
/// number and decides the reply.
pub async fn start_backend<F>(f: F) -> MockBackend
where
    F: Fn(u32) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let (task_hits, task_requests) = (hits.clone(), requests.clone());
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            let hits = task_hits.clone();
            let requests = task_requests.clone();
            tokio::spawn(async move {
                let raw = read_request(&mut socket).await;
                let hit = hits.fetch_add(1, Ordering::SeqCst);
                requests.lock().unwrap().push(raw);
                write_reply(&mut socket, f(hit)).await;
            });
        }
    });

    MockBackend {
        addr,
        hits,
        requests,
    }
}

/// Backend that always gives the same reply.
pub async fn fixed_backend(reply: Reply) -> MockBackend {
    start_backend(move |_| reply.clone()).await
}

pub fn provider(id: &str, app_type: AppType, backend: &MockBackend) -> ProviderConfig {
    ProviderConfig {
        id: id.to_string(),
        app_type,
        name: None,
        base_url: backend.url().parse().unwrap(),
        api_key: None,
        headers: Default::default(),
    }
}

/// Config with the proxy on an ephemeral port and failover for Claude
/// through `providers` in order.
pub fn failover_config(providers: Vec<ProviderConfig>, app: AppProxyConfig) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.listen_port = 0;
    config.admin.enabled = false;
    config.failover.insert(
        "claude".into(),
        providers
            .iter()
            .filter(|p| p.app_type == AppType::Claude)
            .map(|p| p.id.clone())
            .collect(),
    );
    config.apps.insert("claude".into(), app);
    config.providers = providers;
    config
}

pub fn auto_failover() -> AppProxyConfig {
    AppProxyConfig {
        auto_failover_enabled: true,
        ..Default::default()
    }
}

/// Build the control plane and start the proxy. Returns the proxy base URL.
pub async fn start_proxy(config: &ProxyConfig) -> (Arc<ControlPlane>, String) {
    let control = Arc::new(ControlPlane::from_config(config, Arc::new(DetachedRewriter)).unwrap());
    let info = control.start_proxy_server().await.unwrap();
    let url = format!("http://{}:{}", info.address, info.port);
    (control, url)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
