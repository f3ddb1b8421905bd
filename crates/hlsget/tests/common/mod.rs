#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use bytes::Bytes;
use hlsget_engine::hls::DownloadEvent;
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

#[derive(Clone)]
struct Route {
    status: StatusCode,
    body: Bytes,
    delay: Duration,
}

/// In-process HTTP server with per-path bodies, status codes and delays.
///
/// Every request is counted, 404s included, so tests can assert what was fetched.
#[derive(Clone, Default)]
pub struct Fixture {
    routes: Arc<Mutex<HashMap<String, Route>>>,
    hits: Arc<Mutex<HashMap<String, u64>>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, path: &str, route: Route) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.trim_start_matches('/').to_string(), route);
    }

    pub fn serve(&self, path: &str, body: impl Into<Bytes>) {
        self.serve_slow(path, body, Duration::ZERO);
    }

    pub fn serve_slow(&self, path: &str, body: impl Into<Bytes>, delay: Duration) {
        self.insert(
            path,
            Route {
                status: StatusCode::OK,
                body: body.into(),
                delay,
            },
        );
    }

    pub fn serve_status(&self, path: &str, status: StatusCode) {
        self.insert(
            path,
            Route {
                status,
                body: Bytes::new(),
                delay: Duration::ZERO,
            },
        );
    }

    pub fn hits(&self, path: &str) -> u64 {
        self.hits
            .lock()
            .unwrap()
            .get(path.trim_start_matches('/'))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_hits(&self) -> u64 {
        self.hits.lock().unwrap().values().sum()
    }

    /// Bind on an ephemeral port and return the base URL, ending with `/`
    pub async fn start(&self) -> Url {
        let app = Router::new()
            .route("/{*path}", get(handle))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind fixture server");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Url::parse(&format!("http://{addr}/")).unwrap()
    }
}

async fn handle(State(fixture): State<Fixture>, Path(path): Path<String>) -> impl IntoResponse {
    let key = path.trim_start_matches('/').to_string();
    *fixture.hits.lock().unwrap().entry(key.clone()).or_insert(0) += 1;

    let route = fixture.routes.lock().unwrap().get(&key).cloned();
    match route {
        None => (StatusCode::NOT_FOUND, Bytes::new()),
        Some(route) => {
            if !route.delay.is_zero() {
                tokio::time::sleep(route.delay).await;
            }
            (route.status, route.body)
        }
    }
}

/// Collect events up to and including the first terminal one
pub async fn until_terminal(rx: &mut UnboundedReceiver<DownloadEvent>) -> Vec<DownloadEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(15), rx.recv())
            .await
            .expect("timed out waiting for a terminal event")
            .expect("event channel closed");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

pub fn media_playlist(segments: &[&str], key_line: Option<&str>) -> String {
    let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:0\n");
    if let Some(key_line) = key_line {
        text.push_str(key_line);
        text.push('\n');
    }
    for segment in segments {
        text.push_str("#EXTINF:4.0,\n");
        text.push_str(segment);
        text.push('\n');
    }
    text.push_str("#EXT-X-ENDLIST\n");
    text
}
