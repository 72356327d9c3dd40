#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::http::{HeaderMap, Method, Uri};
use axum::Router;

use eventhorizon_client::{Client, ClientConfig};

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock server");
    });
    format!("http://{addr}")
}

pub fn client(base_url: &str) -> Client {
    Client::new(ClientConfig::new(base_url).with_token("test-token")).expect("client")
}

/// One request as the mock server saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: String,
    pub at: Instant,
}

impl Seen {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is json")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Seen>>>);

impl Recorder {
    /// Records the request and returns how many were seen so far, this one included.
    pub fn record(&self, method: Method, uri: &Uri, headers: HeaderMap, body: String) -> usize {
        let mut seen = self.0.lock().expect("recorder lock");
        seen.push(Seen {
            method,
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            headers,
            body,
            at: Instant::now(),
        });
        seen.len()
    }

    pub fn all(&self) -> Vec<Seen> {
        self.0.lock().expect("recorder lock").clone()
    }
}
