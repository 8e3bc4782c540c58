use std::sync::Arc;

use axum::Router;

use crate::config::AppConfig;
use crate::http::HttpClient;
use crate::store::MemoryStore;

/// Serves `app` on an ephemeral local port and returns its base url.
pub async fn spawn_backend(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub backend");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub backend");
    });
    format!("http://{addr}")
}

/// A base url nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind unused port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

pub fn http_for(base_url: &str) -> (HttpClient, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let http = HttpClient::new(&AppConfig::default().with_api_url(base_url), store.clone())
        .expect("http client");
    (http, store)
}
