//! Fake backend lifecycle
//!
//! Each test gets its own server on a random port; dropping the handle
//! shuts it down.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpListener;

use nursery_e2e::{ApiClient, E2eConfig};

use super::backend::{router, Backend, Shared};

pub struct FakeNursery {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,
    state: Shared,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl FakeNursery {
    /// Spawns a server with the seeded accounts and no data
    pub async fn spawn() -> Self {
        Self::spawn_with(Backend::default()).await
    }

    pub async fn spawn_with(backend: Backend) -> Self {
        let state: Shared = Arc::new(Mutex::new(backend));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Suite configuration pointing at this server
    pub fn config(&self) -> E2eConfig {
        E2eConfig {
            base_url: self.base_url.clone(),
            request_timeout_ms: 5_000,
            ..Default::default()
        }
    }

    pub fn api(&self) -> ApiClient {
        ApiClient::new(self.base_url.clone(), Duration::from_secs(5))
            .expect("Failed to build client")
    }

    /// Direct access to the backend state
    pub fn backend(&self) -> MutexGuard<'_, Backend> {
        self.state.lock().unwrap()
    }

    pub fn login_count(&self) -> usize {
        self.count_requests("POST /api/auth/login")
    }

    /// Requests whose `METHOD /path` starts with `prefix`
    pub fn count_requests(&self, prefix: &str) -> usize {
        self.backend()
            .requests()
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    pub fn requests(&self) -> Vec<String> {
        self.backend().requests().to_vec()
    }
}
