//! HTTP probe implementation.

use chrono::Utc;
use std::time::{Duration, Instant};

use super::ProbeError;
use crate::db::Outcome;
use crate::targets::Target;

/// Issues probes through one shared client with a global timeout.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("upwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Config(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Probe a target. Never fails: errors become a `DOWN` outcome.
    pub async fn probe(&self, target: &Target) -> Outcome {
        match self.request(&target.url).await {
            Ok((code, latency)) => Outcome::response(code, latency, Utc::now()),
            Err(e) => Outcome::failure(e.to_string(), Utc::now()),
        }
    }

    /// Returns the status code and the time until it was received.
    async fn request(&self, url: &str) -> Result<(u16, Duration), ProbeError> {
        let start = Instant::now();

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.timeout)
            } else if e.is_builder() {
                ProbeError::Config(e.to_string())
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

        Ok((response.status().as_u16(), start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Status;
    use tokio::net::TcpListener;

    fn target(url: &str) -> Target {
        Target::new("test", url)
    }

    async fn probe_status(code: usize) -> Outcome {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(code)
            .create_async()
            .await;

        let prober = HttpProber::new(Duration::from_secs(5)).unwrap();
        prober.probe(&target(&format!("{}/health", server.url()))).await
    }

    #[tokio::test]
    async fn test_ok_is_up() {
        let outcome = probe_status(200).await;
        assert_eq!(outcome.status, Status::Up);
        assert_eq!(outcome.http_code, Some(200));
        assert!(outcome.latency.is_some());
        assert!(outcome.detail.starts_with("HTTP 200 in "));
    }

    #[tokio::test]
    async fn test_not_found_is_up() {
        let outcome = probe_status(404).await;
        assert_eq!(outcome.status, Status::Up);
        assert_eq!(outcome.http_code, Some(404));
    }

    #[tokio::test]
    async fn test_server_error_is_down() {
        let outcome = probe_status(503).await;
        assert_eq!(outcome.status, Status::Down);
        assert_eq!(outcome.http_code, Some(503));
        assert!(outcome.latency.is_some());
    }

    #[tokio::test]
    async fn test_timeout_is_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer.
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let prober = HttpProber::new(Duration::from_millis(200)).unwrap();
        let outcome = prober.probe(&target(&format!("http://{}/", addr))).await;
        silent.abort();

        assert_eq!(outcome.status, Status::Down);
        assert!(outcome.http_code.is_none());
        assert!(outcome.latency.is_none());
        assert!(outcome.detail.starts_with("timeout"), "{}", outcome.detail);
    }

    #[tokio::test]
    async fn test_connection_refused_is_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let prober = HttpProber::new(Duration::from_secs(2)).unwrap();
        let outcome = prober.probe(&target(&format!("http://{}/", addr))).await;

        assert_eq!(outcome.status, Status::Down);
        assert!(outcome.http_code.is_none());
        assert!(!outcome.detail.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_url_is_down() {
        let prober = HttpProber::new(Duration::from_secs(1)).unwrap();
        let outcome = prober.probe(&target("http://")).await;
        assert_eq!(outcome.status, Status::Down);
        assert!(outcome.latency.is_none());
    }
}
