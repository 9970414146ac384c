/// HTTP reachability probe for a resolved application URL
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub url: String,
    pub status: u16,
    /// 2xx or 3xx
    pub reachable: bool,
    pub elapsed_ms: u64,
}

/// Issue a single GET against `url` and report the status code.
///
/// Redirects are not followed so a TLS redirect still counts as reachable.
pub async fn probe_endpoint(url: &str, timeout: Duration) -> Result<ProbeOutcome, Error> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| Error::Transport(format!("failed to build HTTP client: {}", e)))?;

    let started = Instant::now();
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Error::Timeout(format!("GET {} (no answer within {} ms)", url, timeout.as_millis()))
        } else if e.is_builder() {
            Error::InvalidSpec(format!("invalid URL {:?}: {}", url, e))
        } else {
            Error::Transport(format!("GET {}: {}", url, e))
        }
    })?;

    let status = response.status();
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    debug!("GET {} -> {} in {} ms", url, status, elapsed_ms);

    Ok(ProbeOutcome {
        url: url.to_string(),
        status: status.as_u16(),
        reachable: status.is_success() || status.is_redirection(),
        elapsed_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer one request with `status_line` and close.
    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status_line
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_probe_reports_success() {
        let url = serve_once("200 OK").await;

        let outcome = probe_endpoint(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome.status, 200);
        assert!(outcome.reachable);
    }

    #[tokio::test]
    async fn test_probe_reports_server_errors_as_unreachable() {
        let url = serve_once("503 Service Unavailable").await;

        let outcome = probe_endpoint(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome.status, 503);
        assert!(!outcome.reachable);
    }

    #[tokio::test]
    async fn test_probe_of_closed_port_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = probe_endpoint(&format!("http://{}/", addr), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
