use crate::config::{MAX_HTTP_ATTEMPTS, RETRY_BASE_DELAY};
use crate::errors::ImportError;
use std::time::Duration;

/// Request-with-retry against a JSON-response endpoint.
///
/// Transport errors and overload statuses (429, 500, 502, 503, 504) are
/// retried with bounded exponential backoff; any other non-2xx status and
/// JSON decode failures are terminal. The client never logs: callers decide
/// whether a failure is fatal or absorbable.
pub struct RetryClient {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryClient {
    pub fn new() -> Self {
        Self::with_policy(MAX_HTTP_ATTEMPTS, RETRY_BASE_DELAY)
    }

    pub fn with_policy(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay }
    }

    /// Execute a prepared request, re-sending a clone on each attempt.
    /// The builder must carry a buffered body (no streams).
    pub async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, ImportError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if attempt > 1 {
                tokio::time::sleep(self.base_delay * 2u32.pow(attempt - 2)).await;
            }

            let prepared = request.try_clone().ok_or_else(|| {
                ImportError::Transport("request body is not cloneable".to_string())
            })?;

            match send(prepared).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<serde_json::Value, ImportError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ImportError::Status {
            code: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ImportError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const OK: &str = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 11\r\nconnection: close\r\n\r\n{\"ok\":true}";
    const NOT_JSON: &str = "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 8\r\nconnection: close\r\n\r\nnot json";
    const TOO_MANY: &str = "HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const SERVER_ERR: &str = "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

    /// Serve the scripted responses in order, one connection each, counting hits.
    async fn scripted_server(responses: Vec<&'static str>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            for response in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 8192];
                let _ = stream.read(&mut buf).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });

        (url, hits)
    }

    fn fast_client() -> RetryClient {
        RetryClient::with_policy(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn first_attempt_success() {
        let (url, hits) = scripted_server(vec![OK]).await;
        let value = fast_client()
            .execute(reqwest::Client::new().post(&url).body("q"))
            .await
            .unwrap();
        assert_eq!(value["ok"], serde_json::Value::Bool(true));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_server_error() {
        let (url, hits) = scripted_server(vec![SERVER_ERR, OK]).await;
        let value = fast_client()
            .execute(reqwest::Client::new().post(&url).body("q"))
            .await
            .unwrap();
        assert_eq!(value["ok"], serde_json::Value::Bool(true));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_attempts_on_persistent_429() {
        let (url, hits) = scripted_server(vec![TOO_MANY, TOO_MANY, TOO_MANY]).await;
        let err = fast_client()
            .execute(reqwest::Client::new().post(&url).body("q"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Status { code: 429, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let (url, hits) = scripted_server(vec![NOT_FOUND]).await;
        let err = fast_client()
            .execute(reqwest::Client::new().post(&url).body("q"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Status { code: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn decode_failure_is_terminal() {
        let (url, hits) = scripted_server(vec![NOT_JSON]).await;
        let err = fast_client()
            .execute(reqwest::Client::new().post(&url).body("q"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Parse(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
