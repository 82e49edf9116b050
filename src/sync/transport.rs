use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

/// Body the server sends when a request could not be served.
pub const FAIL_SENTINEL: &str = "FAIL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    /// Connection failure, timeout, or unreadable body.
    Transport(String),
    /// Non-200 response.
    Status(u16),
    /// The server answered with the failure sentinel.
    Sentinel,
    BadUrl(String),
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::Transport(msg) => write!(f, "transport error: {}", msg),
            PollError::Status(code) => write!(f, "server returned status {}", code),
            PollError::Sentinel => write!(f, "server reported failure"),
            PollError::BadUrl(msg) => write!(f, "bad url: {}", msg),
        }
    }
}

impl std::error::Error for PollError {}

/// Reject the failure sentinel; pass every other body through. The server
/// appends the sentinel after whatever it already wrote when it fails
/// mid-response, so a trailing sentinel voids the whole body.
pub fn check_body(body: String) -> Result<String, PollError> {
    if body.trim_end().ends_with(FAIL_SENTINEL) {
        Err(PollError::Sentinel)
    } else {
        Ok(body)
    }
}

/// "Send GET, get text back."
#[async_trait]
pub trait Transport {
    /// GET `{base}/{path}?{query}`. The query is sent as-is (the server's
    /// endpoints take positional `a&b` queries, not `key=value` pairs).
    async fn get(&self, path: &str, query: Option<&str>) -> Result<String, PollError>;
}

pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(base: &str, timeout_ms: u64) -> Result<Self, PollError> {
        // A base without a trailing slash would drop its last segment on join.
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{}/", base)
        };
        let base = Url::parse(&base).map_err(|e| PollError::BadUrl(e.to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| PollError::Transport(e.to_string()))?;
        Ok(Self { client, base })
    }

    pub fn url(&self, path: &str, query: Option<&str>) -> Result<Url, PollError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| PollError::BadUrl(e.to_string()))?;
        url.set_query(query);
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, query: Option<&str>) -> Result<String, PollError> {
        let url = self.url(path, query)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;
        if resp.status() != StatusCode::OK {
            return Err(PollError::Status(resp.status().as_u16()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;
        check_body(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_rejected() {
        assert_eq!(check_body("FAIL".to_string()), Err(PollError::Sentinel));
        assert_eq!(check_body("FAIL\r\n".to_string()), Err(PollError::Sentinel));
        assert_eq!(check_body("OK".to_string()), Ok("OK".to_string()));
        assert_eq!(check_body(String::new()), Ok(String::new()));
    }

    #[test]
    fn trailing_sentinel_voids_partial_body() {
        assert_eq!(
            check_body("time:1700000000000|var:g:tile|FAIL".to_string()),
            Err(PollError::Sentinel)
        );
        assert_eq!(
            check_body("time:1700000000000|app:gemmFAIL\r\n".to_string()),
            Err(PollError::Sentinel)
        );
        assert!(check_body("var:g:tile|coord:1,1,tile:8,0.5".to_string()).is_ok());
    }

    #[test]
    fn url_keeps_positional_query() {
        let t = HttpTransport::new("http://localhost:1977/harmony", 1000).unwrap();
        let url = t.url("session-data", Some("gemm&12")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:1977/harmony/session-data?gemm&12");
        let url = t.url("session-list", None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:1977/harmony/session-list");
    }

    #[test]
    fn bad_base_is_reported() {
        assert!(matches!(
            HttpTransport::new("not a url", 1000),
            Err(PollError::BadUrl(_))
        ));
    }
}
