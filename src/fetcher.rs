//! Outbound HTTP for widget APIs.

use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Host;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can turn a URL into a JSON document.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError>;
}

/// reqwest-backed fetcher that only talks to HTTPS endpoints, or to
/// loopback hosts over any scheme for local development.
pub struct ProxyFetcher {
    client: reqwest::Client,
}

impl ProxyFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("findash/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

/// Parse `url` and apply the scheme allow-list.
pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url.trim()).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    let loopback = match parsed.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    };
    if parsed.scheme() != "https" && !loopback {
        return Err(FetchError::InsecureScheme);
    }
    Ok(parsed)
}

#[async_trait]
impl JsonFetcher for ProxyFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        let url = validate_url(url)?;
        debug!(url = %url, "widget_request");

        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted fetcher for tests. Unknown URLs answer 404.
    #[derive(Default)]
    pub struct StaticFetcher {
        responses: Mutex<HashMap<String, Result<Value, FetchError>>>,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, url: &str, response: Result<Value, FetchError>) {
            let mut guard = self.responses.lock().unwrap();
            guard.insert(url.to_string(), response);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JsonFetcher for StaticFetcher {
        async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let guard = self.responses.lock().unwrap();
            guard
                .get(url)
                .cloned()
                .unwrap_or(Err(FetchError::Status { status: 404 }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_allows_https() {
        assert!(validate_url("https://api.example.com/quote?s=INFY").is_ok());
    }

    #[test]
    fn test_validate_url_allows_loopback_http() {
        assert!(validate_url("http://localhost:3000/data").is_ok());
        assert!(validate_url("http://127.0.0.1:8080/data").is_ok());
        assert!(validate_url("http://127.0.0.2/data").is_ok());
        assert!(validate_url("http://[::1]:8080/data").is_ok());
    }

    #[test]
    fn test_validate_url_rejects() {
        assert_eq!(
            validate_url("http://api.example.com"),
            Err(FetchError::InsecureScheme)
        );
        assert!(matches!(validate_url("not a url"), Err(FetchError::InvalidUrl(_))));
        assert_eq!(validate_url("ftp://example.com"), Err(FetchError::InsecureScheme));
        assert_eq!(
            validate_url("http://127.0.0.1.attacker.example/steal"),
            Err(FetchError::InsecureScheme)
        );
        assert_eq!(
            validate_url("http://localhost.attacker.example"),
            Err(FetchError::InsecureScheme)
        );
    }

    #[tokio::test]
    async fn test_proxy_fetcher_rejects_before_network() {
        let fetcher = ProxyFetcher::new(DEFAULT_TIMEOUT).unwrap();
        let err = fetcher.fetch_json("http://example.com").await.unwrap_err();
        assert_eq!(err, FetchError::InsecureScheme);
    }
}
