//! Binds widget configurations to their APIs.
//!
//! Both operations share one fetch path: look in the cache, otherwise call
//! the fetcher and store the fresh response. A failed fetch is reported to
//! the caller and never answered from an expired entry.

use crate::cache::ResponseCache;
use crate::error::FetchError;
use crate::fetcher::JsonFetcher;
use crate::schema::infer_fields;
use crate::widget::ApiTestResult;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct WidgetBindingService {
    fetcher: Arc<dyn JsonFetcher>,
    cache: ResponseCache,
}

impl WidgetBindingService {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, cache: ResponseCache) -> Self {
        Self { fetcher, cache }
    }

    /// Try a candidate API and discover its fields. Never fails; errors
    /// come back as an unsuccessful result carrying the classified message.
    pub async fn test_endpoint(&self, url: &str) -> ApiTestResult {
        match self.fetch_cached(&test_key(url), url).await {
            Ok(data) => {
                let fields = infer_fields(&data);
                info!(url = %url, fields = fields.len(), "endpoint_tested");
                ApiTestResult::ok(data, fields)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "endpoint_test_failed");
                ApiTestResult::failed(e.to_string())
            }
        }
    }

    /// Raw response for a configured widget.
    pub async fn fetch_widget_data(&self, url: &str) -> Result<Value, FetchError> {
        self.fetch_cached(&live_key(url), url).await.inspect_err(|e| {
            warn!(url = %url, error = %e, kind = ?e.kind(), "widget_fetch_failed");
        })
    }

    pub fn clear_cache(&self) {
        if self.cache.is_empty() {
            return;
        }
        let entries = self.cache.len();
        self.cache.clear();
        debug!(entries, "cache_cleared");
    }

    async fn fetch_cached(&self, key: &str, url: &str) -> Result<Value, FetchError> {
        if let Some(hit) = self.cache.get(key) {
            debug!(key = %key, "cache_hit");
            return Ok(hit);
        }
        let data = self.fetcher.fetch_json(url).await?;
        self.cache.insert(key, data.clone());
        Ok(data)
    }
}

fn test_key(url: &str) -> String {
    format!("test:{url}")
}

fn live_key(url: &str) -> String {
    format!("live:{url}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::error::FetchErrorKind;
    use crate::fetcher::testing::StaticFetcher;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::time::Duration;

    const URL: &str = "https://api.example.com/quote";

    fn service(fetcher: Arc<StaticFetcher>) -> (WidgetBindingService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()));
        let cache = ResponseCache::with_clock(Duration::from_secs(60), 100, clock.clone());
        (WidgetBindingService::new(fetcher, cache), clock)
    }

    #[tokio::test]
    async fn test_endpoint_success_returns_data_and_fields() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond(URL, Ok(json!({"price": {"current": 101.2}, "symbol": "INFY"})));
        let (svc, _) = service(fetcher.clone());

        let result = svc.test_endpoint(URL).await;
        assert!(result.success);
        assert!(result.error.is_none());
        let fields = result.fields.unwrap();
        let paths: Vec<&str> = fields.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["price.current", "symbol"]);
        assert_eq!(result.data.unwrap()["symbol"], json!("INFY"));
    }

    #[tokio::test]
    async fn test_endpoint_rate_limited_is_reported_not_raised() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond(URL, Err(FetchError::Status { status: 429 }));
        let (svc, _) = service(fetcher);

        let result = svc.test_endpoint(URL).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("rate limit"));
        assert!(result.fields.is_none());
    }

    #[tokio::test]
    async fn test_fetch_widget_data_classifies_errors() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond(URL, Err(FetchError::Status { status: 503 }));
        let (svc, _) = service(fetcher);

        let err = svc.fetch_widget_data(URL).await.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::ServerError);
        assert_eq!(err.to_string(), "API server error. Please try again later.");
    }

    #[tokio::test]
    async fn test_cache_reused_within_ttl_and_refetched_after() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond(URL, Ok(json!({"v": 1})));
        let (svc, clock) = service(fetcher.clone());

        svc.fetch_widget_data(URL).await.unwrap();
        clock.advance(Duration::from_secs(30));
        svc.fetch_widget_data(URL).await.unwrap();
        assert_eq!(fetcher.calls(), 1);

        clock.advance(Duration::from_secs(30));
        fetcher.respond(URL, Ok(json!({"v": 2})));
        let data = svc.fetch_widget_data(URL).await.unwrap();
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(data, json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_test_and_live_entries_are_separate() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond(URL, Ok(json!([1, 2])));
        let (svc, _) = service(fetcher.clone());

        svc.test_endpoint(URL).await;
        svc.fetch_widget_data(URL).await.unwrap();
        assert_eq!(fetcher.calls(), 2);

        let cached = svc.test_endpoint(URL).await;
        assert!(cached.success);
        assert_eq!(cached.fields.unwrap().len(), 1);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_a_fallback() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond(URL, Ok(json!({"v": 1})));
        let (svc, clock) = service(fetcher.clone());

        svc.fetch_widget_data(URL).await.unwrap();
        clock.advance(Duration::from_secs(61));
        fetcher.respond(URL, Err(FetchError::Timeout));
        let err = svc.fetch_widget_data(URL).await.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond(URL, Ok(json!(1)));
        let (svc, _) = service(fetcher.clone());

        svc.fetch_widget_data(URL).await.unwrap();
        assert_eq!(svc.cache.len(), 1);
        svc.clear_cache();
        assert!(svc.cache.is_empty());
        svc.fetch_widget_data(URL).await.unwrap();
        assert_eq!(fetcher.calls(), 2);
    }
}
