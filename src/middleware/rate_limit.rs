//! Rate limiting middleware — fixed-window counters per category and client
//!
//! Counters live in the counter store under `{prefix}:{category}:{client}` and
//! expire with their window. A request is denied, without touching the counter,
//! once the stored value has reached the limit. Store failures fail open.

use super::{json_response, Middleware, RequestContext};
use crate::config::{ClassifierConfig, RateLimitCategory, RateLimitPolicy};
use crate::error::Result;
use crate::store::{CounterStore, WindowCount};
use async_trait::async_trait;
use http::{HeaderValue, Response, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Deny {
        limit: u64,
        window: u64,
        retry_after: u64,
    },
}

/// Fixed-window rate limiter
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    policies: HashMap<RateLimitCategory, RateLimitPolicy>,
    classifier: ClassifierConfig,
    key_prefix: String,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        policies: HashMap<RateLimitCategory, RateLimitPolicy>,
        classifier: ClassifierConfig,
        key_prefix: &str,
    ) -> Self {
        Self {
            store,
            policies,
            classifier,
            key_prefix: key_prefix.to_string(),
        }
    }

    /// Category a path is counted against (first match wins)
    pub fn classify(&self, path: &str) -> RateLimitCategory {
        let matches = |prefixes: &[String]| prefixes.iter().any(|p| path.starts_with(p.as_str()));

        if matches(&self.classifier.trading_order_prefixes) {
            RateLimitCategory::TradingOrders
        } else if matches(&self.classifier.market_data_prefixes) {
            RateLimitCategory::MarketData
        } else {
            RateLimitCategory::ApiCalls
        }
    }

    /// Effective policy of a category
    pub fn policy(&self, category: RateLimitCategory) -> RateLimitPolicy {
        self.policies
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_policy())
    }

    /// Counter key of a client in a category
    pub fn counter_key(&self, category: RateLimitCategory, client: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, category, client)
    }

    /// Count one request of `client` against `category`
    pub async fn check(&self, category: RateLimitCategory, client: &str) -> RateDecision {
        let policy = self.policy(category);
        let key = self.counter_key(category, client);

        match self
            .store
            .increment_within(&key, policy.limit, Duration::from_secs(policy.window_secs))
            .await
        {
            Ok(WindowCount::Counted(_)) => RateDecision::Allow,
            Ok(WindowCount::Exceeded(current)) => {
                tracing::debug!(
                    category = %category,
                    client = client,
                    current = current,
                    limit = policy.limit,
                    "Rate limit exceeded"
                );
                RateDecision::Deny {
                    limit: policy.limit,
                    window: policy.window_secs,
                    retry_after: policy.window_secs,
                }
            }
            Err(e) => {
                // Fail open: allow request if the store is unreachable
                tracing::warn!(
                    error = %e,
                    store = self.store.name(),
                    category = %category,
                    "Rate limit store unavailable, failing open"
                );
                RateDecision::Allow
            }
        }
    }
}

/// Rate limit stage of the pipeline
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

/// 429 response carrying the policy and a retry hint
fn too_many_requests(limit: u64, window: u64, retry_after: u64) -> Response<Vec<u8>> {
    let mut resp = json_response(
        StatusCode::TOO_MANY_REQUESTS,
        &serde_json::json!({
            "error": "Rate limit exceeded",
            "limit": limit,
            "window": window,
            "retry_after": retry_after,
        }),
    );
    resp.headers_mut()
        .insert(http::header::RETRY_AFTER, HeaderValue::from(retry_after));
    resp
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle_request(
        &self,
        req: &mut http::request::Parts,
        ctx: &mut RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>> {
        let category = self.limiter.classify(req.uri.path());

        match self.limiter.check(category, &ctx.client_ip).await {
            RateDecision::Allow => {
                ctx.category = Some(category);
                Ok(None)
            }
            RateDecision::Deny {
                limit,
                window,
                retry_after,
            } => Ok(Some(too_many_requests(limit, window, retry_after))),
        }
    }

    fn name(&self) -> &str {
        "rate-limit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve_policies;
    use crate::middleware::tests::{make_ctx, make_parts};
    use crate::store::{MemoryStore, RedisStore};

    fn limiter_with(store: Arc<dyn CounterStore>, overrides: &[(&str, u64, u64)]) -> RateLimiter {
        let overrides: HashMap<String, RateLimitPolicy> = overrides
            .iter()
            .map(|(name, limit, window)| (name.to_string(), RateLimitPolicy::new(*limit, *window)))
            .collect();
        RateLimiter::new(
            store,
            resolve_policies(&overrides),
            ClassifierConfig::default(),
            "lb",
        )
    }

    #[test]
    fn test_classify() {
        let limiter = limiter_with(Arc::new(MemoryStore::new()), &[]);
        assert_eq!(
            limiter.classify("/api/trading/orders"),
            RateLimitCategory::TradingOrders
        );
        assert_eq!(
            limiter.classify("/api/trading/orders/42/cancel"),
            RateLimitCategory::TradingOrders
        );
        assert_eq!(
            limiter.classify("/api/market-data/BTC-USD"),
            RateLimitCategory::MarketData
        );
        assert_eq!(
            limiter.classify("/api/trading/market/ticker"),
            RateLimitCategory::MarketData
        );
        assert_eq!(limiter.classify("/api/users"), RateLimitCategory::ApiCalls);
        assert_eq!(limiter.classify("/"), RateLimitCategory::ApiCalls);
        assert_eq!(
            limiter.classify("/api/trading/positions"),
            RateLimitCategory::ApiCalls
        );
    }

    #[test]
    fn test_counter_key() {
        let limiter = limiter_with(Arc::new(MemoryStore::new()), &[]);
        assert_eq!(
            limiter.counter_key(RateLimitCategory::TradingOrders, "1.2.3.4"),
            "lb:trading_orders:1.2.3.4"
        );
    }

    #[tokio::test]
    async fn test_fixed_window_allows_limit_then_denies() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter_with(store.clone(), &[("trading_orders", 3, 60)]);

        for _ in 0..3 {
            assert_eq!(
                limiter.check(RateLimitCategory::TradingOrders, "c1").await,
                RateDecision::Allow
            );
        }
        for _ in 0..3 {
            assert_eq!(
                limiter.check(RateLimitCategory::TradingOrders, "c1").await,
                RateDecision::Deny {
                    limit: 3,
                    window: 60,
                    retry_after: 60
                }
            );
        }
        // Denied requests are not counted
        assert_eq!(store.counter("lb:trading_orders:c1"), Some(3));
    }

    #[tokio::test]
    async fn test_clients_and_categories_independent() {
        let limiter = limiter_with(
            Arc::new(MemoryStore::new()),
            &[("trading_orders", 1, 60), ("market_data", 1, 60)],
        );
        assert_eq!(
            limiter.check(RateLimitCategory::TradingOrders, "c1").await,
            RateDecision::Allow
        );
        assert_eq!(
            limiter.check(RateLimitCategory::TradingOrders, "c2").await,
            RateDecision::Allow
        );
        assert_eq!(
            limiter.check(RateLimitCategory::MarketData, "c1").await,
            RateDecision::Allow
        );
        assert!(matches!(
            limiter.check(RateLimitCategory::TradingOrders, "c1").await,
            RateDecision::Deny { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let limiter = limiter_with(Arc::new(MemoryStore::new()), &[("market_data", 2, 10)]);
        limiter.check(RateLimitCategory::MarketData, "c").await;
        limiter.check(RateLimitCategory::MarketData, "c").await;
        assert!(matches!(
            limiter.check(RateLimitCategory::MarketData, "c").await,
            RateDecision::Deny { .. }
        ));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(
            limiter.check(RateLimitCategory::MarketData, "c").await,
            RateDecision::Allow
        );
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let store = Arc::new(RedisStore::new("redis://127.0.0.1:1").unwrap());
        let limiter = limiter_with(store, &[("api_calls", 1, 60)]);
        for _ in 0..3 {
            assert_eq!(
                limiter.check(RateLimitCategory::ApiCalls, "c").await,
                RateDecision::Allow
            );
        }
    }

    #[tokio::test]
    async fn test_middleware_denial_shape() {
        let limiter = Arc::new(limiter_with(
            Arc::new(MemoryStore::new()),
            &[("trading_orders", 1, 30)],
        ));
        let mw = RateLimitMiddleware::new(limiter);

        let mut parts = make_parts("POST", "/api/trading/orders");
        let mut ctx = make_ctx(&parts);
        assert!(mw.handle_request(&mut parts, &mut ctx).await.unwrap().is_none());
        assert_eq!(ctx.category, Some(RateLimitCategory::TradingOrders));

        let mut ctx = make_ctx(&parts);
        let resp = mw
            .handle_request(&mut parts, &mut ctx)
            .await
            .unwrap()
            .expect("second request is limited");
        assert!(ctx.category.is_none());
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()["retry-after"], "30");

        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["error"], "Rate limit exceeded");
        assert_eq!(body["limit"], 1);
        assert_eq!(body["window"], 30);
        assert_eq!(body["retry_after"], 30);
    }

    /// Same peer, a different `X-Forwarded-For` on every request
    async fn allowed_with_rotating_forwarded_for(trust_forwarded_for: bool) -> usize {
        let limiter = Arc::new(limiter_with(
            Arc::new(MemoryStore::new()),
            &[("trading_orders", 1, 60)],
        ));
        let mw = RateLimitMiddleware::new(limiter);
        let peer = "10.1.2.3:5555".parse().unwrap();

        let mut allowed = 0;
        for i in 0..20 {
            let mut parts = make_parts("POST", "/api/trading/orders");
            parts
                .headers
                .insert("x-forwarded-for", format!("198.51.100.{}", i).parse().unwrap());
            let mut ctx = RequestContext::new(&parts, peer, trust_forwarded_for);
            if mw.handle_request(&mut parts, &mut ctx).await.unwrap().is_none() {
                allowed += 1;
            }
        }
        allowed
    }

    #[tokio::test]
    async fn test_forwarded_for_cannot_bypass_limit() {
        assert_eq!(allowed_with_rotating_forwarded_for(false).await, 1);
    }

    #[tokio::test]
    async fn test_trusted_forwarded_for_keys_by_client() {
        assert_eq!(allowed_with_rotating_forwarded_for(true).await, 20);
    }

    #[test]
    fn test_name() {
        let limiter = Arc::new(limiter_with(Arc::new(MemoryStore::new()), &[]));
        assert_eq!(RateLimitMiddleware::new(limiter).name(), "rate-limit");
    }
}
