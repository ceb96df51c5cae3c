//! Rate limit configuration — per-category fixed-window policies

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rate limit category a request is counted against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitCategory {
    /// Generic API traffic
    ApiCalls,
    /// Order placement on the trading engine
    TradingOrders,
    /// Market data reads
    MarketData,
}

impl RateLimitCategory {
    /// All categories, in a stable order
    pub const ALL: [RateLimitCategory; 3] = [
        RateLimitCategory::ApiCalls,
        RateLimitCategory::TradingOrders,
        RateLimitCategory::MarketData,
    ];

    /// Configuration / counter key name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiCalls => "api_calls",
            Self::TradingOrders => "trading_orders",
            Self::MarketData => "market_data",
        }
    }

    /// Default policy when the configuration does not override it
    pub fn default_policy(&self) -> RateLimitPolicy {
        match self {
            Self::ApiCalls => RateLimitPolicy::new(1000, 3600),
            Self::TradingOrders => RateLimitPolicy::new(100, 60),
            Self::MarketData => RateLimitPolicy::new(500, 60),
        }
    }
}

impl std::fmt::Display for RateLimitCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RateLimitCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "api_calls" => Ok(Self::ApiCalls),
            "trading_orders" => Ok(Self::TradingOrders),
            "market_data" => Ok(Self::MarketData),
            other => Err(format!("unknown rate limit category: {}", other)),
        }
    }
}

/// Fixed-window limit for one category
///
/// # Example
///
/// ```hcl
/// rate_limits "trading_orders" {
///   limit       = 100
///   window_secs = 60
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Requests allowed per window
    pub limit: u64,
    /// Window length in seconds
    pub window_secs: u64,
}

impl RateLimitPolicy {
    pub fn new(limit: u64, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }
}

/// Path prefixes used to classify requests into categories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Prefixes counted as `trading_orders`
    #[serde(default = "default_trading_order_prefixes")]
    pub trading_order_prefixes: Vec<String>,

    /// Prefixes counted as `market_data`
    #[serde(default = "default_market_data_prefixes")]
    pub market_data_prefixes: Vec<String>,
}

fn default_trading_order_prefixes() -> Vec<String> {
    vec!["/api/trading/orders".to_string()]
}

fn default_market_data_prefixes() -> Vec<String> {
    vec![
        "/api/market-data".to_string(),
        "/api/trading/market".to_string(),
    ]
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            trading_order_prefixes: default_trading_order_prefixes(),
            market_data_prefixes: default_market_data_prefixes(),
        }
    }
}

/// Resolve the effective policy for every category from the configured overrides
pub fn resolve_policies(
    overrides: &HashMap<String, RateLimitPolicy>,
) -> HashMap<RateLimitCategory, RateLimitPolicy> {
    RateLimitCategory::ALL
        .iter()
        .map(|category| {
            let policy = overrides
                .get(category.as_str())
                .copied()
                .unwrap_or_else(|| category.default_policy());
            (*category, policy)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip_names() {
        for category in RateLimitCategory::ALL {
            let parsed: RateLimitCategory = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert!("orders".parse::<RateLimitCategory>().is_err());
    }

    #[test]
    fn test_resolve_policies_defaults() {
        let policies = resolve_policies(&HashMap::new());
        assert_eq!(policies.len(), 3);
        assert_eq!(
            policies[&RateLimitCategory::TradingOrders],
            RateLimitPolicy::new(100, 60)
        );
    }

    #[test]
    fn test_resolve_policies_override() {
        let mut overrides = HashMap::new();
        overrides.insert("market_data".to_string(), RateLimitPolicy::new(5, 10));
        let policies = resolve_policies(&overrides);
        assert_eq!(
            policies[&RateLimitCategory::MarketData],
            RateLimitPolicy::new(5, 10)
        );
        assert_eq!(
            policies[&RateLimitCategory::ApiCalls],
            RateLimitCategory::ApiCalls.default_policy()
        );
    }

    #[test]
    fn test_classifier_defaults() {
        let c = ClassifierConfig::default();
        assert_eq!(c.trading_order_prefixes, vec!["/api/trading/orders"]);
        assert_eq!(c.market_data_prefixes.len(), 2);
    }
}
