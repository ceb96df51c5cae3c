//! Router — ordered prefix table mapping an inbound path to a service
//!
//! First match wins:
//! - `/api/trading/...` → trading service, rewritten to `/api/...`
//! - `/api/...` → default service, unchanged
//! - anything else → default service, unchanged

use crate::config::RoutingConfig;

/// A resolved route — the result of matching a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// Route name that matched
    pub router_name: &'static str,
    /// Target service name
    pub service_name: String,
    /// Path sent to the backend
    pub backend_path: String,
}

/// One entry of the table
struct Route {
    name: &'static str,
    prefix: &'static str,
    service: String,
    /// Replacement for `prefix` in the backend path
    rewrite: Option<&'static str>,
}

/// Router table — the fixed classification table
pub struct RouterTable {
    routes: Vec<Route>,
    fallback: String,
}

impl RouterTable {
    /// Build the router table from configuration
    pub fn from_config(config: &RoutingConfig) -> Self {
        let routes = vec![
            Route {
                name: "trading",
                prefix: "/api/trading/",
                service: config.trading_service.clone(),
                rewrite: Some("/api/"),
            },
            Route {
                name: "api",
                prefix: "/api/",
                service: config.default_service.clone(),
                rewrite: None,
            },
        ];

        Self {
            routes,
            fallback: config.default_service.clone(),
        }
    }

    /// Match a request path; every path resolves to some service
    pub fn match_path(&self, path: &str) -> ResolvedRoute {
        for route in &self.routes {
            if let Some(rest) = path.strip_prefix(route.prefix) {
                let backend_path = match route.rewrite {
                    Some(replacement) => format!("{}{}", replacement, rest),
                    None => path.to_string(),
                };
                return ResolvedRoute {
                    router_name: route.name,
                    service_name: route.service.clone(),
                    backend_path,
                };
            }
        }

        ResolvedRoute {
            router_name: "default",
            service_name: self.fallback.clone(),
            backend_path: path.to_string(),
        }
    }
}
