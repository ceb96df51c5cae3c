//! Access log middleware — request metrics and structured access log

use super::{Middleware, RequestContext};
use crate::error::Result;
use crate::observability::{AccessLog, AccessLogEntry, GatewayMetrics};
use async_trait::async_trait;
use http::Response;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Records every request that reached this stage
pub struct AccessLogMiddleware {
    metrics: Arc<GatewayMetrics>,
    log: AccessLog,
}

impl AccessLogMiddleware {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            metrics,
            log: AccessLog::new(),
        }
    }
}

#[async_trait]
impl Middleware for AccessLogMiddleware {
    async fn handle_request(
        &self,
        _req: &mut http::request::Parts,
        ctx: &mut RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>> {
        ctx.started_at = Some(Instant::now());
        Ok(None)
    }

    async fn handle_response(
        &self,
        resp: &mut http::response::Parts,
        ctx: &RequestContext,
    ) -> Result<()> {
        // Requests stopped before this stage are not counted
        let Some(started_at) = ctx.started_at else {
            return Ok(());
        };
        let elapsed = started_at.elapsed();

        let entry = log_entry(ctx, resp.status, elapsed);
        self.metrics.record_request(entry.is_success(), elapsed);
        self.log.record(&entry);
        Ok(())
    }

    fn name(&self) -> &str {
        "access-log"
    }
}

fn log_entry(ctx: &RequestContext, status: http::StatusCode, elapsed: Duration) -> AccessLogEntry {
    AccessLogEntry {
        timestamp: ctx
            .timestamp
            .unwrap_or_else(chrono::Utc::now)
            .to_rfc3339(),
        request_id: ctx.request_id.clone(),
        client_ip: ctx.client_ip.clone(),
        method: ctx.method.clone(),
        path: ctx.path.clone(),
        status: status.as_u16(),
        duration_ms: elapsed.as_millis() as u64,
        category: ctx.category.map(|c| c.to_string()),
    }
}
