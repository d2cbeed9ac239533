//! Per-request trace context.
//!
//! Accepts the W3C `traceparent` header or the custom `x-trace-id` /
//! `x-request-id` headers; anything missing is generated.

use actix_web::{HttpMessage, HttpRequest};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Header names for trace context propagation
pub const TRACE_ID_HEADER: &str = "x-trace-id";
pub const SPAN_ID_HEADER: &str = "x-span-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const W3C_TRACEPARENT_HEADER: &str = "traceparent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// ID shared by every span of one logical request chain
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    /// Echoed back to the caller as `x-request-id`
    pub request_id: String,
    /// Service that created this context
    pub origin_service: Option<String>,
}

impl TraceContext {
    /// Create a new trace context with fresh IDs
    pub fn new() -> Self {
        let trace_id = Uuid::new_v4().simple().to_string();
        Self {
            request_id: trace_id.clone(),
            trace_id,
            span_id: generate_span_id(),
            parent_span_id: None,
            origin_service: None,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.origin_service = Some(service.into());
        self
    }

    /// Span for one service operation, tagged with this request's ids.
    pub fn operation_span(&self, operation: &'static str) -> tracing::Span {
        tracing::info_span!(
            "operation",
            op = operation,
            trace_id = %self.trace_id,
            request_id = %self.request_id,
        )
    }

    /// Extract trace context from HTTP request headers
    pub fn from_request(req: &HttpRequest) -> Self {
        let headers = req.headers();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        if let Some(ctx) = header(W3C_TRACEPARENT_HEADER).and_then(|tp| Self::parse_traceparent(&tp)) {
            return match header(REQUEST_ID_HEADER) {
                Some(request_id) => Self { request_id, ..ctx },
                None => ctx,
            };
        }

        let trace_id = header(TRACE_ID_HEADER).unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let request_id = header(REQUEST_ID_HEADER).unwrap_or_else(|| trace_id.clone());

        Self {
            trace_id,
            span_id: generate_span_id(),
            parent_span_id: header(SPAN_ID_HEADER),
            request_id,
            origin_service: None,
        }
    }

    /// Parse `version-trace_id-parent_id-flags`, e.g. `00-<32 hex>-<16 hex>-01`.
    fn parse_traceparent(value: &str) -> Option<Self> {
        let parts: Vec<&str> = value.split('-').collect();
        if parts.len() != 4 || parts[1].is_empty() || parts[2].is_empty() {
            return None;
        }

        let trace_id = parts[1].to_string();
        Some(Self {
            request_id: trace_id.clone(),
            trace_id,
            span_id: generate_span_id(),
            parent_span_id: Some(parts[2].to_string()),
            origin_service: None,
        })
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace_id={} span_id={}", self.trace_id, self.span_id)
    }
}

/// 16 hex characters, the W3C span id width
fn generate_span_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// Extension trait to extract TraceContext from actix-web requests
pub trait TraceContextExt {
    fn trace_context(&self) -> TraceContext;
}

impl TraceContextExt for HttpRequest {
    fn trace_context(&self) -> TraceContext {
        // Set by the middleware when it ran for this request
        if let Some(ctx) = self.extensions().get::<TraceContext>() {
            return ctx.clone();
        }
        TraceContext::from_request(self)
    }
}
