//! actix-web middleware that attaches a `TraceContext` to every request and
//! logs the response status and latency.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    rc::Rc,
    time::Instant,
};
use tracing::{debug, error, info, warn, Instrument};

use crate::trace_context::{TraceContext, REQUEST_ID_HEADER, TRACE_ID_HEADER};

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub service_name: String,
    /// Path prefixes that are passed through without logging
    pub exclude_paths: Vec<String>,
    /// Responses slower than this are logged at warn
    pub slow_request_threshold_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "subtrack".to_string(),
            exclude_paths: vec!["/health".to_string(), "/favicon.ico".to_string()],
            slow_request_threshold_ms: 1000,
        }
    }
}

impl ObservabilityConfig {
    pub fn for_service(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_slow_threshold(mut self, ms: u64) -> Self {
        self.slow_request_threshold_ms = ms;
        self
    }
}

#[derive(Clone)]
pub struct ObservabilityMiddleware {
    config: Rc<ObservabilityConfig>,
}

impl ObservabilityMiddleware {
    pub fn new(config: ObservabilityConfig) -> Self {
        Self { config: Rc::new(config) }
    }

    pub fn for_service(name: impl Into<String>) -> Self {
        Self::new(ObservabilityConfig::for_service(name))
    }
}

impl<S, B> Transform<S, ServiceRequest> for ObservabilityMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ObservabilityMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ObservabilityMiddlewareService {
            service: Rc::new(service),
            config: self.config.clone(),
        }))
    }
}

pub struct ObservabilityMiddlewareService<S> {
    service: Rc<S>,
    config: Rc<ObservabilityConfig>,
}

impl<S, B> Service<ServiceRequest> for ObservabilityMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let config = self.config.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let path = req.path().to_string();
            let method = req.method().to_string();

            if config.exclude_paths.iter().any(|p| path.starts_with(p.as_str())) {
                return service.call(req).await;
            }

            let trace_ctx = TraceContext::from_request(req.request())
                .with_service(config.service_name.as_str());
            req.extensions_mut().insert(trace_ctx.clone());

            debug!(
                trace_id = %trace_ctx.trace_id,
                request_id = %trace_ctx.request_id,
                query = %req.query_string(),
                "→ {} {}", method, path
            );

            let request_span = tracing::info_span!(
                "http_request",
                trace_id = %trace_ctx.trace_id,
                method = %method,
                path = %path,
                service = %config.service_name,
            );

            let start = Instant::now();
            let result = service.call(req).instrument(request_span).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(mut res) => {
                    let status = res.status().as_u16();

                    if status >= 500 {
                        error!(trace_id = %trace_ctx.trace_id, status, duration_ms, "← {} {} {} {}ms", method, path, status, duration_ms);
                    } else if status >= 400 {
                        warn!(trace_id = %trace_ctx.trace_id, status, duration_ms, "← {} {} {} {}ms", method, path, status, duration_ms);
                    } else if duration_ms > config.slow_request_threshold_ms {
                        warn!(trace_id = %trace_ctx.trace_id, status, duration_ms, "← SLOW {} {} {} {}ms", method, path, status, duration_ms);
                    } else {
                        info!(trace_id = %trace_ctx.trace_id, status, duration_ms, "← {} {} {} {}ms", method, path, status, duration_ms);
                    }

                    let headers = res.headers_mut();
                    for (name, value) in [
                        (REQUEST_ID_HEADER, &trace_ctx.request_id),
                        (TRACE_ID_HEADER, &trace_ctx.trace_id),
                    ] {
                        if let Ok(value) = HeaderValue::from_str(value) {
                            headers.insert(HeaderName::from_static(name), value);
                        }
                    }

                    Ok(res)
                }
                Err(e) => {
                    error!(
                        trace_id = %trace_ctx.trace_id,
                        duration_ms,
                        error = %e,
                        "← {} {} ERROR {}ms", method, path, duration_ms
                    );
                    Err(e)
                }
            }
        })
    }
}

/// Helper to create observability middleware for a service
pub fn observability(service_name: impl Into<String>) -> ObservabilityMiddleware {
    ObservabilityMiddleware::for_service(service_name)
}

/// Trace context stored by the middleware, or a fresh one.
pub fn get_trace_context(req: &actix_web::HttpRequest) -> TraceContext {
    req.extensions()
        .get::<TraceContext>()
        .cloned()
        .unwrap_or_else(|| TraceContext::from_request(req))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpRequest, HttpResponse};

    async fn echo_trace(req: HttpRequest) -> HttpResponse {
        HttpResponse::Ok().body(get_trace_context(&req).trace_id)
    }

    #[actix_web::test]
    async fn test_middleware_propagates_request_ids() {
        let app = test::init_service(
            App::new()
                .wrap(observability("test-service"))
                .route("/echo", web::get().to(echo_trace)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/echo")
            .insert_header((TRACE_ID_HEADER, "trace-abc"))
            .insert_header((REQUEST_ID_HEADER, "req-123"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert_eq!(resp.headers().get(REQUEST_ID_HEADER).unwrap(), "req-123");
        assert_eq!(resp.headers().get(TRACE_ID_HEADER).unwrap(), "trace-abc");
        let body = test::read_body(resp).await;
        assert_eq!(body, "trace-abc");
    }

    #[actix_web::test]
    async fn test_slow_threshold_still_returns_response() {
        let config = ObservabilityConfig::for_service("test-service").with_slow_threshold(0);
        assert_eq!(config.slow_request_threshold_ms, 0);

        let app = test::init_service(
            App::new()
                .wrap(ObservabilityMiddleware::new(config))
                .route("/echo", web::get().to(echo_trace)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/echo")
            .insert_header((REQUEST_ID_HEADER, "req-slow"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert_eq!(resp.headers().get(REQUEST_ID_HEADER).unwrap(), "req-slow");
    }

    #[actix_web::test]
    async fn test_excluded_paths_skip_context() {
        let app = test::init_service(
            App::new()
                .wrap(observability("test-service"))
                .route("/health", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert!(resp.status().is_success());
        assert!(resp.headers().get(REQUEST_ID_HEADER).is_none());
    }
}
