use actix_web::{error, web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::warn;

use subtrack_observability::TraceContextExt;

use crate::config::ServiceConfig;
use crate::errors::ServiceError;
use crate::models::*;
use crate::services::{SubscriptionService, UpdateOutcome};

pub async fn create_subscription(
    req: HttpRequest,
    service: web::Data<SubscriptionService>,
    body: web::Json<CreateSubscriptionRequest>,
) -> Result<HttpResponse, ServiceError> {
    let created = service.create(&req.trace_context(), body.into_inner()).await?;
    Ok(HttpResponse::Created().json(created))
}

pub async fn get_subscription(
    req: HttpRequest,
    service: web::Data<SubscriptionService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let subscription = service.get(&req.trace_context(), &path).await?;
    Ok(HttpResponse::Ok().json(subscription))
}

pub async fn list_subscriptions(
    req: HttpRequest,
    service: web::Data<SubscriptionService>,
    query: web::Query<ListSubscriptionsQuery>,
) -> Result<HttpResponse, ServiceError> {
    let page = service.list(&req.trace_context(), &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn update_subscription(
    req: HttpRequest,
    service: web::Data<SubscriptionService>,
    path: web::Path<String>,
    body: web::Json<UpdateSubscriptionRequest>,
) -> Result<HttpResponse, ServiceError> {
    match service.update(&req.trace_context(), &path, body.into_inner()).await? {
        UpdateOutcome::Updated(subscription) => Ok(HttpResponse::Ok().json(subscription)),
        UpdateOutcome::Unchanged => Ok(HttpResponse::NoContent().finish()),
    }
}

pub async fn delete_subscription(
    req: HttpRequest,
    service: web::Data<SubscriptionService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    service.delete(&req.trace_context(), &path).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn sum_subscriptions(
    req: HttpRequest,
    service: web::Data<SubscriptionService>,
    path: web::Path<String>,
    query: web::Query<SumQuery>,
) -> Result<HttpResponse, ServiceError> {
    let sum = service.sum(&req.trace_context(), &path, &query).await?;
    Ok(HttpResponse::Ok().json(sum))
}

/// `/sum` with no user segment; answered by the same validation as a blank id.
pub async fn sum_subscriptions_without_user(
    req: HttpRequest,
    service: web::Data<SubscriptionService>,
    query: web::Query<SumQuery>,
) -> Result<HttpResponse, ServiceError> {
    let sum = service.sum(&req.trace_context(), "", &query).await?;
    Ok(HttpResponse::Ok().json(sum))
}

pub async fn health_check(service: web::Data<SubscriptionService>) -> HttpResponse {
    let database = if service.store_healthy().await {
        "connected"
    } else {
        "disconnected"
    };

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": ServiceConfig::SERVICE_NAME,
        "database": database,
        "timestamp": chrono::Utc::now()
    }))
}

/// Malformed or mistyped JSON bodies become 400s in the service's error shape.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        warn!(error = %err, "Rejected request body");
        let message = match &err {
            error::JsonPayloadError::ContentType => "content type must be application/json".to_string(),
            other => format!("invalid request body: {}", other),
        };
        ServiceError::ValidationError(message).into()
    })
}

/// Unparsable query strings get the same treatment as bad bodies.
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        warn!(error = %err, "Rejected query string");
        ServiceError::ValidationError(format!("invalid query: {}", err)).into()
    })
}

pub fn configure_subscription_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/subscriptions")
            .app_data(json_config())
            .app_data(query_config())
            .route("/sum/{user_id}", web::get().to(sum_subscriptions))
            .service(web::resource(["/sum", "/sum/"]).route(web::get().to(sum_subscriptions_without_user)))
            .service(
                web::resource(["", "/"])
                    .route(web::post().to(create_subscription))
                    .route(web::get().to(list_subscriptions)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(get_subscription))
                    .route(web::put().to(update_subscription))
                    .route(web::delete().to(delete_subscription)),
            ),
    );
}
