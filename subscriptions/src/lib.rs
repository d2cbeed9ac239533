//! SubTrack subscriptions service.
//!
//! Tracks recurring subscriptions per user and answers "how much did this
//! user pay over these months". The HTTP layer lives in `handlers`, business
//! rules in `services`, and persistence behind the `SubscriptionStore` trait.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod services;

use actix_web::web;

pub use errors::ServiceError;
pub use services::{SubscriptionService, UpdateOutcome};

/// `/health` plus the subscription API. Expects `web::Data<SubscriptionService>`.
pub fn configure_service(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health_check));
    handlers::configure_subscription_routes(cfg);
}
