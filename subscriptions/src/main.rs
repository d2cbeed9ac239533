use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;

use subtrack_observability::{error, info, init_tracing, observability, TracingConfig};
use subtrack_subscriptions::{
    config::{ServiceConfig, StoreBackend},
    configure_service,
    repositories::{InMemorySubscriptionStore, PgSubscriptionStore, SubscriptionStore},
    SubscriptionService,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    init_tracing(TracingConfig::for_service(ServiceConfig::SERVICE_NAME));

    let config = ServiceConfig::from_env().map_err(|e| {
        error!(error = %format!("{:#}", e), "Invalid configuration");
        e
    })?;

    let store: Arc<dyn SubscriptionStore> = match (config.store, &config.database) {
        (StoreBackend::Postgres, Some(database)) => {
            info!(max_connections = database.max_connections, "Connecting to database");
            let store = PgSubscriptionStore::connect(database).await?;
            if database.run_migrations {
                store.migrate().await?;
                info!("Database migrations applied");
            }
            info!("Database connection established");
            Arc::new(store)
        }
        (StoreBackend::Postgres, None) => {
            anyhow::bail!("postgres backend selected without database configuration")
        }
        (StoreBackend::Memory, _) => {
            info!("Using in-memory subscription store; data is lost on exit");
            Arc::new(InMemorySubscriptionStore::new())
        }
    };

    let service = web::Data::new(SubscriptionService::new(store));

    info!(host = %config.host, port = config.port, "Starting {}", ServiceConfig::SERVICE_NAME);
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .app_data(service.clone())
            .wrap(cors)
            .wrap(observability(ServiceConfig::SERVICE_NAME))
            .configure(configure_service)
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}
