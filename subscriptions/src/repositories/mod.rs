// Storage for subscription records

pub mod memory;
pub mod postgres;

pub use memory::InMemorySubscriptionStore;
pub use postgres::PgSubscriptionStore;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{PageRequest, Period, Subscription, SubscriptionChanges, SubscriptionFilter};

/// Persistence operations the service needs from a subscription store.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert a fully-formed record and return it as stored.
    async fn create(&self, subscription: &Subscription) -> Result<Subscription>;

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Subscription>>;

    /// Apply a partial update. Returns `false` when no row has this id.
    async fn update(&self, id: &Uuid, changes: &SubscriptionChanges) -> Result<bool>;

    /// Delete by id. Returns `false` when nothing was deleted.
    async fn delete(&self, id: &Uuid) -> Result<bool>;

    async fn count(&self, filter: &SubscriptionFilter) -> Result<i64>;

    /// One page of matching records, ordered by start month then id.
    async fn list(&self, filter: &SubscriptionFilter, page: &PageRequest) -> Result<Vec<Subscription>>;

    /// A user's subscriptions whose interval may intersect `period`:
    /// `start_date <= period.end AND (end_date IS NULL OR end_date >= period.start)`.
    async fn find_overlapping(
        &self,
        user_id: &Uuid,
        period: &Period,
        service_name: Option<&str>,
    ) -> Result<Vec<Subscription>>;

    /// Connectivity check used by the health endpoint.
    async fn ping(&self) -> Result<()>;
}
