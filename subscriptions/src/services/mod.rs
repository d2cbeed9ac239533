pub mod overlap;
pub mod query_filter;
pub mod subscriptions;

pub use subscriptions::{SubscriptionService, UpdateOutcome};
