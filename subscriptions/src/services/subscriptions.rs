use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;
use validator::Validate;

use subtrack_observability::TraceContext;

use super::overlap;
use super::query_filter::{self, non_empty, parse_uuid};
use crate::errors::{invalid_month, ServiceError};
use crate::models::*;
use crate::repositories::SubscriptionStore;

/// Result of a partial update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No updatable field was supplied; nothing was written.
    Unchanged,
    Updated(SubscriptionResponse),
}

/// Validates requests, talks to the store and shapes responses.
///
/// Every operation runs inside a span built from the caller's `TraceContext`.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
}

fn storage_error(operation: &'static str) -> impl FnOnce(anyhow::Error) -> ServiceError {
    move |e| {
        error!(operation, error = %format!("{:#}", e), "Store operation failed");
        ServiceError::from(e)
    }
}

fn parse_month(raw: &str, field: &str) -> Result<Month, ServiceError> {
    raw.parse::<Month>().map_err(|e| {
        warn!(field, value = raw, "Invalid month");
        invalid_month(field, e)
    })
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// `true` when the backing store answers.
    pub async fn store_healthy(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Store health check failed");
                false
            }
        }
    }

    pub async fn create(
        &self,
        ctx: &TraceContext,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionResponse, ServiceError> {
        async move {
            request.validate()?;

            let service_name = request.service_name.trim();
            if service_name.is_empty() {
                return Err(ServiceError::validation("service_name is required"));
            }

            let user_id = match non_empty(Some(&request.user_id)) {
                Some(raw) => parse_uuid(raw, "user_id")?,
                None => return Err(ServiceError::validation("user_id is required")),
            };

            let start = parse_month(&request.start_date, "start_date")?;
            let end = match non_empty(request.end_date.as_deref()) {
                Some(raw) => Some(parse_month(raw, "end_date")?),
                None => None,
            };
            let interval = ActiveInterval::checked(start, end)
                .ok_or_else(|| ServiceError::validation("end_date must not be before start_date"))?;

            let subscription = Subscription {
                id: Uuid::new_v4(),
                service_name: service_name.to_string(),
                price: request.price,
                user_id,
                interval,
            };

            debug!(subscription_id = %subscription.id, user_id = %user_id, "Creating subscription in store");
            let created = self
                .store
                .create(&subscription)
                .await
                .map_err(storage_error("create"))?;

            info!(
                subscription_id = %created.id,
                user_id = %created.user_id,
                service_name = %created.service_name,
                "Subscription created"
            );
            Ok(created.into())
        }
        .instrument(ctx.operation_span("create_subscription"))
        .await
    }

    pub async fn get(&self, ctx: &TraceContext, id: &str) -> Result<SubscriptionResponse, ServiceError> {
        async move {
            let id = parse_uuid(id, "id")?;

            match self.store.find_by_id(&id).await.map_err(storage_error("find_by_id"))? {
                Some(subscription) => Ok(subscription.into()),
                None => {
                    warn!(subscription_id = %id, "Subscription not found");
                    Err(ServiceError::NotFound(format!("subscription {} not found", id)))
                }
            }
        }
        .instrument(ctx.operation_span("get_subscription"))
        .await
    }

    pub async fn list(
        &self,
        ctx: &TraceContext,
        query: &ListSubscriptionsQuery,
    ) -> Result<PaginatedResponse<SubscriptionResponse>, ServiceError> {
        async move {
            let params = query_filter::resolve(query)?;
            debug!(
                page = params.page.page,
                limit = params.page.limit,
                user_id = ?params.filter.user_id,
                service_name = ?params.filter.service_name,
                "Listing subscriptions"
            );

            let total = self
                .store
                .count(&params.filter)
                .await
                .map_err(storage_error("count"))?;
            let items = self
                .store
                .list(&params.filter, &params.page)
                .await
                .map_err(storage_error("list"))?;

            let pagination = query_filter::pagination_meta(&params.page, total);
            info!(
                page = pagination.page,
                total = pagination.total,
                items = items.len(),
                "Subscriptions listed"
            );

            Ok(PaginatedResponse {
                data: items.into_iter().map(Into::into).collect(),
                pagination,
            })
        }
        .instrument(ctx.operation_span("list_subscriptions"))
        .await
    }

    /// Partial update. The write and the re-read are separate store calls, so
    /// a concurrent delete can surface as `NotFound` after a successful write.
    pub async fn update(
        &self,
        ctx: &TraceContext,
        id: &str,
        request: UpdateSubscriptionRequest,
    ) -> Result<UpdateOutcome, ServiceError> {
        async move {
            let id = parse_uuid(id, "id")?;
            request.validate()?;

            let owner = match non_empty(request.user_id.as_deref()) {
                Some(raw) => Some(parse_uuid(raw, "user_id")?),
                None => None,
            };

            let changes = SubscriptionChanges {
                service_name: non_empty(request.service_name.as_deref()).map(str::to_string),
                price: request.price,
                start_date: match non_empty(request.start_date.as_deref()) {
                    Some(raw) => Some(parse_month(raw, "start_date")?),
                    None => None,
                },
                end_date: match &request.end_date {
                    Some(None) => Some(None),
                    Some(Some(raw)) => match non_empty(Some(raw)) {
                        Some(raw) => Some(Some(parse_month(raw, "end_date")?)),
                        None => None,
                    },
                    None => None,
                },
            };

            // user_id is not updatable; on its own it leaves nothing to write.
            if changes.is_empty() {
                warn!(subscription_id = %id, "No updates provided");
                return Ok(UpdateOutcome::Unchanged);
            }

            let current = self
                .store
                .find_by_id(&id)
                .await
                .map_err(storage_error("find_by_id"))?
                .ok_or_else(|| ServiceError::NotFound(format!("subscription {} not found", id)))?;

            if owner.is_some_and(|owner| owner != current.user_id) {
                return Err(ServiceError::validation("user_id cannot be changed"));
            }

            let merged = changes.apply_to(&current);
            if ActiveInterval::checked(merged.interval.start(), merged.interval.end()).is_none() {
                return Err(ServiceError::validation("end_date must not be before start_date"));
            }

            debug!(subscription_id = %id, changes = ?changes, "Updating subscription in store");
            let written = self
                .store
                .update(&id, &changes)
                .await
                .map_err(storage_error("update"))?;
            if !written {
                return Err(ServiceError::NotFound(format!("subscription {} not found", id)));
            }

            let updated = self
                .store
                .find_by_id(&id)
                .await
                .map_err(storage_error("find_by_id"))?
                .ok_or_else(|| {
                    warn!(subscription_id = %id, "Subscription vanished after update");
                    ServiceError::NotFound(format!("subscription {} not found", id))
                })?;

            info!(subscription_id = %id, "Subscription updated");
            Ok(UpdateOutcome::Updated(updated.into()))
        }
        .instrument(ctx.operation_span("update_subscription"))
        .await
    }

    /// Idempotent: deleting an unknown id succeeds.
    pub async fn delete(&self, ctx: &TraceContext, id: &str) -> Result<(), ServiceError> {
        async move {
            let id = parse_uuid(id, "id")?;
            let existed = self.store.delete(&id).await.map_err(storage_error("delete"))?;
            info!(subscription_id = %id, existed, "Subscription deleted");
            Ok(())
        }
        .instrument(ctx.operation_span("delete_subscription"))
        .await
    }

    /// Total cost of a user's subscriptions over `[start, end]`.
    pub async fn sum(
        &self,
        ctx: &TraceContext,
        user_id: &str,
        query: &SumQuery,
    ) -> Result<SumResponse, ServiceError> {
        async move {
            let user_id = match non_empty(Some(user_id)) {
                Some(raw) => parse_uuid(raw, "user_id")?,
                None => return Err(ServiceError::validation("user_id is required")),
            };

            let (start, end) = match (non_empty(query.start.as_deref()), non_empty(query.end.as_deref())) {
                (Some(start), Some(end)) => (start, end),
                _ => return Err(ServiceError::validation("start and end are required")),
            };
            let start = parse_month(start, "start")?;
            let end = parse_month(end, "end")?;
            let period = Period::new(start, end)
                .ok_or_else(|| ServiceError::validation("start must not be after end"))?;
            let service_name = non_empty(query.service_name.as_deref());

            debug!(
                user_id = %user_id,
                period_start = %period.start,
                period_end = %period.end,
                service_name = ?service_name,
                "Fetching overlapping subscriptions"
            );
            let candidates = self
                .store
                .find_overlapping(&user_id, &period, service_name)
                .await
                .map_err(storage_error("find_overlapping"))?;

            let breakdown = overlap::breakdown(&candidates, &period);
            for c in &breakdown.contributions {
                debug!(
                    subscription_id = %c.subscription_id,
                    service_name = %c.service_name,
                    months = c.months,
                    amount = c.amount,
                    "Subscription contribution"
                );
            }

            info!(
                user_id = %user_id,
                total = breakdown.total,
                candidates = candidates.len(),
                "Sum calculated"
            );
            Ok(SumResponse { sum: breakdown.total })
        }
        .instrument(ctx.operation_span("sum_subscriptions"))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemorySubscriptionStore;

    fn service() -> SubscriptionService {
        SubscriptionService::new(Arc::new(InMemorySubscriptionStore::new()))
    }

    fn create_request(user_id: Uuid, start: &str, end: Option<&str>, price: i64) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            service_name: "Yandex Plus".to_string(),
            price,
            user_id: user_id.to_string(),
            start_date: start.to_string(),
            end_date: end.map(str::to_string),
        }
    }

    fn sum_query(start: &str, end: &str) -> SumQuery {
        SumQuery {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
            service_name: None,
        }
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let svc = service();
        let ctx = TraceContext::new();
        let user_id = Uuid::new_v4();

        let mut request = create_request(user_id, "07-2025", None, 400);
        request.service_name = "  Yandex Plus  ".to_string();
        let created = svc.create(&ctx, request).await.unwrap();

        assert_eq!(created.service_name, "Yandex Plus");
        assert_eq!(created.start_date, Month::new(2025, 7).unwrap());
        assert_eq!(created.end_date, None);

        let fetched = svc.get(&ctx, &created.id.to_string()).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let svc = service();
        let ctx = TraceContext::new();
        let user_id = Uuid::new_v4();

        let mut blank_name = create_request(user_id, "01-2024", None, 1);
        blank_name.service_name = "   ".to_string();
        assert!(matches!(svc.create(&ctx, blank_name).await, Err(ServiceError::ValidationError(_))));

        let mut bad_user = create_request(user_id, "01-2024", None, 1);
        bad_user.user_id = "42".to_string();
        assert_eq!(
            svc.create(&ctx, bad_user).await.unwrap_err(),
            ServiceError::validation("invalid user_id")
        );

        let negative = create_request(user_id, "01-2024", None, -5);
        assert!(matches!(svc.create(&ctx, negative).await, Err(ServiceError::ValidationError(_))));

        let bad_date = create_request(user_id, "2024-01", None, 1);
        assert!(matches!(svc.create(&ctx, bad_date).await, Err(ServiceError::ValidationError(_))));

        let reversed = create_request(user_id, "05-2024", Some("04-2024"), 1);
        assert_eq!(
            svc.create(&ctx, reversed).await.unwrap_err(),
            ServiceError::validation("end_date must not be before start_date")
        );

        let blank_end = create_request(user_id, "05-2024", Some("  "), 1);
        assert_eq!(svc.create(&ctx, blank_end).await.unwrap().end_date, None);
    }

    #[tokio::test]
    async fn test_get_reports_bad_and_missing_ids() {
        let svc = service();
        let ctx = TraceContext::new();

        assert_eq!(svc.get(&ctx, "nope").await.unwrap_err(), ServiceError::validation("invalid id"));
        assert!(matches!(
            svc.get(&ctx, &Uuid::new_v4().to_string()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_without_fields_is_noop() {
        let svc = service();
        let ctx = TraceContext::new();
        let created = svc
            .create(&ctx, create_request(Uuid::new_v4(), "01-2024", Some("06-2024"), 100))
            .await
            .unwrap();
        let id = created.id.to_string();

        let request = UpdateSubscriptionRequest {
            service_name: Some("  ".to_string()),
            start_date: Some(String::new()),
            end_date: Some(Some(String::new())),
            ..Default::default()
        };
        assert_eq!(svc.update(&ctx, &id, request).await.unwrap(), UpdateOutcome::Unchanged);
        assert_eq!(svc.get(&ctx, &id).await.unwrap(), created);

        // Owner alone is not a change, whether or not the record exists.
        let owner_only = UpdateSubscriptionRequest {
            user_id: Some(created.user_id.to_string()),
            ..Default::default()
        };
        assert_eq!(
            svc.update(&ctx, &id, owner_only.clone()).await.unwrap(),
            UpdateOutcome::Unchanged
        );
        assert_eq!(
            svc.update(&ctx, &Uuid::new_v4().to_string(), owner_only).await.unwrap(),
            UpdateOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn test_update_applies_partial_changes() {
        let svc = service();
        let ctx = TraceContext::new();
        let created = svc
            .create(&ctx, create_request(Uuid::new_v4(), "01-2024", Some("06-2024"), 100))
            .await
            .unwrap();
        let id = created.id.to_string();

        let request = UpdateSubscriptionRequest {
            price: Some(0),
            end_date: Some(None),
            ..Default::default()
        };
        let UpdateOutcome::Updated(updated) = svc.update(&ctx, &id, request).await.unwrap() else {
            panic!("expected an update");
        };
        assert_eq!(updated.price, 0);
        assert_eq!(updated.end_date, None);
        assert_eq!(updated.service_name, created.service_name);
        assert_eq!(updated.start_date, created.start_date);
    }

    #[tokio::test]
    async fn test_update_rejects_bad_interval_and_owner_change() {
        let svc = service();
        let ctx = TraceContext::new();
        let owner = Uuid::new_v4();
        let created = svc
            .create(&ctx, create_request(owner, "03-2024", Some("06-2024"), 100))
            .await
            .unwrap();
        let id = created.id.to_string();

        let reversed = UpdateSubscriptionRequest {
            start_date: Some("09-2024".to_string()),
            ..Default::default()
        };
        assert!(matches!(svc.update(&ctx, &id, reversed).await, Err(ServiceError::ValidationError(_))));

        let new_owner = UpdateSubscriptionRequest {
            user_id: Some(Uuid::new_v4().to_string()),
            price: Some(1),
            ..Default::default()
        };
        assert_eq!(
            svc.update(&ctx, &id, new_owner).await.unwrap_err(),
            ServiceError::validation("user_id cannot be changed")
        );

        let same_owner = UpdateSubscriptionRequest {
            user_id: Some(owner.to_string()),
            price: Some(250),
            ..Default::default()
        };
        let UpdateOutcome::Updated(updated) = svc.update(&ctx, &id, same_owner).await.unwrap() else {
            panic!("expected an update");
        };
        assert_eq!(updated.price, 250);
        assert_eq!(updated.user_id, owner);

        let bad_owner = UpdateSubscriptionRequest {
            user_id: Some("not-a-uuid".to_string()),
            ..Default::default()
        };
        assert_eq!(
            svc.update(&ctx, &id, bad_owner).await.unwrap_err(),
            ServiceError::validation("invalid user_id")
        );

        let missing = UpdateSubscriptionRequest { price: Some(1), ..Default::default() };
        assert!(matches!(
            svc.update(&ctx, &Uuid::new_v4().to_string(), missing).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let svc = service();
        let ctx = TraceContext::new();
        let created = svc
            .create(&ctx, create_request(Uuid::new_v4(), "01-2024", None, 100))
            .await
            .unwrap();
        let id = created.id.to_string();

        svc.delete(&ctx, &id).await.unwrap();
        svc.delete(&ctx, &id).await.unwrap();
        assert!(matches!(svc.get(&ctx, &id).await, Err(ServiceError::NotFound(_))));
        assert_eq!(svc.delete(&ctx, "bad").await.unwrap_err(), ServiceError::validation("invalid id"));
    }

    #[tokio::test]
    async fn test_sum_over_window() {
        let svc = service();
        let ctx = TraceContext::new();
        let user_id = Uuid::new_v4();
        let user = user_id.to_string();

        svc.create(&ctx, create_request(user_id, "01-2024", Some("06-2024"), 100)).await.unwrap();
        svc.create(&ctx, create_request(user_id, "01-2024", Some("03-2024"), 1000)).await.unwrap();
        let mut other_service = create_request(user_id, "11-2024", None, 50);
        other_service.service_name = "Kinopoisk".to_string();
        svc.create(&ctx, other_service).await.unwrap();
        svc.create(&ctx, create_request(Uuid::new_v4(), "01-2024", None, 9999)).await.unwrap();

        let all = svc.sum(&ctx, &user, &sum_query("03-2024", "12-2024")).await.unwrap();
        assert_eq!(all.sum, 400 + 1000 + 100);

        let mut filtered = sum_query("03-2024", "12-2024");
        filtered.service_name = Some("Kinopoisk".to_string());
        assert_eq!(svc.sum(&ctx, &user, &filtered).await.unwrap().sum, 100);

        let later = svc.sum(&ctx, &user, &sum_query("01-2030", "12-2030")).await.unwrap();
        assert_eq!(later.sum, 50 * 12);
    }

    #[tokio::test]
    async fn test_sum_validation() {
        let svc = service();
        let ctx = TraceContext::new();
        let user = Uuid::new_v4().to_string();

        assert_eq!(
            svc.sum(&ctx, "  ", &sum_query("01-2024", "02-2024")).await.unwrap_err(),
            ServiceError::validation("user_id is required")
        );
        assert_eq!(
            svc.sum(&ctx, "xyz", &sum_query("01-2024", "02-2024")).await.unwrap_err(),
            ServiceError::validation("invalid user_id")
        );
        assert_eq!(
            svc.sum(&ctx, &user, &SumQuery::default()).await.unwrap_err(),
            ServiceError::validation("start and end are required")
        );
        assert!(matches!(
            svc.sum(&ctx, &user, &sum_query("1-2024", "02-2024")).await,
            Err(ServiceError::ValidationError(msg)) if msg.starts_with("invalid start")
        ));
        assert_eq!(
            svc.sum(&ctx, &user, &sum_query("05-2024", "02-2024")).await.unwrap_err(),
            ServiceError::validation("start must not be after end")
        );
    }

    /// Store whose every call fails, standing in for an unreachable database.
    struct UnavailableStore;

    #[async_trait::async_trait]
    impl SubscriptionStore for UnavailableStore {
        async fn create(&self, _subscription: &Subscription) -> anyhow::Result<Subscription> {
            anyhow::bail!("connection refused: 10.0.0.5:5432")
        }

        async fn find_by_id(&self, _id: &Uuid) -> anyhow::Result<Option<Subscription>> {
            anyhow::bail!("connection refused: 10.0.0.5:5432")
        }

        async fn update(&self, _id: &Uuid, _changes: &SubscriptionChanges) -> anyhow::Result<bool> {
            anyhow::bail!("connection refused: 10.0.0.5:5432")
        }

        async fn delete(&self, _id: &Uuid) -> anyhow::Result<bool> {
            anyhow::bail!("connection refused: 10.0.0.5:5432")
        }

        async fn count(&self, _filter: &SubscriptionFilter) -> anyhow::Result<i64> {
            anyhow::bail!("connection refused: 10.0.0.5:5432")
        }

        async fn list(
            &self,
            _filter: &SubscriptionFilter,
            _page: &PageRequest,
        ) -> anyhow::Result<Vec<Subscription>> {
            anyhow::bail!("connection refused: 10.0.0.5:5432")
        }

        async fn find_overlapping(
            &self,
            _user_id: &Uuid,
            _period: &Period,
            _service_name: Option<&str>,
        ) -> anyhow::Result<Vec<Subscription>> {
            anyhow::bail!("connection refused: 10.0.0.5:5432")
        }

        async fn ping(&self) -> anyhow::Result<()> {
            anyhow::bail!("connection refused: 10.0.0.5:5432")
        }
    }

    #[tokio::test]
    async fn test_store_failures_become_database_errors() {
        let svc = SubscriptionService::new(Arc::new(UnavailableStore));
        let ctx = TraceContext::new();
        let id = Uuid::new_v4().to_string();

        assert!(matches!(svc.get(&ctx, &id).await, Err(ServiceError::DatabaseError(_))));
        assert!(matches!(
            svc.list(&ctx, &ListSubscriptionsQuery::default()).await,
            Err(ServiceError::DatabaseError(_))
        ));
        assert!(matches!(
            svc.sum(&ctx, &id, &sum_query("01-2024", "03-2024")).await,
            Err(ServiceError::DatabaseError(_))
        ));
        assert!(matches!(
            svc.create(&ctx, create_request(Uuid::new_v4(), "01-2024", None, 10)).await,
            Err(ServiceError::DatabaseError(_))
        ));
        assert!(!svc.store_healthy().await);

        // Input is still validated before the store is touched.
        assert_eq!(svc.get(&ctx, "bad").await.unwrap_err(), ServiceError::validation("invalid id"));
    }
}
