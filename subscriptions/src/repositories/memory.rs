use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::SubscriptionStore;
use crate::models::{PageRequest, Period, Subscription, SubscriptionChanges, SubscriptionFilter};

/// Process-local store for development runs and tests.
///
/// Mirrors the ordering and overlap predicate of the Postgres store.
#[derive(Clone, Default)]
pub struct InMemorySubscriptionStore {
    records: Arc<RwLock<HashMap<Uuid, Subscription>>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn sorted<F>(&self, predicate: F) -> Vec<Subscription>
    where
        F: Fn(&Subscription) -> bool,
    {
        let records = self.records.read();
        let mut matching: Vec<Subscription> =
            records.values().filter(|s| predicate(s)).cloned().collect();
        matching.sort_by(|a, b| {
            a.interval
                .start()
                .cmp(&b.interval.start())
                .then_with(|| a.id.cmp(&b.id))
        });
        matching
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn create(&self, subscription: &Subscription) -> Result<Subscription> {
        let mut records = self.records.write();
        if records.contains_key(&subscription.id) {
            anyhow::bail!("Subscription {} already exists", subscription.id);
        }
        records.insert(subscription.id, subscription.clone());
        Ok(subscription.clone())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Subscription>> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn update(&self, id: &Uuid, changes: &SubscriptionChanges) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }

        let mut records = self.records.write();
        match records.get_mut(id) {
            Some(current) => {
                *current = changes.apply_to(current);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &Uuid) -> Result<bool> {
        Ok(self.records.write().remove(id).is_some())
    }

    async fn count(&self, filter: &SubscriptionFilter) -> Result<i64> {
        let records = self.records.read();
        Ok(records.values().filter(|s| filter.matches(s)).count() as i64)
    }

    async fn list(&self, filter: &SubscriptionFilter, page: &PageRequest) -> Result<Vec<Subscription>> {
        let offset = usize::try_from(page.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit).unwrap_or(0);

        Ok(self
            .sorted(|s| filter.matches(s))
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn find_overlapping(
        &self,
        user_id: &Uuid,
        period: &Period,
        service_name: Option<&str>,
    ) -> Result<Vec<Subscription>> {
        Ok(self.sorted(|s| {
            s.user_id == *user_id
                && s.interval.start() <= period.end
                && s.interval.end().map_or(true, |end| end >= period.start)
                && service_name.map_or(true, |name| s.service_name == name)
        }))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
