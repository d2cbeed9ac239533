use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool, Postgres, QueryBuilder,
};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::SubscriptionStore;
use crate::config::DatabaseConfig;
use crate::models::{
    ActiveInterval, Month, PageRequest, Period, Subscription, SubscriptionChanges,
    SubscriptionFilter,
};

const COLUMNS: &str = "id, service_name, price, user_id, start_date, end_date";

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    service_name: String,
    price: i64,
    user_id: Uuid,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Subscription {
            id: row.id,
            service_name: row.service_name,
            price: row.price,
            user_id: row.user_id,
            interval: ActiveInterval::from_parts(
                Month::from_date(row.start_date),
                row.end_date.map(Month::from_date),
            ),
        }
    }
}

#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        // Disable server-side prepared statements for pgbouncer-style poolers
        let connect_options = PgConnectOptions::from_str(&config.database_url)
            .context("Invalid DATABASE_URL")?
            .statement_cache_capacity(0);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect_with(connect_options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::new(pool))
    }

    /// Run embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &SubscriptionFilter) {
    builder.push(" WHERE TRUE");
    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(service_name) = &filter.service_name {
        builder.push(" AND service_name = ").push_bind(service_name.clone());
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn create(&self, subscription: &Subscription) -> Result<Subscription> {
        let sql = format!(
            "INSERT INTO subscriptions ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COLUMNS}"
        );

        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(subscription.id)
            .bind(&subscription.service_name)
            .bind(subscription.price)
            .bind(subscription.user_id)
            .bind(subscription.interval.start().first_day())
            .bind(subscription.interval.end().map(NaiveDate::from))
            .fetch_one(&self.pool)
            .await
            .context("Failed to create subscription")?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Subscription>> {
        let sql = format!("SELECT {COLUMNS} FROM subscriptions WHERE id = $1");

        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to find subscription")?;

        Ok(row.map(Into::into))
    }

    async fn update(&self, id: &Uuid, changes: &SubscriptionChanges) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE subscriptions SET ");
        {
            let mut set = builder.separated(", ");
            if let Some(service_name) = &changes.service_name {
                set.push("service_name = ").push_bind_unseparated(service_name.clone());
            }
            if let Some(price) = changes.price {
                set.push("price = ").push_bind_unseparated(price);
            }
            if let Some(start) = changes.start_date {
                set.push("start_date = ").push_bind_unseparated(start.first_day());
            }
            if let Some(end) = changes.end_date {
                set.push("end_date = ").push_bind_unseparated(end.map(NaiveDate::from));
            }
        }
        builder.push(" WHERE id = ").push_bind(*id);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to update subscription")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete subscription")?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, filter: &SubscriptionFilter) -> Result<i64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM subscriptions");
        push_filter(&mut builder, filter);

        builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count subscriptions")
    }

    async fn list(&self, filter: &SubscriptionFilter, page: &PageRequest) -> Result<Vec<Subscription>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM subscriptions"));
        push_filter(&mut builder, filter);
        builder
            .push(" ORDER BY start_date ASC, id ASC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let rows = builder
            .build_query_as::<SubscriptionRow>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list subscriptions")?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_overlapping(
        &self,
        user_id: &Uuid,
        period: &Period,
        service_name: Option<&str>,
    ) -> Result<Vec<Subscription>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM subscriptions"));
        builder
            .push(" WHERE user_id = ")
            .push_bind(*user_id)
            .push(" AND start_date <= ")
            .push_bind(period.end.first_day())
            .push(" AND (end_date IS NULL OR end_date >= ")
            .push_bind(period.start.first_day())
            .push(")");
        if let Some(service_name) = service_name {
            builder.push(" AND service_name = ").push_bind(service_name.to_string());
        }
        builder.push(" ORDER BY start_date ASC, id ASC");

        let rows = builder
            .build_query_as::<SubscriptionRow>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch overlapping subscriptions")?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }
}
