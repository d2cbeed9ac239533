use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::Month;

/// Months during which a subscription is billable, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveInterval {
    Bounded { start: Month, end: Month },
    OpenEnded { start: Month },
}

impl ActiveInterval {
    /// Build an interval without checking that `end >= start`.
    ///
    /// Used for rows read back from storage, which may predate the check.
    pub fn from_parts(start: Month, end: Option<Month>) -> Self {
        match end {
            Some(end) => Self::Bounded { start, end },
            None => Self::OpenEnded { start },
        }
    }

    /// Build an interval, rejecting an end month before the start month.
    pub fn checked(start: Month, end: Option<Month>) -> Option<Self> {
        match end {
            Some(end) if end < start => None,
            _ => Some(Self::from_parts(start, end)),
        }
    }

    pub fn start(&self) -> Month {
        match *self {
            Self::Bounded { start, .. } | Self::OpenEnded { start } => start,
        }
    }

    pub fn end(&self) -> Option<Month> {
        match *self {
            Self::Bounded { end, .. } => Some(end),
            Self::OpenEnded { .. } => None,
        }
    }

    pub fn is_open_ended(&self) -> bool {
        matches!(self, Self::OpenEnded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: Uuid,
    pub service_name: String,
    pub price: i64,
    pub user_id: Uuid,
    pub interval: ActiveInterval,
}

/// Fields staged by a partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    pub service_name: Option<String>,
    pub price: Option<i64>,
    pub start_date: Option<Month>,
    /// `Some(None)` clears the end date.
    pub end_date: Option<Option<Month>>,
}

impl SubscriptionChanges {
    pub fn is_empty(&self) -> bool {
        self.service_name.is_none()
            && self.price.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }

    /// Apply the staged fields to a copy of `current`.
    pub fn apply_to(&self, current: &Subscription) -> Subscription {
        let start = self.start_date.unwrap_or_else(|| current.interval.start());
        let end = self.end_date.unwrap_or_else(|| current.interval.end());

        Subscription {
            id: current.id,
            service_name: self
                .service_name
                .clone()
                .unwrap_or_else(|| current.service_name.clone()),
            price: self.price.unwrap_or(current.price),
            user_id: current.user_id,
            interval: ActiveInterval::from_parts(start, end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub id: Uuid,
    pub service_name: String,
    pub price: i64,
    pub user_id: Uuid,
    pub start_date: Month,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Month>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(subscription: Subscription) -> Self {
        Self {
            id: subscription.id,
            service_name: subscription.service_name,
            price: subscription.price,
            user_id: subscription.user_id,
            start_date: subscription.interval.start(),
            end_date: subscription.interval.end(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    pub service_name: String,
    #[validate(range(min = 0, message = "price must not be negative"))]
    pub price: i64,
    pub user_id: String,
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateSubscriptionRequest {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, message = "price must not be negative"))]
    pub price: Option<i64>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    /// Absent keeps the end date, `null` clears it.
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub end_date: Option<Option<String>>,
}

/// Raw list query parameters; numbers stay strings so bad values can fall back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSubscriptionsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub user_id: Option<String>,
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SumQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumResponse {
    pub sum: i64,
}
