//! Plan and billing metadata carried on every API response.

use std::str::FromStr;

use reqwest::header::HeaderMap;
use serde::Serialize;
use strum_macros::{AsRefStr, Display};

pub const PLAN_HEADER: &str = "x-ratelimit-plan";
pub const BILLING_TYPE_HEADER: &str = "x-billing-type";
pub const LIMIT_DAY_HEADER: &str = "x-ratelimit-limit-day";
pub const REMAINING_DAY_HEADER: &str = "x-ratelimit-remaining-day";
pub const LIMIT_MINUTE_HEADER: &str = "x-ratelimit-limit-minute";
pub const REMAINING_MINUTE_HEADER: &str = "x-ratelimit-remaining-minute";
pub const CREDIT_BALANCE_CENTS_HEADER: &str = "x-credit-balance-cents";
pub const CREDIT_BALANCE_HEADER: &str = "x-credit-balance";
pub const REQUEST_COST_CENTS_HEADER: &str = "x-request-cost-cents";
pub const REQUEST_COST_HEADER: &str = "x-request-cost";

/// Accounting scheme declared by the server.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BillingType {
    /// Fixed daily and per-minute quotas
    #[default]
    Subscription,
    /// Prepaid balance debited per request
    Credits,
}

impl BillingType {
    /// Unrecognized values fall back to [`BillingType::Subscription`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("credits") {
            Self::Credits
        } else {
            Self::Subscription
        }
    }
}

/// Mode-specific quota or balance figures.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "billing_type", rename_all = "lowercase")]
pub enum Billing {
    Subscription {
        limit_day: Option<u64>,
        remaining_day: Option<u64>,
        limit_minute: Option<u64>,
        remaining_minute: Option<u64>,
    },
    Credits {
        credit_balance_cents: Option<i64>,
        /// Server-formatted balance, e.g. `$12.34`
        credit_balance: Option<String>,
        request_cost_cents: Option<i64>,
        /// Server-formatted cost, e.g. `$0.01`
        request_cost: Option<String>,
    },
}

/// Rate-limit snapshot parsed from the headers of a single response.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    /// Plan name, e.g. `free`, `pro`, `business`
    pub plan: String,
    #[serde(flatten)]
    pub billing: Billing,
}

impl RateLimitInfo {
    /// Parses rate-limit headers. Returns `None` when the server sent no plan header.
    ///
    /// A present but malformed numeric header is logged and left out of the snapshot; it
    /// never fails the surrounding response.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let plan = header_str(headers, PLAN_HEADER).filter(|plan| !plan.is_empty())?;

        let billing_type = header_str(headers, BILLING_TYPE_HEADER)
            .map(BillingType::parse)
            .unwrap_or_default();

        let billing = match billing_type {
            BillingType::Credits => Billing::Credits {
                credit_balance_cents: header_num(headers, CREDIT_BALANCE_CENTS_HEADER),
                credit_balance: header_str(headers, CREDIT_BALANCE_HEADER).map(ToOwned::to_owned),
                request_cost_cents: header_num(headers, REQUEST_COST_CENTS_HEADER),
                request_cost: header_str(headers, REQUEST_COST_HEADER).map(ToOwned::to_owned),
            },
            BillingType::Subscription => Billing::Subscription {
                limit_day: header_num(headers, LIMIT_DAY_HEADER),
                remaining_day: header_num(headers, REMAINING_DAY_HEADER),
                limit_minute: header_num(headers, LIMIT_MINUTE_HEADER),
                remaining_minute: header_num(headers, REMAINING_MINUTE_HEADER),
            },
        };

        Some(Self {
            plan: plan.to_owned(),
            billing,
        })
    }

    #[must_use]
    pub fn billing_type(&self) -> BillingType {
        match self.billing {
            Billing::Subscription { .. } => BillingType::Subscription,
            Billing::Credits { .. } => BillingType::Credits,
        }
    }

    /// Requests left today, for subscription billing.
    #[must_use]
    pub fn remaining_day(&self) -> Option<u64> {
        match self.billing {
            Billing::Subscription { remaining_day, .. } => remaining_day,
            Billing::Credits { .. } => None,
        }
    }

    /// Requests left this minute, for subscription billing.
    #[must_use]
    pub fn remaining_minute(&self) -> Option<u64> {
        match self.billing {
            Billing::Subscription {
                remaining_minute, ..
            } => remaining_minute,
            Billing::Credits { .. } => None,
        }
    }

    /// Remaining balance in cents, for credit billing.
    #[must_use]
    pub fn credit_balance_cents(&self) -> Option<i64> {
        match self.billing {
            Billing::Credits {
                credit_balance_cents,
                ..
            } => credit_balance_cents,
            Billing::Subscription { .. } => None,
        }
    }
}

fn header_str<'headers>(headers: &'headers HeaderMap, name: &str) -> Option<&'headers str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn header_num<T: FromStr>(headers: &HeaderMap, name: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = header_str(headers, name)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(header = name, value = raw, error = %e, "ignoring malformed rate-limit header");
            #[cfg(not(feature = "tracing"))]
            let _: &T::Err = &e;
            None
        }
    }
}
