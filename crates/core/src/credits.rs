//! Fixed-point credit amounts and the per-tenant rate table.
//!
//! Balances and rates are stored as hundredths of a credit so that the
//! default email rate of 0.5 is exact and ledger deltas never drift.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Sub};

use crate::types::Channel;

const SCALE: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct Credits(i64);

impl Credits {
    pub const ZERO: Credits = Credits(0);

    pub const fn from_cents(cents: i64) -> Self {
        Credits(cents)
    }

    /// Saturates at the representable range instead of overflowing.
    pub const fn whole(units: i64) -> Self {
        Credits(units.saturating_mul(SCALE))
    }

    /// Rounds to the nearest hundredth.
    pub fn from_f64(value: f64) -> Self {
        Credits((value * SCALE as f64).round() as i64)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Whole credits, rounded down.
    pub fn floor_units(&self) -> i64 {
        self.0.div_euclid(SCALE)
    }

    pub fn times(&self, count: u64) -> Credits {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        Credits(self.0.saturating_mul(count))
    }

    /// Multiplies by another fixed-point amount (e.g. an amount by a
    /// conversion rate), truncating toward zero.
    pub fn scale_by(&self, rate: Credits) -> Credits {
        let scaled = self.0 as i128 * rate.0 as i128 / SCALE as i128;
        Credits(scaled.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }
}

impl Add for Credits {
    type Output = Credits;

    fn add(self, rhs: Credits) -> Credits {
        Credits(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Credits {
    type Output = Credits;

    fn sub(self, rhs: Credits) -> Credits {
        Credits(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}{}.{:02}", sign, abs / SCALE, abs % SCALE)
    }
}

impl Serialize for Credits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Credits {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        if !value.is_finite() {
            return Err(serde::de::Error::custom("credit amount must be finite"));
        }
        Ok(Credits::from_f64(value))
    }
}

/// Result of an affordability check for `count` sends on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Affordability {
    pub approved: bool,
    pub total_cost: Credits,
    pub affordable_count: u64,
}

/// Approves iff `balance >= rate * count`. On rejection the caller learns
/// how many sends the balance would cover.
pub fn check_affordable(balance: Credits, rate: Credits, count: u64) -> Affordability {
    let total_cost = rate.times(count);
    let affordable_count = if rate.cents() <= 0 {
        count
    } else if balance.cents() <= 0 {
        0
    } else {
        (balance.cents() / rate.cents()) as u64
    };
    Affordability {
        approved: balance >= total_cost,
        total_cost,
        affordable_count,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    pub sms: Credits,
    pub email: Credits,
    pub whatsapp: Credits,
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            sms: Credits::whole(1),
            email: Credits::from_cents(50),
            whatsapp: Credits::whole(1),
        }
    }
}

impl RateTable {
    pub fn rate(&self, channel: Channel) -> Credits {
        match channel {
            Channel::Sms => self.sms,
            Channel::Email => self.email,
            Channel::Whatsapp => self.whatsapp,
        }
    }

    pub fn cost(&self, channel: Channel, count: u64) -> Credits {
        self.rate(channel).times(count)
    }
}
