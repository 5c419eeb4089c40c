//! Settings database access
//!
//! Read/write settings from the settings table (key-value store) and load the
//! staleness thresholds the engine runs with.

use crate::Result;
use chrono::Duration;
use serde::Serialize;
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::warn;

pub const STALE_AFTER_HOURS_KEY: &str = "stale_after_hours";
pub const GRACE_PERIOD_HOURS_KEY: &str = "grace_period_hours";
pub const RATIO_HEALTHY_MAX_KEY: &str = "ratio_healthy_max";
pub const RATIO_RISK_MIN_KEY: &str = "ratio_risk_min";

const DEFAULT_STALE_AFTER_HOURS: i64 = 72;
const DEFAULT_GRACE_PERIOD_HOURS: i64 = 24;
const DEFAULT_RATIO_HEALTHY_MAX: f64 = 15.0;
const DEFAULT_RATIO_RISK_MIN: f64 = 30.0;

/// Timing and ratio limits for the pipeline health engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    /// Idle time after which a lead counts as stale
    #[serde(serialize_with = "serialize_hours")]
    pub stale_after: Duration,
    /// Time a warned owner has to act before the lead can be reclaimed
    #[serde(serialize_with = "serialize_hours")]
    pub grace_period: Duration,
    /// Stock/sales ratio at or below which an owner is healthy
    pub healthy_ratio_max: f64,
    /// Stock/sales ratio above which an owner is at risk
    pub risk_ratio_min: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            stale_after: Duration::hours(DEFAULT_STALE_AFTER_HOURS),
            grace_period: Duration::hours(DEFAULT_GRACE_PERIOD_HOURS),
            healthy_ratio_max: DEFAULT_RATIO_HEALTHY_MAX,
            risk_ratio_min: DEFAULT_RATIO_RISK_MIN,
        }
    }
}

fn serialize_hours<S>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_i64(d.num_hours())
}

/// Load thresholds from the settings table
///
/// Missing rows are written back with defaults. Unparseable or non-positive
/// values are logged and replaced by the default for this run only.
pub async fn load_thresholds(db: &SqlitePool) -> Result<Thresholds> {
    let defaults = Thresholds::default();

    let stale_hours =
        positive_setting(db, STALE_AFTER_HOURS_KEY, DEFAULT_STALE_AFTER_HOURS).await?;
    let grace_hours =
        positive_setting(db, GRACE_PERIOD_HOURS_KEY, DEFAULT_GRACE_PERIOD_HOURS).await?;
    let healthy = positive_setting(db, RATIO_HEALTHY_MAX_KEY, DEFAULT_RATIO_HEALTHY_MAX).await?;
    let risk = positive_setting(db, RATIO_RISK_MIN_KEY, DEFAULT_RATIO_RISK_MIN).await?;

    let (healthy_ratio_max, risk_ratio_min) = if healthy > risk {
        warn!(
            "Ratio thresholds inverted (healthy {} > risk {}), using defaults",
            healthy, risk
        );
        (defaults.healthy_ratio_max, defaults.risk_ratio_min)
    } else {
        (healthy, risk)
    };

    Ok(Thresholds {
        stale_after: Duration::hours(stale_hours),
        grace_period: Duration::hours(grace_hours),
        healthy_ratio_max,
        risk_ratio_min,
    })
}

async fn positive_setting<T>(db: &SqlitePool, key: &str, default: T) -> Result<T>
where
    T: FromStr + ToString + PartialOrd + Default + Copy,
{
    match get_setting_raw(db, key).await? {
        None => {
            set_setting(db, key, default).await?;
            Ok(default)
        }
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) if value > T::default() => Ok(value),
            _ => {
                warn!(
                    "Invalid value {:?} for setting {}, using default {}",
                    raw,
                    key,
                    default.to_string()
                );
                Ok(default)
            }
        },
    }
}

/// Read a typed setting; `None` when missing, NULL or unparseable
pub async fn get_setting<T: FromStr>(db: &SqlitePool, key: &str) -> Result<Option<T>> {
    Ok(get_setting_raw(db, key)
        .await?
        .and_then(|raw| raw.trim().parse::<T>().ok()))
}

async fn get_setting_raw(db: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    Ok(value.flatten())
}

/// Insert or replace a setting
pub async fn set_setting<T: ToString>(db: &SqlitePool, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}
