//! Ownership ratio report
//!
//! Read-only: compares how many open leads each owner sits on with how many
//! they converted in a reporting period. Never feeds back into the
//! warn/evict lifecycle.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use pipekeep_common::db::is_reserved_owner;
use pipekeep_common::{Error, Lead, Owner, Result, Thresholds};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;
use uuid::Uuid;

use crate::classifier::classify;
use crate::context::PipelineContext;
use crate::providers::{ReadModels, SaleEvent};
use crate::store::LeadFilter;

/// Half-open reporting window `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportPeriod {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl ReportPeriod {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from >= to {
            return Err(Error::InvalidInput(format!(
                "Report period must start before it ends ({} >= {})",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    /// Calendar month (UTC) containing `now`
    pub fn month_of(now: DateTime<Utc>) -> Self {
        let from = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now);
        let (year, month) = if now.month() == 12 {
            (now.year() + 1, 1)
        } else {
            (now.year(), now.month() + 1)
        };
        let to = Utc
            .with_ymd_and_hms(year, month, 1, 0, 0, 0)
            .single()
            .unwrap_or(now + Duration::days(31));
        Self { from, to }
    }

    /// The `days` days leading up to `now`
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Result<Self> {
        Self::new(now - Duration::days(days), now)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }
}

/// Owner standing by stock/sales ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioHealth {
    Healthy,
    Neutral,
    Risk,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerRatio {
    pub owner: String,
    /// Open (non-terminal) leads currently owned
    pub stock: usize,
    pub period_sales: usize,
    pub ratio: f64,
    pub health: RatioHealth,
    /// Owned working leads currently classified stale
    pub stale: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnershipReport {
    pub period: ReportPeriod,
    pub generated_at: DateTime<Utc>,
    pub owners: Vec<OwnerRatio>,
    /// Stale counts could not be computed
    pub degraded: bool,
}

/// `stock / sales`, or the raw stock when nothing sold
pub fn ratio_of(stock: usize, period_sales: usize) -> f64 {
    if period_sales > 0 {
        stock as f64 / period_sales as f64
    } else {
        stock as f64
    }
}

pub fn rate(stock: usize, period_sales: usize, thresholds: &Thresholds) -> RatioHealth {
    if period_sales == 0 && stock > 0 {
        return RatioHealth::Risk;
    }
    let ratio = ratio_of(stock, period_sales);
    if ratio <= thresholds.healthy_ratio_max {
        RatioHealth::Healthy
    } else if ratio > thresholds.risk_ratio_min {
        RatioHealth::Risk
    } else {
        RatioHealth::Neutral
    }
}

/// Fold owners, leads and sales into per-owner rows sorted by name
///
/// `stale_ids` are the leads the classifier currently reports as stale.
pub fn aggregate(
    directory: &[Owner],
    leads: &[Lead],
    sales: &[SaleEvent],
    stale_ids: &BTreeSet<Uuid>,
    period: &ReportPeriod,
    thresholds: &Thresholds,
) -> Vec<OwnerRatio> {
    let mut names: BTreeSet<String> = BTreeSet::new();
    names.extend(
        directory
            .iter()
            .filter(|o| o.role.holds_stock())
            .map(|o| o.name.clone()),
    );
    names.extend(leads.iter().map(|l| l.owner.clone()));
    names.extend(sales.iter().map(|s| s.owner.clone()));
    names.retain(|name| !is_reserved_owner(name));

    let mut stock: BTreeMap<&str, usize> = BTreeMap::new();
    let mut stale: BTreeMap<&str, usize> = BTreeMap::new();
    for lead in leads.iter().filter(|l| !l.status.is_terminal()) {
        *stock.entry(lead.owner.as_str()).or_default() += 1;
        if stale_ids.contains(&lead.id) {
            *stale.entry(lead.owner.as_str()).or_default() += 1;
        }
    }

    let mut sold: BTreeMap<&str, usize> = BTreeMap::new();
    for sale in sales.iter().filter(|s| period.contains(s.sold_at)) {
        *sold.entry(sale.owner.as_str()).or_default() += 1;
    }

    names
        .into_iter()
        .map(|owner| {
            let stock = stock.get(owner.as_str()).copied().unwrap_or(0);
            let period_sales = sold.get(owner.as_str()).copied().unwrap_or(0);
            OwnerRatio {
                stock,
                period_sales,
                ratio: ratio_of(stock, period_sales),
                health: rate(stock, period_sales, thresholds),
                stale: stale.get(owner.as_str()).copied().unwrap_or(0),
                owner,
            }
        })
        .collect()
}

/// Build the report for `period` from the context's store and sources
pub async fn ownership_report(
    ctx: &PipelineContext,
    period: ReportPeriod,
) -> Result<OwnershipReport> {
    let now = ctx.now();
    let directory = ctx.owners.owners().await?;
    let leads = ctx.store.fetch_filtered(&LeadFilter::assigned()).await?;
    let sales = ctx.sales.sales_between(period.from, period.to).await?;

    let working: Vec<&Lead> = leads
        .iter()
        .filter(|l| l.status.is_seller_working())
        .collect();
    let ids: Vec<Uuid> = working.iter().map(|l| l.id).collect();

    let (stale_ids, degraded) = match ctx.read_models(&ids).await {
        Ok(models) => (stale_leads(&working, &models, now, &ctx.thresholds), false),
        Err(e) => {
            warn!("Read-models unavailable, ratio report without stale counts: {}", e);
            (BTreeSet::new(), true)
        }
    };

    Ok(OwnershipReport {
        period,
        generated_at: now,
        owners: aggregate(&directory, &leads, &sales, &stale_ids, &period, &ctx.thresholds),
        degraded,
    })
}

fn stale_leads(
    leads: &[&Lead],
    models: &ReadModels,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> BTreeSet<Uuid> {
    leads
        .iter()
        .filter(|l| classify(l, &models.signals(&l.id), now, thresholds).is_stale())
        .map(|l| l.id)
        .collect()
}
