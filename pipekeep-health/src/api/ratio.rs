//! Ownership ratio endpoint

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use pipekeep_common::Error;
use serde::Deserialize;

use super::ApiError;
use crate::ratio::{ownership_report, OwnershipReport, ReportPeriod};
use crate::AppState;

/// Both bounds or neither; neither means the current calendar month
#[derive(Debug, Deserialize)]
pub struct RatioQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl RatioQuery {
    fn period(&self, now: DateTime<Utc>) -> Result<ReportPeriod, Error> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => ReportPeriod::new(from, to),
            (None, None) => Ok(ReportPeriod::month_of(now)),
            _ => Err(Error::InvalidInput(
                "Both 'from' and 'to' are required for a custom period".to_string(),
            )),
        }
    }
}

/// GET /api/ratio
pub async fn get_ratio(
    State(state): State<AppState>,
    query: Result<Query<RatioQuery>, QueryRejection>,
) -> Result<Json<OwnershipReport>, ApiError> {
    let Query(query) = query?;
    let period = query.period(state.ctx.now())?;
    let report = ownership_report(&state.ctx, period).await?;
    Ok(Json(report))
}
