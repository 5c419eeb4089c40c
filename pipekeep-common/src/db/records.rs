//! Lead, activity, touchpoint and owner records
//!
//! Row mapping shared by the engine's store plus the write paths used by
//! intake and scheduling. Warning and ownership fields are NOT written here;
//! only the engine's conditional updates touch those.

use crate::db::models::{Lead, Owner, OwnerRole, PipelineStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Column list matching [`lead_from_row`]
pub const LEAD_COLUMNS: &str = "guid, owner, status, warning_sent, warning_date, \
     created_at, last_update, next_touch_id, closed_at, notes";

/// Map a `leads` row selected with [`LEAD_COLUMNS`]
pub fn lead_from_row(row: &SqliteRow) -> Result<Lead> {
    let status: String = row.try_get("status")?;
    let next_touch_id: Option<String> = row.try_get("next_touch_id")?;

    Ok(Lead {
        id: parse_guid(&row.try_get::<String, _>("guid")?)?,
        owner: row.try_get("owner")?,
        status: status.parse::<PipelineStatus>()?,
        warning_sent: row.try_get("warning_sent")?,
        warning_date: row.try_get("warning_date")?,
        created_at: row.try_get("created_at")?,
        last_update: row.try_get("last_update")?,
        next_touch_id: next_touch_id.as_deref().map(parse_guid).transpose()?,
        closed_at: row.try_get("closed_at")?,
        notes: row.try_get("notes")?,
    })
}

/// Parse a TEXT guid column
pub fn parse_guid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Internal(format!("Invalid guid {:?}: {}", raw, e)))
}

/// Insert a lead as intake would create it
pub async fn insert_lead(db: &SqlitePool, lead: &Lead) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO leads (guid, owner, status, warning_sent, warning_date,
                           created_at, last_update, next_touch_id, closed_at, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(lead.id.to_string())
    .bind(&lead.owner)
    .bind(lead.status.as_str())
    .bind(lead.warning_sent)
    .bind(lead.warning_date)
    .bind(lead.created_at)
    .bind(lead.last_update)
    .bind(lead.next_touch_id.map(|id| id.to_string()))
    .bind(lead.closed_at)
    .bind(&lead.notes)
    .execute(db)
    .await?;

    Ok(())
}

/// Append an engagement record (call, message, status change...)
pub async fn record_activity(
    db: &SqlitePool,
    lead_id: Uuid,
    kind: &str,
    occurred_at: DateTime<Utc>,
) -> Result<Uuid> {
    let guid = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO lead_activities (guid, lead_id, kind, occurred_at) VALUES (?, ?, ?, ?)",
    )
    .bind(guid.to_string())
    .bind(lead_id.to_string())
    .bind(kind)
    .bind(occurred_at)
    .execute(db)
    .await?;

    Ok(guid)
}

/// Schedule an interaction and make it the lead's next touchpoint
///
/// Both writes share one transaction.
pub async fn schedule_touchpoint(
    db: &SqlitePool,
    lead_id: Uuid,
    kind: &str,
    scheduled_at: DateTime<Utc>,
) -> Result<Uuid> {
    let guid = Uuid::new_v4();
    let mut tx = db.begin().await?;

    sqlx::query(
        "INSERT INTO touchpoints (guid, lead_id, kind, scheduled_at) VALUES (?, ?, ?, ?)",
    )
    .bind(guid.to_string())
    .bind(lead_id.to_string())
    .bind(kind)
    .bind(scheduled_at)
    .execute(&mut *tx)
    .await?;

    let updated = sqlx::query("UPDATE leads SET next_touch_id = ? WHERE guid = ?")
        .bind(guid.to_string())
        .bind(lead_id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if updated == 0 {
        return Err(Error::NotFound(format!("Lead {}", lead_id)));
    }

    tx.commit().await?;
    Ok(guid)
}

/// Cancel a scheduled touchpoint; it no longer protects its lead
pub async fn cancel_touchpoint(db: &SqlitePool, touchpoint_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE touchpoints SET cancelled = 1 WHERE guid = ?")
        .bind(touchpoint_id.to_string())
        .execute(db)
        .await?;
    Ok(())
}

/// Move a lead to a terminal status (sale or loss)
pub async fn close_lead(
    db: &SqlitePool,
    lead_id: Uuid,
    status: PipelineStatus,
    closed_at: DateTime<Utc>,
) -> Result<()> {
    if !status.is_terminal() {
        return Err(Error::InvalidInput(format!(
            "{} is not a terminal status",
            status
        )));
    }

    sqlx::query("UPDATE leads SET status = ?, closed_at = ?, last_update = ? WHERE guid = ?")
        .bind(status.as_str())
        .bind(closed_at)
        .bind(closed_at)
        .bind(lead_id.to_string())
        .execute(db)
        .await?;
    Ok(())
}

/// Add or update an owner directory entry
pub async fn upsert_owner(db: &SqlitePool, name: &str, role: OwnerRole) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO owners (name, role, active) VALUES (?, ?, 1)
        ON CONFLICT(name) DO UPDATE SET role = excluded.role, active = 1
        "#,
    )
    .bind(name)
    .bind(role.as_str())
    .execute(db)
    .await?;
    Ok(())
}

/// Active owners in the directory
pub async fn list_owners(db: &SqlitePool) -> Result<Vec<Owner>> {
    let rows = sqlx::query("SELECT name, role FROM owners WHERE active = 1 ORDER BY name")
        .fetch_all(db)
        .await?;

    rows.iter()
        .map(|row| {
            let role: String = row.try_get("role")?;
            Ok(Owner {
                name: row.try_get("name")?,
                role: role.parse()?,
            })
        })
        .collect()
}
