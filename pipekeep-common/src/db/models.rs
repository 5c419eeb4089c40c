//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

/// Owner value held by leads that nobody is working
pub const UNASSIGNED_OWNER: &str = "Unassigned";

/// Names that never represent a real seller
const RESERVED_OWNER_NAMES: &[&str] = &[UNASSIGNED_OWNER, "System", "Admin"];

/// True for the sentinel and the reserved system names (case-insensitive)
pub fn is_reserved_owner(name: &str) -> bool {
    let name = name.trim();
    name.is_empty()
        || RESERVED_OWNER_NAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Position of a lead in the sales pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Intake state; evicted leads return here
    New,
    Contacted,
    Qualified,
    ProposalSent,
    Negotiating,
    /// Parked for later; owned but not actively worked
    Nurture,
    Won,
    Lost,
}

impl PipelineStatus {
    /// Statuses a seller is actively working. Only these are ever warned or evicted.
    pub const SELLER_WORKING: [PipelineStatus; 5] = [
        PipelineStatus::New,
        PipelineStatus::Contacted,
        PipelineStatus::Qualified,
        PipelineStatus::ProposalSent,
        PipelineStatus::Negotiating,
    ];

    /// Status assigned on eviction
    pub const INTAKE: PipelineStatus = PipelineStatus::New;

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::New => "new",
            PipelineStatus::Contacted => "contacted",
            PipelineStatus::Qualified => "qualified",
            PipelineStatus::ProposalSent => "proposal_sent",
            PipelineStatus::Negotiating => "negotiating",
            PipelineStatus::Nurture => "nurture",
            PipelineStatus::Won => "won",
            PipelineStatus::Lost => "lost",
        }
    }

    pub fn is_seller_working(&self) -> bool {
        Self::SELLER_WORKING.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Won | PipelineStatus::Lost)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(PipelineStatus::New),
            "contacted" => Ok(PipelineStatus::Contacted),
            "qualified" => Ok(PipelineStatus::Qualified),
            "proposal_sent" => Ok(PipelineStatus::ProposalSent),
            "negotiating" => Ok(PipelineStatus::Negotiating),
            "nurture" => Ok(PipelineStatus::Nurture),
            "won" => Ok(PipelineStatus::Won),
            "lost" => Ok(PipelineStatus::Lost),
            other => Err(Error::InvalidInput(format!(
                "Unknown pipeline status: {}",
                other
            ))),
        }
    }
}

/// A tracked ownership record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    /// Named owner or [`UNASSIGNED_OWNER`]
    pub owner: String,
    pub status: PipelineStatus,
    pub warning_sent: bool,
    /// Only meaningful while `warning_sent` is true
    pub warning_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    /// Scheduled interaction this lead is waiting on, if any
    pub next_touch_id: Option<Uuid>,
    /// When the lead reached a terminal status
    pub closed_at: Option<DateTime<Utc>>,
    pub notes: String,
}

impl Lead {
    /// Fresh lead in the intake state
    pub fn new(owner: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            status: PipelineStatus::INTAKE,
            warning_sent: false,
            warning_date: None,
            created_at,
            last_update: created_at,
            next_touch_id: None,
            closed_at: None,
            notes: String::new(),
        }
    }

    pub fn is_unassigned(&self) -> bool {
        self.owner == UNASSIGNED_OWNER
    }

    /// Warned but missing the warning timestamp
    pub fn has_warning_anomaly(&self) -> bool {
        self.warning_sent && self.warning_date.is_none()
    }
}

/// Role tag from the owner directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerRole {
    Seller,
    Manager,
    Admin,
}

impl OwnerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerRole::Seller => "seller",
            OwnerRole::Manager => "manager",
            OwnerRole::Admin => "admin",
        }
    }

    /// Roles that carry their own lead stock
    pub fn holds_stock(&self) -> bool {
        matches!(self, OwnerRole::Seller | OwnerRole::Manager)
    }
}

impl FromStr for OwnerRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "seller" => Ok(OwnerRole::Seller),
            "manager" => Ok(OwnerRole::Manager),
            "admin" => Ok(OwnerRole::Admin),
            other => Err(Error::InvalidInput(format!("Unknown owner role: {}", other))),
        }
    }
}

/// Owner directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    pub role: OwnerRole,
}

/// Next relevant future interaction for a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Touchpoint {
    pub has_future_touch: bool,
    pub next_touch_at: Option<DateTime<Utc>>,
}

impl Touchpoint {
    pub fn scheduled(at: DateTime<Utc>) -> Self {
        Self {
            has_future_touch: true,
            next_touch_at: Some(at),
        }
    }

    /// Touchpoint still lies ahead of `now`
    pub fn protects_at(&self, now: DateTime<Utc>) -> bool {
        match self.next_touch_at {
            Some(at) => self.has_future_touch && at >= now,
            None => false,
        }
    }
}
