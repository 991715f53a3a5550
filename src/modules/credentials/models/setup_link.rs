use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Single-use, expiring set-password link for a paid student
///
/// Only the SHA-256 hash of the token is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SetupLink {
    pub id: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub student_id: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    /// Set when a newer link was issued before this one was redeemed
    pub superseded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Why a link cannot be redeemed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Redeemable,
    Used,
    Superseded,
    Expired,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Redeemable => write!(f, "redeemable"),
            LinkState::Used => write!(f, "used"),
            LinkState::Superseded => write!(f, "superseded"),
            LinkState::Expired => write!(f, "expired"),
        }
    }
}

impl SetupLink {
    pub fn new(student_id: &str, token_hash: String, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            token_hash,
            student_id: student_id.to_string(),
            expires_at: now + ttl,
            used_at: None,
            superseded_at: None,
            created_at: now,
        }
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> LinkState {
        if self.used_at.is_some() {
            LinkState::Used
        } else if self.superseded_at.is_some() {
            LinkState::Superseded
        } else if now >= self.expires_at {
            LinkState::Expired
        } else {
            LinkState::Redeemable
        }
    }

    /// Unused and not yet replaced; expiry is irrelevant for superseding
    pub fn is_outstanding(&self) -> bool {
        self.used_at.is_none() && self.superseded_at.is_none()
    }
}
