use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use reqwest::Url;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::{AppError, RequestIdentity, Result};
use crate::modules::credentials::models::SetupLink;
use crate::modules::enrollment::EnrollmentStore;

/// Raw token length before hex encoding
pub const TOKEN_BYTES: usize = 32;

pub const DEFAULT_TTL_HOURS: i64 = 72;

/// Body returned by `POST /credential/setup-link`
///
/// `url` embeds the raw token; it is shown once and never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSetupLink {
    pub student_id: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Body returned by `POST /credential/redeem`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemedSetupLink {
    pub student_id: String,
}

/// Credential issuer
pub struct CredentialIssuer {
    store: Arc<dyn EnrollmentStore>,
    base_url: Url,
    ttl: Duration,
}

impl CredentialIssuer {
    pub fn new(store: Arc<dyn EnrollmentStore>, base_url: &str, ttl: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            AppError::Configuration(format!("Invalid setup link base URL '{}': {}", base_url, e))
        })?;

        if ttl <= Duration::zero() {
            return Err(AppError::Configuration(
                "Setup link TTL must be positive".to_string(),
            ));
        }

        Ok(Self {
            store,
            base_url,
            ttl,
        })
    }

    /// Mint a set-password link for a paid student, superseding older ones
    pub async fn issue_setup_link(
        &self,
        identity: &RequestIdentity,
        student_id: &str,
    ) -> Result<IssuedSetupLink> {
        let student_id = student_id.trim();
        if student_id.is_empty() {
            return Err(AppError::validation("studentId is required"));
        }

        let token = generate_token();
        let now = Utc::now();
        let link = SetupLink::new(student_id, hash_token(&token), self.ttl, now);

        let issued = self.store.issue_setup_link(&link, now).await.inspect_err(|e| {
            if matches!(e, AppError::PaymentRequired(_)) {
                tracing::warn!(
                    student_id,
                    actor_id = %identity.actor_id,
                    "Setup link refused: student has not paid"
                );
            }
        })?;

        tracing::info!(
            student_id,
            link_id = %issued.link.id,
            superseded = issued.superseded,
            expires_at = %issued.link.expires_at,
            actor_id = %identity.actor_id,
            "Setup link issued"
        );

        Ok(IssuedSetupLink {
            student_id: issued.link.student_id,
            url: self.link_url(&token),
            expires_at: issued.link.expires_at,
        })
    }

    /// Consume a token; fails unless the link is unused, current and unexpired
    pub async fn redeem_setup_link(&self, token: &str) -> Result<RedeemedSetupLink> {
        let token = token.trim();
        if token.len() != TOKEN_BYTES * 2 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AppError::not_found("Setup link not found"));
        }

        let link = self
            .store
            .redeem_setup_link(&hash_token(&token.to_ascii_lowercase()), Utc::now())
            .await
            .inspect_err(|e| {
                if let AppError::InvalidState { id, current, .. } = e {
                    tracing::warn!(link_id = %id, state = %current, "Setup link redemption refused");
                }
            })?;

        tracing::info!(student_id = %link.student_id, link_id = %link.id, "Setup link redeemed");

        Ok(RedeemedSetupLink {
            student_id: link.student_id,
        })
    }

    fn link_url(&self, token: &str) -> String {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("token", token);
        url.to_string()
    }
}

/// 32 bytes from the OS CSPRNG, hex encoded
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 hex digest; the only form of the token that is persisted
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
