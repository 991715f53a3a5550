use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of the actor performing a request, as asserted by the upstream auth layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Admin,
    Staff,
    /// Machine callers such as gateway webhooks
    System,
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorRole::Admin => write!(f, "admin"),
            ActorRole::Staff => write!(f, "staff"),
            ActorRole::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(ActorRole::Admin),
            "staff" => Ok(ActorRole::Staff),
            "system" => Ok(ActorRole::System),
            other => Err(format!("Unknown actor role: {}", other)),
        }
    }
}

/// Request-scoped identity passed explicitly into every orchestrator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub actor_id: String,
    pub role: ActorRole,
    pub request_id: Option<String>,
}

impl RequestIdentity {
    pub fn new(actor_id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            actor_id: actor_id.into(),
            role,
            request_id: None,
        }
    }

    /// Identity used for gateway-initiated calls
    pub fn system(source: &str) -> Self {
        Self::new(format!("system:{}", source), ActorRole::System)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}
