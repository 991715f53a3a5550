use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};
use std::str::FromStr;

use super::request_id::RequestIdValue;
use crate::core::{ActorRole, AppError, RequestIdentity};

pub const ACTOR_ID_HEADER: &str = "X-Actor-Id";
pub const ACTOR_ROLE_HEADER: &str = "X-Actor-Role";

/// Builds the caller identity from headers set by the upstream auth layer
///
/// `system` is reserved for in-process callers and is refused here.
impl FromRequest for RequestIdentity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(identity_from_request(req))
    }
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn identity_from_request(req: &HttpRequest) -> Result<RequestIdentity, AppError> {
    let actor_id = header(req, ACTOR_ID_HEADER)
        .ok_or_else(|| AppError::unauthorized(format!("Missing {} header", ACTOR_ID_HEADER)))?;

    let role = header(req, ACTOR_ROLE_HEADER)
        .ok_or_else(|| AppError::unauthorized(format!("Missing {} header", ACTOR_ROLE_HEADER)))
        .and_then(|raw| ActorRole::from_str(raw).map_err(AppError::unauthorized))?;

    if role == ActorRole::System {
        return Err(AppError::unauthorized("System role cannot be asserted over HTTP"));
    }

    let mut identity = RequestIdentity::new(actor_id, role);
    if let Some(request_id) = req.extensions().get::<RequestIdValue>() {
        identity = identity.with_request_id(request_id.0.clone());
    }

    Ok(identity)
}
