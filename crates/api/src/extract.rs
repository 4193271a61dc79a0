//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{ActorId, TenantId};

use crate::error::ApiError;

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const TENANT_HEADER: &str = "x-tenant-id";

/// The actor and tenant a request is made on behalf of.
///
/// Taken from the `X-Actor-Id` and `X-Tenant-Id` headers, which an upstream
/// authenticating proxy is expected to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub actor_id: ActorId,
    pub tenant_id: TenantId,
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            actor_id: header(parts, ACTOR_HEADER)?,
            tenant_id: header(parts, TENANT_HEADER)?,
        })
    }
}

fn header<T: std::str::FromStr>(parts: &Parts, name: &str) -> Result<T, ApiError> {
    let value = parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("malformed {name} header")))
}
