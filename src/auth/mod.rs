//! Request authentication context.
//!
//! The platform gateway authenticates parents and forwards their identity in
//! headers; this module turns those headers into an explicit [`AuthContext`]
//! value passed into every engine call. The engine never consults ambient
//! session state.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;
use uuid::Uuid;

/// Identity of the caller as asserted by the authentication gateway.
///
/// `parent_id` is `None` for anonymous requests; `admin` grants content
/// access regardless of enrollment but never bypasses pacing or prerequisite
/// ordering when completing lessons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub parent_id: Option<Uuid>,
    pub admin: bool,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self {
            parent_id: None,
            admin: false,
        }
    }

    pub fn parent(parent_id: Uuid) -> Self {
        Self {
            parent_id: Some(parent_id),
            admin: false,
        }
    }

    pub fn admin(parent_id: Uuid) -> Self {
        Self {
            parent_id: Some(parent_id),
            admin: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.parent_id.is_some()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let parent_id = parts
            .headers
            .get("x-parent-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok());
        let admin = parent_id.is_some()
            && parts
                .headers
                .get("x-parent-role")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.eq_ignore_ascii_case("admin"))
                .unwrap_or(false);
        Ok(Self { parent_id, admin })
    }
}
