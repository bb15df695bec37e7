use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub static X_TENANT: &str = "x-tenant";
pub static X_ROLE: &str = "x-role";

const DEFAULT_TENANT: &str = "default";

/// Who is calling, as far as task visibility is concerned.
///
/// Authentication happens in front of this service; the gateway forwards the
/// tenant and role as headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub tenant: String,
    pub admin: bool,
}

impl Caller {
    /// Tenant filter for store queries; admins see every tenant.
    pub fn visibility(&self) -> Option<&str> {
        if self.admin { None } else { Some(&self.tenant) }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        Ok(Caller {
            tenant: header(X_TENANT).unwrap_or(DEFAULT_TENANT).to_owned(),
            admin: header(X_ROLE).is_some_and(|role| role.eq_ignore_ascii_case("admin")),
        })
    }
}
