use crate::error::HandlerErr;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id: String,
    role: Role,
    exp: i64,
}

/// HS256 keys for signing and verifying bearer tokens.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn issue(
        &self,
        user: &AuthenticatedUser,
        ttl: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_until(user, Utc::now().timestamp() + ttl.as_secs() as i64)
    }

    /// Signs a token expiring at `exp` (seconds since the Unix epoch).
    pub fn issue_until(
        &self,
        user: &AuthenticatedUser,
        exp: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            id: user.id.clone(),
            role: user.role,
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, HandlerErr> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            HandlerErr::unauthenticated("invalid token")
        })?;
        Ok(AuthenticatedUser {
            id: data.claims.id,
            role: data.claims.role,
        })
    }
}

/// Admits a request carrying `credential` (an `Authorization` header value)
/// when its role is in `allowed`. An empty `allowed` admits any role.
pub fn admit(
    keys: &TokenKeys,
    credential: Option<&str>,
    allowed: &[Role],
) -> Result<AuthenticatedUser, HandlerErr> {
    let Some(header) = credential.map(str::trim).filter(|s| !s.is_empty()) else {
        return Err(HandlerErr::unauthenticated("missing token"));
    };
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| HandlerErr::unauthenticated("expected a bearer token"))?;
    let user = keys.verify(token)?;
    if !allowed.is_empty() && !allowed.contains(&user.role) {
        debug!(user_id = %user.id, role = ?user.role, "role not permitted");
        return Err(HandlerErr::forbidden("access denied"));
    }
    Ok(user)
}
