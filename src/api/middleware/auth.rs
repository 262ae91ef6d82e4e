//! Bearer tokens and the middleware that resolves them into an [`Actor`].
//!
//! A token is `kind.id.expiry.signature`: `kind` is `user` or `employee`, `expiry` is a unix
//! timestamp in seconds, and `signature` is the hex HMAC-SHA256 of everything before it.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use http::header::AUTHORIZATION;
use ring::hmac::{self, Key};
use thiserror::Error;

use crate::api::server::{AppState, RouteError};
use crate::constants::BEARER_PREFIX;
use crate::db::prelude::{Actor, EmployeeId, StoreError, UserId};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("malformed bearer token")]
    Malformed,

    #[error("invalid token signature")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("token subject no longer exists")]
    UnknownSubject,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSubject {
    User(UserId),
    Employee(EmployeeId),
}

#[derive(Debug, Clone)]
pub struct TokenSigner {
    key: Key,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
        }
    }

    pub fn issue(&self, subject: TokenSubject, expires_at: DateTime<Utc>) -> String {
        let claims = match subject {
            TokenSubject::User(id) => format!("user.{id}.{}", expires_at.timestamp()),
            TokenSubject::Employee(id) => format!("employee.{id}.{}", expires_at.timestamp()),
        };

        let signed = hmac::sign(&self.key, claims.as_bytes());
        format!("{claims}.{}", hex::encode(signed))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenSubject, AuthError> {
        let (claims, signature) = token.rsplit_once('.').ok_or(AuthError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| AuthError::Malformed)?;

        hmac::verify(&self.key, claims.as_bytes(), &signature)
            .map_err(|_| AuthError::BadSignature)?;

        let mut parts = claims.splitn(3, '.');
        let (Some(kind), Some(id), Some(expiry)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed);
        };

        let expiry = expiry.parse::<i64>().map_err(|_| AuthError::Malformed)?;
        if expiry <= now.timestamp() {
            return Err(AuthError::Expired);
        }

        match kind {
            "user" => Ok(TokenSubject::User(
                id.parse().map_err(|_| AuthError::Malformed)?,
            )),
            "employee" => Ok(TokenSubject::Employee(
                id.parse().map_err(|_| AuthError::Malformed)?,
            )),
            _ => Err(AuthError::Malformed),
        }
    }
}

/// Verifies the bearer token and stores the resolved [`Actor`] in the request extensions.
/// Role checks happen later, per operation.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, RouteError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .ok_or(AuthError::MissingToken)?;

    let actor = resolve_actor(&state, token.trim()).await?;

    tracing::debug!(actor = %actor.label(), "request authenticated");
    req.extensions_mut().insert(actor);

    Ok(next.run(req).await)
}

async fn resolve_actor(state: &AppState, token: &str) -> Result<Actor, AuthError> {
    let actor = match state.signer.verify(token, Utc::now())? {
        TokenSubject::User(id) => state.store.get_user(id).await?.map(Actor::User),
        TokenSubject::Employee(id) => state.store.get_employee(id).await?.map(Actor::Employee),
    };

    actor.ok_or(AuthError::UnknownSubject)
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_issue_then_verify() {
        let signer = TokenSigner::new("hunter2");
        let subject = TokenSubject::Employee(EmployeeId::new());
        let token = signer.issue(subject, Utc::now() + Duration::hours(1));

        assert!(token.starts_with("employee."));
        assert_eq!(signer.verify(&token, Utc::now()).unwrap(), subject);
    }

    #[test]
    fn test_rejects_tampering_and_expiry() {
        let signer = TokenSigner::new("hunter2");
        let user = UserId::new();
        let token = signer.issue(TokenSubject::User(user), Utc::now() + Duration::hours(1));

        // swap the kind but keep the signature
        let forged = token.replacen("user.", "employee.", 1);
        assert!(matches!(
            signer.verify(&forged, Utc::now()),
            Err(AuthError::BadSignature)
        ));

        let other_key = TokenSigner::new("not-the-secret");
        assert!(matches!(
            other_key.verify(&token, Utc::now()),
            Err(AuthError::BadSignature)
        ));

        assert!(matches!(
            signer.verify(&token, Utc::now() + Duration::hours(2)),
            Err(AuthError::Expired)
        ));

        for junk in ["", "nodots", "user.abc.zz", "user.x.1.zz"] {
            assert!(signer.verify(junk, Utc::now()).is_err(), "token = {junk:?}");
        }
    }
}
