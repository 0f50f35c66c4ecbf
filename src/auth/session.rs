use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::rngs::OsRng;
use rand::RngCore;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo::{User, UserWithGuests};

pub const SESSION_COOKIE: &str = "sessionId";

/// Resolved session: the bound user with its guest list expanded, detached
/// from the datastore.
#[derive(Debug, Clone)]
pub struct SessionData {
    pub user: UserWithGuests,
}

/// Generate the opaque bearer token: 50 random bytes, hex-encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 50];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Create a session for `user_id` and return the token and its expiry.
///
/// Existing sessions for the user are cleared first, best-effort: a failed
/// cleanup is logged and the new session is created anyway. The token is
/// never logged; it leaves the process only inside the cookie.
pub async fn create_session(
    db: &PgPool,
    user_id: Uuid,
    ttl: Duration,
) -> anyhow::Result<(String, OffsetDateTime)> {
    let token = generate_token();
    let expires_at = OffsetDateTime::now_utc() + ttl;

    if let Err(e) = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(db)
        .await
    {
        warn!(error = %e, %user_id, "failed to clear previous sessions");
    }

    sqlx::query("INSERT INTO sessions (session_id, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(&token)
        .bind(user_id)
        .bind(expires_at)
        .execute(db)
        .await?;

    Ok((token, expires_at))
}

/// Build the session cookie: http-only, secure, strict same-site, expiring
/// with the session.
pub fn session_cookie(token: String, expires_at: OffsetDateTime) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_http_only(true);
    cookie.set_secure(true);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    cookie.set_expires(expires_at);
    cookie
}

/// Cookie that expires the session cookie on the client.
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    cookie
}

/// Delete the session row for `token`. A missing row is not an error, so the
/// operation is idempotent.
pub async fn delete_session(db: &PgPool, token: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM sessions WHERE session_id = $1")
        .bind(token)
        .execute(db)
        .await?;
    Ok(())
}

async fn resolve_session(db: &PgPool, token: &str) -> anyhow::Result<Option<SessionData>> {
    let user_id: Option<Uuid> = sqlx::query_scalar(
        "SELECT user_id FROM sessions WHERE session_id = $1 AND expires_at > now()",
    )
    .bind(token)
    .fetch_optional(db)
    .await?;
    let Some(user_id) = user_id else {
        return Ok(None);
    };
    // A session whose user vanished resolves to nothing rather than erroring.
    let Some(user) = User::find_by_id(db, user_id).await? else {
        return Ok(None);
    };
    let user = User::populate(db, user).await?;
    Ok(Some(SessionData { user }))
}

/// Memoized per-request resolution result, stored in request extensions so
/// every extraction within one request shares a single datastore lookup.
#[derive(Clone)]
struct CachedSession(Option<SessionData>);

/// The current session, or `None` when the request carries no valid cookie.
/// An absent or stale token is not an error.
pub struct CurrentSession(pub Option<SessionData>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(cached) = parts.extensions.get::<CachedSession>() {
            return Ok(CurrentSession(cached.0.clone()));
        }

        let jar = CookieJar::from_headers(&parts.headers);
        let resolved = match jar.get(SESSION_COOKIE) {
            None => None,
            Some(cookie) => resolve_session(&state.db, cookie.value())
                .await
                .map_err(|e| {
                    error!(error = %e, "session lookup failed");
                    ApiError::Unavailable("Service unavailable. Please try again later.".into())
                })?,
        };

        parts.extensions.insert(CachedSession(resolved.clone()));
        Ok(CurrentSession(resolved))
    }
}

/// Like [`CurrentSession`], but rejects unauthenticated requests with 401.
pub struct AuthSession(pub SessionData);

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentSession(session) = CurrentSession::from_request_parts(parts, state).await?;
        session
            .map(AuthSession)
            .ok_or_else(|| ApiError::Unauthorized("Not signed in".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_long_hex_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 100);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn session_cookie_attributes() {
        let expires_at = OffsetDateTime::now_utc() + Duration::hours(24);
        let cookie = session_cookie("token".into(), expires_at);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        assert!(cookie.expires().is_some());
    }

    #[test]
    fn removal_cookie_targets_same_path() {
        let cookie = removal_cookie();
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.path(), Some("/"));
    }
}
