use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, OriginalUri},
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::warn;

use crate::auth::services::{resolve_session, JwtKeys, Session, NOT_AUTHORIZED};
use crate::error::AppError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Any signed-in user with a profile, whatever the role.
pub struct CurrentUser(pub Session);

/// A signed-in admin. Every dashboard route takes this.
pub struct AdminUser(pub Session);

/// Pages send an anonymous visitor to the sign-in form; the API answers with JSON.
#[derive(Debug)]
pub enum GateRejection {
    Login,
    Denied(AppError),
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        match self {
            GateRejection::Login => Redirect::to("/login").into_response(),
            GateRejection::Denied(e) => e.into_response(),
        }
    }
}

fn request_path(parts: &Parts) -> &str {
    // Nested routers see a stripped uri.
    parts
        .extensions
        .get::<OriginalUri>()
        .map(|o| o.0.path())
        .unwrap_or_else(|| parts.uri.path())
}

fn is_api(parts: &Parts) -> bool {
    request_path(parts).starts_with("/api/")
}

/// Bearer header first, then the session cookie.
pub(crate) fn bearer_or_cookie(parts: &Parts) -> Option<String> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    header.or_else(|| {
        CookieJar::from_headers(&parts.headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
    })
}

pub(crate) fn session_cookie(token: String, secure: bool, ttl_minutes: i64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::minutes(ttl_minutes))
        .build()
}

pub(crate) fn cleared_session_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

async fn gate(parts: &Parts, state: &AppState) -> Result<Session, GateRejection> {
    let deny = |e: AppError| match e {
        AppError::Unauthorized(_) if !is_api(parts) => GateRejection::Login,
        other => GateRejection::Denied(other),
    };
    let token = bearer_or_cookie(parts)
        .ok_or_else(|| deny(AppError::Unauthorized("Missing credentials".into())))?;
    let keys = JwtKeys::from_ref(state);
    resolve_session(&keys, &state.sessions, state.users.as_ref(), &token)
        .await
        .map_err(deny)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = GateRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        gate(parts, state).await.map(CurrentUser)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = GateRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = gate(parts, state).await?;
        if !session.is_admin() {
            warn!(user_id = %session.user.id, role = session.user.role.as_str(), "non-admin denied");
            return Err(GateRejection::Denied(AppError::Forbidden(NOT_AUTHORIZED.into())));
        }
        Ok(AdminUser(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::COOKIE, Request};

    fn parts(req: Request<()>) -> Parts {
        req.into_parts().0
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let p = parts(
            Request::builder()
                .header(AUTHORIZATION, "Bearer abc")
                .header(COOKIE, "session=xyz")
                .body(())
                .unwrap(),
        );
        assert_eq!(bearer_or_cookie(&p).as_deref(), Some("abc"));

        let p = parts(
            Request::builder()
                .header(COOKIE, "theme=dark; session=xyz")
                .body(())
                .unwrap(),
        );
        assert_eq!(bearer_or_cookie(&p).as_deref(), Some("xyz"));

        let p = parts(Request::builder().header(AUTHORIZATION, "Basic zzz").body(()).unwrap());
        assert_eq!(bearer_or_cookie(&p), None);
    }

    #[test]
    fn session_cookie_is_http_only() {
        let c = session_cookie("t".into(), true, 5);
        assert_eq!(c.name(), SESSION_COOKIE);
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.secure(), Some(true));
        assert_eq!(c.path(), Some("/"));
    }

    #[test]
    fn api_paths_are_detected() {
        let p = parts(Request::builder().uri("/api/v1/events").body(()).unwrap());
        assert!(is_api(&p));
        let p = parts(Request::builder().uri("/app").body(()).unwrap());
        assert!(!is_api(&p));
    }
}
