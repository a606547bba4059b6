use std::convert::Infallible;

use axum::{
    extract::{FromRef, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use futures::{stream, Stream};
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, LogoutResponse, PublicUser, RefreshRequest, SessionResponse},
        extractors::{cleared_session_cookie, session_cookie, CurrentUser, SESSION_COOKIE},
        repo_types::{Role, User},
        services::{
            greeting, is_valid_email, normalize_email, verify_password, JwtKeys, NOT_AUTHORIZED,
            PROFILE_MISSING,
        },
        session::SessionEvent,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/session", get(session))
        .route("/auth/events", get(events))
}

fn issue(
    state: &AppState,
    jar: CookieJar,
    user: &User,
    sid: Uuid,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let keys = JwtKeys::from_ref(state);
    let (access_token, refresh_token) = keys.sign_pair(user.id, sid)?;
    let cookie = session_cookie(
        access_token.clone(),
        state.config.cookie_secure,
        state.config.jwt.ttl_minutes,
    );
    Ok((
        jar.add(cookie),
        Json(AuthResponse {
            access_token,
            refresh_token,
            greeting: greeting(user),
            user: PublicUser::from(user),
        }),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::validation(
            "email",
            "Please enter your email and password.",
        ));
    }
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::validation("email", "Invalid email"));
    }

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };
    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }
    if user.role != Role::Admin {
        warn!(user_id = %user.id, role = user.role.as_str(), "non-admin sign-in refused");
        return Err(AppError::Forbidden(NOT_AUTHORIZED.into()));
    }

    let sid = Uuid::new_v4();
    let out = issue(&state, jar, &user, sid)?;
    state.sessions.publish(SessionEvent::SignedIn {
        user_id: user.id,
        session_id: sid,
    });
    info!(user_id = %user.id, email = %user.email, session_id = %sid, "user logged in");
    Ok(out)
}

#[instrument(skip(state, jar, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let token = payload
        .and_then(|Json(p)| p.refresh_token)
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".into()))?;
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&token)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;
    if state.sessions.is_revoked(claims.sid) {
        warn!(session_id = %claims.sid, "refresh on revoked session");
        return Err(AppError::Unauthorized("Session has ended".into()));
    }

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized(PROFILE_MISSING.into()))?;
    // Role may have changed since sign-in.
    if user.role != Role::Admin {
        return Err(AppError::Forbidden(NOT_AUTHORIZED.into()));
    }
    issue(&state, jar, &user, claims.sid)
}

#[instrument(skip(state, jar, session))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    CurrentUser(session): CurrentUser,
) -> (CookieJar, Json<LogoutResponse>) {
    // Refresh rotation keeps the sid, so the last refresh token can outlive
    // sign-in by at most one refresh lifetime from now.
    let until = OffsetDateTime::now_utc() + time::Duration::minutes(state.config.jwt.refresh_ttl_minutes);
    if let Err(e) = state.sessions.revoke(session.session_id, until).await {
        error!(error = %e, session_id = %session.session_id, "failed to persist session revocation");
    }
    state.sessions.publish(SessionEvent::SignedOut {
        user_id: session.user.id,
        session_id: session.session_id,
    });
    info!(user_id = %session.user.id, session_id = %session.session_id, "user signed out");
    let jar = match jar.get(SESSION_COOKIE) {
        Some(_) => jar.remove(cleared_session_cookie()),
        None => jar,
    };
    (jar, Json(LogoutResponse { message: "Signed out" }))
}

/// Resolves the caller. Non-admins get an authorization-denied state instead of content.
#[instrument(skip(session))]
pub async fn session(CurrentUser(session): CurrentUser) -> Json<SessionResponse> {
    let authorized = session.is_admin();
    Json(SessionResponse {
        authorized,
        greeting: authorized.then(|| greeting(&session.user)),
        message: (!authorized).then(|| NOT_AUTHORIZED.to_string()),
        user: PublicUser::from(&session.user),
    })
}

fn session_events(
    state: &AppState,
    user_id: Uuid,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(state.sessions.subscribe(), move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(ev) if ev.user_id() == user_id => {
                    let event = Event::default()
                        .event(ev.name())
                        .json_data(&ev)
                        .unwrap_or_else(|_| Event::default().event(ev.name()));
                    return Some((Ok(event), rx));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, %user_id, "session subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

/// Session-changed subscription for the caller's own identity.
#[instrument(skip(state, session))]
pub async fn events(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(session_events(&state, session.user.id)).keep_alive(KeepAlive::default())
}
