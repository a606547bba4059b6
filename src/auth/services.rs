pub(crate) use crate::auth::dto::{Claims, JwtKeys, TokenKind};
use crate::auth::repo::UserDirectory;
use crate::auth::repo_types::{NewUser, Role, User};
use crate::auth::session::SessionHub;
use crate::config::{BootstrapAdmin, JwtConfig};
use crate::error::AppError;
use crate::state::AppState;
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const NOT_AUTHORIZED: &str = "You are not authorized to access this site.";
pub const PROFILE_MISSING: &str = "User data not found.";
pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn greeting(user: &User) -> String {
    format!("Welcome, {}!", user.display_name())
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_minutes.max(0) as u64) * 60),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from(&state.config.jwt)
    }
}

impl JwtKeys {
    fn sign_with_kind(&self, user_id: Uuid, sid: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            sid,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, session_id = %sid, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid, sid: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, sid, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user_id: Uuid, sid: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, sid, TokenKind::Refresh)
    }

    /// Access and refresh tokens for one session.
    pub fn sign_pair(&self, user_id: Uuid, sid: Uuid) -> anyhow::Result<(String, String)> {
        Ok((
            self.sign_access(user_id, sid)?,
            self.sign_refresh(user_id, sid)?,
        ))
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            anyhow::bail!("not a refresh token");
        }
        Ok(claims)
    }
}

/// An authenticated caller: the resolved profile plus the session it signed in with.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub session_id: Uuid,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.user.role == Role::Admin
    }
}

/// Token -> live session -> profile. Any failure denies.
pub async fn resolve_session(
    keys: &JwtKeys,
    sessions: &SessionHub,
    users: &dyn UserDirectory,
    token: &str,
) -> Result<Session, AppError> {
    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "invalid or expired token");
        AppError::Unauthorized("Invalid or expired token".into())
    })?;
    if claims.kind != TokenKind::Access {
        return Err(AppError::Unauthorized("Access token required".into()));
    }
    if sessions.is_revoked(claims.sid) {
        warn!(session_id = %claims.sid, "revoked session presented");
        return Err(AppError::Unauthorized("Session has ended".into()));
    }
    let user = users.find_by_id(claims.sub).await?.ok_or_else(|| {
        warn!(user_id = %claims.sub, "token subject has no profile");
        AppError::Unauthorized(PROFILE_MISSING.into())
    })?;
    Ok(Session {
        user,
        session_id: claims.sid,
    })
}

/// Seeds the first admin when the directory is empty.
pub async fn bootstrap_admin(
    users: &dyn UserDirectory,
    admin: &BootstrapAdmin,
) -> anyhow::Result<Option<User>> {
    if users.count().await? > 0 {
        return Ok(None);
    }
    let email = normalize_email(&admin.email);
    anyhow::ensure!(is_valid_email(&email), "BOOTSTRAP_ADMIN_EMAIL is not an email");
    anyhow::ensure!(
        admin.password.len() >= MIN_PASSWORD_LEN,
        "BOOTSTRAP_ADMIN_PASSWORD must be at least {MIN_PASSWORD_LEN} characters"
    );
    let user = users
        .create(NewUser {
            email,
            password_hash: hash_password(&admin.password)?,
            first_name: String::new(),
            last_name: String::new(),
            role: Role::Admin,
        })
        .await?;
    info!(user_id = %user.id, email = %user.email, "bootstrap admin created");
    Ok(Some(user))
}

#[cfg(test)]
mod password_tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("ops@eventdesk.test"));
        assert!(!is_valid_email("ops@eventdesk"));
        assert!(!is_valid_email("not an email"));
        assert_eq!(normalize_email("  Ops@EventDesk.test "), "ops@eventdesk.test");
    }
}

#[cfg(test)]
mod jwt_tests {
    use super::*;
    use crate::auth::repo::memory::MemoryUsers;
    use crate::config::AppConfig;

    fn make_keys(issuer: &str, audience: &str) -> JwtKeys {
        let mut cfg = AppConfig::for_tests().jwt;
        cfg.issuer = issuer.into();
        cfg.audience = audience.into();
        JwtKeys::from(&cfg)
    }

    fn test_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    async fn member(users: &MemoryUsers, role: Role) -> User {
        users
            .create(NewUser {
                email: format!("{}@eventdesk.test", Uuid::new_v4()),
                password_hash: "x".into(),
                first_name: "Ada".into(),
                last_name: "Obi".into(),
                role,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn sign_and_verify_access_token() {
        let keys = test_keys();
        let user_id = Uuid::new_v4();
        let sid = Uuid::new_v4();
        let token = keys.sign_access(user_id, sid).expect("sign access");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.sid, sid);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[tokio::test]
    async fn refresh_token_keeps_session_and_rejects_access() {
        let keys = test_keys();
        let (access, refresh) = keys.sign_pair(Uuid::new_v4(), Uuid::nil()).unwrap();
        let claims = keys.verify_refresh(&refresh).expect("verify refresh");
        assert_eq!(claims.kind, TokenKind::Refresh);
        assert_eq!(claims.sid, Uuid::nil());
        let err = keys.verify_refresh(&access).unwrap_err();
        assert!(err.to_string().contains("not a refresh token"));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = make_keys("good-iss", "good-aud");
        let bad = make_keys("bad-iss", "bad-aud");
        let token = good.sign_access(Uuid::new_v4(), Uuid::new_v4()).unwrap();
        assert!(bad.verify(&token).is_err());
        assert!(good.verify(&token).is_ok());
    }

    #[tokio::test]
    async fn resolve_session_fails_closed() {
        let keys = test_keys();
        let hub = SessionHub::default();
        let users = MemoryUsers::default();
        let admin = member(&users, Role::Admin).await;
        let sid = Uuid::new_v4();

        let token = keys.sign_access(admin.id, sid).unwrap();
        let session = resolve_session(&keys, &hub, &users, &token).await.unwrap();
        assert!(session.is_admin());
        assert_eq!(session.session_id, sid);

        let refresh = keys.sign_refresh(admin.id, sid).unwrap();
        assert!(resolve_session(&keys, &hub, &users, &refresh).await.is_err());

        let ghost = keys.sign_access(Uuid::new_v4(), sid).unwrap();
        let err = resolve_session(&keys, &hub, &users, &ghost).await.unwrap_err();
        assert_eq!(err.to_string(), PROFILE_MISSING);

        hub.revoke(sid, time::OffsetDateTime::now_utc() + time::Duration::hours(1))
            .await
            .unwrap();
        assert!(resolve_session(&keys, &hub, &users, &token).await.is_err());
    }

    #[tokio::test]
    async fn bootstrap_only_seeds_an_empty_directory() {
        let users = MemoryUsers::default();
        let admin = BootstrapAdmin {
            email: "Root@EventDesk.test".into(),
            password: "long-enough".into(),
        };
        let created = bootstrap_admin(&users, &admin).await.unwrap().unwrap();
        assert_eq!(created.email, "root@eventdesk.test");
        assert_eq!(created.role, Role::Admin);
        assert!(bootstrap_admin(&users, &admin).await.unwrap().is_none());
        assert_eq!(users.count().await.unwrap(), 1);
    }

    #[test]
    fn greeting_falls_back_to_email() {
        let mut user = User {
            id: Uuid::nil(),
            email: "ops@eventdesk.test".into(),
            password_hash: String::new(),
            first_name: "Ada".into(),
            last_name: "Obi".into(),
            role: Role::Admin,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        assert_eq!(greeting(&user), "Welcome, Ada Obi!");
        user.first_name.clear();
        user.last_name.clear();
        assert_eq!(greeting(&user), "Welcome, ops@eventdesk.test!");
    }
}
