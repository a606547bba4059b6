use crate::analytics::source::{HttpKpiSource, KpiSource};
use crate::articles::Article;
use crate::auth::repo::{PgRevocations, PgUsers, UserDirectory};
use crate::auth::session::SessionHub;
use crate::config::AppConfig;
use crate::events::Event;
use crate::storage::{Storage, StorageClient};
use crate::store::{pg::PgDocuments, DocumentStore};
use crate::visuals::Visual;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared handler state. Every collaborator sits behind a trait object so
/// tests can swap in memory doubles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
    pub users: Arc<dyn UserDirectory>,
    pub articles: Arc<dyn DocumentStore<Article>>,
    pub events: Arc<dyn DocumentStore<Event>>,
    pub visuals: Arc<dyn DocumentStore<Visual>>,
    pub kpi: Arc<dyn KpiSource>,
    pub sessions: SessionHub,
}

impl AppState {
    pub async fn init(config: AppConfig, db: PgPool) -> anyhow::Result<Self> {
        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;
        let kpi = Arc::new(HttpKpiSource::new(&config.kpi)?) as Arc<dyn KpiSource>;
        let sessions = SessionHub::restore(Arc::new(PgRevocations::new(db.clone()))).await?;

        Ok(Self {
            config: Arc::new(config),
            storage,
            users: Arc::new(PgUsers::new(db.clone())),
            articles: Arc::new(PgDocuments::<Article>::new(db.clone())),
            events: Arc::new(PgDocuments::<Event>::new(db.clone())),
            visuals: Arc::new(PgDocuments::<Visual>::new(db)),
            kpi,
            sessions,
        })
    }
}

/// Handles on the memory doubles behind a fake state, for failure injection.
#[cfg(test)]
pub struct Fakes {
    pub storage: Arc<crate::storage::memory::MemoryStorage>,
    pub users: Arc<crate::auth::repo::memory::MemoryUsers>,
    pub articles: Arc<crate::store::memory::MemoryDocuments<Article>>,
    pub events: Arc<crate::store::memory::MemoryDocuments<Event>>,
    pub visuals: Arc<crate::store::memory::MemoryDocuments<Visual>>,
    pub kpi: Arc<crate::analytics::source::fake::StaticKpiSource>,
}

#[cfg(test)]
impl AppState {
    pub fn fake() -> Self {
        Self::fake_with().0
    }

    pub fn fake_with() -> (Self, Fakes) {
        let fakes = Fakes {
            storage: Arc::default(),
            users: Arc::default(),
            articles: Arc::default(),
            events: Arc::default(),
            visuals: Arc::default(),
            kpi: Arc::default(),
        };
        let state = Self {
            config: Arc::new(AppConfig::for_tests()),
            storage: fakes.storage.clone(),
            users: fakes.users.clone(),
            articles: fakes.articles.clone(),
            events: fakes.events.clone(),
            visuals: fakes.visuals.clone(),
            kpi: fakes.kpi.clone(),
            sessions: SessionHub::default(),
        };
        (state, fakes)
    }
}

#[cfg(test)]
pub mod testing {
    //! Seeding helpers for router tests.

    use axum::extract::FromRef;
    use uuid::Uuid;

    use super::AppState;
    use crate::auth::repo_types::{NewUser, Role, User};
    use crate::auth::services::JwtKeys;

    pub async fn seed_user(state: &AppState, role: Role) -> User {
        state
            .users
            .create(NewUser {
                email: format!("{}@eventdesk.test", Uuid::new_v4().simple()),
                password_hash: "unused".into(),
                first_name: "Ada".into(),
                last_name: "Obi".into(),
                role,
            })
            .await
            .unwrap()
    }

    pub fn token_for(state: &AppState, user: &User) -> String {
        JwtKeys::from_ref(state)
            .sign_access(user.id, Uuid::new_v4())
            .unwrap()
    }

    pub async fn admin_token(state: &AppState) -> String {
        let user = seed_user(state, Role::Admin).await;
        token_for(state, &user)
    }

    pub async fn member_token(state: &AppState) -> String {
        let user = seed_user(state, Role::Member).await;
        token_for(state, &user)
    }
}
