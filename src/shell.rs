//! Entry points and navigation: sign-in page, dashboard shell and its JSON twin.

use axum::{
    response::{Html, Redirect},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::instrument;

use crate::auth::{extractors::AdminUser, services::greeting};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Section {
    pub id: &'static str,
    pub label: &'static str,
    pub api: &'static str,
}

pub const SECTIONS: [Section; 4] = [
    Section {
        id: "dashboard",
        label: "Dashboard",
        api: "/api/v1/analytics",
    },
    Section {
        id: "articles",
        label: "Articles",
        api: "/api/v1/articles",
    },
    Section {
        id: "events",
        label: "Events",
        api: "/api/v1/events",
    },
    Section {
        id: "visuals",
        label: "Visuals",
        api: "/api/v1/visuals",
    },
];

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Action {
    pub label: &'static str,
    pub method: &'static str,
    pub api: &'static str,
}

pub const ADMIN_ACTIONS: [Action; 3] = [
    Action {
        label: "Manage roles",
        method: "GET",
        api: "/api/v1/users",
    },
    Action {
        label: "Check visuals storage",
        method: "GET",
        api: "/api/v1/visuals/orphans",
    },
    Action {
        label: "Sign out",
        method: "POST",
        api: "/api/v1/auth/logout",
    },
];

#[derive(Debug, Serialize)]
pub struct ShellResponse {
    pub greeting: String,
    pub sections: &'static [Section],
    pub admin_actions: &'static [Action],
}

/// Browser entry points, mounted at the root.
pub fn pages() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/login") }))
        .route("/login", get(login_page))
        .route("/app", get(app_page))
}

pub fn api_routes() -> Router<AppState> {
    Router::new().route("/shell", get(shell))
}

const LOGIN_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Sign in</title></head>
<body>
<h1>Sign in</h1>
<form id="login">
  <label>Email <input name="email" type="email" autocomplete="username"></label>
  <label>Password <input name="password" type="password" autocomplete="current-password"></label>
  <button type="submit">Sign in</button>
</form>
<p id="error" role="alert"></p>
<script>
document.getElementById('login').addEventListener('submit', async (e) => {
  e.preventDefault();
  const form = new FormData(e.target);
  const res = await fetch('/api/v1/auth/login', {
    method: 'POST',
    headers: {'Content-Type': 'application/json'},
    body: JSON.stringify({email: form.get('email'), password: form.get('password')}),
  });
  if (res.ok) { window.location.assign('/app'); return; }
  const body = await res.json().catch(() => ({}));
  document.getElementById('error').textContent = body.error || 'Sign-in failed.';
});
</script>
</body>
</html>
"#;

async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}

pub(crate) fn render_app(greeting: &str) -> String {
    let nav: String = SECTIONS
        .iter()
        .map(|s| format!(r##"<li><a href="#{id}" data-api="{api}">{label}</a></li>"##, id = s.id, api = s.api, label = s.label))
        .collect();
    format!(
        r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Dashboard</title></head>
<body>
<header><p>{greeting}</p><form method="post" action="/api/v1/auth/logout"><button>Sign out</button></form></header>
<nav><ul>{nav}</ul></nav>
<main id="content"></main>
</body>
</html>
"#,
        greeting = ammonia::clean_text(greeting),
    )
}

#[instrument(skip(session))]
async fn app_page(AdminUser(session): AdminUser) -> Html<String> {
    Html(render_app(&greeting(&session.user)))
}

#[instrument(skip(session))]
async fn shell(AdminUser(session): AdminUser) -> Json<ShellResponse> {
    Json(ShellResponse {
        greeting: greeting(&session.user),
        sections: &SECTIONS,
        admin_actions: &ADMIN_ACTIONS,
    })
}
