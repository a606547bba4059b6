use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{service, Form, Resource};
use crate::{
    auth::extractors::AdminUser,
    config::clamp_page_size,
    error::AppError,
    state::AppState,
    store::{Cursor, Order, PageQuery},
    uploads::{resolve_url, MediaKind, StoredMedia},
};

pub fn routes<R: Resource>() -> Router<AppState> {
    Router::new()
        .route(&format!("/{}", R::PATH), get(list::<R>).post(create::<R>))
        .route(
            &format!("/{}/:id", R::PATH),
            get(get_one::<R>).put(update::<R>).delete(remove::<R>),
        )
}

/// A record as the panel sees it: stored fields plus its resolved media.
#[derive(Debug, Serialize)]
pub struct View<R> {
    #[serde(flatten)]
    pub item: R,
    /// `None` only when a just-written record's URL could not be resolved.
    pub media_url: Option<String>,
    pub media_kind: MediaKind,
}

#[derive(Debug, Serialize)]
pub struct ListResponse<R> {
    pub items: Vec<View<R>>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ItemResponse<R> {
    pub item: View<R>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: Uuid,
    pub blob_removed: bool,
    pub message: String,
}

pub(crate) async fn view<R: Resource>(state: &AppState, item: R) -> Result<View<R>, AppError> {
    let media_url = resolve_url(state.storage.as_ref(), item.media_key()).await?;
    let media_kind = MediaKind::from_key(item.media_key());
    Ok(View {
        item,
        media_url: Some(media_url),
        media_kind,
    })
}

/// View of a record whose write has committed. Never fails: the URL from the
/// upload is reused, and an unresolvable URL is reported as `null`.
pub(crate) async fn committed_view<R: Resource>(
    state: &AppState,
    item: R,
    fresh: Option<StoredMedia>,
) -> View<R> {
    let media_url = match fresh {
        Some(stored) if stored.key == item.media_key() => Some(stored.url),
        _ => match resolve_url(state.storage.as_ref(), item.media_key()).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, collection = R::COLLECTION, id = %item.id(), "media url unavailable after write");
                None
            }
        },
    };
    let media_kind = MediaKind::from_key(item.media_key());
    View {
        item,
        media_url,
        media_kind,
    }
}

const RESERVED: [&str; 4] = ["order", "direction", "page_size", "cursor"];

/// Builds the page query from `?order=&direction=&page_size=&cursor=&<filter>=`.
pub(crate) fn page_query<R: Resource>(
    params: &HashMap<String, String>,
    default_page_size: u32,
) -> Result<PageQuery, AppError> {
    let order = Order::parse::<R>(
        params.get("order").map(String::as_str),
        params.get("direction").map(String::as_str),
    )?;
    let page_size = match params.get("page_size").map(|s| s.trim()) {
        None | Some("") => default_page_size,
        Some(raw) => raw
            .parse::<u32>()
            .map(clamp_page_size)
            .map_err(|_| AppError::BadRequest("page_size must be a positive integer".into()))?,
    };
    let cursor = match params.get("cursor").map(|s| s.trim()) {
        None | Some("") => None,
        Some(raw) => Some(Cursor::decode(raw)?),
    };

    let mut query = PageQuery::first(order, page_size).after(cursor);
    let mut names: Vec<&String> = params
        .keys()
        .filter(|k| !RESERVED.contains(&k.as_str()))
        .collect();
    names.sort();
    for name in names {
        let column = R::FILTER_COLUMNS
            .iter()
            .copied()
            .find(|c| *c == name.as_str())
            .ok_or_else(|| AppError::BadRequest(format!("unknown filter `{name}`")))?;
        let raw = params[name].trim();
        if raw.is_empty() {
            continue;
        }
        query = query.filter(column, R::parse_filter(column, raw)?);
    }
    Ok(query)
}

#[instrument(skip(state, params, _admin), fields(collection = R::COLLECTION))]
pub async fn list<R: Resource>(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ListResponse<R>>, AppError> {
    let query = page_query::<R>(&params, state.config.page_size)?;
    let page = R::store(&state).query(&query).await?;
    let items = try_join_all(page.items.into_iter().map(|item| view(&state, item))).await?;
    Ok(Json(ListResponse {
        items,
        next_cursor: page.next_cursor,
    }))
}

#[instrument(skip(state, _admin), fields(collection = R::COLLECTION))]
pub async fn get_one<R: Resource>(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<View<R>>, AppError> {
    let item = R::store(&state)
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found", R::NAME)))?;
    Ok(Json(view(&state, item).await?))
}

#[instrument(skip(state, _admin, multipart), fields(collection = R::COLLECTION))]
pub async fn create<R: Resource>(
    State(state): State<AppState>,
    _admin: AdminUser,
    multipart: Multipart,
) -> Result<(StatusCode, HeaderMap, Json<ItemResponse<R>>), AppError> {
    let form = Form::from_multipart(multipart).await?;
    let (record, stored) = service::create::<R>(&state, form).await?;

    let mut headers = HeaderMap::new();
    let location = format!("/api/v1/{}/{}", R::PATH, record.id());
    if let Ok(value) = HeaderValue::from_str(&location) {
        headers.insert(header::LOCATION, value);
    }
    let item = committed_view(&state, record, Some(stored)).await;
    Ok((
        StatusCode::CREATED,
        headers,
        Json(ItemResponse {
            item,
            message: format!("{} added successfully!", R::NAME),
        }),
    ))
}

#[instrument(skip(state, _admin, multipart), fields(collection = R::COLLECTION))]
pub async fn update<R: Resource>(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<ItemResponse<R>>, AppError> {
    let form = Form::from_multipart(multipart).await?;
    let (record, fresh) = service::update::<R>(&state, id, form).await?;
    Ok(Json(ItemResponse {
        item: committed_view(&state, record, fresh).await,
        message: format!("{} updated successfully!", R::NAME),
    }))
}

#[instrument(skip(state, _admin), fields(collection = R::COLLECTION))]
pub async fn remove<R: Resource>(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = service::delete::<R>(&state, id).await?;
    Ok(Json(DeleteResponse {
        id: deleted.record.id(),
        blob_removed: deleted.blob_removed,
        message: format!("{} deleted successfully!", R::NAME),
    }))
}
