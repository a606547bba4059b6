use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use super::dto::{MissingObject, OrphanReport};
use super::repo_types::Visual;
use crate::category::Category;
use crate::config::MAX_PAGE_SIZE;
use crate::crud::form::{parse_category, parse_id};
use crate::crud::{category_in, Form, Resource};
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{DocumentStore, FieldValue, Fields, PageQuery, Record};

const FILL_ALL: &str = "Please fill out all fields.";
const PICK_CATEGORY: &str = "Please select a category first.";
const PICK_FILE: &str = "Please select a file for the visual.";
const ROOT: &str = "visuals/";

fn event_id(form: &Form) -> Result<Option<FieldValue>, AppError> {
    if !form.has("event_id") {
        return Ok(None);
    }
    let id = match form.text("event_id") {
        Some(raw) if !raw.is_empty() => Some(parse_id("event_id", raw)?),
        _ => None,
    };
    Ok(Some(FieldValue::OptId(id)))
}

#[async_trait]
impl Resource for Visual {
    const NAME: &'static str = "Visual";
    const PATH: &'static str = "visuals";
    const MEDIA_COLUMN: &'static str = "media_key";

    fn store(state: &AppState) -> &Arc<dyn DocumentStore<Self>> {
        &state.visuals
    }

    fn media_key(&self) -> &str {
        &self.media_key
    }

    fn category(&self) -> Category {
        self.category
    }

    fn media_prefix(category: Category) -> String {
        format!("{ROOT}{}", category.as_str())
    }

    fn create_fields(form: &Form) -> Result<Fields, AppError> {
        let category = parse_category(
            "category",
            &form.required("category", PICK_CATEGORY)?,
            PICK_CATEGORY,
        )?;
        let title = form.required("title", FILL_ALL)?;
        form.require_file(PICK_FILE)?;
        let mut fields: Fields = vec![
            ("title", FieldValue::Text(title)),
            ("category", FieldValue::Category(category)),
        ];
        fields.extend(event_id(form)?.map(|v| ("event_id", v)));
        Ok(fields)
    }

    fn update_fields(form: &Form) -> Result<Fields, AppError> {
        let mut fields = Fields::new();
        if let Some(title) = form.changed("title", FILL_ALL)? {
            fields.push(("title", FieldValue::Text(title)));
        }
        if let Some(raw) = form.changed("category", PICK_CATEGORY)? {
            fields.push((
                "category",
                FieldValue::Category(parse_category("category", &raw, PICK_CATEGORY)?),
            ));
        }
        fields.extend(event_id(form)?.map(|v| ("event_id", v)));
        Ok(fields)
    }

    fn parse_filter(column: &'static str, raw: &str) -> Result<FieldValue, AppError> {
        match column {
            "event_id" => Uuid::parse_str(raw)
                .map(|id| FieldValue::OptId(Some(id)))
                .map_err(|_| AppError::BadRequest("event_id must be a uuid".into())),
            "category" => raw
                .parse::<Category>()
                .map(FieldValue::Category)
                .map_err(|e| AppError::BadRequest(e.to_string())),
            other => Err(AppError::BadRequest(format!("unknown filter `{other}`"))),
        }
    }

    /// The linked event must exist and share the visual's category.
    async fn check_references(
        state: &AppState,
        fields: &Fields,
        existing: Option<&Self>,
    ) -> Result<(), AppError> {
        let submitted = fields.iter().find_map(|(col, v)| match (col, v) {
            (&"event_id", FieldValue::OptId(id)) => Some(*id),
            _ => None,
        });
        let category = category_in(fields);
        // An edit that touches neither side of the link leaves it as it was.
        if submitted.is_none() && category.is_none() {
            return Ok(());
        }
        let event_id = submitted.unwrap_or_else(|| existing.and_then(|v| v.event_id));
        let Some(event_id) = event_id else {
            return Ok(());
        };
        let category = category.or_else(|| existing.map(|v| v.category));

        let event = state
            .events
            .get(event_id)
            .await?
            .ok_or_else(|| AppError::validation("event_id", "The selected event does not exist."))?;
        if Some(event.category) != category {
            return Err(AppError::validation(
                "event_id",
                "Please select both a category and an event for the visual.",
            ));
        }
        Ok(())
    }
}

/// Every visual matching `filters`, paged through the store.
async fn all_visuals(
    store: &dyn DocumentStore<Visual>,
    filters: Fields,
) -> Result<Vec<Visual>, AppError> {
    let mut query = PageQuery::first(Visual::DEFAULT_ORDER, MAX_PAGE_SIZE);
    for (column, value) in filters {
        query = query.filter(column, value);
    }
    let mut out = Vec::new();
    loop {
        let page = store.query(&query).await?;
        out.extend(page.items);
        match page.next_cursor {
            Some(token) => query = query.after(Some(crate::store::Cursor::decode(&token)?)),
            None => return Ok(out),
        }
    }
}

/// Visuals that point at `event_id`.
pub(crate) async fn linked_to(state: &AppState, event_id: Uuid) -> Result<Vec<Visual>, AppError> {
    all_visuals(
        state.visuals.as_ref(),
        vec![("event_id", FieldValue::OptId(Some(event_id)))],
    )
    .await
}

/// Compares records against the blob directory. Reports only.
pub async fn orphan_report(
    state: &AppState,
    category: Option<Category>,
) -> Result<OrphanReport, AppError> {
    let records = all_visuals(state.visuals.as_ref(), Fields::new()).await?;
    let listing: HashSet<String> = state
        .storage
        .list_prefix(ROOT)
        .await
        .context("list visuals directory")?
        .into_iter()
        .collect();
    let referenced: HashSet<&str> = records.iter().map(|v| v.media_key.as_str()).collect();

    let dir = match category {
        Some(c) => format!("{}/", Visual::media_prefix(c)),
        None => ROOT.to_string(),
    };
    let mut orphaned_objects: Vec<String> = listing
        .iter()
        .filter(|k| k.starts_with(&dir) && !referenced.contains(k.as_str()))
        .cloned()
        .collect();
    orphaned_objects.sort();

    let missing_objects = records
        .iter()
        .filter(|v| category.map_or(true, |c| v.category == c))
        .filter(|v| !listing.contains(&v.media_key))
        .map(|v| MissingObject {
            id: v.id,
            title: v.title.clone(),
            media_key: v.media_key.clone(),
        })
        .collect();

    Ok(OrphanReport {
        category,
        orphaned_objects,
        missing_objects,
    })
}
