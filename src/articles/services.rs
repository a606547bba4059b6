use std::sync::Arc;

use async_trait::async_trait;

use super::repo_types::Article;
use crate::category::Category;
use crate::crud::form::parse_category;
use crate::crud::{Form, Resource};
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{DocumentStore, FieldValue, Fields};

const FILL_ALL: &str = "Please fill out all fields.";
const PICK_IMAGE: &str = "Please select an image for the article.";

/// Strips scripts, handlers and unknown tags; keeps ordinary formatting.
pub fn sanitize(html: &str) -> String {
    ammonia::clean(html).trim().to_string()
}

fn content(form: &Form) -> Result<Option<String>, AppError> {
    match form.changed("content", FILL_ALL)? {
        None => Ok(None),
        Some(raw) => {
            let clean = sanitize(&raw);
            if clean.is_empty() {
                return Err(AppError::validation("content", FILL_ALL));
            }
            Ok(Some(clean))
        }
    }
}

#[async_trait]
impl Resource for Article {
    const NAME: &'static str = "Article";
    const PATH: &'static str = "articles";
    const MEDIA_COLUMN: &'static str = "image_key";

    fn store(state: &AppState) -> &Arc<dyn DocumentStore<Self>> {
        &state.articles
    }

    fn media_key(&self) -> &str {
        &self.image_key
    }

    fn category(&self) -> Category {
        self.category
    }

    fn media_prefix(_category: Category) -> String {
        "articles".to_string()
    }

    fn create_fields(form: &Form) -> Result<Fields, AppError> {
        let title = form.required("title", FILL_ALL)?;
        form.required("content", FILL_ALL)?;
        let content = content(form)?.ok_or_else(|| AppError::validation("content", FILL_ALL))?;
        let category = parse_category("category", &form.required("category", FILL_ALL)?, FILL_ALL)?;
        form.require_file(PICK_IMAGE)?;
        Ok(vec![
            ("title", FieldValue::Text(title)),
            ("content", FieldValue::Text(content)),
            ("category", FieldValue::Category(category)),
        ])
    }

    fn update_fields(form: &Form) -> Result<Fields, AppError> {
        let mut fields = Fields::new();
        if let Some(title) = form.changed("title", FILL_ALL)? {
            fields.push(("title", FieldValue::Text(title)));
        }
        if let Some(content) = content(form)? {
            fields.push(("content", FieldValue::Text(content)));
        }
        if let Some(raw) = form.changed("category", FILL_ALL)? {
            fields.push((
                "category",
                FieldValue::Category(parse_category("category", &raw, FILL_ALL)?),
            ));
        }
        Ok(fields)
    }
}
