//! One panel implementation shared by every content collection. A collection
//! plugs in through [`Resource`]; routes, the upload/write sequencing and
//! response shaping live here once.

pub mod form;
pub mod handlers;
pub mod service;

use std::sync::Arc;

use async_trait::async_trait;

use crate::category::Category;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{DocumentStore, FieldValue, Fields, Record};

pub use form::Form;

#[async_trait]
pub trait Resource: Record {
    /// Display name used in messages, e.g. "Event".
    const NAME: &'static str;
    /// Route segment under `/api/v1`.
    const PATH: &'static str;
    /// Column holding the object-store key.
    const MEDIA_COLUMN: &'static str;

    fn store(state: &AppState) -> &Arc<dyn DocumentStore<Self>>;

    fn media_key(&self) -> &str;

    fn category(&self) -> Category;

    /// Blob directory for a new upload.
    fn media_prefix(category: Category) -> String;

    /// Full validation for a new record; runs before any I/O.
    fn create_fields(form: &Form) -> Result<Fields, AppError>;

    /// Validation for a partial update: only the submitted fields.
    fn update_fields(form: &Form) -> Result<Fields, AppError>;

    /// Parses a list filter from the query string.
    fn parse_filter(column: &'static str, raw: &str) -> Result<FieldValue, AppError> {
        match column {
            "category" => raw
                .parse::<Category>()
                .map(FieldValue::Category)
                .map_err(|e| AppError::BadRequest(e.to_string())),
            other => Err(AppError::BadRequest(format!("unknown filter `{other}`"))),
        }
    }

    /// Checks fields that point at other records.
    async fn check_references(
        _state: &AppState,
        _fields: &Fields,
        _existing: Option<&Self>,
    ) -> Result<(), AppError> {
        Ok(())
    }
}

pub(crate) fn category_in(fields: &Fields) -> Option<Category> {
    fields.iter().find_map(|(col, v)| match (col, v) {
        (&"category", FieldValue::Category(c)) => Some(*c),
        _ => None,
    })
}
