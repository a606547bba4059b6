use std::sync::Arc;

use async_trait::async_trait;

use super::repo_types::Event;
use crate::category::Category;
use crate::crud::form::{parse_category, parse_date};
use crate::crud::{category_in, Form, Resource};
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{DocumentStore, FieldValue, Fields};
use crate::visuals::visuals_linked_to;

const FILL_ALL: &str = "Please fill out all fields.";
const PICK_CATEGORY: &str = "Please select a category for the event.";
const PICK_IMAGE: &str = "Please select an image for the event.";

fn ticket_url(form: &Form) -> Option<FieldValue> {
    form.has("ticket_url").then(|| {
        FieldValue::OptText(
            form.text("ticket_url")
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        )
    })
}

#[async_trait]
impl Resource for Event {
    const NAME: &'static str = "Event";
    const PATH: &'static str = "events";
    const MEDIA_COLUMN: &'static str = "picture_key";

    fn store(state: &AppState) -> &Arc<dyn DocumentStore<Self>> {
        &state.events
    }

    fn media_key(&self) -> &str {
        &self.picture_key
    }

    fn category(&self) -> Category {
        self.category
    }

    fn media_prefix(_category: Category) -> String {
        "events".to_string()
    }

    fn create_fields(form: &Form) -> Result<Fields, AppError> {
        let title = form.required("title", FILL_ALL)?;
        let category = parse_category(
            "category",
            &form.required("category", PICK_CATEGORY)?,
            PICK_CATEGORY,
        )?;
        let date = parse_date("date", &form.required("date", FILL_ALL)?)?;
        form.require_file(PICK_IMAGE)?;

        let mut fields: Fields = vec![
            ("title", FieldValue::Text(title)),
            (
                "description",
                FieldValue::Text(form.text("description").unwrap_or_default().to_string()),
            ),
            ("date", FieldValue::Date(date)),
            (
                "url",
                FieldValue::Text(form.text("url").unwrap_or_default().to_string()),
            ),
            ("category", FieldValue::Category(category)),
        ];
        fields.extend(ticket_url(form).map(|v| ("ticket_url", v)));
        Ok(fields)
    }

    fn update_fields(form: &Form) -> Result<Fields, AppError> {
        let mut fields = Fields::new();
        if let Some(title) = form.changed("title", FILL_ALL)? {
            fields.push(("title", FieldValue::Text(title)));
        }
        for column in ["description", "url"] {
            if let Some(v) = form.text(column) {
                fields.push((column, FieldValue::Text(v.to_string())));
            }
        }
        if let Some(raw) = form.changed("date", FILL_ALL)? {
            fields.push(("date", FieldValue::Date(parse_date("date", &raw)?)));
        }
        if let Some(raw) = form.changed("category", PICK_CATEGORY)? {
            let category = parse_category("category", &raw, PICK_CATEGORY)?;
            fields.push(("category", FieldValue::Category(category)));
        }
        fields.extend(ticket_url(form).map(|v| ("ticket_url", v)));
        Ok(fields)
    }

    /// Linked visuals share their event's category, so an event cannot move
    /// away from the category of any visual that points at it.
    async fn check_references(
        state: &AppState,
        fields: &Fields,
        existing: Option<&Self>,
    ) -> Result<(), AppError> {
        let (Some(event), Some(category)) = (existing, category_in(fields)) else {
            return Ok(());
        };
        if category == event.category {
            return Ok(());
        }
        let stranded = visuals_linked_to(state, event.id)
            .await?
            .into_iter()
            .filter(|v| v.category != category)
            .count();
        if stranded > 0 {
            return Err(AppError::validation(
                "category",
                format!("{stranded} visual(s) linked to this event are in another category. Move or unlink them first."),
            ));
        }
        Ok(())
    }
}
