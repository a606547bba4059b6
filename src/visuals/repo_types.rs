use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::category::Category;
use crate::store::{FieldValue, Order, Record};

/// An image or video, optionally tied to an event of the same category.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Visual {
    pub id: Uuid,
    pub title: String,
    pub media_key: String,
    pub category: Category,
    pub event_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Record for Visual {
    const COLLECTION: &'static str = "visuals";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "title",
        "media_key",
        "category",
        "event_id",
        "created_at",
    ];
    const DEFAULT_ORDER: Order = Order::asc("title");
    const ORDER_COLUMNS: &'static [&'static str] = &["title", "created_at"];
    const FILTER_COLUMNS: &'static [&'static str] = &["category", "event_id"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn field(&self, column: &str) -> Option<FieldValue> {
        Some(match column {
            "title" => FieldValue::Text(self.title.clone()),
            "created_at" => FieldValue::Timestamp(self.created_at),
            "category" => FieldValue::Category(self.category),
            "event_id" => FieldValue::OptId(self.event_id),
            _ => return None,
        })
    }
}
