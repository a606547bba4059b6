use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::category::Category;
use crate::store::{FieldValue, Order, Record};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(with = "crate::iso_date")]
    pub date: Date,
    pub url: String,
    pub ticket_url: Option<String>,
    pub category: Category,
    pub picture_key: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Record for Event {
    const COLLECTION: &'static str = "events";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "title",
        "description",
        "date",
        "url",
        "ticket_url",
        "category",
        "picture_key",
        "created_at",
    ];
    const DEFAULT_ORDER: Order = Order::asc("title");
    const ORDER_COLUMNS: &'static [&'static str] = &["title", "date", "created_at"];
    const FILTER_COLUMNS: &'static [&'static str] = &["category"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn field(&self, column: &str) -> Option<FieldValue> {
        Some(match column {
            "title" => FieldValue::Text(self.title.clone()),
            "date" => FieldValue::Date(self.date),
            "created_at" => FieldValue::Timestamp(self.created_at),
            "category" => FieldValue::Category(self.category),
            _ => return None,
        })
    }
}
