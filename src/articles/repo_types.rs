use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::category::Category;
use crate::store::{FieldValue, Order, Record};

/// A news article. `content` is stored already sanitized.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub category: Category,
    pub image_key: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Record for Article {
    const COLLECTION: &'static str = "news_articles";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "title",
        "content",
        "category",
        "image_key",
        "created_at",
    ];
    const DEFAULT_ORDER: Order = Order::desc("created_at");
    const ORDER_COLUMNS: &'static [&'static str] = &["created_at", "title"];
    const FILTER_COLUMNS: &'static [&'static str] = &["category"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn field(&self, column: &str) -> Option<FieldValue> {
        Some(match column {
            "title" => FieldValue::Text(self.title.clone()),
            "created_at" => FieldValue::Timestamp(self.created_at),
            "category" => FieldValue::Category(self.category),
            _ => return None,
        })
    }
}
