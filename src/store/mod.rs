//! Collection-scoped document store with keyset pagination.
//!
//! Every collection is a [`Record`] type backed by a table. [`DocumentStore`]
//! is the seam handlers talk to; [`pg::PgDocuments`] is the production
//! implementation.

pub mod cursor;
#[cfg(test)]
pub mod memory;
pub mod pg;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow};
use thiserror::Error;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::category::Category;

pub use cursor::Cursor;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(Uuid),
    #[error("invalid pagination cursor")]
    InvalidCursor,
    #[error("cursor does not match this query; order and filters must stay the same across pages")]
    CursorMismatch,
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Pool and connection failures are outages, not query errors.
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(e.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// A typed column value used for inserts, partial updates, filters and cursors.
#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    OptText(Option<String>),
    Date(#[serde(with = "crate::iso_date")] Date),
    Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    Category(Category),
    Id(Uuid),
    OptId(Option<Uuid>),
}

impl FieldValue {
    /// JSON form matching how records serialize the same column.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::OptText(s) => s.clone().map(Value::String).unwrap_or(Value::Null),
            FieldValue::Date(d) => crate::iso_date::serialize(d, serde_json::value::Serializer)
                .unwrap_or(Value::Null),
            FieldValue::Timestamp(t) => {
                time::serde::rfc3339::serialize(t, serde_json::value::Serializer)
                    .unwrap_or(Value::Null)
            }
            FieldValue::Category(c) => Value::String(c.as_str().to_string()),
            FieldValue::Id(id) => Value::String(id.to_string()),
            FieldValue::OptId(id) => id.map(|i| Value::String(i.to_string())).unwrap_or(Value::Null),
        }
    }
}

/// Ordered column/value pairs. Columns always come from a record's static whitelist.
pub type Fields = Vec<(&'static str, FieldValue)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub direction: Direction,
}

impl Order {
    pub const fn asc(column: &'static str) -> Self {
        Self {
            column,
            direction: Direction::Asc,
        }
    }

    pub const fn desc(column: &'static str) -> Self {
        Self {
            column,
            direction: Direction::Desc,
        }
    }

    /// Resolves user-supplied ordering against the record's whitelist.
    pub fn parse<R: Record>(
        column: Option<&str>,
        direction: Option<&str>,
    ) -> Result<Self, StoreError> {
        let default = R::DEFAULT_ORDER;
        let column = match column.map(str::trim).filter(|c| !c.is_empty()) {
            None => default.column,
            Some(name) => R::ORDER_COLUMNS
                .iter()
                .copied()
                .find(|c| *c == name)
                .ok_or_else(|| StoreError::UnknownField(name.to_string()))?,
        };
        let implied = if column == default.column {
            default.direction
        } else {
            Direction::Asc
        };
        let direction = match direction.map(|d| d.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") => implied,
            Some("asc") => Direction::Asc,
            Some("desc") => Direction::Desc,
            Some(other) => return Err(StoreError::UnknownField(other.to_string())),
        };
        Ok(Self { column, direction })
    }
}

#[derive(Debug, Clone)]
pub struct PageQuery {
    pub filters: Fields,
    pub order: Order,
    pub page_size: u32,
    pub cursor: Option<Cursor>,
}

impl PageQuery {
    pub fn first(order: Order, page_size: u32) -> Self {
        Self {
            filters: Vec::new(),
            order,
            page_size,
            cursor: None,
        }
    }

    pub fn filter(mut self, column: &'static str, value: FieldValue) -> Self {
        self.filters.push((column, value));
        self
    }

    pub fn after(mut self, cursor: Option<Cursor>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Identity of the query a cursor belongs to: collection, ordering and filters.
    pub fn fingerprint(&self, collection: &str) -> String {
        let mut filters: Vec<String> = self
            .filters
            .iter()
            .map(|(col, v)| format!("{col}={}", v.to_json()))
            .collect();
        filters.sort();
        format!(
            "{collection}|{}:{}|{}",
            self.order.column,
            self.order.direction.as_sql(),
            filters.join("&")
        )
    }

    /// Fails when the cursor was produced by a different query.
    pub fn checked_cursor(&self, collection: &str) -> Result<Option<&Cursor>, StoreError> {
        match &self.cursor {
            None => Ok(None),
            Some(c) if c.fingerprint() == self.fingerprint(collection) => Ok(Some(c)),
            Some(_) => Err(StoreError::CursorMismatch),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<R> {
    pub items: Vec<R>,
    pub next_cursor: Option<String>,
}

/// A document collection backed by one table.
pub trait Record:
    Serialize + DeserializeOwned + for<'r> FromRow<'r, PgRow> + Clone + Send + Sync + Unpin + 'static
{
    const COLLECTION: &'static str;
    const COLUMNS: &'static [&'static str];
    const DEFAULT_ORDER: Order;
    const ORDER_COLUMNS: &'static [&'static str];
    const FILTER_COLUMNS: &'static [&'static str];

    fn id(&self) -> Uuid;

    /// Value of an orderable or filterable column.
    fn field(&self, column: &str) -> Option<FieldValue>;
}

/// Trims the over-fetched row and derives the cursor for the next page.
pub(crate) fn paginate<R: Record>(mut rows: Vec<R>, query: &PageQuery) -> Result<Page<R>, StoreError> {
    let limit = query.page_size as usize;
    if rows.len() <= limit {
        return Ok(Page {
            items: rows,
            next_cursor: None,
        });
    }
    rows.truncate(limit);
    let next_cursor = match rows.last() {
        Some(last) => {
            let value = last
                .field(query.order.column)
                .ok_or_else(|| StoreError::UnknownField(query.order.column.to_string()))?;
            Some(Cursor::new(query.fingerprint(R::COLLECTION), value, last.id()).encode())
        }
        None => None,
    };
    Ok(Page {
        items: rows,
        next_cursor,
    })
}

#[async_trait]
pub trait DocumentStore<R: Record>: Send + Sync {
    async fn create(&self, fields: Fields) -> Result<R, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<R>, StoreError>;

    async fn query(&self, query: &PageQuery) -> Result<Page<R>, StoreError>;

    async fn list(
        &self,
        order: Order,
        page_size: u32,
        cursor: Option<Cursor>,
    ) -> Result<Page<R>, StoreError> {
        self.query(&PageQuery::first(order, page_size).after(cursor))
            .await
    }

    /// Partial merge; columns absent from `fields` keep their value.
    async fn update(&self, id: Uuid, fields: Fields) -> Result<R, StoreError>;

    /// Removes the record and hands it back so callers can release its blob.
    async fn delete(&self, id: Uuid) -> Result<R, StoreError>;
}
