//! In-memory collection used by tests, with switches to simulate store outages.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{paginate, Direction, DocumentStore, Fields, Page, PageQuery, Record, StoreError};

pub struct MemoryDocuments<R> {
    rows: Mutex<Vec<R>>,
    pub fail_creates: AtomicBool,
    pub fail_updates: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl<R: Record> Default for MemoryDocuments<R> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fail_creates: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }
}

impl<R: Record> MemoryDocuments<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn snapshot(&self) -> Vec<R> {
        self.rows.lock().unwrap().clone()
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<(), StoreError> {
        if flag.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{op} rejected")));
        }
        Ok(())
    }
}

fn merge(target: &mut Map<String, Value>, fields: Fields) {
    for (col, value) in fields {
        target.insert(col.to_string(), value.to_json());
    }
}

fn materialize<R: Record>(doc: Map<String, Value>) -> Result<R, StoreError> {
    serde_json::from_value(Value::Object(doc))
        .map_err(|e| StoreError::Unavailable(format!("incomplete document: {e}")))
}

fn sort_key<R: Record>(row: &R, column: &str) -> (Option<super::FieldValue>, Uuid) {
    (row.field(column), row.id())
}

#[async_trait]
impl<R: Record> DocumentStore<R> for MemoryDocuments<R> {
    async fn create(&self, fields: Fields) -> Result<R, StoreError> {
        Self::check(&self.fail_creates, "create")?;
        let mut doc = Map::new();
        doc.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        let now = time::serde::rfc3339::serialize(
            &OffsetDateTime::now_utc(),
            serde_json::value::Serializer,
        )
        .unwrap_or(Value::Null);
        doc.insert("created_at".into(), now);
        merge(&mut doc, fields);
        let row: R = materialize(doc)?;
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<R>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id() == id)
            .cloned())
    }

    async fn query(&self, query: &PageQuery) -> Result<Page<R>, StoreError> {
        let cursor = query.checked_cursor(R::COLLECTION)?;
        let column = query.order.column;
        let mut rows: Vec<R> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                query
                    .filters
                    .iter()
                    .all(|(col, v)| r.field(col).as_ref() == Some(v))
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let ord = sort_key(a, column)
                .partial_cmp(&sort_key(b, column))
                .unwrap_or(Ordering::Equal);
            match query.order.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            }
        });

        if let Some(c) = cursor {
            let pivot = (Some(c.value().clone()), c.id());
            rows.retain(|r| {
                let key = sort_key(r, column);
                match query.order.direction {
                    Direction::Asc => key > pivot,
                    Direction::Desc => key < pivot,
                }
            });
        }

        rows.truncate(query.page_size as usize + 1);
        paginate(rows, query)
    }

    async fn update(&self, id: Uuid, fields: Fields) -> Result<R, StoreError> {
        Self::check(&self.fail_updates, "update")?;
        let mut rows = self.rows.lock().unwrap();
        let slot = rows
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or(StoreError::NotFound(id))?;
        let mut doc = match serde_json::to_value(&*slot) {
            Ok(Value::Object(map)) => map,
            _ => return Err(StoreError::Unavailable("record is not an object".into())),
        };
        merge(&mut doc, fields);
        let updated: R = materialize(doc)?;
        *slot = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<R, StoreError> {
        Self::check(&self.fail_deletes, "delete")?;
        let mut rows = self.rows.lock().unwrap();
        let pos = rows
            .iter()
            .position(|r| r.id() == id)
            .ok_or(StoreError::NotFound(id))?;
        Ok(rows.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::events::repo_types::Event;
    use crate::store::{Cursor, FieldValue, Order};
    use std::collections::HashSet;

    fn event_fields(title: &str, category: Category) -> Fields {
        vec![
            ("title", FieldValue::Text(title.into())),
            ("description", FieldValue::Text(String::new())),
            ("date", FieldValue::Date(time::macros::date!(2024 - 05 - 01))),
            ("url", FieldValue::Text(String::new())),
            ("ticket_url", FieldValue::OptText(None)),
            ("category", FieldValue::Category(category)),
            ("picture_key", FieldValue::Text(format!("events/{title}.jpg"))),
        ]
    }

    async fn seeded(n: usize) -> MemoryDocuments<Event> {
        let store = MemoryDocuments::<Event>::new();
        for i in 0..n {
            store
                .create(event_fields(&format!("event-{i:03}"), Category::InTheCity))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn load_more_accumulates_without_gaps_or_duplicates() {
        let page_size = 3;
        let loads = 4;
        let store = seeded(page_size * loads + 2).await;

        let order = Order::asc("title");
        let mut seen = Vec::new();
        let mut cursor: Option<Cursor> = None;
        for _ in 0..loads {
            let page = store.list(order, page_size as u32, cursor.clone()).await.unwrap();
            seen.extend(page.items.iter().map(|e| e.title.clone()));
            cursor = page.next_cursor.as_deref().map(|c| Cursor::decode(c).unwrap());
        }

        assert_eq!(seen.len(), page_size * loads);
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), seen.len());
        let expected: Vec<String> = (0..page_size * loads).map(|i| format!("event-{i:03}")).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn last_page_has_no_cursor() {
        let store = seeded(4).await;
        let first = store.list(Order::asc("title"), 3, None).await.unwrap();
        let cursor = Cursor::decode(first.next_cursor.as_deref().unwrap()).unwrap();
        let second = store.list(Order::asc("title"), 3, Some(cursor)).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn descending_order_walks_backwards() {
        let store = seeded(5).await;
        let page = store.list(Order::desc("title"), 2, None).await.unwrap();
        let titles: Vec<_> = page.items.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["event-004", "event-003"]);
        let cursor = Cursor::decode(page.next_cursor.as_deref().unwrap()).unwrap();
        let page = store.list(Order::desc("title"), 2, Some(cursor)).await.unwrap();
        let titles: Vec<_> = page.items.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["event-002", "event-001"]);
    }

    #[tokio::test]
    async fn filters_apply_before_paging() {
        let store = seeded(3).await;
        store
            .create(event_fields("daisies", Category::RockingTheDaisies))
            .await
            .unwrap();
        let q = PageQuery::first(Order::asc("title"), 10)
            .filter("category", FieldValue::Category(Category::RockingTheDaisies));
        let page = store.query(&q).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "daisies");
    }

    #[tokio::test]
    async fn update_merges_only_given_fields() {
        let store = seeded(1).await;
        let before = store.snapshot().remove(0);
        let after = store
            .update(before.id, vec![("title", FieldValue::Text("renamed".into()))])
            .await
            .unwrap();
        assert_eq!(after.title, "renamed");
        assert_eq!(after.picture_key, before.picture_key);
        assert_eq!(after.date, before.date);
        assert_eq!(after.id, before.id);
    }

    #[tokio::test]
    async fn failed_delete_keeps_record() {
        let store = seeded(1).await;
        let id = store.snapshot()[0].id;
        store.fail_deletes.store(true, AtomicOrdering::SeqCst);
        assert!(store.delete(id).await.is_err());
        assert_eq!(store.len(), 1);
    }
}
