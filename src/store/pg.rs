use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::{paginate, Direction, DocumentStore, FieldValue, Fields, Page, PageQuery, Record, StoreError};

/// Postgres-backed collection. Statements are assembled with `QueryBuilder`;
/// identifiers only ever come from the record's static column lists.
pub struct PgDocuments<R> {
    db: PgPool,
    _record: PhantomData<fn() -> R>,
}

impl<R> PgDocuments<R> {
    pub fn new(db: PgPool) -> Self {
        Self {
            db,
            _record: PhantomData,
        }
    }
}

fn push_value(qb: &mut QueryBuilder<'static, Postgres>, value: FieldValue) {
    match value {
        FieldValue::Text(v) => qb.push_bind(v),
        FieldValue::OptText(v) => qb.push_bind(v),
        FieldValue::Date(v) => qb.push_bind(v),
        FieldValue::Timestamp(v) => qb.push_bind(v),
        FieldValue::Category(v) => qb.push_bind(v),
        FieldValue::Id(v) => qb.push_bind(v),
        FieldValue::OptId(v) => qb.push_bind(v),
    };
}

fn ensure_columns(fields: &Fields, allowed: &[&str]) -> Result<(), StoreError> {
    match fields.iter().find(|(c, _)| !allowed.contains(c)) {
        Some((c, _)) => Err(StoreError::UnknownField((*c).to_string())),
        None => Ok(()),
    }
}

fn select_head<R: Record>() -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(R::COLUMNS.join(", "))
        .push(" FROM ")
        .push(R::COLLECTION);
    qb
}

pub(crate) fn select_page<R: Record>(
    query: &PageQuery,
) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    ensure_columns(&query.filters, R::FILTER_COLUMNS)?;
    if !R::ORDER_COLUMNS.contains(&query.order.column) {
        return Err(StoreError::UnknownField(query.order.column.to_string()));
    }
    let cursor = query.checked_cursor(R::COLLECTION)?;

    let column = query.order.column;
    let dir = query.order.direction.as_sql();

    let mut qb = select_head::<R>();
    qb.push(" WHERE TRUE");
    for (col, value) in &query.filters {
        qb.push(" AND ").push(*col).push(" IS NOT DISTINCT FROM ");
        push_value(&mut qb, value.clone());
    }
    if let Some(c) = cursor {
        let cmp = match query.order.direction {
            Direction::Asc => " > ",
            Direction::Desc => " < ",
        };
        qb.push(" AND (").push(column).push(", id)").push(cmp).push("(");
        push_value(&mut qb, c.value().clone());
        qb.push(", ").push_bind(c.id()).push(")");
    }
    qb.push(" ORDER BY ")
        .push(column)
        .push(" ")
        .push(dir)
        .push(", id ")
        .push(dir)
        .push(" LIMIT ")
        .push_bind(i64::from(query.page_size) + 1);
    Ok(qb)
}

pub(crate) fn insert<R: Record>(fields: Fields) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    ensure_columns(&fields, R::COLUMNS)?;
    let mut qb = QueryBuilder::new("INSERT INTO ");
    qb.push(R::COLLECTION).push(" (");
    let names: Vec<&str> = fields.iter().map(|(c, _)| *c).collect();
    qb.push(names.join(", ")).push(") VALUES (");
    for (i, (_, value)) in fields.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_value(&mut qb, value);
    }
    qb.push(") RETURNING ").push(R::COLUMNS.join(", "));
    Ok(qb)
}

pub(crate) fn update<R: Record>(
    id: Uuid,
    fields: Fields,
) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    ensure_columns(&fields, R::COLUMNS)?;
    let mut qb = QueryBuilder::new("UPDATE ");
    qb.push(R::COLLECTION).push(" SET ");
    for (i, (col, value)) in fields.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(col).push(" = ");
        push_value(&mut qb, value);
    }
    qb.push(" WHERE id = ")
        .push_bind(id)
        .push(" RETURNING ")
        .push(R::COLUMNS.join(", "));
    Ok(qb)
}

#[async_trait]
impl<R: Record> DocumentStore<R> for PgDocuments<R> {
    async fn create(&self, fields: Fields) -> Result<R, StoreError> {
        let mut qb = insert::<R>(fields)?;
        let row = qb.build_query_as::<R>().fetch_one(&self.db).await?;
        debug!(collection = R::COLLECTION, id = %row.id(), "document created");
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<R>, StoreError> {
        let mut qb = select_head::<R>();
        qb.push(" WHERE id = ").push_bind(id);
        Ok(qb.build_query_as::<R>().fetch_optional(&self.db).await?)
    }

    async fn query(&self, query: &PageQuery) -> Result<Page<R>, StoreError> {
        let mut qb = select_page::<R>(query)?;
        let rows = qb.build_query_as::<R>().fetch_all(&self.db).await?;
        paginate(rows, query)
    }

    async fn update(&self, id: Uuid, fields: Fields) -> Result<R, StoreError> {
        if fields.is_empty() {
            return self.get(id).await?.ok_or(StoreError::NotFound(id));
        }
        let mut qb = update::<R>(id, fields)?;
        qb.build_query_as::<R>()
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn delete(&self, id: Uuid) -> Result<R, StoreError> {
        let mut qb = QueryBuilder::new("DELETE FROM ");
        qb.push(R::COLLECTION)
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(R::COLUMNS.join(", "));
        qb.build_query_as::<R>()
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound(id))
    }
}
