use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use std::ops::Bound;
use tracing::{debug, error};

use super::{
    validate_transaction, Condition, Item, ItemKey, KvStore, Query, QueryPage, SortKeyCondition,
    WriteOp,
};
use crate::error::StoreError;
use crate::schema::items;

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::items)]
struct ItemRow {
    pk: String,
    sk: String,
    attrs: serde_json::Value,
    expires_at: Option<DateTime<Utc>>,
}

impl From<&Item> for ItemRow {
    fn from(item: &Item) -> Self {
        Self {
            pk: item.key.pk.clone(),
            sk: item.key.sk.clone(),
            attrs: serde_json::Value::Object(item.attrs.clone()),
            expires_at: item.expires_at,
        }
    }
}

impl TryFrom<ItemRow> for Item {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        match row.attrs {
            serde_json::Value::Object(attrs) => Ok(Item {
                key: ItemKey::new(row.pk, row.sk),
                attrs,
                expires_at: row.expires_at,
            }),
            other => Err(StoreError::Invalid(format!(
                "item {} / {} has non-object attributes: {}",
                row.pk, row.sk, other
            ))),
        }
    }
}

/// Postgres-backed table. Conditions are checked under row locks inside a
/// single database transaction; the `(pk, sk)` primary key backs `NotExists`.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<PooledConnection<'_, AsyncPgConnection>, StoreError> {
        self.pool.get().await.map_err(|e| {
            error!("Error acquiring database connection: {}", e);
            StoreError::Backend(e.to_string())
        })
    }
}

/// Escapes `LIKE` metacharacters so a prefix matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

async fn write_op(conn: &mut AsyncPgConnection, index: usize, op: &WriteOp) -> Result<(), StoreError> {
    let key = op.key();
    let condition_failed = || StoreError::ConditionFailed {
        index,
        key: key.clone(),
    };

    if let WriteOp::Put {
        item,
        condition: Some(Condition::NotExists),
    } = op
    {
        let inserted = diesel::insert_into(items::table)
            .values(&ItemRow::from(item))
            .on_conflict_do_nothing()
            .execute(conn)
            .await?;
        return if inserted == 1 { Ok(()) } else { Err(condition_failed()) };
    }

    let current = items::table
        .find((&key.pk, &key.sk))
        .for_update()
        .first::<ItemRow>(conn)
        .await
        .optional()?
        .map(Item::try_from)
        .transpose()?;

    if let Some(condition) = op.condition() {
        if !condition.is_satisfied(current.as_ref()) {
            return Err(condition_failed());
        }
    }

    let row = ItemRow::from(&op.apply(current.as_ref()));
    diesel::insert_into(items::table)
        .values(&row)
        .on_conflict((items::pk, items::sk))
        .do_update()
        .set((items::attrs.eq(row.attrs.clone()), items::expires_at.eq(row.expires_at)))
        .execute(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl KvStore for PgStore {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        let mut conn = self.conn().await?;
        items::table
            .find((&key.pk, &key.sk))
            .first::<ItemRow>(&mut conn)
            .await
            .optional()?
            .map(Item::try_from)
            .transpose()
    }

    async fn query(&self, query: &Query) -> Result<QueryPage, StoreError> {
        if query.limit == 0 {
            return Err(StoreError::Invalid("query limit must be positive".to_string()));
        }
        let mut conn = self.conn().await?;

        let mut statement = items::table.filter(items::pk.eq(&query.pk)).into_boxed();
        match &query.condition {
            SortKeyCondition::BeginsWith(prefix) => {
                statement = statement.filter(items::sk.like(like_prefix(prefix)));
            }
            SortKeyCondition::Range { lower, upper } => {
                statement = match lower {
                    Bound::Included(l) => statement.filter(items::sk.ge(l.clone())),
                    Bound::Excluded(l) => statement.filter(items::sk.gt(l.clone())),
                    Bound::Unbounded => statement,
                };
                statement = match upper {
                    Bound::Included(u) => statement.filter(items::sk.le(u.clone())),
                    Bound::Excluded(u) => statement.filter(items::sk.lt(u.clone())),
                    Bound::Unbounded => statement,
                };
            }
        }
        if let Some(after) = &query.exclusive_start {
            statement = statement.filter(items::sk.gt(after.clone()));
        }

        // One extra row tells us whether another page exists.
        let mut rows = statement
            .order(items::sk.asc())
            .limit(query.limit as i64 + 1)
            .load::<ItemRow>(&mut conn)
            .await?;
        let more = rows.len() > query.limit;
        rows.truncate(query.limit);

        let items = rows
            .into_iter()
            .map(Item::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let last_evaluated_key = if more {
            items.last().map(|item| item.key.sk.clone())
        } else {
            None
        };
        Ok(QueryPage {
            items,
            last_evaluated_key,
        })
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        validate_transaction(&ops)?;
        let mut conn = self.conn().await?;

        // Rows are locked in key order so two transactions cannot deadlock on each other.
        let mut order: Vec<usize> = (0..ops.len()).collect();
        order.sort_by(|a, b| ops[*a].key().cmp(ops[*b].key()));

        conn.transaction::<_, StoreError, _>(|conn| {
            Box::pin(async move {
                for index in order {
                    write_op(conn, index, &ops[index]).await?;
                }
                Ok(())
            })
        })
        .await?;

        debug!("Committed transaction");
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(items::table.filter(items::expires_at.le(now)))
            .execute(&mut conn)
            .await?;
        Ok(deleted)
    }
}
