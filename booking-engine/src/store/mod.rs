//! Single-table key-value store abstraction.
//!
//! Every backend offers point reads, ordered range queries within one
//! partition, and an all-or-nothing multi-item write with per-item
//! preconditions. The write primitive is the only concurrency control the
//! engine relies on.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::collections::HashSet;
use std::fmt;
use std::ops::Bound;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// Upper bound on items in one transaction.
pub const MAX_TRANSACT_ITEMS: usize = 25;

pub type Attributes = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.pk, self.sk)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub key: ItemKey,
    pub attrs: Attributes,
    /// Once passed, the item may be removed by [`KvStore::purge_expired`].
    pub expires_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn new(key: ItemKey, attrs: Attributes) -> Self {
        Self {
            key,
            attrs,
            expires_at: None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }
}

/// Per-item precondition evaluated inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists,
    NotExists,
    /// The item exists and `name` holds one of `values`.
    AttributeIn { name: String, values: Vec<Value> },
}

impl Condition {
    pub fn attribute_in(name: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Self {
        Condition::AttributeIn {
            name: name.into(),
            values: values.into_iter().collect(),
        }
    }

    pub fn is_satisfied(&self, current: Option<&Item>) -> bool {
        match (self, current) {
            (Condition::Exists, current) => current.is_some(),
            (Condition::NotExists, current) => current.is_none(),
            (Condition::AttributeIn { name, values }, Some(item)) => item
                .attr(name)
                .map_or(false, |value| values.contains(value)),
            (Condition::AttributeIn { .. }, None) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replaces the whole item.
    Put {
        item: Item,
        condition: Option<Condition>,
    },
    /// Merges `set` into the item's attributes, creating it if absent and unconditioned.
    Update {
        key: ItemKey,
        set: Attributes,
        expires_at: Option<DateTime<Utc>>,
        condition: Option<Condition>,
    },
}

impl WriteOp {
    pub fn put(item: Item) -> Self {
        WriteOp::Put {
            item,
            condition: None,
        }
    }

    pub fn put_new(item: Item) -> Self {
        WriteOp::Put {
            item,
            condition: Some(Condition::NotExists),
        }
    }

    pub fn put_if(item: Item, condition: Condition) -> Self {
        WriteOp::Put {
            item,
            condition: Some(condition),
        }
    }

    pub fn update(key: ItemKey, set: Attributes, condition: Condition) -> Self {
        WriteOp::Update {
            key,
            set,
            expires_at: None,
            condition: Some(condition),
        }
    }

    pub fn with_expiry(mut self, at: DateTime<Utc>) -> Self {
        match &mut self {
            WriteOp::Put { item, .. } => item.expires_at = Some(at),
            WriteOp::Update { expires_at, .. } => *expires_at = Some(at),
        }
        self
    }

    pub fn key(&self) -> &ItemKey {
        match self {
            WriteOp::Put { item, .. } => &item.key,
            WriteOp::Update { key, .. } => key,
        }
    }

    pub fn condition(&self) -> Option<&Condition> {
        match self {
            WriteOp::Put { condition, .. } | WriteOp::Update { condition, .. } => condition.as_ref(),
        }
    }

    /// Produces the item this op leaves behind given the current one.
    pub fn apply(&self, current: Option<&Item>) -> Item {
        match self {
            WriteOp::Put { item, .. } => item.clone(),
            WriteOp::Update {
                key,
                set,
                expires_at,
                ..
            } => {
                let mut next = current
                    .cloned()
                    .unwrap_or_else(|| Item::new(key.clone(), Attributes::new()));
                for (name, value) in set {
                    next.attrs.insert(name.clone(), value.clone());
                }
                if expires_at.is_some() {
                    next.expires_at = *expires_at;
                }
                next
            }
        }
    }
}

/// Rejects empty, oversized, or self-conflicting transactions before touching the backend.
pub fn validate_transaction(ops: &[WriteOp]) -> Result<(), StoreError> {
    if ops.is_empty() {
        return Err(StoreError::Invalid("transaction has no items".to_string()));
    }
    if ops.len() > MAX_TRANSACT_ITEMS {
        return Err(StoreError::Invalid(format!(
            "transaction has {} items, limit is {}",
            ops.len(),
            MAX_TRANSACT_ITEMS
        )));
    }
    let mut seen = HashSet::with_capacity(ops.len());
    for op in ops {
        if !seen.insert(op.key()) {
            return Err(StoreError::Invalid(format!(
                "item {} appears twice in one transaction",
                op.key()
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortKeyCondition {
    BeginsWith(String),
    Range {
        lower: Bound<String>,
        upper: Bound<String>,
    },
}

impl SortKeyCondition {
    pub fn matches(&self, sk: &str) -> bool {
        match self {
            SortKeyCondition::BeginsWith(prefix) => sk.starts_with(prefix.as_str()),
            SortKeyCondition::Range { lower, upper } => {
                let above = match lower {
                    Bound::Included(l) => sk >= l.as_str(),
                    Bound::Excluded(l) => sk > l.as_str(),
                    Bound::Unbounded => true,
                };
                let below = match upper {
                    Bound::Included(u) => sk <= u.as_str(),
                    Bound::Excluded(u) => sk < u.as_str(),
                    Bound::Unbounded => true,
                };
                above && below
            }
        }
    }
}

/// A single-partition query in ascending sort-key order.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub pk: String,
    pub condition: SortKeyCondition,
    pub limit: usize,
    pub exclusive_start: Option<String>,
}

impl Query {
    pub fn begins_with(pk: impl Into<String>, prefix: impl Into<String>, limit: usize) -> Self {
        Self {
            pk: pk.into(),
            condition: SortKeyCondition::BeginsWith(prefix.into()),
            limit,
            exclusive_start: None,
        }
    }

    pub fn range(pk: impl Into<String>, lower: Bound<String>, upper: Bound<String>, limit: usize) -> Self {
        Self {
            pk: pk.into(),
            condition: SortKeyCondition::Range { lower, upper },
            limit,
            exclusive_start: None,
        }
    }

    pub fn starting_after(mut self, sk: Option<String>) -> Self {
        self.exclusive_start = sk;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub items: Vec<Item>,
    /// Sort key to resume from; `None` once the partition range is exhausted.
    pub last_evaluated_key: Option<String>,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>, StoreError>;

    async fn query(&self, query: &Query) -> Result<QueryPage, StoreError>;

    /// Applies every op or none. A failed condition yields
    /// [`StoreError::ConditionFailed`] naming the first offending op.
    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Deletes items whose expiry is at or before `now`, returning how many went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Drains every page of `query`. Any page failure fails the whole read.
pub async fn query_all(store: &dyn KvStore, query: Query) -> Result<Vec<Item>, StoreError> {
    let mut items = Vec::new();
    let mut next = query;
    loop {
        let page = store.query(&next).await?;
        items.extend(page.items);
        match page.last_evaluated_key {
            Some(last) => next = next.starting_after(Some(last)),
            None => return Ok(items),
        }
    }
}
