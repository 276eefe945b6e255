use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{validate_transaction, Item, ItemKey, KvStore, Query, QueryPage, WriteOp};
use crate::error::StoreError;

const NO_FAULT: usize = usize::MAX;

/// Ordered in-process store. Transactions are staged and only applied once
/// every condition has passed, so readers never see a partial write.
#[derive(Debug)]
pub struct MemoryStore {
    items: RwLock<BTreeMap<ItemKey, Item>>,
    fault_after: AtomicUsize,
    commits: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            fault_after: AtomicUsize::new(NO_FAULT),
            commits: AtomicUsize::new(0),
        }
    }

    /// Makes the next transaction fail with a backend error once `staged_ops`
    /// of its ops have been staged.
    pub fn inject_fault_after(&self, staged_ops: usize) {
        self.fault_after.store(staged_ops, Ordering::SeqCst);
    }

    pub fn committed_transactions(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    pub async fn contains(&self, key: &ItemKey) -> bool {
        self.items.read().await.contains_key(key)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn query(&self, query: &Query) -> Result<QueryPage, StoreError> {
        if query.limit == 0 {
            return Err(StoreError::Invalid("query limit must be positive".to_string()));
        }
        let items = self.items.read().await;
        let start = ItemKey::new(query.pk.clone(), String::new());

        let mut matched = items
            .range(start..)
            .take_while(|(key, _)| key.pk == query.pk)
            .filter(|(key, _)| query.condition.matches(&key.sk))
            .filter(|(key, _)| {
                query
                    .exclusive_start
                    .as_deref()
                    .map_or(true, |after| key.sk.as_str() > after)
            })
            .map(|(_, item)| item.clone());

        let page: Vec<Item> = matched.by_ref().take(query.limit).collect();
        let last_evaluated_key = if matched.next().is_some() {
            page.last().map(|item| item.key.sk.clone())
        } else {
            None
        };

        Ok(QueryPage {
            items: page,
            last_evaluated_key,
        })
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        validate_transaction(&ops)?;
        let fault_after = self.fault_after.swap(NO_FAULT, Ordering::SeqCst);

        let mut items = self.items.write().await;
        let mut staged = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            if index == fault_after {
                return Err(StoreError::Backend("injected fault".to_string()));
            }
            let current = items.get(op.key());
            if let Some(condition) = op.condition() {
                if !condition.is_satisfied(current) {
                    return Err(StoreError::ConditionFailed {
                        index,
                        key: op.key().clone(),
                    });
                }
            }
            staged.push(op.apply(current));
        }

        for item in staged {
            items.insert(item.key.clone(), item);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|_, item| item.expires_at.map_or(true, |at| at > now));
        Ok(before - items.len())
    }
}
