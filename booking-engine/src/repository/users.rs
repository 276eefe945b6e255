use std::sync::Arc;

use tracing::{error, info};

use crate::error::{BookingError, Result, StoreError};
use crate::keys::{self, KeyTag};
use crate::models::{validate_identifier, User};
use crate::projections;
use crate::store::{query_all, KvStore, Query, WriteOp};

#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn KvStore>,
    page_size: usize,
}

impl UserRepository {
    pub fn new(store: Arc<dyn KvStore>, page_size: usize) -> Self {
        Self { store, page_size }
    }

    /// Registers a user under a unique id and a unique (case-insensitive) email.
    pub async fn add_user(&self, user: &User) -> Result<()> {
        validate_identifier("user_id", &user.user_id)?;
        if !user.email.contains('@') {
            return Err(BookingError::InvalidInput(format!(
                "'{}' is not an email address",
                user.email
            )));
        }
        if self.user_id_for_email(&user.email).await?.is_some() {
            return Err(BookingError::UserAlreadyExists(user.email.clone()));
        }

        let ops = projections::user_items(user)
            .into_iter()
            .map(WriteOp::put_new)
            .collect();
        match self.store.transact_write(ops).await {
            Ok(()) => {
                info!("User {} registered", user.user_id);
                Ok(())
            }
            Err(StoreError::ConditionFailed { .. }) => {
                Err(BookingError::UserAlreadyExists(user.email.clone()))
            }
            Err(err) => {
                error!("Error registering user {}: {}", user.user_id, err);
                Err(err.into())
            }
        }
    }

    pub async fn get_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let item = self
            .store
            .get(&keys::user_details(user_id))
            .await
            .map_err(|err| {
                error!("Error retrieving user by id {}: {}", user_id, err);
                err
            })?;
        item.as_ref().map(projections::user_from_item).transpose()
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.user_id_for_email(email).await? {
            Some(user_id) => self.get_by_id(&user_id).await,
            None => Ok(None),
        }
    }

    async fn user_id_for_email(&self, email: &str) -> Result<Option<String>> {
        let query = Query::begins_with(keys::email_pk(email), KeyTag::User.prefix(), self.page_size);
        let items = query_all(self.store.as_ref(), query).await.map_err(|err| {
            error!("Error retrieving user by email: {}", err);
            err
        })?;
        Ok(items
            .first()
            .and_then(|item| KeyTag::User.strip(&item.key.sk))
            .map(str::to_string))
    }
}
