use std::sync::Arc;

use bigdecimal::BigDecimal;
use num_traits::Zero;
use tracing::{error, info};

use crate::error::{BookingError, Resource, Result, StoreError};
use crate::keys::{self, KeyTag};
use crate::models::{validate_identifier, Category, Room, RoomStatus};
use crate::projections;
use crate::store::{query_all, KvStore, Query, WriteOp};

#[derive(Clone)]
pub struct RoomRepository {
    store: Arc<dyn KvStore>,
    page_size: usize,
}

impl RoomRepository {
    pub fn new(store: Arc<dyn KvStore>, page_size: usize) -> Self {
        Self { store, page_size }
    }

    /// Writes the details and membership items together; a duplicate id fails both.
    pub async fn add_room(&self, room_id: &str, category: Category) -> Result<Room> {
        validate_identifier("room_id", room_id)?;
        let room = Room::new(room_id, category);
        let ops = vec![
            WriteOp::put_new(projections::room_details_item(&room)),
            WriteOp::put_new(projections::room_membership_item(&room)),
        ];

        match self.store.transact_write(ops).await {
            Ok(()) => {
                info!("Room {} added to {}", room_id, category);
                Ok(room)
            }
            Err(StoreError::ConditionFailed { .. }) => {
                Err(BookingError::RoomAlreadyExists(room_id.to_string()))
            }
            Err(err) => {
                error!("Error adding room {}: {}", room_id, err);
                Err(err.into())
            }
        }
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Option<Room>> {
        let item = self
            .store
            .get(&keys::room_details(room_id))
            .await
            .map_err(|err| {
                error!("Error retrieving room by id {}: {}", room_id, err);
                err
            })?;
        item.as_ref().map(projections::room_from_item).transpose()
    }

    /// Every room id in the category, in key order.
    pub async fn room_ids_by_category(&self, category: Category) -> Result<Vec<String>> {
        let query = Query::begins_with(keys::category_pk(category), KeyTag::Room.prefix(), self.page_size);
        let items = query_all(self.store.as_ref(), query).await.map_err(|err| {
            error!("Error retrieving {} rooms: {}", category, err);
            err
        })?;
        items.iter().map(projections::member_room_id).collect()
    }

    pub async fn update_room_status(&self, room_id: &str, status: RoomStatus) -> Result<()> {
        match self
            .store
            .transact_write(vec![projections::room_status_update(room_id, status)])
            .await
        {
            Ok(()) => {
                info!("Room {} status set to {}", room_id, status);
                Ok(())
            }
            Err(StoreError::ConditionFailed { .. }) => Err(BookingError::not_found(Resource::Room, room_id)),
            Err(err) => {
                error!("Error updating room {} status: {}", room_id, err);
                Err(err.into())
            }
        }
    }

    pub async fn put_category_price(&self, category: Category, price: &BigDecimal) -> Result<()> {
        if price <= &BigDecimal::zero() {
            return Err(BookingError::InvalidInput(format!(
                "price for {} must be positive",
                category
            )));
        }
        self.store
            .transact_write(vec![WriteOp::put(projections::category_item(category, price))])
            .await
            .map_err(|err| {
                error!("Error storing category {} price: {}", category, err);
                BookingError::from(err)
            })
    }

    pub async fn category_price(&self, category: Category) -> Result<Option<BigDecimal>> {
        let item = self
            .store
            .get(&keys::category_details(category))
            .await
            .map_err(|err| {
                error!("Error retrieving category {} details: {}", category, err);
                err
            })?;
        item.as_ref().map(projections::price_from_item).transpose()
    }
}
