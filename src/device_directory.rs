use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::errors::*;
use crate::ledger::*;
use crate::models::*;
use crate::types::*;

/// Sync identifiers of a named entity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntityDevice {
    pub key: i32,
    pub device_key: i32,
    pub device_id: String,
    pub currency: Option<String>,
}

/// Resolves entities to device identifiers, caching lookups for the lifetime
/// of one payload build.
pub struct DeviceDirectory<'a, S: LedgerStore + ?Sized> {
    store: &'a S,
    entities: RefCell<HashMap<(EntityTable, String), EntityDevice>>,
    primary: RefCell<Option<DeviceInfo>>,
}

impl<'a, S: LedgerStore + ?Sized> DeviceDirectory<'a, S> {
    pub fn new(store: &'a S) -> DeviceDirectory<'a, S> {
        DeviceDirectory {
            store,
            entities: RefCell::new(HashMap::new()),
            primary: RefCell::new(None),
        }
    }

    pub fn resolve(&self, table: EntityTable, name: &str) -> Result<EntityDevice> {
        let cache_key = (table, name.to_string());
        if let Some(device) = self.entities.borrow().get(&cache_key) {
            return Ok(device.clone());
        }
        let row = self
            .store
            .find_entity(table, name)?
            .ok_or_else(|| Error::from(ErrorKind::NotFound(format!("{} '{}'", table, name))))?;
        // Entities created before sync was enabled have no device key of
        // their own and are addressed by their storage key.
        let device_id = match row.device_id_key {
            Some(device_id_key) => self.store.device_id(device_id_key)?.unwrap_or_default(),
            None => String::new(),
        };
        let device = EntityDevice {
            key: row.key,
            device_key: row.device_key.unwrap_or(row.key),
            device_id,
            currency: row.currency,
        };
        debug!("Resolved {} '{}' to device key {}", table, name, device.device_key);
        self.entities.borrow_mut().insert(cache_key, device.clone());
        Ok(device)
    }

    pub fn primary_device(&self) -> Result<DeviceInfo> {
        if let Some(device) = self.primary.borrow().as_ref() {
            return Ok(device.clone());
        }
        let device = self.store.primary_device()?.ok_or_else(|| {
            Error::from(ErrorKind::SyncMisconfigured(
                "no active primary device in DeviceInfo".to_string(),
            ))
        })?;
        *self.primary.borrow_mut() = Some(device.clone());
        Ok(device)
    }
}
