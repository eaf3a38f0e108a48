//! Identity map from helper-assigned ids to live entities.
//!
//! Only the router's dispatch path inserts, so read-then-create is race free
//! without any further coordination.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use log::debug;

use crate::api::central::{PeripheralId, ShimId};
use crate::shim::channel::ChannelEntity;
use crate::shim::characteristic::CharacteristicEntity;
use crate::shim::peripheral::PeripheralEntity;
use crate::shim::service::ServiceEntity;
use crate::{Error, Result};

#[derive(Debug)]
pub struct EntityMap<K, V> {
    kind: &'static str,
    entries: HashMap<K, Arc<V>>,
}

impl<K, V> EntityMap<K, V>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new(kind: &'static str) -> Self {
        EntityMap {
            kind,
            entries: HashMap::new(),
        }
    }

    /// Returns the existing entity or builds one; the flag tells which.
    pub fn get_or_create(&mut self, id: &K, create: impl FnOnce() -> V) -> (Arc<V>, bool) {
        if let Some(existing) = self.entries.get(id) {
            return (Arc::clone(existing), false);
        }
        debug!("new {} {}", self.kind, id);
        let entity = Arc::new(create());
        self.entries.insert(id.clone(), Arc::clone(&entity));
        (entity, true)
    }

    pub fn get(&self, id: &K) -> Option<Arc<V>> {
        self.entries.get(id).cloned()
    }

    /// Like [`get`](Self::get) but a miss is an [`Error::UnknownEntity`].
    pub fn require(&self, id: &K) -> Result<Arc<V>> {
        self.get(id).ok_or_else(|| Error::UnknownEntity {
            kind: self.kind,
            id: id.to_string(),
        })
    }

    pub fn values(&self) -> impl Iterator<Item = &Arc<V>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
pub struct Registry {
    pub(crate) peripherals: EntityMap<PeripheralId, PeripheralEntity>,
    pub(crate) services: EntityMap<ShimId, ServiceEntity>,
    pub(crate) characteristics: EntityMap<ShimId, CharacteristicEntity>,
    pub(crate) channels: EntityMap<ShimId, ChannelEntity>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            peripherals: EntityMap::new("peripheral"),
            services: EntityMap::new("service"),
            characteristics: EntityMap::new("characteristic"),
            channels: EntityMap::new("channel"),
        }
    }

    pub fn peripheral_count(&self) -> usize {
        self.peripherals.len()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn characteristic_count(&self) -> usize {
        self.characteristics.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Resolves the peripheral a characteristic ultimately belongs to.
    pub(crate) fn owner_of_characteristic(&self, id: &ShimId) -> Result<PeripheralId> {
        let characteristic = self.characteristics.require(id)?;
        let service = self.services.require(characteristic.service_id())?;
        Ok(service.peripheral_id())
    }

    /// Marks everything hanging off a disconnected peripheral stale. Ids stay
    /// mapped so a reconnect that rediscovers them gets the same instances.
    pub(crate) fn retire_tree(&self, peripheral: &PeripheralEntity) {
        for service_id in peripheral.service_ids() {
            let Some(service) = self.services.get(&service_id) else {
                continue;
            };
            service.mark_stale();
            for characteristic_id in service.characteristic_ids() {
                if let Some(characteristic) = self.characteristics.get(&characteristic_id) {
                    characteristic.mark_stale();
                }
            }
        }
        for channel in self.channels.values() {
            if channel.peer_id() == peripheral.id() {
                channel.apply_closed();
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::uuid::ShortUuid;

    #[test]
    fn get_or_create_is_idempotent() {
        let mut services: EntityMap<ShimId, ServiceEntity> = EntityMap::new("service");
        let peripheral = PeripheralId::new(Uuid::new_v4());
        let id = ShimId::from("S1");

        let (first, created) = services.get_or_create(&id, || {
            ServiceEntity::new(id.clone(), peripheral, Uuid::from_short(0x180d), true)
        });
        assert!(created);
        let (second, created) = services.get_or_create(&id, || {
            panic!("constructor must not run for a known id")
        });
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn require_reports_kind_and_id() {
        let channels: EntityMap<ShimId, ChannelEntity> = EntityMap::new("channel");
        match channels.require(&ShimId::from("L9")) {
            Err(Error::UnknownEntity { kind, id }) => {
                assert_eq!(kind, "channel");
                assert_eq!(id, "L9");
            }
            other => panic!("expected unknown entity, got {other:?}"),
        }
        assert!(channels.is_empty());
    }
}
