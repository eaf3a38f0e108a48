use std::fmt;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::api::central::{PeripheralId, ShimId};
use crate::shim::characteristic::Characteristic;
use crate::shim::peripheral::Peripheral;
use crate::shim::router::Router;
use crate::shim::{read, write};

#[derive(Debug, Clone)]
struct ServiceState {
    uuid: Uuid,
    primary: bool,
    characteristics: Vec<ShimId>,
    stale: bool,
}

#[derive(Debug)]
pub(crate) struct ServiceEntity {
    id: ShimId,
    peripheral: PeripheralId,
    state: RwLock<ServiceState>,
}

impl ServiceEntity {
    pub(crate) fn new(id: ShimId, peripheral: PeripheralId, uuid: Uuid, primary: bool) -> Self {
        ServiceEntity {
            id,
            peripheral,
            state: RwLock::new(ServiceState {
                uuid,
                primary,
                characteristics: Vec::new(),
                stale: false,
            }),
        }
    }

    pub(crate) fn id(&self) -> &ShimId {
        &self.id
    }

    pub(crate) fn peripheral_id(&self) -> PeripheralId {
        self.peripheral
    }

    pub(crate) fn characteristic_ids(&self) -> Vec<ShimId> {
        read(&self.state).characteristics.clone()
    }

    pub(crate) fn apply_discovery(&self, uuid: Uuid, primary: bool) {
        let mut state = write(&self.state);
        state.uuid = uuid;
        state.primary = primary;
        state.stale = false;
    }

    pub(crate) fn attach_characteristic(&self, id: &ShimId) {
        let mut state = write(&self.state);
        if !state.characteristics.contains(id) {
            state.characteristics.push(id.clone());
        }
    }

    pub(crate) fn mark_stale(&self) {
        write(&self.state).stale = true;
    }
}

/// A discovered GATT service. Cheap to clone; all clones observe the same entity.
#[derive(Clone)]
pub struct Service {
    entity: Arc<ServiceEntity>,
    router: Arc<Router>,
}

impl Service {
    pub(crate) fn new(entity: Arc<ServiceEntity>, router: Arc<Router>) -> Self {
        Service { entity, router }
    }

    pub fn id(&self) -> &ShimId {
        self.entity.id()
    }

    pub fn uuid(&self) -> Uuid {
        read(&self.entity.state).uuid
    }

    pub fn is_primary(&self) -> bool {
        read(&self.entity.state).primary
    }

    /// Set once the owning peripheral disconnects, cleared by rediscovery.
    pub fn is_stale(&self) -> bool {
        read(&self.entity.state).stale
    }

    pub fn peripheral_id(&self) -> PeripheralId {
        self.entity.peripheral_id()
    }

    pub fn peripheral(&self) -> Option<Peripheral> {
        let entity = self.router.registry().peripherals.get(&self.entity.peripheral)?;
        Some(Peripheral::new(entity, Arc::clone(&self.router)))
    }

    /// Characteristics in discovery order.
    pub fn characteristics(&self) -> Vec<Characteristic> {
        let ids = self.entity.characteristic_ids();
        let registry = self.router.registry();
        ids.iter()
            .filter_map(|id| registry.characteristics.get(id))
            .map(|entity| Characteristic::new(entity, Arc::clone(&self.router)))
            .collect()
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<Characteristic> {
        self.characteristics().into_iter().find(|c| c.uuid() == uuid)
    }
}

impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entity, &other.entity)
    }
}

impl Eq for Service {}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = read(&self.entity.state);
        f.debug_struct("Service")
            .field("id", &self.entity.id)
            .field("uuid", &state.uuid)
            .field("primary", &state.primary)
            .field("characteristics", &state.characteristics)
            .field("stale", &state.stale)
            .finish()
    }
}
