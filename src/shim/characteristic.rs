use std::fmt;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::api::central::ShimId;
use crate::api::characteristic::{CharacteristicProperties, CharacteristicProperty};
use crate::shim::router::Router;
use crate::shim::service::Service;
use crate::shim::{read, write};

#[derive(Debug, Clone)]
struct CharacteristicState {
    uuid: Uuid,
    properties: CharacteristicProperties,
    // swapped whole, never edited in place
    value: Option<Arc<[u8]>>,
    notifying: bool,
    stale: bool,
}

#[derive(Debug)]
pub(crate) struct CharacteristicEntity {
    id: ShimId,
    service: ShimId,
    state: RwLock<CharacteristicState>,
}

impl CharacteristicEntity {
    pub(crate) fn new(
        id: ShimId,
        service: ShimId,
        uuid: Uuid,
        properties: CharacteristicProperties,
    ) -> Self {
        CharacteristicEntity {
            id,
            service,
            state: RwLock::new(CharacteristicState {
                uuid,
                properties,
                value: None,
                notifying: false,
                stale: false,
            }),
        }
    }

    pub(crate) fn id(&self) -> &ShimId {
        &self.id
    }

    pub(crate) fn service_id(&self) -> &ShimId {
        &self.service
    }

    pub(crate) fn properties(&self) -> CharacteristicProperties {
        read(&self.state).properties
    }

    pub(crate) fn apply_discovery(&self, uuid: Uuid, properties: CharacteristicProperties) {
        let mut state = write(&self.state);
        state.uuid = uuid;
        state.properties = properties;
        state.stale = false;
    }

    pub(crate) fn apply_value(&self, value: Vec<u8>) {
        let value: Arc<[u8]> = value.into();
        write(&self.state).value = Some(value);
    }

    pub(crate) fn apply_notifying(&self, notifying: bool) {
        write(&self.state).notifying = notifying;
    }

    pub(crate) fn notifying(&self) -> bool {
        read(&self.state).notifying
    }

    pub(crate) fn mark_stale(&self) {
        let mut state = write(&self.state);
        state.stale = true;
        state.notifying = false;
    }
}

/// A discovered characteristic. Cheap to clone; all clones observe the same entity.
#[derive(Clone)]
pub struct Characteristic {
    entity: Arc<CharacteristicEntity>,
    router: Arc<Router>,
}

impl Characteristic {
    pub(crate) fn new(entity: Arc<CharacteristicEntity>, router: Arc<Router>) -> Self {
        Characteristic { entity, router }
    }

    pub fn id(&self) -> &ShimId {
        self.entity.id()
    }

    pub fn uuid(&self) -> Uuid {
        read(&self.entity.state).uuid
    }

    pub fn properties(&self) -> CharacteristicProperties {
        self.entity.properties()
    }

    pub fn has_property(&self, property: CharacteristicProperty) -> bool {
        self.properties().contains(property)
    }

    /// The last value the helper delivered. Readers get a snapshot that later
    /// updates never touch.
    pub fn value(&self) -> Option<Arc<[u8]>> {
        read(&self.entity.state).value.clone()
    }

    pub fn is_notifying(&self) -> bool {
        self.entity.notifying()
    }

    pub fn is_stale(&self) -> bool {
        read(&self.entity.state).stale
    }

    pub fn service_id(&self) -> &ShimId {
        self.entity.service_id()
    }

    pub fn service(&self) -> Option<Service> {
        let entity = self.router.registry().services.get(self.entity.service_id())?;
        Some(Service::new(entity, Arc::clone(&self.router)))
    }
}

impl PartialEq for Characteristic {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entity, &other.entity)
    }
}

impl Eq for Characteristic {}

impl fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = read(&self.entity.state);
        f.debug_struct("Characteristic")
            .field("id", &self.entity.id)
            .field("service", &self.entity.service)
            .field("uuid", &state.uuid)
            .field("properties", &state.properties)
            .field("notifying", &state.notifying)
            .field("stale", &state.stale)
            .finish()
    }
}
