use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use log::debug;
use uuid::Uuid;

use crate::api::central::{PeripheralId, PeripheralRemote, PeripheralState, Psm, ShimId};
use crate::api::central_event::{AdvertisementData, CentralEvent};
use crate::api::characteristic::{CharacteristicProperty, CharacteristicWriteType};
use crate::shim::channel::Channel;
use crate::shim::characteristic::Characteristic;
use crate::shim::codec::Message;
use crate::shim::router::{Router, wait_for};
use crate::shim::service::Service;
use crate::shim::{read, write};
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
struct PeripheralSnapshot {
    name: Option<String>,
    state: PeripheralState,
    services: Vec<ShimId>,
    advertisement: AdvertisementData,
    rssi: Option<i16>,
}

#[derive(Debug)]
pub(crate) struct PeripheralEntity {
    id: PeripheralId,
    snapshot: RwLock<PeripheralSnapshot>,
}

impl PeripheralEntity {
    pub(crate) fn new(id: PeripheralId) -> Self {
        PeripheralEntity {
            id,
            snapshot: RwLock::new(PeripheralSnapshot::default()),
        }
    }

    pub(crate) fn id(&self) -> PeripheralId {
        self.id
    }

    pub(crate) fn name(&self) -> Option<String> {
        read(&self.snapshot).name.clone()
    }

    pub(crate) fn state(&self) -> PeripheralState {
        read(&self.snapshot).state
    }

    pub(crate) fn service_ids(&self) -> Vec<ShimId> {
        read(&self.snapshot).services.clone()
    }

    /// A discovery without a name keeps the one already known.
    pub(crate) fn apply_discovery(
        &self,
        name: Option<String>,
        advertisement: AdvertisementData,
        rssi: Option<i16>,
    ) {
        let mut snapshot = write(&self.snapshot);
        if let Some(name) = name.or_else(|| advertisement.local_name.clone()) {
            snapshot.name = Some(name);
        }
        snapshot.advertisement = advertisement;
        if rssi.is_some() {
            snapshot.rssi = rssi;
        }
    }

    pub(crate) fn apply_name(&self, name: String) {
        write(&self.snapshot).name = Some(name);
    }

    pub(crate) fn apply_state(&self, state: PeripheralState) {
        write(&self.snapshot).state = state;
    }

    pub(crate) fn attach_service(&self, id: &ShimId) {
        let mut snapshot = write(&self.snapshot);
        if !snapshot.services.contains(id) {
            snapshot.services.push(id.clone());
        }
    }
}

/// Client-side stand-in for a remote peripheral.
///
/// Request methods return once the message is on its way; the outcome arrives as
/// a [`CentralEvent`]. Nothing here changes local state, only inbound events do.
#[derive(Clone)]
pub struct Peripheral {
    entity: Arc<PeripheralEntity>,
    router: Arc<Router>,
}

impl Peripheral {
    pub(crate) fn new(entity: Arc<PeripheralEntity>, router: Arc<Router>) -> Self {
        Peripheral { entity, router }
    }

    pub fn identifier(&self) -> PeripheralId {
        self.entity.id
    }

    pub fn name(&self) -> Option<String> {
        self.entity.name()
    }

    pub fn state(&self) -> PeripheralState {
        self.entity.state()
    }

    pub fn advertisement_data(&self) -> AdvertisementData {
        read(&self.entity.snapshot).advertisement.clone()
    }

    pub fn rssi(&self) -> Option<i16> {
        read(&self.entity.snapshot).rssi
    }

    /// Services in discovery order.
    pub fn discovered_services(&self) -> Vec<Service> {
        let ids = self.entity.service_ids();
        let registry = self.router.registry();
        ids.iter()
            .filter_map(|id| registry.services.get(id))
            .map(|entity| Service::new(entity, Arc::clone(&self.router)))
            .collect()
    }

    pub fn service(&self, uuid: Uuid) -> Option<Service> {
        self.discovered_services()
            .into_iter()
            .find(|service| service.uuid() == uuid)
    }

    pub fn channels(&self) -> Vec<Channel> {
        let registry = self.router.registry();
        registry
            .channels
            .values()
            .filter(|channel| channel.peer_id() == self.entity.id)
            .map(|entity| Channel::new(Arc::clone(entity), Arc::clone(&self.router)))
            .collect()
    }

    /// An empty filter asks for every service.
    pub fn discover_services(&self, uuids: &[Uuid]) -> Result<()> {
        self.ensure_connected("discoverServices")?;
        self.router.send(Message::DiscoverServices {
            peripheral_id: self.entity.id,
            service_uuids: filter(uuids),
        })
    }

    pub fn discover_characteristics(&self, uuids: &[Uuid], service: &Service) -> Result<()> {
        self.ensure_connected("discoverCharacteristics")?;
        if service.peripheral_id() != self.entity.id {
            return Err(Error::violation(format!(
                "service {} belongs to {}, not {}",
                service.id(),
                service.peripheral_id(),
                self.entity.id
            )));
        }
        self.router.send(Message::DiscoverCharacteristics {
            peripheral_id: self.entity.id,
            service_id: service.id().clone(),
            characteristic_uuids: filter(uuids),
        })
    }

    pub fn read_value(&self, characteristic: &Characteristic) -> Result<()> {
        self.ensure_usable(characteristic, "readValue")?;
        if !characteristic.has_property(CharacteristicProperty::Read) {
            return Err(Error::violation(format!(
                "characteristic {} is not readable",
                characteristic.id()
            )));
        }
        self.router.send(Message::ReadValue {
            characteristic_id: characteristic.id().clone(),
        })
    }

    pub fn write_value(
        &self,
        data: &[u8],
        characteristic: &Characteristic,
        write_type: CharacteristicWriteType,
    ) -> Result<()> {
        self.ensure_usable(characteristic, "writeValue")?;
        let required = match write_type {
            CharacteristicWriteType::WriteWithResponse => CharacteristicProperty::Write,
            CharacteristicWriteType::WriteWithoutResponse => {
                CharacteristicProperty::WriteWithoutResponse
            }
        };
        if !characteristic.has_property(required) {
            return Err(Error::violation(format!(
                "characteristic {} does not support {:?}",
                characteristic.id(),
                write_type
            )));
        }
        self.router.send(Message::WriteValue {
            characteristic_id: characteristic.id().clone(),
            value: data.to_vec(),
            write_type,
        })
    }

    pub fn set_notify_value(&self, enabled: bool, characteristic: &Characteristic) -> Result<()> {
        self.ensure_usable(characteristic, "setNotifyValue")?;
        if !characteristic.has_property(CharacteristicProperty::Notify)
            && !characteristic.has_property(CharacteristicProperty::Indicate)
        {
            return Err(Error::violation(format!(
                "characteristic {} neither notifies nor indicates",
                characteristic.id()
            )));
        }
        self.router.send(Message::SetNotifyValue {
            characteristic_id: characteristic.id().clone(),
            enabled,
        })
    }

    pub fn open_l2cap_channel(&self, psm: Psm) -> Result<()> {
        self.ensure_connected("openL2CAPChannel")?;
        self.router.send(Message::OpenL2capChannel {
            peripheral_id: self.entity.id,
            psm,
        })
    }

    pub fn maximum_write_value_length(&self, write_type: CharacteristicWriteType) -> usize {
        self.router.config().max_write_len(write_type)
    }

    pub fn can_send_write_without_response(&self) -> bool {
        self.state() == PeripheralState::Connected
    }

    fn ensure_connected(&self, operation: &str) -> Result<()> {
        match self.state() {
            PeripheralState::Connected => Ok(()),
            state => Err(Error::violation(format!(
                "{} on {} while {:?}",
                operation, self.entity.id, state
            ))),
        }
    }

    fn ensure_usable(&self, characteristic: &Characteristic, operation: &str) -> Result<()> {
        self.ensure_connected(operation)?;
        let owner = self
            .router
            .registry()
            .owner_of_characteristic(characteristic.id())?;
        if owner != self.entity.id {
            return Err(Error::violation(format!(
                "characteristic {} belongs to {}, not {}",
                characteristic.id(),
                owner,
                self.entity.id
            )));
        }
        Ok(())
    }
}

fn filter(uuids: &[Uuid]) -> Option<Vec<Uuid>> {
    if uuids.is_empty() {
        None
    } else {
        Some(uuids.to_vec())
    }
}

fn remote(error: Option<String>, fallback: &str) -> Error {
    Error::Remote(error.unwrap_or_else(|| fallback.to_string()))
}

#[async_trait]
impl PeripheralRemote for Peripheral {
    type Service = Service;
    type Characteristic = Characteristic;

    fn id(&self) -> PeripheralId {
        self.entity.id
    }

    fn services(&self) -> Vec<Service> {
        self.discovered_services()
    }

    fn is_connected(&self) -> bool {
        self.state() == PeripheralState::Connected
    }

    async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let id = self.entity.id;
        let events = self.router.subscribe();
        self.router.send(Message::Connect { peripheral_id: id })?;
        debug!("awaiting connection to {}", id);
        wait_for(events, |event| match event {
            CentralEvent::PeripheralStateChanged {
                peripheral_id,
                state,
                error,
            } if peripheral_id == id => match state {
                PeripheralState::Connected => Some(Ok(())),
                PeripheralState::Disconnected => Some(Err(remote(error, "connection failed"))),
                _ => None,
            },
            _ => None,
        })
        .await
    }

    async fn disconnect(&self) -> Result<()> {
        if self.state() == PeripheralState::Disconnected {
            return Ok(());
        }
        let id = self.entity.id;
        let events = self.router.subscribe();
        self.router.send(Message::Disconnect { peripheral_id: id })?;
        wait_for(events, |event| match event {
            CentralEvent::PeripheralStateChanged {
                peripheral_id,
                state: PeripheralState::Disconnected,
                ..
            } if peripheral_id == id => Some(Ok(())),
            _ => None,
        })
        .await
    }

    async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        write_type: CharacteristicWriteType,
    ) -> Result<()> {
        if write_type == CharacteristicWriteType::WriteWithoutResponse {
            return self.write_value(data, characteristic, write_type);
        }
        let id = characteristic.id().clone();
        let events = self.router.subscribe();
        self.write_value(data, characteristic, write_type)?;
        wait_for(events, |event| match event {
            CentralEvent::WriteCompleted {
                characteristic_id,
                error,
            } if characteristic_id == id => Some(match error {
                None => Ok(()),
                Some(error) => Err(Error::Remote(error)),
            }),
            _ => None,
        })
        .await
    }

    // A notification that lands first resolves the read too; both carry the current value.
    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>> {
        let id = characteristic.id().clone();
        let events = self.router.subscribe();
        self.read_value(characteristic)?;
        wait_for(events, |event| match event {
            CentralEvent::ValueUpdated {
                characteristic_id,
                value,
                error,
            } if characteristic_id == id => Some(match error {
                None => Ok(value),
                Some(error) => Err(Error::Remote(error)),
            }),
            _ => None,
        })
        .await
    }

    async fn subscribe(&self, characteristic: &Characteristic) -> Result<()> {
        self.await_notify_state(characteristic, true).await
    }

    async fn unsubscribe(&self, characteristic: &Characteristic) -> Result<()> {
        self.await_notify_state(characteristic, false).await
    }
}

impl Peripheral {
    async fn await_notify_state(&self, characteristic: &Characteristic, enabled: bool) -> Result<()> {
        if characteristic.is_notifying() == enabled {
            return Ok(());
        }
        let id = characteristic.id().clone();
        let events = self.router.subscribe();
        self.set_notify_value(enabled, characteristic)?;
        wait_for(events, |event| match event {
            CentralEvent::NotificationStateUpdated {
                characteristic_id,
                notifying,
                error,
            } if characteristic_id == id => Some(match error {
                Some(error) => Err(Error::Remote(error)),
                None if notifying == enabled => Ok(()),
                None => Err(remote(None, "helper did not change notification state")),
            }),
            _ => None,
        })
        .await
    }
}

impl PartialEq for Peripheral {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entity, &other.entity)
    }
}

impl Eq for Peripheral {}

impl fmt::Debug for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = read(&self.entity.snapshot);
        f.debug_struct("Peripheral")
            .field("id", &self.entity.id)
            .field("name", &snapshot.name)
            .field("state", &snapshot.state)
            .field("services", &snapshot.services)
            .finish()
    }
}
