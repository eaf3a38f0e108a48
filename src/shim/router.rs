//! Single fan-in/fan-out point between the proxies and the transport.

use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, Weak};

use futures::StreamExt;
use log::{debug, error, trace, warn};
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::api::central::{EventStream, PeripheralState};
use crate::api::central_event::{CentralEvent, CentralState, ManagerAuthorization};
use crate::error::TransportError;
use crate::shim::channel::ChannelEntity;
use crate::shim::characteristic::CharacteristicEntity;
use crate::shim::codec::{self, Message};
use crate::shim::config::BridgeConfig;
use crate::shim::peripheral::PeripheralEntity;
use crate::shim::registry::Registry;
use crate::shim::service::ServiceEntity;
use crate::shim::transport::{Inbound, Transport};
use crate::shim::{lock, read, write};
use crate::{Error, Result};

/// Owns the transport's handler and the entity registry.
///
/// Construct exactly one per transport with [`Router::install`]; installing a
/// second router on the same transport takes the handler over from the first.
pub struct Router {
    transport: Arc<dyn Transport>,
    config: BridgeConfig,
    registry: RwLock<Registry>,
    central: RwLock<(CentralState, ManagerAuthorization)>,
    listeners: Mutex<Vec<UnboundedSender<CentralEvent>>>,
}

impl Router {
    pub fn install(transport: Arc<dyn Transport>, config: BridgeConfig) -> Arc<Router> {
        let router = Arc::new(Router {
            transport,
            config,
            registry: RwLock::new(Registry::new()),
            central: RwLock::new(Default::default()),
            listeners: Mutex::new(Vec::new()),
        });
        let weak: Weak<Router> = Arc::downgrade(&router);
        router.transport.set_handler(Arc::new(move |inbound| {
            if let Some(router) = weak.upgrade() {
                router.handle_inbound(inbound);
            }
        }));
        router
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    pub fn central_state(&self) -> (CentralState, ManagerAuthorization) {
        *read(&self.central)
    }

    pub fn registry(&self) -> RwLockReadGuard<'_, Registry> {
        read(&self.registry)
    }

    /// Forwards a request verbatim. A closed transport fails here, before anything is written.
    pub fn send(&self, message: Message) -> Result<()> {
        if !self.transport.is_open() {
            return Err(TransportError::Closed.into());
        }
        let frame = codec::encode(&message)?;
        debug!("-> {}", message.kind());
        self.transport.send(frame)?;
        Ok(())
    }

    /// Registers a listener; it stays registered until the stream is dropped.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_listener(tx);
        EventStream::new(rx)
    }

    pub fn add_listener(&self, listener: UnboundedSender<CentralEvent>) {
        if self.transport.is_open() {
            lock(&self.listeners).push(listener);
        }
    }

    /// Entry point for the transport handler. Runs one message to completion.
    pub fn handle_inbound(&self, inbound: Inbound) {
        match inbound {
            Inbound::Frame(frame) => match codec::decode(&frame) {
                Ok(message) => self.dispatch(message),
                Err(err) => warn!("dropping malformed message: {}", err),
            },
            Inbound::Closed => self.transport_closed(),
        }
    }

    pub fn dispatch(&self, message: Message) {
        let kind = message.kind();
        trace!("<- {:?}", message);
        if !message.is_event() {
            warn!("helper sent request `{}`, dropping", kind);
            return;
        }
        match self.apply(message) {
            Ok(Some(event)) => self.publish(event),
            Ok(None) => {}
            Err(Error::UnknownEntity { kind: entity, id }) => {
                warn!("dropping stale `{}` for unknown {} {}", kind, entity, id)
            }
            Err(err) => warn!("dropping `{}`: {}", kind, err),
        }
    }

    fn apply(&self, message: Message) -> Result<Option<CentralEvent>> {
        let event = match message {
            Message::CentralStateChanged {
                state,
                authorization,
            } => {
                *write(&self.central) = (state, authorization);
                CentralEvent::StateUpdate {
                    state,
                    authorization,
                }
            }
            Message::PeripheralDiscovered {
                peripheral_id,
                name,
                advertisement_data,
                rssi,
            } => {
                let (peripheral, _) = write(&self.registry)
                    .peripherals
                    .get_or_create(&peripheral_id, || PeripheralEntity::new(peripheral_id));
                peripheral.apply_discovery(name, advertisement_data.clone(), rssi);
                CentralEvent::DeviceDiscovered {
                    peripheral_id,
                    name: peripheral.name(),
                    advertisement: advertisement_data,
                    rssi,
                }
            }
            Message::NameUpdated {
                peripheral_id,
                name,
            } => {
                self.registry()
                    .peripherals
                    .require(&peripheral_id)?
                    .apply_name(name.clone());
                CentralEvent::NameUpdated {
                    peripheral_id,
                    name,
                }
            }
            Message::StateChanged {
                peripheral_id,
                state,
                error,
            } => {
                let registry = self.registry();
                let peripheral = registry.peripherals.require(&peripheral_id)?;
                peripheral.apply_state(state);
                if state == PeripheralState::Disconnected {
                    registry.retire_tree(&peripheral);
                }
                CentralEvent::PeripheralStateChanged {
                    peripheral_id,
                    state,
                    error,
                }
            }
            Message::ServiceDiscovered {
                peripheral_id,
                service_id,
                uuid,
                primary,
            } => {
                let mut registry = write(&self.registry);
                let peripheral = registry.peripherals.require(&peripheral_id)?;
                let (service, _) = registry.services.get_or_create(&service_id, || {
                    ServiceEntity::new(service_id.clone(), peripheral_id, uuid, primary)
                });
                if service.peripheral_id() != peripheral_id {
                    return Err(Error::violation(format!(
                        "service {} already belongs to {}",
                        service_id,
                        service.peripheral_id()
                    )));
                }
                service.apply_discovery(uuid, primary);
                peripheral.attach_service(&service_id);
                CentralEvent::ServicesDiscovered {
                    peripheral_id,
                    service_id,
                }
            }
            Message::CharacteristicDiscovered {
                service_id,
                characteristic_id,
                uuid,
                properties,
            } => {
                let mut registry = write(&self.registry);
                let service = registry.services.require(&service_id)?;
                let (characteristic, _) =
                    registry
                        .characteristics
                        .get_or_create(&characteristic_id, || {
                            CharacteristicEntity::new(
                                characteristic_id.clone(),
                                service_id.clone(),
                                uuid,
                                properties,
                            )
                        });
                if characteristic.service_id() != &service_id {
                    return Err(Error::violation(format!(
                        "characteristic {} already belongs to {}",
                        characteristic_id,
                        characteristic.service_id()
                    )));
                }
                characteristic.apply_discovery(uuid, properties);
                service.attach_characteristic(&characteristic_id);
                CentralEvent::CharacteristicsDiscovered {
                    service_id,
                    characteristic_id,
                }
            }
            Message::CharacteristicValueUpdated {
                characteristic_id,
                value,
                error,
            } => {
                let characteristic = self.registry().characteristics.require(&characteristic_id)?;
                // a failed read leaves the last good value in place
                let value = match (value, &error) {
                    (Some(value), None) => {
                        characteristic.apply_value(value.clone());
                        value
                    }
                    (_, Some(_)) => Vec::new(),
                    (None, None) => {
                        return Err(Error::violation("value update carries neither value nor error"));
                    }
                };
                CentralEvent::ValueUpdated {
                    characteristic_id,
                    value,
                    error,
                }
            }
            Message::WriteResponse {
                characteristic_id,
                error,
            } => {
                self.registry().characteristics.require(&characteristic_id)?;
                CentralEvent::WriteCompleted {
                    characteristic_id,
                    error,
                }
            }
            Message::NotifyStateUpdated {
                characteristic_id,
                notifying,
                error,
            } => {
                let characteristic = self.registry().characteristics.require(&characteristic_id)?;
                if error.is_none() {
                    characteristic.apply_notifying(notifying);
                }
                CentralEvent::NotificationStateUpdated {
                    characteristic_id,
                    notifying: characteristic.notifying(),
                    error,
                }
            }
            Message::ChannelOpened {
                peripheral_id,
                channel_id,
                psm,
                input_stream,
                output_stream,
            } => {
                let mut registry = write(&self.registry);
                registry.peripherals.require(&peripheral_id)?;
                let (channel, _) = registry.channels.get_or_create(&channel_id, || {
                    ChannelEntity::new(channel_id.clone(), peripheral_id, psm)
                });
                if channel.peer_id() != peripheral_id {
                    return Err(Error::violation(format!(
                        "channel {} already belongs to {}",
                        channel_id,
                        channel.peer_id()
                    )));
                }
                channel.apply_open(psm, input_stream, output_stream);
                CentralEvent::ChannelOpened {
                    peripheral_id,
                    channel_id,
                    psm,
                }
            }
            Message::ChannelDataReceived { channel_id, data } => {
                self.registry().channels.require(&channel_id)?;
                CentralEvent::ChannelData { channel_id, data }
            }
            Message::ChannelClosed { channel_id } => {
                self.registry().channels.require(&channel_id)?.apply_closed();
                CentralEvent::ChannelClosed { channel_id }
            }
            request => {
                return Err(Error::violation(format!(
                    "`{}` is not an event",
                    request.kind()
                )));
            }
        };
        Ok(Some(event))
    }

    fn publish(&self, event: CentralEvent) {
        let mut listeners = lock(&self.listeners);
        listeners.retain(|listener| listener.send(event.clone()).is_ok());
    }

    /// Everything that was live drops to disconnected through the usual event
    /// path, then every listener stream ends.
    fn transport_closed(&self) {
        error!("transport to helper closed");
        let mut events = Vec::new();
        {
            let registry = self.registry();
            for peripheral in registry.peripherals.values() {
                if peripheral.state() == PeripheralState::Disconnected {
                    continue;
                }
                peripheral.apply_state(PeripheralState::Disconnected);
                registry.retire_tree(peripheral);
                events.push(CentralEvent::PeripheralStateChanged {
                    peripheral_id: peripheral.id(),
                    state: PeripheralState::Disconnected,
                    error: Some("transport closed".to_string()),
                });
            }
        }
        let authorization = {
            let mut central = write(&self.central);
            central.0 = CentralState::Unknown;
            central.1
        };
        events.push(CentralEvent::StateUpdate {
            state: CentralState::Unknown,
            authorization,
        });
        for event in events {
            self.publish(event);
        }
        lock(&self.listeners).clear();
    }
}

/// Drains `events` until `matcher` produces a result. A stream that ends first
/// means the transport went away.
pub(crate) async fn wait_for<T, F>(mut events: EventStream, mut matcher: F) -> Result<T>
where
    F: FnMut(CentralEvent) -> Option<Result<T>> + Send,
{
    while let Some(event) = events.next().await {
        if let Some(result) = matcher(event) {
            return result;
        }
    }
    Err(TransportError::Closed.into())
}
