use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::Result;
use crate::api::central_event::{CentralEvent, CentralState, ManagerAuthorization};
use crate::api::characteristic::CharacteristicWriteType;

/// L2CAP protocol/service multiplexer.
pub type Psm = u16;

/// The client-facing central manager surface. Operations return as soon as the
/// request is handed to the transport; results arrive later on [`events`](Self::events).
pub trait CentralManager: Send + Sync {
    type Peripheral: PeripheralRemote;

    fn state(&self) -> CentralState;

    fn authorization(&self) -> ManagerAuthorization;

    fn start_scan(&self, filter: ScanFilter) -> Result<()>;

    fn stop_scan(&self) -> Result<()>;

    fn peripherals(&self) -> Vec<Self::Peripheral>;

    fn peripheral(&self, id: &PeripheralId) -> Option<Self::Peripheral>;

    fn events(&self) -> EventStream;
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanFilter {
    pub services: Vec<Uuid>,
    pub allow_duplicates: bool,
}

impl ScanFilter {
    pub fn with_services(services: impl IntoIterator<Item = Uuid>) -> Self {
        ScanFilter {
            services: services.into_iter().collect(),
            allow_duplicates: false,
        }
    }
}

/// Awaiting layer on top of the fire-and-forget peripheral operations.
///
/// Each call registers for events before sending its request and resolves on the
/// first matching event. There are no timeouts; wrap calls in
/// `tokio::time::timeout` when the helper may never answer.
#[async_trait]
pub trait PeripheralRemote: Send + Sync {
    type Service: Send + Sync;
    type Characteristic: Send + Sync;

    fn id(&self) -> PeripheralId;

    fn services(&self) -> Vec<Self::Service>;

    fn is_connected(&self) -> bool;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn write(
        &self,
        characteristic: &Self::Characteristic,
        data: &[u8],
        write_type: CharacteristicWriteType,
    ) -> Result<()>;

    async fn read(&self, characteristic: &Self::Characteristic) -> Result<Vec<u8>>;

    // subscribe to notifications
    async fn subscribe(&self, characteristic: &Self::Characteristic) -> Result<()>;

    // unsubscribe to notifications
    async fn unsubscribe(&self, characteristic: &Self::Characteristic) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeripheralId(Uuid);

impl PeripheralId {
    pub fn new(uuid: Uuid) -> Self {
        PeripheralId(uuid)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for PeripheralId {
    fn from(uuid: Uuid) -> Self {
        PeripheralId(uuid)
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Identifier the helper assigns to every service, characteristic and channel.
/// Only ever echoed back, never minted on this side.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShimId(String);

impl ShimId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ShimId {
    fn from(id: &str) -> Self {
        ShimId(id.to_string())
    }
}

impl From<String> for ShimId {
    fn from(id: String) -> Self {
        ShimId(id)
    }
}

impl fmt::Display for ShimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeripheralState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Listener handle returned by the router. Dropping it unregisters the listener.
#[derive(Debug)]
pub struct EventStream {
    receiver: UnboundedReceiver<CentralEvent>,
}

impl EventStream {
    pub(crate) fn new(receiver: UnboundedReceiver<CentralEvent>) -> Self {
        EventStream { receiver }
    }

    pub async fn recv(&mut self) -> Option<CentralEvent> {
        self.receiver.recv().await
    }

    /// Events already published, without waiting.
    pub fn try_recv(&mut self) -> Option<CentralEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = CentralEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
