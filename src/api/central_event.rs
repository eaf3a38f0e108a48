use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::central::{PeripheralId, PeripheralState, Psm, ShimId};

/// Notifications published to every listener after the matching inbound
/// message has been applied to the proxy graph.
#[derive(Debug, Clone, PartialEq)]
pub enum CentralEvent {
    StateUpdate {
        state: CentralState,
        authorization: ManagerAuthorization,
    },
    DeviceDiscovered {
        peripheral_id: PeripheralId,
        name: Option<String>,
        advertisement: AdvertisementData,
        rssi: Option<i16>,
    },
    NameUpdated {
        peripheral_id: PeripheralId,
        name: String,
    },
    PeripheralStateChanged {
        peripheral_id: PeripheralId,
        state: PeripheralState,
        error: Option<String>,
    },
    ServicesDiscovered {
        peripheral_id: PeripheralId,
        service_id: ShimId,
    },
    CharacteristicsDiscovered {
        service_id: ShimId,
        characteristic_id: ShimId,
    },
    ValueUpdated {
        characteristic_id: ShimId,
        value: Vec<u8>,
        error: Option<String>,
    },
    WriteCompleted {
        characteristic_id: ShimId,
        error: Option<String>,
    },
    NotificationStateUpdated {
        characteristic_id: ShimId,
        notifying: bool,
        error: Option<String>,
    },
    ChannelOpened {
        peripheral_id: PeripheralId,
        channel_id: ShimId,
        psm: Psm,
    },
    ChannelData {
        channel_id: ShimId,
        data: Vec<u8>,
    },
    ChannelClosed {
        channel_id: ShimId,
    },
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CentralState {
    #[default]
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ManagerAuthorization {
    #[default]
    NotDetermined,
    Restricted,
    Denied,
    AllowedAlways,
}

impl ManagerAuthorization {
    pub fn is_authorized(&self) -> bool {
        *self != ManagerAuthorization::Restricted && *self != ManagerAuthorization::Denied
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdvertisementData {
    pub local_name: Option<String>,
    #[serde(with = "crate::shim::codec::base64_bytes::option")]
    pub manufacturer_data: Option<Vec<u8>>,
    #[serde(with = "crate::uuid::wire::list")]
    pub service_uuids: Option<Vec<Uuid>>,
    pub tx_power_level: Option<i16>,
    pub is_connectable: Option<bool>,
}
