//! Wire format: one JSON object per frame, discriminated by its `type` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::api::central::{PeripheralId, PeripheralState, Psm, ShimId};
use crate::api::central_event::{AdvertisementData, CentralState, ManagerAuthorization};
use crate::api::characteristic::{CharacteristicProperties, CharacteristicWriteType};

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("not a json record: {0}")]
    Json(#[source] serde_json::Error),

    #[error("record has no `type` field")]
    MissingType,

    #[error("bad `{kind}` record: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("`{kind}` record without `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Message {
    // central manager, outbound
    ScanStart {
        #[serde(default, with = "crate::uuid::wire::list", skip_serializing_if = "Option::is_none")]
        service_uuids: Option<Vec<Uuid>>,
        #[serde(default)]
        allow_duplicates: bool,
    },
    ScanStop,
    Connect {
        peripheral_id: PeripheralId,
    },
    Disconnect {
        peripheral_id: PeripheralId,
    },

    // central manager, inbound
    CentralStateChanged {
        state: CentralState,
        #[serde(default)]
        authorization: ManagerAuthorization,
    },
    PeripheralDiscovered {
        peripheral_id: PeripheralId,
        #[serde(default)]
        name: Option<String>,
        advertisement_data: AdvertisementData,
        #[serde(default)]
        rssi: Option<i16>,
    },
    NameUpdated {
        peripheral_id: PeripheralId,
        name: String,
    },
    StateChanged {
        peripheral_id: PeripheralId,
        state: PeripheralState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // peripheral, outbound
    DiscoverServices {
        peripheral_id: PeripheralId,
        #[serde(default, with = "crate::uuid::wire::list", skip_serializing_if = "Option::is_none")]
        service_uuids: Option<Vec<Uuid>>,
    },
    DiscoverCharacteristics {
        peripheral_id: PeripheralId,
        service_id: ShimId,
        #[serde(default, with = "crate::uuid::wire::list", skip_serializing_if = "Option::is_none")]
        characteristic_uuids: Option<Vec<Uuid>>,
    },
    ReadValue {
        characteristic_id: ShimId,
    },
    WriteValue {
        characteristic_id: ShimId,
        #[serde(with = "base64_bytes")]
        value: Vec<u8>,
        write_type: CharacteristicWriteType,
    },
    SetNotifyValue {
        characteristic_id: ShimId,
        enabled: bool,
    },
    #[serde(rename = "openL2CAPChannel")]
    OpenL2capChannel {
        peripheral_id: PeripheralId,
        psm: Psm,
    },

    // peripheral, inbound
    ServiceDiscovered {
        peripheral_id: PeripheralId,
        service_id: ShimId,
        #[serde(with = "crate::uuid::wire")]
        uuid: Uuid,
        primary: bool,
    },
    CharacteristicDiscovered {
        service_id: ShimId,
        characteristic_id: ShimId,
        #[serde(with = "crate::uuid::wire")]
        uuid: Uuid,
        properties: CharacteristicProperties,
    },
    CharacteristicValueUpdated {
        characteristic_id: ShimId,
        /// Absent only when `error` is set.
        #[serde(default, with = "base64_bytes::option", skip_serializing_if = "Option::is_none")]
        value: Option<Vec<u8>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    WriteResponse {
        characteristic_id: ShimId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    NotifyStateUpdated {
        characteristic_id: ShimId,
        notifying: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // l2cap
    ChannelOpened {
        peripheral_id: PeripheralId,
        channel_id: ShimId,
        psm: Psm,
        input_stream: String,
        output_stream: String,
    },
    ChannelWrite {
        channel_id: ShimId,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    ChannelDataReceived {
        channel_id: ShimId,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    CloseChannel {
        channel_id: ShimId,
    },
    ChannelClosed {
        channel_id: ShimId,
    },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ScanStart { .. } => "scanStart",
            Message::ScanStop => "scanStop",
            Message::Connect { .. } => "connect",
            Message::Disconnect { .. } => "disconnect",
            Message::CentralStateChanged { .. } => "centralStateChanged",
            Message::PeripheralDiscovered { .. } => "peripheralDiscovered",
            Message::NameUpdated { .. } => "nameUpdated",
            Message::StateChanged { .. } => "stateChanged",
            Message::DiscoverServices { .. } => "discoverServices",
            Message::DiscoverCharacteristics { .. } => "discoverCharacteristics",
            Message::ReadValue { .. } => "readValue",
            Message::WriteValue { .. } => "writeValue",
            Message::SetNotifyValue { .. } => "setNotifyValue",
            Message::OpenL2capChannel { .. } => "openL2CAPChannel",
            Message::ServiceDiscovered { .. } => "serviceDiscovered",
            Message::CharacteristicDiscovered { .. } => "characteristicDiscovered",
            Message::CharacteristicValueUpdated { .. } => "characteristicValueUpdated",
            Message::WriteResponse { .. } => "writeResponse",
            Message::NotifyStateUpdated { .. } => "notifyStateUpdated",
            Message::ChannelOpened { .. } => "channelOpened",
            Message::ChannelWrite { .. } => "channelWrite",
            Message::ChannelDataReceived { .. } => "channelDataReceived",
            Message::CloseChannel { .. } => "closeChannel",
            Message::ChannelClosed { .. } => "channelClosed",
        }
    }

    /// Catches fields that are optional on the wire only in combination with another.
    fn check_required(&self) -> Result<(), CodecError> {
        match self {
            Message::CharacteristicValueUpdated {
                value: None,
                error: None,
                ..
            } => Err(CodecError::MissingField {
                kind: self.kind(),
                field: "value",
            }),
            _ => Ok(()),
        }
    }

    /// True for records the helper emits; false for requests the client emits.
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            Message::CentralStateChanged { .. }
                | Message::PeripheralDiscovered { .. }
                | Message::NameUpdated { .. }
                | Message::StateChanged { .. }
                | Message::ServiceDiscovered { .. }
                | Message::CharacteristicDiscovered { .. }
                | Message::CharacteristicValueUpdated { .. }
                | Message::WriteResponse { .. }
                | Message::NotifyStateUpdated { .. }
                | Message::ChannelOpened { .. }
                | Message::ChannelDataReceived { .. }
                | Message::ChannelClosed { .. }
        )
    }
}

pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(message).map_err(CodecError::Json)
}

pub fn decode(frame: &[u8]) -> Result<Message, CodecError> {
    let record: Value = serde_json::from_slice(frame).map_err(CodecError::Json)?;
    let kind = record
        .get("type")
        .and_then(Value::as_str)
        .ok_or(CodecError::MissingType)?
        .to_string();
    let message: Message =
        serde_json::from_value(record).map_err(|source| CodecError::Malformed { kind, source })?;
    message.check_required()?;
    Ok(message)
}

pub(crate) mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }

    pub mod option {
        use base64::{Engine as _, engine::general_purpose::STANDARD};
        use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            let encoded: Option<String> = Option::deserialize(deserializer)?;
            encoded
                .map(|s| STANDARD.decode(s.as_bytes()).map_err(D::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::uuid::ShortUuid;

    #[test]
    fn write_value_survives_the_wire() {
        let sent = Message::WriteValue {
            characteristic_id: ShimId::from("C7"),
            value: vec![0x00, 0xff, 0x10, 0x80],
            write_type: CharacteristicWriteType::WriteWithoutResponse,
        };

        let received = decode(&encode(&sent).unwrap()).unwrap();

        match received {
            Message::WriteValue {
                characteristic_id,
                value,
                write_type,
            } => {
                assert_eq!(characteristic_id.as_str(), "C7");
                assert_eq!(value, vec![0x00, 0xff, 0x10, 0x80]);
                assert_eq!(write_type, CharacteristicWriteType::WriteWithoutResponse);
            }
            other => panic!("decoded into {other:?}"),
        }
    }

    #[test]
    fn requests_use_camel_case_record_layout() {
        let peripheral = PeripheralId::new(Uuid::nil());
        let record: Value = serde_json::to_value(Message::DiscoverServices {
            peripheral_id: peripheral,
            service_uuids: None,
        })
        .unwrap();
        assert_eq!(
            record,
            json!({
                "type": "discoverServices",
                "peripheralId": "00000000-0000-0000-0000-000000000000",
            })
        );

        let record = serde_json::to_value(Message::OpenL2capChannel {
            peripheral_id: peripheral,
            psm: 0x25,
        })
        .unwrap();
        assert_eq!(record["type"], "openL2CAPChannel");
        assert_eq!(record["psm"], 0x25);
    }

    #[test]
    fn service_event_decodes_short_uuid() {
        let frame = json!({
            "type": "serviceDiscovered",
            "peripheralId": "5b1c2a8e-2f1b-4a36-9d0e-2a3b5c7d9e10",
            "serviceId": "S1",
            "uuid": "180D",
            "primary": true,
        })
        .to_string();

        match decode(frame.as_bytes()).unwrap() {
            Message::ServiceDiscovered {
                service_id,
                uuid,
                primary,
                ..
            } => {
                assert_eq!(service_id.as_str(), "S1");
                assert_eq!(uuid, Uuid::from_short(0x180d));
                assert!(primary);
            }
            other => panic!("decoded into {other:?}"),
        }
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let frame = br#"{"type":"characteristicDiscovered","serviceId":"S1","uuid":"2A37"}"#;
        match decode(frame) {
            Err(CodecError::Malformed { kind, .. }) => assert_eq!(kind, "characteristicDiscovered"),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn value_update_needs_a_value_unless_it_failed() {
        let bare = br#"{"type":"characteristicValueUpdated","characteristicId":"C1"}"#;
        assert!(matches!(
            decode(bare),
            Err(CodecError::MissingField { kind: "characteristicValueUpdated", field: "value" })
        ));

        let failed = br#"{"type":"characteristicValueUpdated","characteristicId":"C1","error":"busy"}"#;
        assert!(matches!(
            decode(failed).unwrap(),
            Message::CharacteristicValueUpdated { value: None, error: Some(_), .. }
        ));

        let empty = br#"{"type":"characteristicValueUpdated","characteristicId":"C1","value":""}"#;
        assert!(matches!(
            decode(empty).unwrap(),
            Message::CharacteristicValueUpdated { value: Some(ref bytes), .. } if bytes.is_empty()
        ));
    }

    #[test]
    fn discovery_without_advertisement_data_is_malformed() {
        let frame = json!({
            "type": "peripheralDiscovered",
            "peripheralId": "5b1c2a8e-2f1b-4a36-9d0e-2a3b5c7d9e10",
        })
        .to_string();
        assert!(matches!(decode(frame.as_bytes()), Err(CodecError::Malformed { .. })));

        let frame = json!({
            "type": "peripheralDiscovered",
            "peripheralId": "5b1c2a8e-2f1b-4a36-9d0e-2a3b5c7d9e10",
            "advertisementData": {},
        })
        .to_string();
        assert!(matches!(
            decode(frame.as_bytes()).unwrap(),
            Message::PeripheralDiscovered { name: None, .. }
        ));
    }

    #[test]
    fn untyped_and_garbage_frames_are_rejected() {
        assert!(matches!(decode(br#"{"peripheralId":"x"}"#), Err(CodecError::MissingType)));
        assert!(matches!(decode(b"\x00\x01"), Err(CodecError::Json(_))));
        assert!(matches!(
            decode(br#"{"type":"selfDestruct"}"#),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn events_and_requests_are_told_apart() {
        assert!(Message::ChannelClosed { channel_id: "L1".into() }.is_event());
        assert!(!Message::ScanStop.is_event());
        assert_eq!(Message::ScanStop.kind(), "scanStop");
    }
}
