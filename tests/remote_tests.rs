mod common;

use std::sync::Arc;

use serde_json::json;
use shimble::Error;
use shimble::api::central::{CentralManager, PeripheralId, PeripheralRemote, PeripheralState};
use shimble::api::central_event::CentralEvent;
use shimble::api::characteristic::CharacteristicWriteType;
use shimble::shim::central_manager::Central;
use shimble::shim::codec::{self, Message};
use shimble::shim::config::BridgeConfig;
use shimble::shim::stream::StreamTransport;
use shimble::shim::transport::{Inbound, Transport};
use tokio::sync::mpsc;
use uuid::Uuid;

use common::Harness;

#[tokio::test]
async fn connect_resolves_when_helper_confirms() {
    let mut h = Harness::new();
    let id = PeripheralId::new(Uuid::new_v4());
    let peripheral = h.discovered(id, "Band").await;

    let pending = tokio::spawn({
        let peripheral = peripheral.clone();
        async move { peripheral.connect().await }
    });

    assert_eq!(h.helper.next_request().await, Message::Connect { peripheral_id: id });
    h.helper.emit(json!({ "type": "stateChanged", "peripheralId": id, "state": "connecting" }));
    h.helper.emit(json!({ "type": "stateChanged", "peripheralId": id, "state": "connected" }));

    pending.await.unwrap().unwrap();
    assert!(peripheral.is_connected());
}

#[tokio::test]
async fn failed_connect_surfaces_helper_error() {
    let mut h = Harness::new();
    let id = PeripheralId::new(Uuid::new_v4());
    let peripheral = h.discovered(id, "Band").await;

    let pending = tokio::spawn({
        let peripheral = peripheral.clone();
        async move { peripheral.connect().await }
    });

    h.helper.next_request().await;
    h.helper.emit(json!({
        "type": "stateChanged",
        "peripheralId": id,
        "state": "disconnected",
        "error": "peer removed pairing information",
    }));

    match pending.await.unwrap() {
        Err(Error::Remote(reason)) => assert_eq!(reason, "peer removed pairing information"),
        other => panic!("expected remote error, got {other:?}"),
    }
    assert_eq!(peripheral.state(), PeripheralState::Disconnected);
}

#[tokio::test]
async fn read_resolves_with_matching_value_only() {
    let mut h = Harness::new();
    let (peripheral, characteristic) = h.with_characteristic(0x02).await;
    h.helper.emit(json!({
        "type": "characteristicDiscovered",
        "serviceId": "S1",
        "characteristicId": "C2",
        "uuid": "2A38",
        "properties": 0x02,
    }));
    h.next_event().await;

    let pending = tokio::spawn({
        let (peripheral, characteristic) = (peripheral.clone(), characteristic.clone());
        async move { peripheral.read(&characteristic).await }
    });

    assert_eq!(
        h.helper.next_request().await,
        Message::ReadValue { characteristic_id: "C1".into() }
    );
    h.helper.emit(json!({ "type": "characteristicValueUpdated", "characteristicId": "C2", "value": "AQ==" }));
    h.helper.emit(json!({ "type": "characteristicValueUpdated", "characteristicId": "C1", "value": "SGk=" }));

    assert_eq!(pending.await.unwrap().unwrap(), b"Hi".to_vec());
    assert_eq!(characteristic.value().as_deref(), Some(&b"Hi"[..]));
}

#[tokio::test]
async fn write_with_response_waits_for_acknowledgement() {
    let mut h = Harness::new();
    let (peripheral, characteristic) = h.with_characteristic(0x08 | 0x04).await;

    let pending = tokio::spawn({
        let (peripheral, characteristic) = (peripheral.clone(), characteristic.clone());
        async move {
            peripheral
                .write(&characteristic, &[1, 2, 3], CharacteristicWriteType::WriteWithResponse)
                .await
        }
    });

    assert_eq!(
        h.helper.next_request().await,
        Message::WriteValue {
            characteristic_id: "C1".into(),
            value: vec![1, 2, 3],
            write_type: CharacteristicWriteType::WriteWithResponse,
        }
    );
    h.helper.emit(json!({
        "type": "writeResponse",
        "characteristicId": "C1",
        "error": "write not permitted",
    }));
    assert!(matches!(pending.await.unwrap(), Err(Error::Remote(_))));

    // without response there is nothing to wait for
    peripheral
        .write(&characteristic, &[4], CharacteristicWriteType::WriteWithoutResponse)
        .await
        .unwrap();
    assert!(matches!(
        h.helper.next_request().await,
        Message::WriteValue { write_type: CharacteristicWriteType::WriteWithoutResponse, .. }
    ));
}

#[tokio::test]
async fn subscribe_and_unsubscribe_follow_notify_state() {
    let mut h = Harness::new();
    let (peripheral, characteristic) = h.with_characteristic(0x10).await;

    let pending = tokio::spawn({
        let (peripheral, characteristic) = (peripheral.clone(), characteristic.clone());
        async move { peripheral.subscribe(&characteristic).await }
    });
    assert_eq!(
        h.helper.next_request().await,
        Message::SetNotifyValue { characteristic_id: "C1".into(), enabled: true }
    );
    h.helper.emit(json!({ "type": "notifyStateUpdated", "characteristicId": "C1", "notifying": true }));
    pending.await.unwrap().unwrap();
    assert!(characteristic.is_notifying());

    // already in the requested state, nothing is sent
    peripheral.subscribe(&characteristic).await.unwrap();

    let pending = tokio::spawn({
        let (peripheral, characteristic) = (peripheral.clone(), characteristic.clone());
        async move { peripheral.unsubscribe(&characteristic).await }
    });
    assert_eq!(
        h.helper.next_request().await,
        Message::SetNotifyValue { characteristic_id: "C1".into(), enabled: false }
    );
    h.helper.emit(json!({ "type": "notifyStateUpdated", "characteristicId": "C1", "notifying": false }));
    pending.await.unwrap().unwrap();
    assert!(!characteristic.is_notifying());
}

#[tokio::test]
async fn pending_read_fails_when_transport_goes_away() {
    let mut h = Harness::new();
    let (peripheral, characteristic) = h.with_characteristic(0x02).await;

    let pending = tokio::spawn({
        let (peripheral, characteristic) = (peripheral.clone(), characteristic.clone());
        async move { peripheral.read(&characteristic).await }
    });
    h.helper.next_request().await;
    h.client.close();

    assert!(matches!(pending.await.unwrap(), Err(Error::Transport(_))));
}

#[tokio::test]
async fn bridge_runs_over_a_framed_byte_stream() {
    let config = BridgeConfig::default();
    let (near, far) = tokio::io::duplex(256);
    let (near_read, near_write) = tokio::io::split(near);
    let (far_read, far_write) = tokio::io::split(far);

    let helper = StreamTransport::spawn(far_read, far_write, &config);
    let (requests_tx, mut requests) = mpsc::unbounded_channel();
    helper.set_handler(Arc::new(move |inbound| {
        if let Inbound::Frame(frame) = inbound {
            let _ = requests_tx.send(codec::decode(&frame).unwrap());
        }
    }));

    let (sender_tx, mut events) = mpsc::unbounded_channel();
    let client = StreamTransport::spawn(near_read, near_write, &config);
    let central = Central::new(Arc::new(client), config, sender_tx);

    let id = PeripheralId::new(Uuid::new_v4());
    let discovered = codec::encode(&Message::PeripheralDiscovered {
        peripheral_id: id,
        name: Some("Wired".to_string()),
        advertisement_data: Default::default(),
        rssi: Some(-40),
    })
    .unwrap();
    helper.send(discovered).unwrap();

    assert!(matches!(
        events.recv().await,
        Some(CentralEvent::DeviceDiscovered { rssi: Some(-40), .. })
    ));
    let peripheral = central.peripheral(&id).unwrap();
    assert_eq!(peripheral.name().as_deref(), Some("Wired"));

    central.connect(&peripheral).unwrap();
    assert_eq!(requests.recv().await, Some(Message::Connect { peripheral_id: id }));
}
