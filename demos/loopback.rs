use std::sync::Arc;

use log::LevelFilter;
use serde_json::json;
use shimble::api::central::{CentralManager, PeripheralRemote, ScanFilter};
use shimble::api::central_event::CentralEvent;
use shimble::shim::central_manager::Central;
use shimble::shim::codec::{self, Message};
use shimble::shim::config::BridgeConfig;
use shimble::shim::transport::{Inbound, LocalTransport, Transport};
use shimble::uuid::ShortUuid;
use tokio::sync::mpsc;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .init();

    let (client, helper) = LocalTransport::pair();
    let helper = Arc::new(helper);
    run_scripted_helper(helper.clone());

    let (sender_tx, mut receiver_rx) = mpsc::unbounded_channel::<CentralEvent>();
    let central = Central::new(Arc::new(client), BridgeConfig::default(), sender_tx);

    central
        .scan_for_peripherals(ScanFilter::with_services([Uuid::from_short(0x180d)]))
        .unwrap();

    while let Some(event) = receiver_rx.recv().await {
        if let CentralEvent::DeviceDiscovered { peripheral_id, .. } = event {
            central.stop_scan().unwrap();
            let peripheral = central.peripheral(&peripheral_id).unwrap();
            peripheral.connect().await.unwrap();
            log::info!("connected to {:?}", peripheral.name());
            peripheral.discover_services(&[]).unwrap();
            break;
        }
    }

    while let Some(event) = receiver_rx.recv().await {
        match event {
            CentralEvent::ServicesDiscovered { peripheral_id, .. } => {
                let peripheral = central.peripheral(&peripheral_id).unwrap();
                for service in peripheral.discovered_services() {
                    peripheral.discover_characteristics(&[], &service).unwrap();
                }
            }
            CentralEvent::CharacteristicsDiscovered { service_id, characteristic_id } => {
                let service = central
                    .peripherals()
                    .into_iter()
                    .flat_map(|peripheral| peripheral.discovered_services())
                    .find(|service| service.id() == &service_id)
                    .unwrap();
                let characteristic = service
                    .characteristics()
                    .into_iter()
                    .find(|characteristic| characteristic.id() == &characteristic_id)
                    .unwrap();
                let peripheral = service.peripheral().unwrap();
                let value = peripheral.read(&characteristic).await.unwrap();
                log::info!("{} reads {:?}", characteristic.uuid(), value);
                break;
            }
            other => log::info!("{:?}", other),
        }
    }

    helper.close();
    while receiver_rx.recv().await.is_some() {}
    log::info!("helper gone");
}

/// Plays the helper's side of one heart rate monitor.
fn run_scripted_helper(helper: Arc<LocalTransport>) {
    let peripheral_id = Uuid::new_v4();
    let replier = helper.clone();
    helper.set_handler(Arc::new(move |inbound| {
        let Inbound::Frame(frame) = inbound else {
            return;
        };
        let replies = match codec::decode(&frame) {
            Ok(Message::ScanStart { .. }) => vec![json!({
                "type": "peripheralDiscovered",
                "peripheralId": peripheral_id,
                "name": "Pulse",
                "advertisementData": { "serviceUuids": ["180D"], "isConnectable": true },
                "rssi": -58,
            })],
            Ok(Message::Connect { peripheral_id }) => vec![
                json!({ "type": "stateChanged", "peripheralId": peripheral_id, "state": "connecting" }),
                json!({ "type": "stateChanged", "peripheralId": peripheral_id, "state": "connected" }),
            ],
            Ok(Message::DiscoverServices { peripheral_id, .. }) => vec![json!({
                "type": "serviceDiscovered",
                "peripheralId": peripheral_id,
                "serviceId": "hr-service",
                "uuid": "180D",
                "primary": true,
            })],
            Ok(Message::DiscoverCharacteristics { service_id, .. }) => vec![json!({
                "type": "characteristicDiscovered",
                "serviceId": service_id,
                "characteristicId": "hr-measurement",
                "uuid": "2A37",
                "properties": 0x12,
            })],
            Ok(Message::ReadValue { characteristic_id }) => vec![json!({
                "type": "characteristicValueUpdated",
                "characteristicId": characteristic_id,
                "value": "AEg=",
            })],
            _ => Vec::new(),
        };
        for reply in replies {
            let _ = replier.send(reply.to_string().into_bytes());
        }
    }));
}
