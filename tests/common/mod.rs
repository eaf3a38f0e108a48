#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use shimble::api::central::{CentralManager, PeripheralId, PeripheralState};
use shimble::api::central_event::CentralEvent;
use shimble::shim::central_manager::Central;
use shimble::shim::codec::{self, Message};
use shimble::shim::config::BridgeConfig;
use shimble::shim::peripheral::Peripheral;
use shimble::shim::transport::{Inbound, LocalTransport, Transport};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;
use uuid::Uuid;

const PATIENCE: Duration = Duration::from_secs(2);

/// What the scripted helper observed from the client.
#[derive(Debug, PartialEq)]
pub enum Seen {
    Request(Message),
    Closed,
}

pub struct FakeHelper {
    transport: LocalTransport,
    seen: UnboundedReceiver<Seen>,
}

impl FakeHelper {
    pub fn emit(&self, record: Value) {
        self.transport
            .send(record.to_string().into_bytes())
            .expect("helper side still open");
    }

    pub fn emit_raw(&self, frame: &[u8]) {
        self.transport.send(frame.to_vec()).expect("helper side still open");
    }

    pub async fn next_seen(&mut self) -> Seen {
        timeout(PATIENCE, self.seen.recv())
            .await
            .expect("helper waited too long")
            .expect("helper feed ended")
    }

    pub async fn next_request(&mut self) -> Message {
        match self.next_seen().await {
            Seen::Request(message) => message,
            Seen::Closed => panic!("transport closed while waiting for a request"),
        }
    }

    /// Sends a scanStop through `central` and asserts nothing was queued before it.
    pub async fn assert_nothing_before_marker(&mut self, central: &Central) {
        central.stop_scan().expect("marker send");
        assert_eq!(self.next_request().await, Message::ScanStop);
    }
}

pub struct Harness {
    pub central: Central,
    pub client: Arc<LocalTransport>,
    pub events: UnboundedReceiver<CentralEvent>,
    pub helper: FakeHelper,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        let _ = pretty_env_logger::formatted_builder()
            .is_test(true)
            .try_init();

        let (client, helper) = LocalTransport::pair();
        let client = Arc::new(client);

        let (seen_tx, seen) = mpsc::unbounded_channel();
        helper.set_handler(Arc::new(move |inbound| {
            let seen = match inbound {
                Inbound::Frame(frame) => {
                    Seen::Request(codec::decode(&frame).expect("client sent a valid record"))
                }
                Inbound::Closed => Seen::Closed,
            };
            let _ = seen_tx.send(seen);
        }));

        let (sender_tx, events) = mpsc::unbounded_channel();
        let central = Central::new(client.clone(), config, sender_tx);

        Harness {
            central,
            client,
            events,
            helper: FakeHelper {
                transport: helper,
                seen,
            },
        }
    }

    pub async fn next_event(&mut self) -> CentralEvent {
        timeout(PATIENCE, self.events.recv())
            .await
            .expect("client waited too long")
            .expect("event stream ended")
    }

    /// Emits `record`, then a marker, and returns every event published in between.
    pub async fn settle(&mut self, record: Value) -> Vec<CentralEvent> {
        self.helper.emit(record);
        self.helper.emit(json!({ "type": "centralStateChanged", "state": "poweredOn" }));
        let mut events = Vec::new();
        loop {
            match self.next_event().await {
                CentralEvent::StateUpdate { .. } => return events,
                event => events.push(event),
            }
        }
    }

    pub async fn discovered(&mut self, id: PeripheralId, name: &str) -> Peripheral {
        self.helper.emit(json!({
            "type": "peripheralDiscovered",
            "peripheralId": id,
            "name": name,
            "advertisementData": { "isConnectable": true },
            "rssi": -60,
        }));
        match self.next_event().await {
            CentralEvent::DeviceDiscovered { peripheral_id, .. } => assert_eq!(peripheral_id, id),
            other => panic!("expected discovery, got {other:?}"),
        }
        self.central.peripheral(&id).expect("discovered peripheral is registered")
    }

    pub async fn connected(&mut self, name: &str) -> Peripheral {
        let id = PeripheralId::new(Uuid::new_v4());
        let peripheral = self.discovered(id, name).await;
        self.helper.emit(json!({
            "type": "stateChanged",
            "peripheralId": id,
            "state": "connected",
        }));
        match self.next_event().await {
            CentralEvent::PeripheralStateChanged { state, .. } => {
                assert_eq!(state, PeripheralState::Connected)
            }
            other => panic!("expected state change, got {other:?}"),
        }
        peripheral
    }

    /// A connected peripheral with service "S1" (180D) holding characteristic "C1"
    /// (2A37) with the given properties.
    pub async fn with_characteristic(
        &mut self,
        properties: u32,
    ) -> (Peripheral, shimble::shim::characteristic::Characteristic) {
        let peripheral = self.connected("Sensor").await;
        self.helper.emit(json!({
            "type": "serviceDiscovered",
            "peripheralId": peripheral.identifier(),
            "serviceId": "S1",
            "uuid": "180D",
            "primary": true,
        }));
        self.next_event().await;
        self.helper.emit(json!({
            "type": "characteristicDiscovered",
            "serviceId": "S1",
            "characteristicId": "C1",
            "uuid": "2A37",
            "properties": properties,
        }));
        self.next_event().await;
        let characteristic = peripheral.discovered_services()[0].characteristics()[0].clone();
        (peripheral, characteristic)
    }
}
