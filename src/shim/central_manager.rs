use std::sync::Arc;

use log::info;
use tokio::sync::mpsc::UnboundedSender;

use crate::Result;
use crate::api::central::{CentralManager, EventStream, PeripheralId, ScanFilter};
use crate::api::central_event::{CentralEvent, CentralState, ManagerAuthorization};
use crate::shim::codec::Message;
use crate::shim::config::BridgeConfig;
use crate::shim::peripheral::Peripheral;
use crate::shim::router::Router;
use crate::shim::transport::Transport;

/// The process-wide central manager proxy. One per client run.
pub struct Central {
    router: Arc<Router>,
}

impl Central {
    /// Installs a router on `transport` and registers `sender_tx` as the first listener.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: BridgeConfig,
        sender_tx: UnboundedSender<CentralEvent>,
    ) -> Self {
        let router = Router::install(transport, config);
        router.add_listener(sender_tx);
        info!("central manager bridged to helper");
        Central { router }
    }

    pub fn with_router(router: Arc<Router>) -> Self {
        Central { router }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn scan_for_peripherals(&self, filter: ScanFilter) -> Result<()> {
        let service_uuids = if filter.services.is_empty() {
            None
        } else {
            Some(filter.services)
        };
        self.router.send(Message::ScanStart {
            service_uuids,
            allow_duplicates: filter.allow_duplicates || self.router.config().allow_duplicates,
        })
    }

    pub fn stop_scan(&self) -> Result<()> {
        self.router.send(Message::ScanStop)
    }

    /// Requests a connection; the state only moves once the helper reports it.
    pub fn connect(&self, peripheral: &Peripheral) -> Result<()> {
        self.router.send(Message::Connect {
            peripheral_id: peripheral.identifier(),
        })
    }

    pub fn cancel_peripheral_connection(&self, peripheral: &Peripheral) -> Result<()> {
        self.router.send(Message::Disconnect {
            peripheral_id: peripheral.identifier(),
        })
    }
}

impl CentralManager for Central {
    type Peripheral = Peripheral;

    fn state(&self) -> CentralState {
        self.router.central_state().0
    }

    fn authorization(&self) -> ManagerAuthorization {
        self.router.central_state().1
    }

    fn start_scan(&self, filter: ScanFilter) -> Result<()> {
        self.scan_for_peripherals(filter)
    }

    fn stop_scan(&self) -> Result<()> {
        Central::stop_scan(self)
    }

    fn peripherals(&self) -> Vec<Peripheral> {
        self.router
            .registry()
            .peripherals
            .values()
            .map(|entity| Peripheral::new(Arc::clone(entity), Arc::clone(&self.router)))
            .collect()
    }

    fn peripheral(&self, id: &PeripheralId) -> Option<Peripheral> {
        let entity = self.router.registry().peripherals.get(id)?;
        Some(Peripheral::new(entity, Arc::clone(&self.router)))
    }

    fn events(&self) -> EventStream {
        self.router.subscribe()
    }
}
