use std::fmt;
use std::sync::{Arc, RwLock};

use crate::api::central::{PeripheralId, Psm, ShimId};
use crate::shim::codec::Message;
use crate::shim::peripheral::Peripheral;
use crate::shim::router::Router;
use crate::shim::{read, write};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct ChannelState {
    psm: Psm,
    input_stream: String,
    output_stream: String,
    open: bool,
}

#[derive(Debug)]
pub(crate) struct ChannelEntity {
    id: ShimId,
    peer: PeripheralId,
    state: RwLock<ChannelState>,
}

impl ChannelEntity {
    pub(crate) fn new(id: ShimId, peer: PeripheralId, psm: Psm) -> Self {
        ChannelEntity {
            id,
            peer,
            state: RwLock::new(ChannelState {
                psm,
                input_stream: String::new(),
                output_stream: String::new(),
                open: false,
            }),
        }
    }

    pub(crate) fn peer_id(&self) -> PeripheralId {
        self.peer
    }

    pub(crate) fn apply_open(&self, psm: Psm, input_stream: String, output_stream: String) {
        let mut state = write(&self.state);
        state.psm = psm;
        state.input_stream = input_stream;
        state.output_stream = output_stream;
        state.open = true;
    }

    pub(crate) fn apply_closed(&self) {
        write(&self.state).open = false;
    }
}

/// An L2CAP channel opened by the helper.
///
/// The stream handles are the helper's names for the two directions of the
/// channel; data moves through [`write`](Self::write) and
/// [`CentralEvent::ChannelData`](crate::api::central_event::CentralEvent::ChannelData).
#[derive(Clone)]
pub struct Channel {
    entity: Arc<ChannelEntity>,
    router: Arc<Router>,
}

impl Channel {
    pub(crate) fn new(entity: Arc<ChannelEntity>, router: Arc<Router>) -> Self {
        Channel { entity, router }
    }

    pub fn id(&self) -> &ShimId {
        &self.entity.id
    }

    pub fn psm(&self) -> Psm {
        read(&self.entity.state).psm
    }

    pub fn input_stream(&self) -> String {
        read(&self.entity.state).input_stream.clone()
    }

    pub fn output_stream(&self) -> String {
        read(&self.entity.state).output_stream.clone()
    }

    pub fn is_open(&self) -> bool {
        read(&self.entity.state).open
    }

    pub fn peer_id(&self) -> PeripheralId {
        self.entity.peer
    }

    pub fn peer(&self) -> Option<Peripheral> {
        let entity = self.router.registry().peripherals.get(&self.entity.peer)?;
        Some(Peripheral::new(entity, Arc::clone(&self.router)))
    }

    pub fn write(&self, data: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(Error::violation(format!("channel {} is closed", self.id())));
        }
        self.router.send(Message::ChannelWrite {
            channel_id: self.id().clone(),
            data: data.to_vec(),
        })
    }

    /// Asks the helper to close; [`is_open`](Self::is_open) flips on its `channelClosed`.
    pub fn close(&self) -> Result<()> {
        self.router.send(Message::CloseChannel {
            channel_id: self.id().clone(),
        })
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entity, &other.entity)
    }
}

impl Eq for Channel {}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = read(&self.entity.state);
        f.debug_struct("Channel")
            .field("id", &self.entity.id)
            .field("peer", &self.entity.peer)
            .field("psm", &state.psm)
            .field("open", &state.open)
            .finish()
    }
}
