//! The message pipe between this process and the helper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::{trace, warn};
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::TransportError;
use crate::shim::{lock, read, write};

/// What a transport hands to its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Frame(Vec<u8>),
    /// Delivered once, after the last frame, when the channel goes down.
    Closed,
}

pub type MessageHandler = Arc<dyn Fn(Inbound) + Send + Sync>;

/// Ordered, reliable, bidirectional pipe of opaque frames.
///
/// Implementations invoke the installed handler once per frame in wire order
/// and never concurrently with itself.
pub trait Transport: Send + Sync {
    fn send(&self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Installs the single handler, replacing any previous one.
    fn set_handler(&self, handler: MessageHandler);

    fn is_open(&self) -> bool;
}

#[derive(Default)]
pub(crate) struct HandlerSlot(RwLock<Option<MessageHandler>>);

impl HandlerSlot {
    pub(crate) fn replace(&self, handler: MessageHandler) {
        *write(&self.0) = Some(handler);
    }

    pub(crate) fn deliver(&self, inbound: Inbound) {
        // cloned out so a handler may reinstall itself without deadlocking
        let handler = read(&self.0).clone();
        match handler {
            Some(handler) => handler(inbound),
            None => warn!("no handler installed, dropping {:?}", inbound),
        }
    }
}

struct Endpoint {
    name: &'static str,
    outbound: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    inbound: Mutex<Option<UnboundedReceiver<Vec<u8>>>>,
    handler: HandlerSlot,
    open: AtomicBool,
    shut_down: Notify,
}

impl Endpoint {
    fn shut(&self) {
        self.open.store(false, Ordering::Release);
        lock(&self.outbound).take();
        self.shut_down.notify_one();
    }
}

/// In-memory transport, one half of a connected pair.
///
/// Frames sent before the peer installs its handler are buffered. Must be used
/// from within a tokio runtime: installing the handler spawns the delivery task.
pub struct LocalTransport {
    endpoint: Arc<Endpoint>,
}

impl LocalTransport {
    pub fn pair() -> (LocalTransport, LocalTransport) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            LocalTransport::new("client", b_tx, a_rx),
            LocalTransport::new("helper", a_tx, b_rx),
        )
    }

    fn new(
        name: &'static str,
        outbound: UnboundedSender<Vec<u8>>,
        inbound: UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        LocalTransport {
            endpoint: Arc::new(Endpoint {
                name,
                outbound: Mutex::new(Some(outbound)),
                inbound: Mutex::new(Some(inbound)),
                handler: HandlerSlot::default(),
                open: AtomicBool::new(true),
                shut_down: Notify::new(),
            }),
        }
    }

    /// Stops sending immediately. This side sees `Closed` after delivering the
    /// frames already queued for it, whether or not the peer ever installed a
    /// handler. The peer sees `Closed` once it has drained what was sent.
    pub fn close(&self) {
        trace!("closing {} endpoint", self.endpoint.name);
        self.endpoint.shut();
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.endpoint.shut();
    }
}

impl Transport for LocalTransport {
    fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let outbound = lock(&self.endpoint.outbound);
        let Some(sender) = outbound.as_ref() else {
            return Err(TransportError::Closed);
        };
        sender.send(frame).map_err(|_| {
            self.endpoint.open.store(false, Ordering::Release);
            TransportError::Unreachable
        })
    }

    fn set_handler(&self, handler: MessageHandler) {
        self.endpoint.handler.replace(handler);

        let Some(mut inbound) = lock(&self.endpoint.inbound).take() else {
            // delivery task already running, it picks up the new handler
            return;
        };
        let endpoint = Arc::clone(&self.endpoint);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    frame = inbound.recv() => match frame {
                        Some(frame) => endpoint.handler.deliver(Inbound::Frame(frame)),
                        None => {
                            trace!("{} endpoint lost its peer", endpoint.name);
                            break;
                        }
                    },
                    _ = endpoint.shut_down.notified() => {
                        trace!("{} endpoint shut down", endpoint.name);
                        break;
                    }
                }
            }
            drop(inbound);
            endpoint.shut();
            endpoint.handler.deliver(Inbound::Closed);
        });
    }

    fn is_open(&self) -> bool {
        self.endpoint.open.load(Ordering::Acquire)
    }
}
