//! Length-prefixed framing over any byte stream, e.g. a socket to the helper.
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::TransportError;
use crate::shim::config::BridgeConfig;
use crate::shim::lock;
use crate::shim::transport::{HandlerSlot, Inbound, MessageHandler, Transport};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

struct Shared {
    outbound: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    reader: Mutex<Option<BoxedReader>>,
    handler: HandlerSlot,
    open: AtomicBool,
    max_frame_len: usize,
}

impl Shared {
    fn shut(&self) {
        self.open.store(false, Ordering::Release);
        lock(&self.outbound).take();
    }
}

pub struct StreamTransport {
    shared: Arc<Shared>,
}

impl StreamTransport {
    /// Starts the writer task right away; the reader task starts when a handler
    /// is installed. Requires a tokio runtime.
    pub fn spawn<R, W>(reader: R, writer: W, config: &BridgeConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            outbound: Mutex::new(Some(tx)),
            reader: Mutex::new(Some(Box::new(reader))),
            handler: HandlerSlot::default(),
            open: AtomicBool::new(true),
            max_frame_len: config.max_frame_len,
        });
        tokio::spawn(write_frames(Arc::clone(&shared), writer, rx));
        StreamTransport { shared }
    }

    /// Flushes queued frames and shuts the write half down.
    pub fn close(&self) {
        self.shared.shut();
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.shared.shut();
    }
}

impl Transport for StreamTransport {
    fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        if frame.len() > self.shared.max_frame_len {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: self.shared.max_frame_len,
            });
        }
        let outbound = lock(&self.shared.outbound);
        let Some(sender) = outbound.as_ref() else {
            return Err(TransportError::Closed);
        };
        sender.send(frame).map_err(|_| {
            self.shared.open.store(false, Ordering::Release);
            TransportError::Unreachable
        })
    }

    fn set_handler(&self, handler: MessageHandler) {
        self.shared.handler.replace(handler);
        if let Some(reader) = lock(&self.shared.reader).take() {
            tokio::spawn(read_frames(Arc::clone(&self.shared), reader));
        }
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }
}

async fn write_frames<W>(shared: Arc<Shared>, mut writer: W, mut rx: UnboundedReceiver<Vec<u8>>)
where
    W: AsyncWrite + Send + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(err) = write_frame(&mut writer, &frame).await {
            error!("writing frame to helper failed: {}", err);
            shared.shut();
            return;
        }
    }
    if let Err(err) = writer.shutdown().await {
        debug!("shutting down writer: {}", err);
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> std::io::Result<()> {
    let len = u32::try_from(frame.len())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame too long"))?;
    writer.write_u32(len).await?;
    writer.write_all(frame).await?;
    writer.flush().await
}

async fn read_frames(shared: Arc<Shared>, mut reader: BoxedReader) {
    loop {
        match read_frame(&mut reader, shared.max_frame_len).await {
            Ok(Some(frame)) => shared.handler.deliver(Inbound::Frame(frame)),
            Ok(None) => {
                trace!("helper closed the stream");
                break;
            }
            Err(err) => {
                error!("reading frame from helper failed: {}", err);
                break;
            }
        }
    }
    shared.shut();
    shared.handler.deliver(Inbound::Closed);
}

async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_len: usize,
) -> Result<Option<Vec<u8>>, TransportError> {
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if len > max_frame_len {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: max_frame_len,
        });
    }
    let mut frame = vec![0; len];
    reader.read_exact(&mut frame).await?;
    Ok(Some(frame))
}
