//! services/extension_host/src/bridge.rs
//!
//! Connects the in-process `MessageRouter` to the browser over a byte stream using
//! native-messaging framing: a 4-byte little-endian length followed by UTF-8 JSON.
//!
//! Every browser context that sends a frame gets a proxy listener on the router.
//! Messages routed to that context are written out as frames. Requests get a
//! numeric `id` and wait for a `{"replyTo": id, "reply": ...}` frame; if none arrives
//! in time the request is dropped and the requester sees `NoResponse`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use synthstyle_core::router::{Envelope, Responder};
use synthstyle_core::{Endpoint, ExtensionMessage, MessageListener, MessageRouter, Reply};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::HostError;

/// Chrome refuses host-to-browser messages above 1 MiB; inbound frames get the same cap.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// The framing codec for both directions.
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .little_endian()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_BYTES)
        .new_codec()
}

//=========================================================================================
// Wire Frames
//=========================================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    /// The browser answering a request the host sent.
    Reply {
        #[serde(rename = "replyTo")]
        reply_to: u64,
        reply: Reply,
    },
    Message {
        #[serde(default)]
        id: Option<u64>,
        from: Endpoint,
        to: Endpoint,
        message: ExtensionMessage,
    },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Message {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        to: Endpoint,
        message: ExtensionMessage,
    },
    Reply {
        #[serde(rename = "replyTo")]
        reply_to: u64,
        reply: Reply,
    },
}

//=========================================================================================
// Pending Requests
//=========================================================================================

#[derive(Clone, Default)]
struct PendingReplies {
    next_id: Arc<AtomicU64>,
    waiting: Arc<Mutex<HashMap<u64, Responder>>>,
}

impl PendingReplies {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Responder>> {
        self.waiting.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Parks `responder` and returns the id the browser must echo back. The entry is
    /// dropped after `timeout`.
    fn park(&self, responder: Responder, timeout: Duration, endpoint: Endpoint) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.lock().insert(id, responder);

        let pending = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if pending.take(id).is_some() {
                warn!("{} never answered request {}.", endpoint, id);
            }
        });
        id
    }

    fn take(&self, id: u64) -> Option<Responder> {
        self.lock().remove(&id)
    }
}

/// Stands in for a browser context on the router.
struct ProxyListener {
    endpoint: Endpoint,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    pending: PendingReplies,
    reply_timeout: Duration,
}

#[async_trait]
impl MessageListener for ProxyListener {
    async fn on_message(&self, envelope: Envelope) {
        let Envelope {
            message, responder, ..
        } = envelope;
        let kind = message.kind();
        let id = responder.map(|r| self.pending.park(r, self.reply_timeout, self.endpoint));

        let frame = OutboundFrame::Message {
            id,
            to: self.endpoint,
            message,
        };
        if self.outbound.send(frame).is_err() {
            debug!("Bridge closed; dropping {} for {}.", kind, self.endpoint);
            if let Some(id) = id {
                self.pending.take(id);
            }
        }
    }
}

//=========================================================================================
// The Bridge
//=========================================================================================

pub struct Bridge {
    router: MessageRouter,
    reply_timeout: Duration,
    pending: PendingReplies,
}

impl Bridge {
    pub fn new(router: MessageRouter) -> Self {
        Self {
            router,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            pending: PendingReplies::default(),
        }
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Pumps frames until the browser closes `reader`, a read fails or `shutdown`
    /// fires. Proxy listeners are unregistered on the way out.
    pub async fn run<R, W>(
        &self,
        reader: R,
        writer: W,
        shutdown: CancellationToken,
    ) -> Result<(), HostError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let stop = shutdown.child_token();
        let (tx, rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let writer_task = tokio::spawn(write_frames(
            FramedWrite::new(writer, codec()),
            rx,
            self.pending.clone(),
            stop.clone(),
        ));

        let mut frames = FramedRead::new(reader, codec());
        let mut proxies = HashSet::new();
        let result = loop {
            let next = tokio::select! {
                _ = stop.cancelled() => break Ok(()),
                next = frames.next() => next,
            };
            match next {
                Some(Ok(bytes)) => self.dispatch(&bytes, &tx, &mut proxies),
                Some(Err(e)) => {
                    error!("Failed to read a frame from the browser: {}", e);
                    break Err(HostError::Bridge(e.to_string()));
                }
                None => {
                    info!("Browser closed the connection.");
                    break Ok(());
                }
            }
        };

        for endpoint in proxies {
            self.router.unregister(endpoint);
        }
        stop.cancel();
        if let Err(e) = writer_task.await {
            error!("Bridge writer task failed: {}", e);
        }
        result
    }

    fn dispatch(
        &self,
        bytes: &[u8],
        outbound: &mpsc::UnboundedSender<OutboundFrame>,
        proxies: &mut HashSet<Endpoint>,
    ) {
        let frame = match serde_json::from_slice::<InboundFrame>(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                return;
            }
        };

        match frame {
            InboundFrame::Reply { reply_to, reply } => match self.pending.take(reply_to) {
                Some(responder) => responder.send(reply),
                None => debug!("Reply {} arrived after its request expired.", reply_to),
            },
            InboundFrame::Message {
                id,
                from,
                to,
                message,
            } => {
                if from == Endpoint::Background {
                    warn!("Ignoring a frame that claims to come from the background.");
                    return;
                }
                if !self.router.is_registered(from) {
                    let proxy = ProxyListener {
                        endpoint: from,
                        outbound: outbound.clone(),
                        pending: self.pending.clone(),
                        reply_timeout: self.reply_timeout,
                    };
                    self.router.register(from, Arc::new(proxy));
                    proxies.insert(from);
                }
                self.forward(id, from, to, message, outbound);
            }
        }
    }

    fn forward(
        &self,
        id: Option<u64>,
        from: Endpoint,
        to: Endpoint,
        message: ExtensionMessage,
        outbound: &mpsc::UnboundedSender<OutboundFrame>,
    ) {
        let Some(id) = id else {
            let kind = message.kind();
            if let Err(e) = self.router.notify(from, to, message) {
                debug!("Dropped {} from {}: {}", kind, from, e);
            }
            return;
        };

        // Long requests must not hold up the frames behind them.
        let router = self.router.clone();
        let outbound = outbound.clone();
        tokio::spawn(async move {
            let reply = match router.request(from, to, message).await {
                Ok(reply) => reply,
                Err(e) => {
                    debug!("Request {} from {} failed: {}", id, from, e);
                    Reply::failed(e.to_string())
                }
            };
            if outbound
                .send(OutboundFrame::Reply {
                    reply_to: id,
                    reply,
                })
                .is_err()
            {
                debug!("Bridge closed before reply {} could be sent.", id);
            }
        });
    }
}

async fn write_frames<W>(
    mut sink: FramedWrite<W, LengthDelimitedCodec>,
    mut frames: mpsc::UnboundedReceiver<OutboundFrame>,
    pending: PendingReplies,
    stop: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            frame = frames.recv() => frame,
            _ = stop.cancelled() => {
                // Flush what is already queued, then stop.
                while let Ok(frame) = frames.try_recv() {
                    if !write_frame(&mut sink, frame, &pending).await {
                        break;
                    }
                }
                return;
            }
        };
        let Some(frame) = frame else {
            return;
        };
        if !write_frame(&mut sink, frame, &pending).await {
            stop.cancel();
            return;
        }
    }
}

/// Writes one frame. Returns `false` once the stream is unusable.
async fn write_frame<W>(
    sink: &mut FramedWrite<W, LengthDelimitedCodec>,
    frame: OutboundFrame,
    pending: &PendingReplies,
) -> bool
where
    W: AsyncWrite + Unpin,
{
    let bytes = match serde_json::to_vec(&frame) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to encode an outbound frame: {}", e);
            return true;
        }
    };
    if bytes.len() > MAX_FRAME_BYTES {
        warn!("Dropping a {} byte frame for the browser.", bytes.len());
        if let OutboundFrame::Message { id: Some(id), .. } = frame {
            pending.take(id);
        }
        return true;
    }
    if let Err(e) = sink.send(Bytes::from(bytes)).await {
        error!("Failed to write a frame to the browser: {}", e);
        return false;
    }
    true
}
