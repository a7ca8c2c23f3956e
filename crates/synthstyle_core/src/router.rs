//! crates/synthstyle_core/src/router.rs
//!
//! Routes `ExtensionMessage`s between registered contexts.
//!
//! Every registered endpoint gets its own inbox and a single task draining it, so a
//! listener sees the messages from any one sender in the order they were sent and
//! never runs two handlers at once. A request carries a `Responder`; the listener
//! answers by consuming it, which makes a second answer impossible. A listener that
//! needs to finish work later simply keeps the responder (for example by moving it
//! into a spawned task) and the requester keeps waiting.

use crate::protocol::{Endpoint, ExtensionMessage, Reply};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("No listener registered for {0}")]
    NoReceiver(Endpoint),
    #[error("Listener dropped the {0} request without responding")]
    NoResponse(&'static str),
}

//=========================================================================================
// Envelope and Responder
//=========================================================================================

/// The one-shot answer channel attached to a request.
#[derive(Debug)]
pub struct Responder {
    kind: &'static str,
    tx: oneshot::Sender<Reply>,
}

impl Responder {
    pub fn new(kind: &'static str) -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (Self { kind, tx }, rx)
    }

    pub fn send(self, reply: Reply) {
        if self.tx.send(reply).is_err() {
            debug!("Requester for {} went away before the reply.", self.kind);
        }
    }
}

#[derive(Debug)]
pub struct Envelope {
    pub from: Endpoint,
    pub message: ExtensionMessage,
    pub responder: Option<Responder>,
}

impl Envelope {
    /// Answers the request, if this envelope is one.
    pub fn respond(&mut self, reply: Reply) {
        if let Some(responder) = self.responder.take() {
            responder.send(reply);
        }
    }
}

#[async_trait]
pub trait MessageListener: Send + Sync + 'static {
    async fn on_message(&self, envelope: Envelope);
}

//=========================================================================================
// The Router
//=========================================================================================

#[derive(Clone, Default)]
pub struct MessageRouter {
    inboxes: Arc<RwLock<HashMap<Endpoint, mpsc::UnboundedSender<Envelope>>>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `endpoint`, replacing any previous registration.
    /// The returned handle finishes once the endpoint is unregistered and its inbox
    /// has drained.
    pub fn register(
        &self,
        endpoint: Endpoint,
        listener: Arc<dyn MessageListener>,
    ) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        self.write_inboxes().insert(endpoint, tx);
        debug!("Registered listener for {}.", endpoint);

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                listener.on_message(envelope).await;
            }
            debug!("Inbox for {} closed.", endpoint);
        })
    }

    pub fn unregister(&self, endpoint: Endpoint) {
        if self.write_inboxes().remove(&endpoint).is_some() {
            debug!("Unregistered listener for {}.", endpoint);
        }
    }

    pub fn is_registered(&self, endpoint: Endpoint) -> bool {
        self.read_inboxes().contains_key(&endpoint)
    }

    /// Fire-and-forget delivery.
    pub fn notify(
        &self,
        from: Endpoint,
        to: Endpoint,
        message: ExtensionMessage,
    ) -> Result<(), RouterError> {
        self.deliver(
            to,
            Envelope {
                from,
                message,
                responder: None,
            },
        )
    }

    /// Delivers a request and waits for the listener's answer.
    pub async fn request(
        &self,
        from: Endpoint,
        to: Endpoint,
        message: ExtensionMessage,
    ) -> Result<Reply, RouterError> {
        let kind = message.kind();
        let (responder, rx) = Responder::new(kind);
        self.deliver(
            to,
            Envelope {
                from,
                message,
                responder: Some(responder),
            },
        )?;
        rx.await.map_err(|_| RouterError::NoResponse(kind))
    }

    fn deliver(&self, to: Endpoint, envelope: Envelope) -> Result<(), RouterError> {
        let inboxes = self.read_inboxes();
        let inbox = inboxes.get(&to).ok_or(RouterError::NoReceiver(to))?;
        let kind = envelope.message.kind();
        inbox.send(envelope).map_err(|_| {
            warn!("Inbox for {} closed while delivering {}.", to, kind);
            RouterError::NoReceiver(to)
        })
    }

    fn read_inboxes(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<Endpoint, mpsc::UnboundedSender<Envelope>>> {
        self.inboxes.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_inboxes(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<Endpoint, mpsc::UnboundedSender<Envelope>>> {
        self.inboxes.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// Records every message it sees and answers requests with an ack.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Endpoint, u8)>>,
    }

    #[async_trait]
    impl MessageListener for Recorder {
        async fn on_message(&self, mut envelope: Envelope) {
            if let ExtensionMessage::UpdateSustainability { score } = envelope.message {
                self.seen.lock().await.push((envelope.from, score));
            }
            envelope.respond(Reply::ok());
        }
    }

    /// Drops every responder unanswered.
    struct Silent;

    #[async_trait]
    impl MessageListener for Silent {
        async fn on_message(&self, _envelope: Envelope) {}
    }

    /// Answers from a spawned task after the handler has returned.
    struct Deferred;

    #[async_trait]
    impl MessageListener for Deferred {
        async fn on_message(&self, envelope: Envelope) {
            if let Some(responder) = envelope.responder {
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    responder.send(Reply::failed("later"));
                });
            }
        }
    }

    const TAB: Endpoint = Endpoint::Tab { tab_id: 1 };

    #[tokio::test]
    async fn messages_from_one_sender_arrive_in_order() {
        let router = MessageRouter::new();
        let recorder = Arc::new(Recorder::default());
        router.register(TAB, recorder.clone());

        for score in 0..50u8 {
            router
                .notify(Endpoint::Background, TAB, ExtensionMessage::UpdateSustainability { score })
                .unwrap();
        }
        // A request queues behind the notifications, so its reply means they were handled.
        router
            .request(Endpoint::Background, TAB, ExtensionMessage::HideVirtualTryOn)
            .await
            .unwrap();

        let seen = recorder.seen.lock().await;
        let scores: Vec<u8> = seen.iter().map(|(_, s)| *s).collect();
        assert_eq!(scores, (0..50).collect::<Vec<_>>());
        assert!(seen.iter().all(|(from, _)| *from == Endpoint::Background));
    }

    #[tokio::test]
    async fn request_to_missing_endpoint_fails() {
        let router = MessageRouter::new();
        let err = router
            .request(Endpoint::Popup, Endpoint::Background, ExtensionMessage::GetUserProfile)
            .await
            .unwrap_err();
        assert_eq!(err, RouterError::NoReceiver(Endpoint::Background));
    }

    #[tokio::test]
    async fn dropped_responder_reports_no_response() {
        let router = MessageRouter::new();
        router.register(Endpoint::Background, Arc::new(Silent));

        let err = router
            .request(Endpoint::Popup, Endpoint::Background, ExtensionMessage::GetMeasurements)
            .await
            .unwrap_err();
        assert_eq!(err, RouterError::NoResponse("GET_MEASUREMENTS"));
    }

    #[tokio::test]
    async fn pending_response_is_delivered_later() {
        let router = MessageRouter::new();
        router.register(Endpoint::Background, Arc::new(Deferred));

        let reply = router
            .request(Endpoint::Popup, Endpoint::Background, ExtensionMessage::GetUserProfile)
            .await
            .unwrap();
        assert_eq!(reply, Reply::failed("later"));
    }

    #[tokio::test]
    async fn unregister_closes_the_endpoint() {
        let router = MessageRouter::new();
        let handle = router.register(Endpoint::Popup, Arc::new(Recorder::default()));
        assert!(router.is_registered(Endpoint::Popup));

        router.unregister(Endpoint::Popup);
        handle.await.unwrap();

        assert!(!router.is_registered(Endpoint::Popup));
        assert_eq!(
            router.notify(Endpoint::Background, Endpoint::Popup, ExtensionMessage::GetProductId),
            Err(RouterError::NoReceiver(Endpoint::Popup))
        );
    }
}
