//! In-process loopback transport for development and demos.
//!
//! No real chat network is involved: the [`LoopbackHub`] plays the network.
//! Inbound traffic is injected through the hub (the admin HTTP surface
//! exposes this), outbound messages land in a per-tenant outbox, and drops
//! or pairing rejections can be forced to exercise reconnection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use botline_core::transport::{Handshake, Transport, TransportEvent, TransportFactory};
use botline_types::error::SessionError;
use botline_types::message::{InboundMessage, OutboundMessage};
use botline_types::session::AuthArtifact;
use botline_types::tenant::TenantId;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Event channel capacity per link.
const LINK_CAPACITY: usize = 256;

/// Outbound messages retained per tenant.
const OUTBOX_LIMIT: usize = 1_000;

struct Link {
    id: u64,
    events: mpsc::Sender<TransportEvent>,
}

#[derive(Default)]
struct HubInner {
    links: DashMap<TenantId, Link>,
    outbox: DashMap<TenantId, Vec<OutboundMessage>>,
    rejections: DashMap<TenantId, String>,
    next_link: AtomicU64,
}

/// The simulated network shared by every loopback transport.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    inner: Arc<HubInner>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> LoopbackTransportFactory {
        LoopbackTransportFactory { hub: self.clone() }
    }

    /// Whether `tenant_id` currently has an established link.
    pub fn is_linked(&self, tenant_id: &TenantId) -> bool {
        self.inner.links.contains_key(tenant_id)
    }

    /// Deliver an inbound message to the tenant's live connection.
    pub async fn inject(&self, tenant_id: &TenantId, message: InboundMessage) -> Result<(), SessionError> {
        let events = self.link_sender(tenant_id)?;
        events
            .send(TransportEvent::Message(message))
            .await
            .map_err(|_| SessionError::NotConnected {
                tenant_id: tenant_id.clone(),
            })
    }

    /// Force the tenant's connection to drop.
    pub async fn disconnect(&self, tenant_id: &TenantId, reason: &str) -> Result<(), SessionError> {
        let events = self.link_sender(tenant_id)?;
        let _ = events
            .send(TransportEvent::Disconnected {
                reason: reason.to_string(),
            })
            .await;
        Ok(())
    }

    /// Make subsequent handshakes of `tenant_id` fail until allowed again.
    pub fn reject_pairing(&self, tenant_id: &TenantId, reason: &str) {
        self.inner
            .rejections
            .insert(tenant_id.clone(), reason.to_string());
    }

    pub fn allow_pairing(&self, tenant_id: &TenantId) {
        self.inner.rejections.remove(tenant_id);
    }

    /// Messages the tenant has sent, oldest first.
    pub fn outbox(&self, tenant_id: &TenantId) -> Vec<OutboundMessage> {
        self.inner
            .outbox
            .get(tenant_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    fn link_sender(&self, tenant_id: &TenantId) -> Result<mpsc::Sender<TransportEvent>, SessionError> {
        self.inner
            .links
            .get(tenant_id)
            .map(|link| link.events.clone())
            .ok_or_else(|| SessionError::NotConnected {
                tenant_id: tenant_id.clone(),
            })
    }
}

impl std::fmt::Debug for LoopbackHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackHub")
            .field("links", &self.inner.links.len())
            .finish_non_exhaustive()
    }
}

/// Creates loopback transports attached to one hub.
#[derive(Debug, Clone)]
pub struct LoopbackTransportFactory {
    hub: LoopbackHub,
}

impl TransportFactory for LoopbackTransportFactory {
    type Transport = LoopbackTransport;

    fn create(&self, tenant_id: &TenantId) -> LoopbackTransport {
        LoopbackTransport {
            tenant_id: tenant_id.clone(),
            hub: self.hub.clone(),
            link_id: Mutex::new(None),
        }
    }
}

/// One tenant's loopback connection.
#[derive(Debug)]
pub struct LoopbackTransport {
    tenant_id: TenantId,
    hub: LoopbackHub,
    link_id: Mutex<Option<u64>>,
}

impl LoopbackTransport {
    fn current_link(&self) -> Option<u64> {
        *self.link_id.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for LoopbackTransport {
    async fn connect(&self, artifact: Option<AuthArtifact>) -> Result<Handshake, SessionError> {
        if let Some(reason) = self.hub.inner.rejections.get(&self.tenant_id) {
            return Err(SessionError::HandshakeRejected {
                reason: reason.value().clone(),
            });
        }

        // First pairing mints credentials; later handshakes reuse them.
        let fresh = match artifact {
            Some(_) => None,
            None => Some(AuthArtifact::new(
                format!("loopback:{}:{}", self.tenant_id, Uuid::now_v7()).into_bytes(),
            )),
        };

        let (tx, rx) = mpsc::channel(LINK_CAPACITY);
        let id = self.hub.inner.next_link.fetch_add(1, Ordering::Relaxed);
        self.hub
            .inner
            .links
            .insert(self.tenant_id.clone(), Link { id, events: tx });
        *self.link_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);

        tracing::debug!(tenant_id = %self.tenant_id, paired = fresh.is_some(), "loopback link established");
        Ok(Handshake {
            artifact: fresh,
            events: rx,
        })
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), SessionError> {
        let linked = self
            .current_link()
            .is_some_and(|id| self.hub.inner.links.get(&self.tenant_id).is_some_and(|l| l.id == id));
        if !linked {
            return Err(SessionError::Transport {
                reason: "loopback link is down".to_string(),
            });
        }

        let mut outbox = self.hub.inner.outbox.entry(self.tenant_id.clone()).or_default();
        outbox.push(message.clone());
        if outbox.len() > OUTBOX_LIMIT {
            let excess = outbox.len() - OUTBOX_LIMIT;
            outbox.drain(..excess);
        }
        Ok(())
    }

    async fn close(&self) {
        let Some(id) = self.link_id.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };
        self.hub
            .inner
            .links
            .remove_if(&self.tenant_id, |_, link| link.id == id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botline_types::tenant::SenderId;

    fn tenant() -> TenantId {
        TenantId::new("6")
    }

    #[tokio::test]
    async fn first_pairing_mints_credentials() {
        let hub = LoopbackHub::new();
        let transport = hub.factory().create(&tenant());

        let handshake = transport.connect(None).await.unwrap();
        let artifact = handshake.artifact.unwrap();
        assert!(String::from_utf8_lossy(artifact.as_bytes()).starts_with("loopback:6:"));
        assert!(hub.is_linked(&tenant()));
    }

    #[tokio::test]
    async fn known_credentials_are_kept() {
        let hub = LoopbackHub::new();
        let transport = hub.factory().create(&tenant());
        let handshake = transport
            .connect(Some(AuthArtifact::new(b"saved".to_vec())))
            .await
            .unwrap();
        assert!(handshake.artifact.is_none());
    }

    #[tokio::test]
    async fn rejected_pairing_fails_handshake() {
        let hub = LoopbackHub::new();
        hub.reject_pairing(&tenant(), "qr expired");
        let transport = hub.factory().create(&tenant());

        let err = transport.connect(None).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::HandshakeRejected {
                reason: "qr expired".into()
            }
        );

        hub.allow_pairing(&tenant());
        assert!(transport.connect(None).await.is_ok());
    }

    #[tokio::test]
    async fn injected_messages_and_drops_arrive_in_order() {
        let hub = LoopbackHub::new();
        let transport = hub.factory().create(&tenant());
        let mut events = transport.connect(None).await.unwrap().events;

        hub.inject(&tenant(), InboundMessage::new(SenderId::from("5511"), "hi"))
            .await
            .unwrap();
        hub.disconnect(&tenant(), "forced").await.unwrap();

        match events.recv().await.unwrap() {
            TransportEvent::Message(message) => assert_eq!(message.payload, "hi"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(
            events.recv().await.unwrap(),
            TransportEvent::Disconnected {
                reason: "forced".into()
            }
        );
    }

    #[tokio::test]
    async fn inject_without_link_is_not_connected() {
        let hub = LoopbackHub::new();
        let err = hub
            .inject(&tenant(), InboundMessage::new(SenderId::from("5511"), "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotConnected { .. }));
    }

    #[tokio::test]
    async fn send_lands_in_outbox_and_close_unlinks() {
        let hub = LoopbackHub::new();
        let transport = hub.factory().create(&tenant());
        let _handshake = transport.connect(None).await.unwrap();

        let message = OutboundMessage {
            recipient: SenderId::from("5511"),
            payload: "booked".into(),
        };
        transport.send(&message).await.unwrap();
        assert_eq!(hub.outbox(&tenant()), vec![message.clone()]);

        transport.close().await;
        assert!(!hub.is_linked(&tenant()));
        assert!(transport.send(&message).await.is_err());
        transport.close().await;
    }

    #[tokio::test]
    async fn closing_stale_transport_keeps_newer_link() {
        let hub = LoopbackHub::new();
        let old = hub.factory().create(&tenant());
        let new = hub.factory().create(&tenant());
        let _a = old.connect(None).await.unwrap();
        let _b = new.connect(None).await.unwrap();

        old.close().await;
        assert!(hub.is_linked(&tenant()));
    }
}
