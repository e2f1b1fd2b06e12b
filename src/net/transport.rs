//! Message transport seam and the in-process channel implementation

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::protocol::{Envelope, NetError};
use crate::util::rate_limit::PeerRateLimiter;

/// Queue depth of the in-process channel
const CHANNEL_CAPACITY: usize = 1024;

/// Outbound side of a connection to the other participants
pub trait Transport: Send {
    fn send(&mut self, envelope: &Envelope) -> Result<(), NetError>;
}

/// JSON over a tokio channel, used to wire a host and a peer in one process
pub struct ChannelTransport {
    tx: mpsc::Sender<String>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, envelope: &Envelope) -> Result<(), NetError> {
        let raw = envelope.encode()?;
        self.tx.try_send(raw).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NetError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => NetError::ChannelClosed,
        })
    }
}

/// Two connected endpoints: each transport delivers into the other's receiver
pub fn channel_pair() -> (
    (ChannelTransport, mpsc::Receiver<String>),
    (ChannelTransport, mpsc::Receiver<String>),
) {
    let (a_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (b_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);
    ((ChannelTransport::new(b_tx), a_rx), (ChannelTransport::new(a_tx), b_rx))
}

/// Inbound messages waiting for the next frame.
///
/// The frame takes the whole queue at once, so it sees a message entirely or
/// not at all.
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    queue: Arc<Mutex<Vec<Envelope>>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, envelope: Envelope) {
        self.queue.lock().push(envelope);
    }

    pub fn drain(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// Decode, rate-limit, and buffer inbound traffic until the channel closes.
///
/// Authority messages bypass the budget; the frame drops them anyway unless
/// they come from the host.
pub async fn pump(mut rx: mpsc::Receiver<String>, inbox: Inbox, per_second: u32) {
    let mut limiter = PeerRateLimiter::new(per_second);

    while let Some(raw) = rx.recv().await {
        let envelope = match Envelope::decode(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable peer message");
                continue;
            }
        };

        if !envelope.msg.is_authority() && !limiter.check(&envelope.from) {
            let err = NetError::RateLimited(envelope.from.clone());
            debug!(error = %err, msg = envelope.msg.name(), "Dropping peer message");
            continue;
        }

        inbox.push(envelope);
    }

    debug!("Peer channel closed, inbox pump stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::NetMsg;
    use uuid::Uuid;

    fn killed() -> NetMsg {
        NetMsg::EnemyKilled {
            enemy_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn pump_delivers_decoded_messages() {
        let ((mut host_tx, _host_rx), (_peer_tx, peer_rx)) = channel_pair();
        let inbox = Inbox::new();

        host_tx.send(&Envelope::new("host", killed())).expect("send");
        host_tx.send(&Envelope::new("host", killed())).expect("send");
        drop(host_tx);

        pump(peer_rx, inbox.clone(), 60).await;
        let batch = inbox.drain();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|e| e.from == "host"));
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn garbage_and_floods_are_dropped() {
        let (tx, rx) = mpsc::channel(16);
        let inbox = Inbox::new();

        tx.send("not json".to_string()).await.expect("send");
        for _ in 0..5 {
            let raw = Envelope::new("noisy", killed()).encode().expect("encode");
            tx.send(raw).await.expect("send");
        }
        drop(tx);

        pump(rx, inbox.clone(), 3).await;
        assert_eq!(inbox.len(), 3);
    }

    #[tokio::test]
    async fn host_kills_survive_a_full_roster_of_player_states() {
        let (tx, rx) = mpsc::channel(256);
        let inbox = Inbox::new();

        for _ in 0..20 {
            for index in 0..8 {
                let state = NetMsg::PlayerState {
                    player_id: format!("host-{index}"),
                    state: Default::default(),
                };
                tx.send(Envelope::new("host", state).encode().expect("encode"))
                    .await
                    .expect("send");
            }
            let raw = Envelope::new("host", killed()).encode().expect("encode");
            tx.send(raw).await.expect("send");
        }
        drop(tx);

        pump(rx, inbox.clone(), 60).await;
        let batch = inbox.drain();
        let kills = batch
            .iter()
            .filter(|e| matches!(e.msg, NetMsg::EnemyKilled { .. }))
            .count();
        assert_eq!(kills, 20);
        // Player states are still held to the budget
        assert!(batch.len() < 180);
    }

    #[test]
    fn closed_channel_is_reported() {
        let ((mut host_tx, _host_rx), (_peer_tx, peer_rx)) = channel_pair();
        drop(peer_rx);
        let result = host_tx.send(&Envelope::new("host", killed()));
        assert!(matches!(result, Err(NetError::ChannelClosed)));
    }
}
