//! Classical link abstraction.
//!
//! Each peer holds one endpoint: it sends on its outgoing channel and
//! receives from the peer's. The two directions are independent; each is
//! FIFO and lossless, with a fixed propagation delay.
//!
//! [`MemoryLink`](memory::MemoryLink) delays are simulated time; see
//! [`clock`](crate::clock).

use async_trait::async_trait;

use crate::error::Result;
use crate::messages::ClassicalMessage;

/// One peer's end of the two classical channels.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ClassicalLink: Send + Sync {
    /// Send a message to the peer.
    async fn send(&self, message: ClassicalMessage) -> Result<()>;

    /// Receive the next message from the peer.
    ///
    /// Blocks until the next frame has propagated. Returns
    /// `ConnectionClosed` once the peer is gone and nothing is left in
    /// flight, and `MalformedMessage` for a frame that fails to decode.
    async fn recv(&self) -> Result<ClassicalMessage>;

    /// Whether the outgoing channel can still deliver.
    fn is_connected(&self) -> bool;
}

/// In-memory link with simulated propagation delay.
pub mod memory {
    use super::*;
    use std::fmt;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use crate::clock;
    use crate::error::ProtocolError;

    /// A frame that will never decode.
    const CORRUPT_FRAME: &[u8] = &[0xff, 0xff, 0xff];

    #[derive(Debug)]
    struct Frame {
        deliver_at: Instant,
        bytes: Bytes,
    }

    struct Inbox {
        rx: mpsc::UnboundedReceiver<Frame>,
        /// Frame taken off the channel but not yet propagated.
        pending: Option<Frame>,
    }

    /// Predicate selecting frames for fault injection.
    pub type FramePredicate = Arc<dyn Fn(&ClassicalMessage) -> bool + Send + Sync>;

    /// Fault applied to an endpoint's outgoing channel.
    #[derive(Clone)]
    pub enum Fault {
        /// Drop the first matching frame and everything after it; the
        /// receiving side then observes the connection closed.
        Truncate(FramePredicate),
        /// Replace the first matching frame with undecodable bytes.
        Corrupt(FramePredicate),
    }

    impl Fault {
        /// Truncate the channel at the first frame matching `predicate`.
        pub fn truncate_at<F>(predicate: F) -> Self
        where
            F: Fn(&ClassicalMessage) -> bool + Send + Sync + 'static,
        {
            Fault::Truncate(Arc::new(predicate))
        }

        /// Corrupt the first frame matching `predicate`.
        pub fn corrupt_once<F>(predicate: F) -> Self
        where
            F: Fn(&ClassicalMessage) -> bool + Send + Sync + 'static,
        {
            Fault::Corrupt(Arc::new(predicate))
        }
    }

    impl fmt::Debug for Fault {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Fault::Truncate(_) => f.write_str("Fault::Truncate"),
                Fault::Corrupt(_) => f.write_str("Fault::Corrupt"),
            }
        }
    }

    enum Disposition {
        Deliver,
        Corrupt,
        Truncate,
    }

    /// In-memory link endpoint.
    pub struct MemoryLink {
        label: &'static str,
        delay: Duration,
        outgoing: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
        incoming: tokio::sync::Mutex<Inbox>,
        faults: Mutex<Vec<Fault>>,
    }

    impl MemoryLink {
        /// Create connected endpoints for Alice and Bob.
        ///
        /// `alice_to_bob` and `bob_to_alice` are the per-direction
        /// propagation delays.
        pub fn pair(alice_to_bob: Duration, bob_to_alice: Duration) -> (Self, Self) {
            let (a2b_tx, a2b_rx) = mpsc::unbounded_channel();
            let (b2a_tx, b2a_rx) = mpsc::unbounded_channel();

            let alice = Self::endpoint("alice", alice_to_bob, a2b_tx, b2a_rx);
            let bob = Self::endpoint("bob", bob_to_alice, b2a_tx, a2b_rx);
            (alice, bob)
        }

        fn endpoint(
            label: &'static str,
            delay: Duration,
            tx: mpsc::UnboundedSender<Frame>,
            rx: mpsc::UnboundedReceiver<Frame>,
        ) -> Self {
            Self {
                label,
                delay,
                outgoing: Mutex::new(Some(tx)),
                incoming: tokio::sync::Mutex::new(Inbox { rx, pending: None }),
                faults: Mutex::new(Vec::new()),
            }
        }

        /// Propagation delay of this endpoint's outgoing channel.
        pub fn delay(&self) -> Duration {
            self.delay
        }

        /// Install a fault on the outgoing channel.
        pub fn inject(&self, fault: Fault) {
            self.faults.lock().unwrap().push(fault);
        }

        /// Close the outgoing channel. Frames already in flight still arrive.
        pub fn close(&self) {
            self.outgoing.lock().unwrap().take();
        }

        /// Check installed faults; a fault that fires is removed.
        fn disposition(&self, message: &ClassicalMessage) -> Disposition {
            let mut faults = self.faults.lock().unwrap();
            let hit = faults.iter().position(|fault| match fault {
                Fault::Truncate(p) | Fault::Corrupt(p) => p(message),
            });
            match hit.map(|i| faults.remove(i)) {
                Some(Fault::Truncate(_)) => Disposition::Truncate,
                Some(Fault::Corrupt(_)) => Disposition::Corrupt,
                None => Disposition::Deliver,
            }
        }
    }

    #[async_trait]
    impl ClassicalLink for MemoryLink {
        async fn send(&self, message: ClassicalMessage) -> Result<()> {
            let bytes = match self.disposition(&message) {
                Disposition::Deliver => message.encode()?,
                Disposition::Corrupt => {
                    tracing::debug!(link = self.label, round = message.round, "corrupting frame");
                    Bytes::from_static(CORRUPT_FRAME)
                }
                Disposition::Truncate => {
                    tracing::debug!(link = self.label, round = message.round, "truncating channel");
                    self.close();
                    return Ok(());
                }
            };

            let outgoing = self.outgoing.lock().unwrap();
            let tx = outgoing.as_ref().ok_or(ProtocolError::ConnectionClosed)?;
            tx.send(Frame {
                deliver_at: clock::after(Instant::now(), self.delay),
                bytes,
            })
            .map_err(|_| ProtocolError::ConnectionClosed)
        }

        /// Cancel safe: a frame taken off the channel is parked until it
        /// has propagated, so dropping this future never loses it.
        async fn recv(&self) -> Result<ClassicalMessage> {
            let mut inbox = self.incoming.lock().await;

            if inbox.pending.is_none() {
                inbox.pending = inbox.rx.recv().await;
            }
            let deliver_at = match &inbox.pending {
                Some(frame) => frame.deliver_at,
                None => return Err(ProtocolError::ConnectionClosed),
            };

            tokio::time::sleep_until(deliver_at).await;

            match inbox.pending.take() {
                Some(frame) => ClassicalMessage::decode(&frame.bytes),
                None => Err(ProtocolError::ConnectionClosed),
            }
        }

        fn is_connected(&self) -> bool {
            self.outgoing
                .lock()
                .unwrap()
                .as_ref()
                .map_or(false, |tx| !tx.is_closed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{Fault, MemoryLink};
    use super::*;
    use crate::clock;
    use crate::error::ProtocolError;
    use crate::messages::Payload;
    use entqkd_core::Basis;
    use std::time::Duration;
    use tokio::time::Instant;

    fn delays() -> (Duration, Duration) {
        (Duration::from_nanos(20), Duration::from_nanos(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_link_delay_and_order() {
        let (a2b, b2a) = delays();
        let (alice, bob) = MemoryLink::pair(a2b, b2a);

        let start = Instant::now();
        alice.send(ClassicalMessage::new(0, Payload::Match(true))).await.unwrap();
        alice.send(ClassicalMessage::new(1, Payload::Match(false))).await.unwrap();

        let first = bob.recv().await.unwrap();
        assert_eq!(first.round, 0);
        assert_eq!(clock::since(start), a2b);

        let second = bob.recv().await.unwrap();
        assert_eq!(second.payload, Payload::Match(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_directions_are_independent() {
        let (a2b, b2a) = delays();
        let (alice, bob) = MemoryLink::pair(a2b, b2a);

        bob.send(ClassicalMessage::new(0, Payload::Basis(Basis::Conjugate)))
            .await
            .unwrap();
        let start = Instant::now();
        let msg = alice.recv().await.unwrap();
        assert_eq!(msg.payload, Payload::Basis(Basis::Conjugate));
        assert_eq!(clock::since(start), b2a);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_after_peer_dropped() {
        let (alice, bob) = MemoryLink::pair(Duration::ZERO, Duration::ZERO);
        alice.send(ClassicalMessage::new(0, Payload::Ack)).await.unwrap();
        drop(alice);

        // In-flight frame still arrives, then the link reports closed.
        assert_eq!(bob.recv().await.unwrap().payload, Payload::Ack);
        assert!(matches!(bob.recv().await, Err(ProtocolError::ConnectionClosed)));
        assert!(!bob.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncate_fault() {
        let (alice, bob) = MemoryLink::pair(Duration::ZERO, Duration::ZERO);
        alice.inject(Fault::truncate_at(|m| m.payload == Payload::Match(true)));

        alice.send(ClassicalMessage::new(0, Payload::Match(false))).await.unwrap();
        alice.send(ClassicalMessage::new(1, Payload::Match(true))).await.unwrap();
        assert!(!alice.is_connected());
        assert!(matches!(
            alice.send(ClassicalMessage::new(2, Payload::Ack)).await,
            Err(ProtocolError::ConnectionClosed)
        ));

        assert_eq!(bob.recv().await.unwrap().round, 0);
        assert!(matches!(bob.recv().await, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_fault_fires_once() {
        let (alice, bob) = MemoryLink::pair(Duration::ZERO, Duration::ZERO);
        alice.inject(Fault::corrupt_once(|m| matches!(m.payload, Payload::Match(_))));

        alice.send(ClassicalMessage::new(0, Payload::Match(false))).await.unwrap();
        alice.send(ClassicalMessage::new(1, Payload::Match(false))).await.unwrap();

        assert!(matches!(bob.recv().await, Err(ProtocolError::MalformedMessage(_))));
        assert_eq!(bob.recv().await.unwrap().round, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_is_cancel_safe() {
        let (alice, bob) = MemoryLink::pair(Duration::from_nanos(100), Duration::ZERO);
        alice.send(ClassicalMessage::new(5, Payload::Ack)).await.unwrap();

        // Give up halfway through propagation.
        let early = tokio::time::timeout(clock::to_runtime(Duration::from_nanos(50)), bob.recv()).await;
        assert!(early.is_err());

        let msg = bob.recv().await.unwrap();
        assert_eq!(msg.round, 5);
    }
}
