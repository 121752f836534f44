//! Network simulator for deterministic testing.
//!
//! Real networks drop, reorder, and duplicate datagrams.  To exercise the
//! retry logic without depending on actual network conditions, [`Simulator`]
//! wraps any [`Channel`] and applies a fault model to **outbound** datagrams:
//!
//! | Fault            | Description                                          |
//! |------------------|------------------------------------------------------|
//! | Scripted drop    | Drop the next `n` datagrams equal to a given payload.|
//! | Packet loss      | Drop a datagram with probability `loss_rate`.        |
//! | Duplication      | Deliver a datagram twice.                            |
//! | Reordering       | Hold a datagram back until the next one has gone out.|
//!
//! Randomised faults draw from a [`StdRng`] seeded by `SimulatorConfig::seed`,
//! so a failing run can be replayed exactly.  Every datagram handed to
//! [`Channel::send_to`] is recorded (before faults apply) for later
//! inspection.
//!
//! Receives pass straight through to the inner channel.

use std::io;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::socket::Channel;

/// Configuration for the randomised part of the fault model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is sent twice.
    pub duplicate_rate: f64,
    /// Probability that a datagram is held back behind the next one.
    pub reorder_rate: f64,
    /// Seed for the fault RNG.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default; the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            seed: 0,
        }
    }
}

/// Drop the next `remaining` outbound datagrams whose bytes equal `payload`.
#[derive(Debug, Clone)]
struct DropRule {
    payload: Vec<u8>,
    remaining: u32,
}

#[derive(Debug)]
struct FaultState {
    rng: StdRng,
    rules: Vec<DropRule>,
    held: Option<(Vec<u8>, SocketAddr)>,
    sent: Vec<Vec<u8>>,
    dropped: usize,
}

/// A fault-injecting wrapper around another channel.
#[derive(Debug)]
pub struct Simulator<C> {
    inner: C,
    config: SimulatorConfig,
    state: Mutex<FaultState>,
}

impl<C: Channel> Simulator<C> {
    /// Wrap `inner` with the given fault model.
    pub fn new(inner: C, config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            state: Mutex::new(FaultState {
                rng,
                rules: Vec::new(),
                held: None,
                sent: Vec::new(),
                dropped: 0,
            }),
        }
    }

    /// Wrap `inner` without any randomised faults.
    pub fn pass_through(inner: C) -> Self {
        Self::new(inner, SimulatorConfig::default())
    }

    /// Silently drop the next `times` outbound datagrams equal to `payload`.
    pub fn drop_next(&self, payload: &[u8], times: u32) {
        self.lock().rules.push(DropRule {
            payload: payload.to_vec(),
            remaining: times,
        });
    }

    /// Drop every outbound datagram equal to `payload`, forever.
    pub fn drop_always(&self, payload: &[u8]) {
        self.drop_next(payload, u32::MAX);
    }

    /// Every datagram the caller asked to send, in order, faults ignored.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    /// How many datagrams the fault model swallowed.
    pub fn dropped(&self) -> usize {
        self.lock().dropped
    }

    /// The wrapped channel.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn lock(&self) -> MutexGuard<'_, FaultState> {
        // A poisoned lock only means a test thread panicked mid-update; the
        // fault state itself is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Decide what actually goes on the wire for one outbound datagram.
    fn plan(&self, bytes: &[u8], dest: SocketAddr) -> Vec<(Vec<u8>, SocketAddr)> {
        let mut st = self.lock();
        st.sent.push(bytes.to_vec());

        let scripted = st
            .rules
            .iter_mut()
            .find(|r| r.remaining > 0 && r.payload == bytes)
            .map(|r| r.remaining -= 1)
            .is_some();
        if scripted {
            st.dropped += 1;
            log::debug!("[sim] scripted drop of {} byte(s) to {dest}", bytes.len());
            return Vec::new();
        }

        if self.config.loss_rate > 0.0 && st.rng.gen_bool(self.config.loss_rate) {
            st.dropped += 1;
            log::debug!("[sim] random loss of {} byte(s) to {dest}", bytes.len());
            return Vec::new();
        }

        let mut out = Vec::with_capacity(3);
        out.push((bytes.to_vec(), dest));
        if self.config.duplicate_rate > 0.0 && st.rng.gen_bool(self.config.duplicate_rate) {
            out.push((bytes.to_vec(), dest));
        }

        if let Some(held) = st.held.take() {
            out.push(held);
        } else if self.config.reorder_rate > 0.0 && st.rng.gen_bool(self.config.reorder_rate) {
            // Held until the next send; a final datagram held here is lost.
            st.held = out.pop();
        }
        out
    }
}

impl<C: Channel> Channel for Simulator<C> {
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<()> {
        for (datagram, to) in self.plan(bytes, dest) {
            self.inner.send_to(&datagram, to).await?;
        }
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::Socket;
    use std::time::Duration;

    async fn pair() -> (Socket, Socket) {
        let a = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        (a, b)
    }

    async fn drain(s: &Socket) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while let Some((n, _)) = s
            .recv_from_timeout(&mut buf, Duration::from_millis(50))
            .await
            .unwrap()
        {
            out.push(buf[..n].to_vec());
        }
        out
    }

    #[tokio::test]
    async fn pass_through_delivers_everything() {
        let (a, b) = pair().await;
        let sim = Simulator::pass_through(&a);
        sim.send_to(b"x", b.local_addr).await.unwrap();
        sim.send_to(b"y", b.local_addr).await.unwrap();
        assert_eq!(drain(&b).await, vec![b"x".to_vec(), b"y".to_vec()]);
        assert_eq!(sim.dropped(), 0);
    }

    #[tokio::test]
    async fn scripted_drop_fires_exactly_n_times() {
        let (a, b) = pair().await;
        let sim = Simulator::pass_through(&a);
        sim.drop_next(b"2", 2);

        for _ in 0..3 {
            sim.send_to(b"2", b.local_addr).await.unwrap();
        }
        sim.send_to(b"3", b.local_addr).await.unwrap();

        assert_eq!(drain(&b).await, vec![b"2".to_vec(), b"3".to_vec()]);
        assert_eq!(sim.dropped(), 2);
        assert_eq!(sim.sent().len(), 4);
    }

    #[tokio::test]
    async fn drop_always_never_delivers() {
        let (a, b) = pair().await;
        let sim = Simulator::pass_through(&a);
        sim.drop_always(b"0");
        for _ in 0..10 {
            sim.send_to(b"0", b.local_addr).await.unwrap();
        }
        assert!(drain(&b).await.is_empty());
        assert_eq!(sim.dropped(), 10);
    }

    #[tokio::test]
    async fn full_duplication_doubles_delivery() {
        let (a, b) = pair().await;
        let sim = Simulator::new(
            &a,
            SimulatorConfig {
                duplicate_rate: 1.0,
                ..Default::default()
            },
        );
        sim.send_to(b"d", b.local_addr).await.unwrap();
        assert_eq!(drain(&b).await, vec![b"d".to_vec(), b"d".to_vec()]);
    }

    #[tokio::test]
    async fn reorder_swaps_adjacent_datagrams() {
        let (a, b) = pair().await;
        let sim = Simulator::new(
            &a,
            SimulatorConfig {
                reorder_rate: 1.0,
                ..Default::default()
            },
        );
        // First is held, second goes out followed by the held one.
        sim.send_to(b"first", b.local_addr).await.unwrap();
        sim.send_to(b"second", b.local_addr).await.unwrap();
        assert_eq!(
            drain(&b).await,
            vec![b"second".to_vec(), b"first".to_vec()]
        );
    }

    #[tokio::test]
    async fn seeded_loss_is_reproducible() {
        let (a, b) = pair().await;
        let lossy = || {
            Simulator::new(
                &a,
                SimulatorConfig {
                    loss_rate: 0.5,
                    seed: 7,
                    ..Default::default()
                },
            )
        };

        let mut runs = Vec::new();
        for _ in 0..2 {
            let sim = lossy();
            for i in 0..20u8 {
                sim.send_to(&[i], b.local_addr).await.unwrap();
            }
            runs.push(drain(&b).await);
        }
        assert_eq!(runs[0], runs[1]);
        assert!(runs[0].len() < 20, "half-loss run delivered everything");
    }
}
