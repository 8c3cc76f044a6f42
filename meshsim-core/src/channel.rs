//! The shared wireless medium (§4.C): node registry, MAC arbitration, and
//! delayed, range-gated delivery.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use meshsim_arch::{rng::SharedRng, tasks};
use tokio::{sync::Mutex, time::Instant};

use crate::{
    config::SimConfig,
    messages::Frame,
    node::NodeShared,
    types::{NodeId, Position},
};

/// A registered node, as seen by the channel: just enough to decide
/// reachability and to hand off a frame. The channel never touches a
/// node's routing table, neighbor set, or counters directly — only its
/// position (for range checks) and its inbox (to deliver).
struct Registered {
    shared: Arc<NodeShared>,
}

/// The shared "air": communication range, node registry, and MAC state.
/// `channel_busy_until` is an atomic nanosecond offset from `start` so
/// that step 1 of the MAC algorithm (sensing) can read it lock-free, as
/// described in §5 ("read outside the lock; benign, re-verified
/// inside"). `reserve` is the mutex that actually guards the idle→reserved
/// transition (§4.C step 2).
pub struct WirelessChannel {
    start: Instant,
    comm_range: f64,
    nodes: std::sync::Mutex<HashMap<NodeId, Registered>>,
    busy_until_nanos: AtomicU64,
    reserve: Mutex<()>,
    rng: SharedRng,
    jitter_s: (f64, f64),
    base_delay_s: f64,
    prop_speed_mps: f64,
    max_per_hop_delay_s: f64,
    mac_min_backoff_s: f64,
    mac_max_backoff_s: f64,
    mac_slot_s: f64,
    mac_tx_duration_s: f64,
}

impl WirelessChannel {
    pub fn new(cfg: &SimConfig, start: Instant, rng: SharedRng) -> Arc<Self> {
        Arc::new(Self {
            start,
            comm_range: cfg.comm_range,
            nodes: std::sync::Mutex::new(HashMap::new()),
            busy_until_nanos: AtomicU64::new(0),
            reserve: Mutex::new(()),
            rng,
            jitter_s: (cfg.channel_jitter_s.lo, cfg.channel_jitter_s.hi),
            base_delay_s: cfg.channel_base_delay_s,
            prop_speed_mps: cfg.prop_speed_mps,
            max_per_hop_delay_s: cfg.max_per_hop_delay_s,
            mac_min_backoff_s: cfg.mac_min_backoff_s,
            mac_max_backoff_s: cfg.mac_max_backoff_s,
            mac_slot_s: cfg.mac_slot_s,
            mac_tx_duration_s: cfg.mac_tx_duration_s,
        })
    }

    /// Registers a node's handle so it can be found for delivery.
    /// Mutates the registry only at build time (§9 "shared-mutable
    /// channel state").
    pub fn attach(&self, shared: Arc<NodeShared>) {
        self.nodes
            .lock()
            .expect("channel node registry poisoned")
            .insert(shared.nid, Registered { shared });
    }

    fn now_nanos(&self) -> u64 {
        self.start.elapsed().as_nanos().min(u64::MAX as u128) as u64
    }

    /// §4.C step 1: sense + backoff, looping until the medium is idle both
    /// before and after a random backoff.
    async fn sense_and_backoff(&self) {
        loop {
            if self.now_nanos() >= self.busy_until_nanos.load(Ordering::Relaxed) {
                let backoff = self.rng.gen_range_f64(self.mac_min_backoff_s, self.mac_max_backoff_s);
                tasks::wait_s(backoff).await;
                if self.now_nanos() >= self.busy_until_nanos.load(Ordering::Relaxed) {
                    return;
                }
            } else {
                tasks::wait_s(self.mac_slot_s).await;
            }
        }
    }

    /// §4.C steps 2-4: reserve the medium, dispatch delivery, release.
    /// Retries from step 1 if another sender reserved the medium between
    /// the idle check and the lock acquisition.
    async fn mac_send(self: &Arc<Self>, sender: NodeId, frame: Frame, next_hop: Option<NodeId>) {
        loop {
            self.sense_and_backoff().await;
            let _guard = self.reserve.lock().await;
            if self.now_nanos() < self.busy_until_nanos.load(Ordering::Relaxed) {
                continue;
            }
            let tx_dur_nanos = (self.mac_tx_duration_s.max(0.0) * 1e9) as u64;
            self.busy_until_nanos
                .store(self.now_nanos() + tx_dur_nanos, Ordering::Relaxed);

            match next_hop {
                None => self.dispatch_broadcast(sender, frame),
                Some(dst) => self.dispatch_unicast(sender, dst, frame),
            }
            return;
        }
    }

    /// Broadcasts `frame` from `sender` to every other registered node
    /// within range. Out-of-range or non-existent recipients are silently
    /// excluded — there is no notion of "send failed" at this layer.
    pub async fn broadcast(self: &Arc<Self>, sender: NodeId, frame: Frame) {
        self.mac_send(sender, frame, None).await;
    }

    /// Unicasts `frame` from `sender` to `next_hop`. Silently dropped if
    /// `next_hop` is unknown or out of range (§4.C Failure semantics, §7).
    pub async fn unicast(self: &Arc<Self>, sender: NodeId, next_hop: NodeId, frame: Frame) {
        self.mac_send(sender, frame, Some(next_hop)).await;
    }

    fn sender_pos(&self, sender: NodeId) -> Option<Position> {
        let nodes = self.nodes.lock().expect("channel node registry poisoned");
        nodes.get(&sender).map(|r| r.shared.position())
    }

    /// Spawns one delayed-delivery task per in-range recipient. Spawning
    /// (rather than awaiting) is deliberate: the MAC reservation (held by
    /// the caller's `_guard`) must not extend for the full propagation
    /// delay, only for the instant of winning the channel (§4.C step 3,
    /// "non-blocking on the medium").
    fn dispatch_broadcast(self: &Arc<Self>, sender: NodeId, frame: Frame) {
        let Some(sender_pos) = self.sender_pos(sender) else {
            log::trace!("broadcast from unregistered node {sender}, dropping");
            return;
        };
        let nodes = self.nodes.lock().expect("channel node registry poisoned");
        for (nid, reg) in nodes.iter() {
            if *nid == sender {
                continue;
            }
            let dist = sender_pos.distance(&reg.shared.position());
            if dist <= self.comm_range {
                self.spawn_delivery(reg.shared.clone(), frame.clone(), dist);
            }
        }
    }

    fn dispatch_unicast(self: &Arc<Self>, sender: NodeId, next_hop: NodeId, frame: Frame) {
        let Some(sender_pos) = self.sender_pos(sender) else {
            log::trace!("unicast from unregistered node {sender}, dropping");
            return;
        };
        let nodes = self.nodes.lock().expect("channel node registry poisoned");
        let Some(reg) = nodes.get(&next_hop) else {
            log::trace!("unicast to unknown next-hop {next_hop}, dropping");
            return;
        };
        let dist = sender_pos.distance(&reg.shared.position());
        if dist > self.comm_range {
            log::trace!("unicast to {next_hop} out of range ({dist:.1}m), dropping");
            return;
        }
        self.spawn_delivery(reg.shared.clone(), frame, dist);
    }

    /// §4.C Delivery: `channel_base_delay_s + jitter + prop_delay`, then
    /// enqueue into the recipient's inbox. Tolerates the recipient being
    /// torn down mid-flight: the send into a closed inbox is simply
    /// dropped (§5 Cancellation).
    fn spawn_delivery(self: &Arc<Self>, recipient: Arc<NodeShared>, frame: Frame, dist: f64) {
        let jitter = self.rng.gen_range_f64(self.jitter_s.0, self.jitter_s.1);
        let prop_delay = (dist / self.prop_speed_mps).min(self.max_per_hop_delay_s);
        let delay = self.base_delay_s + jitter + prop_delay;
        tasks::spawn_local(async move {
            tasks::wait_s(delay).await;
            recipient.deliver(frame);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeState;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    fn make_shared(nid: u32, pos: Position, start: Instant) -> (Arc<NodeShared>, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(NodeShared {
            nid: NodeId(nid),
            state: StdMutex::new(NodeState::new(NodeId(nid), pos, start)),
            inbox_tx: tx,
        });
        (shared, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_reaches_only_in_range_nodes() {
        let cfg = SimConfig::default();
        let start = Instant::now();
        let rng = SharedRng::new(1);
        let chan = WirelessChannel::new(&cfg, start, rng);

        let (a, _rx_a) = make_shared(0, Position::new(0.0, 0.0), start);
        let (b, mut rx_b) = make_shared(1, Position::new(100.0, 0.0), start);
        let (c, mut rx_c) = make_shared(2, Position::new(10_000.0, 0.0), start);
        chan.attach(a.clone());
        chan.attach(b);
        chan.attach(c);

        chan.broadcast(
            NodeId(0),
            Frame::Hello(crate::messages::Hello {
                src: NodeId(0),
                pos: Position::new(0.0, 0.0),
                seq: 1,
            }),
        )
        .await;

        tokio::time::advance(std::time::Duration::from_millis(100)).await;
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn unicast_to_unknown_next_hop_is_silently_dropped() {
        let cfg = SimConfig::default();
        let start = Instant::now();
        let rng = SharedRng::new(1);
        let chan = WirelessChannel::new(&cfg, start, rng);
        let (a, _rx_a) = make_shared(0, Position::new(0.0, 0.0), start);
        chan.attach(a);

        chan.unicast(
            NodeId(0),
            NodeId(99),
            Frame::Hello(crate::messages::Hello {
                src: NodeId(0),
                pos: Position::new(0.0, 0.0),
                seq: 1,
            }),
        )
        .await;
        // No panic, no recipient: nothing further to assert beyond "it returned".
    }
}
