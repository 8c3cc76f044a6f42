//! A node (§4.D): owned mutable state plus the six concurrent tasks that
//! run against it. The channel only ever reaches a node through
//! `NodeShared::position()` (read) and `NodeShared::deliver()` (inbox
//! enqueue) — every other field is private to the node's own tasks,
//! matching §3's "the node exclusively owns its mutable state; the
//! channel holds a non-owning reference used only to enqueue frames".

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex as StdMutex},
};

use tokio::{
    sync::mpsc,
    time::{Duration, Instant},
};
use tokio_stream::StreamExt;

use meshsim_arch::{
    rng::SharedRng,
    tasks::{self, Interval},
};

use crate::{
    channel::WirelessChannel,
    config::{Range, SimConfig},
    messages::{mark_forwarded, Data, DistanceVector, Frame, Hello, SessionAck, SessionReq},
    routing::RoutingTable,
    trace::TraceSink,
    types::{DataId, NodeId, Position, SessionId},
};

/// Mutable state a node owns: position/mobility, neighbor bookkeeping,
/// routing table, sequence counters, and data-plane metrics (§3 Node).
pub struct NodeState {
    pub pos: Position,
    target_wp: Option<Position>,
    speed_mps: f64,
    pause_until_s: f64,

    pub neighbors: HashSet<NodeId>,
    pub neighbor_last_seen: HashMap<NodeId, f64>,
    pub rt: RoutingTable,

    hello_seq: u64,
    dv_seq: u64,

    pub generated: u64,
    pub delivered: u64,
    pub latencies: Vec<f64>,
    pub hops_used: Vec<u32>,
}

impl NodeState {
    pub fn new(nid: NodeId, pos: Position, start: Instant) -> Self {
        Self {
            pos,
            target_wp: None,
            speed_mps: 0.0,
            pause_until_s: 0.0,
            neighbors: HashSet::new(),
            neighbor_last_seen: HashMap::new(),
            rt: RoutingTable::new(nid, start.elapsed().as_secs_f64()),
            hello_seq: 0,
            dv_seq: 0,
            generated: 0,
            delivered: 0,
            latencies: Vec::new(),
            hops_used: Vec::new(),
        }
    }
}

/// The part of a node reachable from outside its own tasks: the channel
/// reads `position()` and calls `deliver()`; the simulation reads
/// `state` directly once all tasks are cancelled, to build the report.
pub struct NodeShared {
    pub nid: NodeId,
    pub state: StdMutex<NodeState>,
    pub inbox_tx: mpsc::UnboundedSender<Frame>,
}

impl NodeShared {
    pub fn position(&self) -> Position {
        self.state.lock().expect("node state poisoned").pos
    }

    /// Enqueues a frame into this node's inbox. Silently does nothing if
    /// the node's `rx_loop` has already been torn down (§5 Cancellation,
    /// §7 Frame loss) — the receiving half was dropped along with it.
    pub fn deliver(&self, frame: Frame) {
        let _ = self.inbox_tx.send(frame);
    }
}

/// Config fields the six tasks need, lifted out of `SimConfig` so a task
/// doesn't have to carry the whole record around.
#[derive(Clone, Copy)]
struct TaskConfig {
    hello_period_s: f64,
    dv_period_s: f64,
    mobility_step_s: f64,
    app_send_period_s: f64,
    app_pairs_per_period: u32,
    speed_mps: Range,
    waypoint_pause_s: Range,
    neighbor_timeout_s: f64,
    data_payload_bytes: usize,
}

impl From<&SimConfig> for TaskConfig {
    fn from(cfg: &SimConfig) -> Self {
        Self {
            hello_period_s: cfg.hello_period_s,
            dv_period_s: cfg.dv_period_s,
            mobility_step_s: cfg.mobility_step_s,
            app_send_period_s: cfg.app_send_period_s,
            app_pairs_per_period: cfg.app_pairs_per_period,
            speed_mps: cfg.speed_mps,
            waypoint_pause_s: cfg.waypoint_pause_s,
            neighbor_timeout_s: cfg.neighbor_timeout_s,
            data_payload_bytes: cfg.data_payload_bytes,
        }
    }
}

/// Everything a task closure needs, bundled so `Node::spawn_tasks` doesn't
/// have to thread a dozen parameters through six functions.
struct NodeCtx {
    nid: NodeId,
    shared: Arc<NodeShared>,
    channel: Arc<WirelessChannel>,
    rng: SharedRng,
    start: Instant,
    world_size: (f64, f64),
    trace_sink: Option<Arc<dyn TraceSink>>,
    cfg: TaskConfig,
}

impl NodeCtx {
    fn now_s(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// A node handle, for use by the simulation driver: building it gives you
/// both the handle to register with the channel and the inbox receiver to
/// hand to `rx_loop` once tasks are spawned.
pub struct Node {
    pub nid: NodeId,
    pub shared: Arc<NodeShared>,
    channel: Arc<WirelessChannel>,
    rng: SharedRng,
    start: Instant,
    world_size: (f64, f64),
    trace_sink: Option<Arc<dyn TraceSink>>,
    cfg: TaskConfig,
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        nid: NodeId,
        pos: Position,
        channel: Arc<WirelessChannel>,
        cfg: &SimConfig,
        rng: SharedRng,
        trace_sink: Option<Arc<dyn TraceSink>>,
        start: Instant,
    ) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(NodeShared {
            nid,
            state: StdMutex::new(NodeState::new(nid, pos, start)),
            inbox_tx,
        });
        let node = Self {
            nid,
            shared,
            channel,
            rng,
            start,
            world_size: cfg.world_size,
            trace_sink,
            cfg: TaskConfig::from(cfg),
        };
        (node, inbox_rx)
    }

    fn ctx(&self) -> NodeCtx {
        NodeCtx {
            nid: self.nid,
            shared: self.shared.clone(),
            channel: self.channel.clone(),
            rng: self.rng.clone(),
            start: self.start,
            world_size: self.world_size,
            trace_sink: self.trace_sink.clone(),
            cfg: self.cfg,
        }
    }

    /// Spawns the six per-node tasks (§4.D) plus `rx_loop`, returning
    /// their join handles so the simulation can cancel them all at
    /// shutdown (§4.E, §5 Cancellation).
    pub fn spawn_tasks(&self, all_ids: Arc<[NodeId]>, inbox_rx: mpsc::UnboundedReceiver<Frame>) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            tasks::spawn_local(mobility_task(self.ctx())),
            tasks::spawn_local(hello_task(self.ctx())),
            tasks::spawn_local(dv_task(self.ctx())),
            tasks::spawn_local(neighbor_watch_task(self.ctx())),
            tasks::spawn_local(rx_loop(self.ctx(), inbox_rx)),
            tasks::spawn_local(app_task(self.ctx(), all_ids)),
        ]
    }
}

// ---------------------------------------------------------------- mobility

fn pick_new_waypoint(ctx: &NodeCtx) {
    let tx = ctx.rng.gen_range_f64(0.0, ctx.world_size.0);
    let ty = ctx.rng.gen_range_f64(0.0, ctx.world_size.1);
    let speed = ctx.rng.gen_range_f64(ctx.cfg.speed_mps.lo, ctx.cfg.speed_mps.hi);
    let pause = ctx.rng.gen_range_f64(ctx.cfg.waypoint_pause_s.lo, ctx.cfg.waypoint_pause_s.hi);
    let now = ctx.now_s();
    let mut st = ctx.shared.state.lock().expect("node state poisoned");
    st.target_wp = Some(Position::new(tx, ty));
    st.speed_mps = speed;
    st.pause_until_s = now + pause;
}

fn step_toward_waypoint(ctx: &NodeCtx, dt: f64) {
    let now = ctx.now_s();
    let mut st = ctx.shared.state.lock().expect("node state poisoned");
    let Some(target) = st.target_wp else {
        drop(st);
        pick_new_waypoint(ctx);
        return;
    };
    if now < st.pause_until_s {
        return;
    }
    let dx = target.x - st.pos.x;
    let dy = target.y - st.pos.y;
    let dist = (dx * dx + dy * dy).sqrt();
    if dist < 1e-3 {
        drop(st);
        pick_new_waypoint(ctx);
        return;
    }
    let step = st.speed_mps * dt;
    if step >= dist {
        st.pos = target;
        drop(st);
        pick_new_waypoint(ctx);
    } else {
        let r = step / dist;
        st.pos = Position::new(st.pos.x + r * dx, st.pos.y + r * dy);
    }
}

async fn mobility_task(ctx: NodeCtx) {
    pick_new_waypoint(&ctx);
    let tick = ctx.cfg.mobility_step_s;
    let mut interval = Interval::new(Duration::from_secs_f64(tick));
    loop {
        step_toward_waypoint(&ctx, tick);
        interval.next().await;
    }
}

// ------------------------------------------------------------- hello / dv

async fn hello_task(ctx: NodeCtx) {
    let mut interval = Interval::new(Duration::from_secs_f64(ctx.cfg.hello_period_s));
    loop {
        interval.next().await;
        let (pos, seq) = {
            let mut st = ctx.shared.state.lock().expect("node state poisoned");
            st.hello_seq += 1;
            (st.pos, st.hello_seq)
        };
        ctx.channel
            .broadcast(ctx.nid, Frame::Hello(Hello { src: ctx.nid, pos, seq }))
            .await;
    }
}

async fn dv_task(ctx: NodeCtx) {
    let mut interval = Interval::new(Duration::from_secs_f64(ctx.cfg.dv_period_s));
    loop {
        interval.next().await;
        let (vector, seq) = {
            let mut st = ctx.shared.state.lock().expect("node state poisoned");
            st.dv_seq += 1;
            (st.rt.snapshot(), st.dv_seq)
        };
        ctx.channel
            .broadcast(ctx.nid, Frame::Dv(DistanceVector { src: ctx.nid, vector, seq }))
            .await;
    }
}

// ------------------------------------------------------------ neighbor watch

async fn neighbor_watch_task(ctx: NodeCtx) {
    let period = ctx.cfg.neighbor_timeout_s / 3.0;
    let mut interval = Interval::new(Duration::from_secs_f64(period));
    loop {
        interval.next().await;
        let now = ctx.now_s();
        let mut st = ctx.shared.state.lock().expect("node state poisoned");
        let dead: Vec<NodeId> = st
            .neighbor_last_seen
            .iter()
            .filter(|(_, &last)| now - last > ctx.cfg.neighbor_timeout_s)
            .map(|(&nid, _)| nid)
            .collect();
        for dead_nid in dead {
            st.neighbors.remove(&dead_nid);
            st.neighbor_last_seen.remove(&dead_nid);
            st.rt.purge_neighbor(dead_nid);
            log::debug!("{} lost neighbor {}", ctx.nid, dead_nid);
        }
    }
}

// ---------------------------------------------------------------- rx loop

async fn rx_loop(ctx: NodeCtx, mut inbox_rx: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = inbox_rx.recv().await {
        match frame {
            Frame::Hello(m) => {
                let now = ctx.now_s();
                let mut st = ctx.shared.state.lock().expect("node state poisoned");
                st.neighbors.insert(m.src);
                st.neighbor_last_seen.insert(m.src, now);
                st.rt.ensure_one_hop(m.src, now);
            }
            Frame::Dv(m) => {
                let now = ctx.now_s();
                let mut st = ctx.shared.state.lock().expect("node state poisoned");
                st.rt.apply_distance_vector(m.src, &m.vector, now);
            }
            Frame::SessionReq(m) => forward_session_req(&ctx, m).await,
            Frame::SessionAck(m) => forward_session_ack(&ctx, m).await,
            Frame::Data(m) => forward_data(&ctx, m).await,
        }
    }
}

// ---------------------------------------------------------------- app task

async fn app_task(ctx: NodeCtx, all_ids: Arc<[NodeId]>) {
    let mut interval = Interval::new(Duration::from_secs_f64(ctx.cfg.app_send_period_s));
    loop {
        interval.next().await;
        for _ in 0..ctx.cfg.app_pairs_per_period {
            let Some(&dst) = ctx.rng.choose(&all_ids) else {
                continue;
            };
            if dst == ctx.nid {
                continue;
            }
            let has_route = ctx.shared.state.lock().expect("node state poisoned").rt.contains(dst);
            if !has_route {
                continue;
            }
            let session_id = SessionId(mint_id(&ctx.rng));
            let req = SessionReq::new(ctx.nid, dst, session_id, ctx.now_s());
            forward_session_req(&ctx, req).await;
        }
    }
}

fn mint_id(rng: &SharedRng) -> u64 {
    rng.gen_range_u64(1, 10_000_000)
}

// ----------------------------------------------------- forwarding handlers
//
// Shared structure (§4.D "Forwarding handlers share structure"): append
// self to path if not already last, handle terminal delivery if we are
// the destination, otherwise look up the route and unicast one more hop.

async fn forward_session_req(ctx: &NodeCtx, mut msg: SessionReq) {
    mark_forwarded(&mut msg.path, ctx.nid);

    if msg.dst == ctx.nid {
        let ack = SessionAck::new(ctx.nid, msg.src, msg.session_id, ctx.now_s());
        forward_session_ack(ctx, ack).await;
        return;
    }

    let route = {
        let st = ctx.shared.state.lock().expect("node state poisoned");
        st.rt.get(msg.dst).copied()
    };
    let Some(route) = route else {
        log::trace!("{}: no route to {}, dropping SessionReq", ctx.nid, msg.dst);
        return;
    };
    msg.hop_count += 1;
    ctx.channel.unicast(ctx.nid, route.next_hop, Frame::SessionReq(msg)).await;
}

async fn forward_session_ack(ctx: &NodeCtx, mut msg: SessionAck) {
    mark_forwarded(&mut msg.path, ctx.nid);

    if msg.dst == ctx.nid {
        let target = msg.target;
        let has_target = ctx.shared.state.lock().expect("node state poisoned").rt.contains(target);
        if !has_target {
            log::trace!("{}: no route to target {}, dropping SessionAck", ctx.nid, target);
            return;
        }
        let mut payload = vec![0u8; ctx.cfg.data_payload_bytes];
        ctx.rng.fill_bytes(&mut payload);
        let data_id = DataId(mint_id(&ctx.rng));
        let data = Data::new(ctx.nid, target, payload, ctx.now_s(), data_id);
        {
            let mut st = ctx.shared.state.lock().expect("node state poisoned");
            st.generated += 1;
        }
        forward_data(ctx, data).await;
        return;
    }

    let route = {
        let st = ctx.shared.state.lock().expect("node state poisoned");
        st.rt.get(msg.dst).copied()
    };
    let Some(route) = route else {
        log::trace!("{}: no route to {}, dropping SessionAck", ctx.nid, msg.dst);
        return;
    };
    msg.hop_count += 1;
    ctx.channel.unicast(ctx.nid, route.next_hop, Frame::SessionAck(msg)).await;
}

async fn forward_data(ctx: &NodeCtx, mut msg: Data) {
    mark_forwarded(&mut msg.path, ctx.nid);

    if msg.dst == ctx.nid {
        let now = ctx.now_s();
        let latency = now - msg.created_at_s;
        let mut st = ctx.shared.state.lock().expect("node state poisoned");
        st.delivered += 1;
        st.latencies.push(latency);
        st.hops_used.push(msg.hop_count);
        drop(st);
        if let Some(sink) = &ctx.trace_sink {
            sink.on_delivery(&msg.path);
        }
        return;
    }

    let route = {
        let st = ctx.shared.state.lock().expect("node state poisoned");
        st.rt.get(msg.dst).copied()
    };
    let Some(route) = route else {
        log::trace!("{}: no route to {}, dropping Data", ctx.nid, msg.dst);
        return;
    };
    msg.hop_count += 1;
    ctx.channel.unicast(ctx.nid, route.next_hop, Frame::Data(msg)).await;
}
