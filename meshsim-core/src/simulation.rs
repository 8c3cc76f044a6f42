//! The simulation driver (§4.E): builds nodes, runs them for a bounded
//! duration, and aggregates a final report.

use std::{fmt, sync::Arc};

use meshsim_arch::{rng::SharedRng, tasks};
use tokio::time::Instant;

use crate::{
    channel::WirelessChannel,
    config::{ConfigError, SimConfig},
    node::Node,
    trace::TraceSink,
    types::{NodeId, Position},
};

pub struct Simulation {
    cfg: SimConfig,
    channel: Arc<WirelessChannel>,
    nodes: Vec<Node>,
    pending_inboxes: Vec<tokio::sync::mpsc::UnboundedReceiver<crate::messages::Frame>>,
    start: Instant,
}

impl Simulation {
    /// Validates `cfg`, then constructs `cfg.num_nodes` nodes at random
    /// positions and attaches each to a shared channel (§4.E build phase).
    pub fn build(cfg: SimConfig, trace_sink: Option<Arc<dyn TraceSink>>) -> Result<Self, ConfigError> {
        cfg.validate()?;

        let start = Instant::now();
        let rng = SharedRng::new(cfg.seed);
        let channel = WirelessChannel::new(&cfg, start, rng.clone());

        let mut nodes = Vec::with_capacity(cfg.num_nodes as usize);
        let mut pending_inboxes = Vec::with_capacity(cfg.num_nodes as usize);
        for i in 0..cfg.num_nodes {
            let nid = NodeId(i);
            let x = rng.gen_range_f64(0.0, cfg.world_size.0);
            let y = rng.gen_range_f64(0.0, cfg.world_size.1);
            let (node, inbox_rx) = Node::build(
                nid,
                Position::new(x, y),
                channel.clone(),
                &cfg,
                rng.clone(),
                trace_sink.clone(),
                start,
            );
            channel.attach(node.shared.clone());
            pending_inboxes.push(inbox_rx);
            nodes.push(node);
        }

        log::info!("built simulation: {} nodes, range {}m", cfg.num_nodes, cfg.comm_range);
        Ok(Self {
            cfg,
            channel,
            nodes,
            pending_inboxes,
            start,
        })
    }

    /// Exposes the nodes for test scenarios that want to poke at state
    /// mid-run (e.g. force a node's position to simulate a link break).
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn channel(&self) -> &Arc<WirelessChannel> {
        &self.channel
    }

    /// Spawns all six per-node tasks for every node, runs for
    /// `cfg.sim_time_s`, cancels everything, and aggregates the report
    /// (§4.E run phase, §5 Cancellation).
    pub async fn run(mut self) -> Report {
        let all_ids: Arc<[NodeId]> = self.nodes.iter().map(|n| n.nid).collect::<Vec<_>>().into();

        let mut handles = Vec::new();
        for (node, inbox_rx) in self.nodes.iter().zip(self.pending_inboxes.drain(..)) {
            handles.extend(node.spawn_tasks(all_ids.clone(), inbox_rx));
        }

        tasks::wait_s(self.cfg.sim_time_s).await;

        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }

        Report::collect(&self.cfg, &self.nodes, self.start)
    }
}

/// The shutdown report (§6): totals, delivery ratio, average latency and
/// average hops across every node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub num_nodes: u32,
    pub comm_range: f64,
    pub sim_time_s: f64,
    pub total_generated: u64,
    pub total_delivered: u64,
    pub delivery_ratio: f64,
    pub avg_latency_s: f64,
    pub avg_hops: f64,
}

impl Report {
    fn collect(cfg: &SimConfig, nodes: &[Node], _start: Instant) -> Self {
        let mut total_generated = 0u64;
        let mut total_delivered = 0u64;
        let mut all_latencies = Vec::new();
        let mut all_hops = Vec::new();

        for node in nodes {
            let st = node.shared.state.lock().expect("node state poisoned");
            total_generated += st.generated;
            total_delivered += st.delivered;
            all_latencies.extend(st.latencies.iter().copied());
            all_hops.extend(st.hops_used.iter().copied());
        }

        let delivery_ratio = if total_generated > 0 {
            total_delivered as f64 / total_generated as f64
        } else {
            0.0
        };
        let avg_latency_s = if !all_latencies.is_empty() {
            all_latencies.iter().sum::<f64>() / all_latencies.len() as f64
        } else {
            0.0
        };
        let avg_hops = if !all_hops.is_empty() {
            all_hops.iter().sum::<u32>() as f64 / all_hops.len() as f64
        } else {
            0.0
        };

        Self {
            num_nodes: cfg.num_nodes,
            comm_range: cfg.comm_range,
            sim_time_s: cfg.sim_time_s,
            total_generated,
            total_delivered,
            delivery_ratio,
            avg_latency_s,
            avg_hops,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Simulation Summary ===")?;
        writeln!(
            f,
            "Nodes: {}  Range: {} m  Duration: {} s",
            self.num_nodes, self.comm_range, self.sim_time_s
        )?;
        writeln!(
            f,
            "Total generated (Data): {}  Total delivered: {}",
            self.total_generated, self.total_delivered
        )?;
        writeln!(f, "Delivery ratio: {:.3}", self.delivery_ratio)?;
        writeln!(f, "Avg latency: {:.4} s", self.avg_latency_s)?;
        write!(f, "Avg hops: {:.3}", self.avg_hops)
    }
}
