use clap::Parser;
use meshsim_core::{config::Range, SimConfig, Simulation};

/// Discrete-time simulation of a mobile wireless mesh network (drone swarm).
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(flatten)]
    verbosity: clap_verbosity_flag::Verbosity,

    /// Number of nodes in the swarm.
    #[arg(long, default_value_t = SimConfig::default().num_nodes)]
    num_nodes: u32,
    /// World width, in meters.
    #[arg(long, default_value_t = SimConfig::default().world_size.0)]
    world_w: f64,
    /// World height, in meters.
    #[arg(long, default_value_t = SimConfig::default().world_size.1)]
    world_h: f64,
    /// Radio communication range, in meters.
    #[arg(long, default_value_t = SimConfig::default().comm_range)]
    comm_range: f64,

    /// Hello beacon period, in seconds.
    #[arg(long, default_value_t = SimConfig::default().hello_period_s)]
    hello_period_s: f64,
    /// Distance-vector broadcast period, in seconds.
    #[arg(long, default_value_t = SimConfig::default().dv_period_s)]
    dv_period_s: f64,
    /// Mobility tick, in seconds.
    #[arg(long, default_value_t = SimConfig::default().mobility_step_s)]
    mobility_step_s: f64,

    /// Application handshake-initiation period, in seconds.
    #[arg(long, default_value_t = SimConfig::default().app_send_period_s)]
    app_send_period_s: f64,
    /// Handshake initiations attempted per period, per node.
    #[arg(long, default_value_t = SimConfig::default().app_pairs_per_period)]
    app_pairs_per_period: u32,

    /// Total simulated runtime, in seconds.
    #[arg(long, default_value_t = SimConfig::default().sim_time_s)]
    sim_time_s: f64,

    /// Minimum waypoint speed, in m/s.
    #[arg(long, default_value_t = SimConfig::default().speed_mps.lo)]
    speed_mps_lo: f64,
    /// Maximum waypoint speed, in m/s.
    #[arg(long, default_value_t = SimConfig::default().speed_mps.hi)]
    speed_mps_hi: f64,
    /// Minimum waypoint pause, in seconds.
    #[arg(long, default_value_t = SimConfig::default().waypoint_pause_s.lo)]
    waypoint_pause_s_lo: f64,
    /// Maximum waypoint pause, in seconds.
    #[arg(long, default_value_t = SimConfig::default().waypoint_pause_s.hi)]
    waypoint_pause_s_hi: f64,

    /// Minimum per-delivery jitter, in seconds.
    #[arg(long, default_value_t = SimConfig::default().channel_jitter_s.lo)]
    channel_jitter_s_lo: f64,
    /// Maximum per-delivery jitter, in seconds.
    #[arg(long, default_value_t = SimConfig::default().channel_jitter_s.hi)]
    channel_jitter_s_hi: f64,
    /// Fixed per-delivery base delay, in seconds.
    #[arg(long, default_value_t = SimConfig::default().channel_base_delay_s)]
    channel_base_delay_s: f64,
    /// Propagation speed, in meters/second.
    #[arg(long, default_value_t = SimConfig::default().prop_speed_mps)]
    prop_speed_mps: f64,
    /// Clamp applied to the propagation-delay component of delivery, in seconds.
    #[arg(long, default_value_t = SimConfig::default().max_per_hop_delay_s)]
    max_per_hop_delay_s: f64,

    /// Minimum MAC backoff, in seconds.
    #[arg(long, default_value_t = SimConfig::default().mac_min_backoff_s)]
    mac_min_backoff_s: f64,
    /// Maximum MAC backoff, in seconds.
    #[arg(long, default_value_t = SimConfig::default().mac_max_backoff_s)]
    mac_max_backoff_s: f64,
    /// MAC sensing slot duration, in seconds.
    #[arg(long, default_value_t = SimConfig::default().mac_slot_s)]
    mac_slot_s: f64,
    /// MAC reservation (on-air) duration, in seconds.
    #[arg(long, default_value_t = SimConfig::default().mac_tx_duration_s)]
    mac_tx_duration_s: f64,

    /// How long a neighbor may stay silent before being aged out, in seconds.
    #[arg(long, default_value_t = SimConfig::default().neighbor_timeout_s)]
    neighbor_timeout_s: f64,

    /// Data frame payload size, in bytes.
    #[arg(long, default_value_t = SimConfig::default().data_payload_bytes)]
    data_payload_bytes: usize,

    /// RNG seed, threaded through mobility, MAC backoff, jitter, payloads,
    /// session ids, and destination picks.
    #[arg(long, default_value_t = SimConfig::default().seed)]
    seed: u64,
}

impl From<Args> for SimConfig {
    fn from(a: Args) -> Self {
        Self {
            num_nodes: a.num_nodes,
            world_size: (a.world_w, a.world_h),
            comm_range: a.comm_range,
            hello_period_s: a.hello_period_s,
            dv_period_s: a.dv_period_s,
            mobility_step_s: a.mobility_step_s,
            app_send_period_s: a.app_send_period_s,
            app_pairs_per_period: a.app_pairs_per_period,
            sim_time_s: a.sim_time_s,
            speed_mps: Range::new(a.speed_mps_lo, a.speed_mps_hi),
            waypoint_pause_s: Range::new(a.waypoint_pause_s_lo, a.waypoint_pause_s_hi),
            channel_jitter_s: Range::new(a.channel_jitter_s_lo, a.channel_jitter_s_hi),
            channel_base_delay_s: a.channel_base_delay_s,
            prop_speed_mps: a.prop_speed_mps,
            max_per_hop_delay_s: a.max_per_hop_delay_s,
            mac_min_backoff_s: a.mac_min_backoff_s,
            mac_max_backoff_s: a.mac_max_backoff_s,
            mac_slot_s: a.mac_slot_s,
            mac_tx_duration_s: a.mac_tx_duration_s,
            neighbor_timeout_s: a.neighbor_timeout_s,
            data_payload_bytes: a.data_payload_bytes,
            seed: a.seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    meshsim_arch::start_logging_filter_level(args.verbosity.log_level_filter());

    let cfg: SimConfig = args.into();
    log::info!("starting simulation with seed {}", cfg.seed);

    let sim = Simulation::build(cfg, None)?;
    let report = sim.run().await;

    println!("{report}");
    Ok(())
}
