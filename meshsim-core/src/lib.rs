pub mod channel;
pub mod config;
pub mod messages;
pub mod node;
pub mod routing;
pub mod simulation;
pub mod trace;
pub mod types;

pub use config::{ConfigError, Range, SimConfig};
pub use simulation::{Report, Simulation};
pub use trace::{RecordingTraceSink, TraceSink};
pub use types::{DataId, NodeId, Position, SessionId};
