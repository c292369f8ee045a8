//! Network state tracking for a Faucet-controlled stacked fabric.
//!
//! This crate owns the domain model and the logic that folds controller
//! events into it:
//!
//! - **[`StateEngine`]**: thread-safe state graph. Event handlers mutate it
//!   under a single lock; queries copy owned views out of it and refuse to
//!   answer until the state has been restored from a metrics snapshot.
//!
//! - **[`Orchestrator`]**: async driver. Connects the
//!   [`EventIngestor`](forch_api::EventIngestor), restores from varz,
//!   dispatches events and runs the topology heartbeat.
//!
//! - **[`DpsConfig`]**: static Faucet configuration, resolved into per-port
//!   attributes (access, stack, egress, sequester).
//!
//! - **Domain model** ([`model`]): switches, ports, links, hosts, topology,
//!   egress members, VLAN counters and the reply shapes served to callers.

pub mod attributes;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod state;

// ── Primary re-exports ──────────────────────────────────────────────
pub use attributes::{DpsConfig, PortAttributes, PortType};
pub use config::{EngineConfig, OrchestratorConfig};
pub use error::CoreError;
pub use orchestrator::Orchestrator;
pub use state::{DevicePlacement, DeviceStateReporter, StateEngine};

pub use model::{
    DataplaneState, HostPathReply, HostsReply, MacAddress, PathHop, PathReply, Reply, State,
    Summary, SwitchesState,
};
