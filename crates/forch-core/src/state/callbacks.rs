// ── Downstream callbacks ──
//
// The device-authorization side registers these to follow host placement
// and raw port activity. Handlers only queue notifications; the engine
// delivers them once the state lock is released.

use std::sync::Arc;

use serde::Serialize;

use crate::model::MacAddress;

/// Where a host sits, or sat, on the access layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DevicePlacement {
    pub switch: String,
    pub port: u32,
    pub connected: bool,
}

/// Invoked on access-port learn (connected) and expiry (disconnected).
/// The MAC is `None` when an access port with no learned hosts goes down.
pub type PlacementCallback = Arc<dyn Fn(Option<&MacAddress>, &DevicePlacement) + Send + Sync>;

/// Raw port activity feed for authorization logic.
pub trait DeviceStateReporter: Send + Sync {
    fn port_state(&self, switch: &str, port: u32, up: bool);

    fn port_learn(&self, switch: &str, port: u32, mac: &MacAddress);

    /// A host showed up on a different VLAN than before.
    fn port_assign(&self, mac: &MacAddress, vid: u16);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Notification {
    Placement {
        mac: Option<MacAddress>,
        placement: DevicePlacement,
    },
    PortState {
        switch: String,
        port: u32,
        up: bool,
    },
    PortLearn {
        switch: String,
        port: u32,
        mac: MacAddress,
    },
    PortAssign {
        mac: MacAddress,
        vid: u16,
    },
}

#[derive(Default, Clone)]
pub(crate) struct Callbacks {
    pub placement: Option<PlacementCallback>,
    pub reporter: Option<Arc<dyn DeviceStateReporter>>,
}

impl Callbacks {
    pub fn deliver(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            match notification {
                Notification::Placement { mac, placement } => {
                    if let Some(callback) = &self.placement {
                        callback(mac.as_ref(), &placement);
                    }
                }
                Notification::PortState { switch, port, up } => {
                    if let Some(reporter) = &self.reporter {
                        reporter.port_state(&switch, port, up);
                    }
                }
                Notification::PortLearn { switch, port, mac } => {
                    if let Some(reporter) = &self.reporter {
                        reporter.port_learn(&switch, port, &mac);
                    }
                }
                Notification::PortAssign { mac, vid } => {
                    if let Some(reporter) = &self.reporter {
                        reporter.port_assign(&mac, vid);
                    }
                }
            }
        }
    }
}
