// ── Stack links ──
//
// A link joins two `switch:port` endpoints. Keys are canonical: the
// smaller endpoint always comes first, so `sw2:2-sw1:1` and `sw1:1-sw2:2`
// name the same link.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use strum::{Display, EnumString};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    pub switch: String,
    pub port: u32,
}

impl Endpoint {
    pub fn new(switch: impl Into<String>, port: u32) -> Self {
        Self {
            switch: switch.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.switch, self.port)
    }
}

/// Unordered endpoint pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkKey {
    a: Endpoint,
    b: Endpoint,
}

impl LinkKey {
    pub fn new(x: Endpoint, y: Endpoint) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    pub fn a(&self) -> &Endpoint {
        &self.a
    }

    pub fn b(&self) -> &Endpoint {
        &self.b
    }

    pub fn endpoints(&self) -> [&Endpoint; 2] {
        [&self.a, &self.b]
    }

    /// The far side, if `switch:port` is one end of this link.
    pub fn peer_of(&self, switch: &str, port: u32) -> Option<&Endpoint> {
        if self.a.switch == switch && self.a.port == port {
            Some(&self.b)
        } else if self.b.switch == switch && self.b.port == port {
            Some(&self.a)
        } else {
            None
        }
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.a, self.b)
    }
}

impl Serialize for LinkKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Derived state of a stack link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkState {
    Down,
    Up,
    Active,
    Broken,
}

impl LinkState {
    /// Carrying or able to carry traffic.
    pub fn is_healthy(self) -> bool {
        matches!(self, Self::Up | Self::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub key: LinkKey,
    pub state: LinkState,
    pub change_count: u64,
    pub last_change: Option<DateTime<Utc>>,
}

impl Link {
    pub fn new(key: LinkKey) -> Self {
        Self {
            key,
            state: LinkState::Down,
            change_count: 0,
            last_change: None,
        }
    }
}
