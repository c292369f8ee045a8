// ── Learned hosts ──
//
// A host is keyed by MAC and carries one learn record per switch that
// currently reports it. The engine drops the host once the last record
// goes away.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── MacAddress ──────────────────────────────────────────────────────

/// MAC address, normalized to lowercase colon-separated format (aa:bb:cc:dd:ee:ff).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MacAddress(String);

impl MacAddress {
    /// Create a normalized MAC address from colon- or dash-separated input.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized = raw.as_ref().trim().to_lowercase().replace('-', ":");
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MacAddress {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

// ── Host records ────────────────────────────────────────────────────

/// Where one switch last saw the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LearnRecord {
    pub port: u32,
    pub learned_at: DateTime<Utc>,
}

/// Authorization outcome attached by the device-auth subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    pub access: Option<String>,
    pub segment: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LearnedHost {
    pub switches: BTreeMap<String, LearnRecord>,
    pub ips: BTreeSet<String>,
    pub vid: Option<u16>,
    pub auth: Option<AuthResult>,
}
