use chrono::{DateTime, Utc};

/// Packet counter for one VLAN, sampled from varz.
#[derive(Debug, Clone, PartialEq)]
pub struct VlanCounters {
    pub packet_count: f64,
    pub sampled_at: DateTime<Utc>,
    /// Packets per second since the previous sample.
    pub packet_rate: f64,
    pub over_threshold: bool,
}

impl VlanCounters {
    pub fn first(packet_count: f64, sampled_at: DateTime<Utc>) -> Self {
        Self {
            packet_count,
            sampled_at,
            packet_rate: 0.0,
            over_threshold: false,
        }
    }

    /// Fold in a new sample. A counter that went backwards (controller
    /// restart) resets the baseline.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn update(&mut self, packet_count: f64, now: DateTime<Utc>, threshold: Option<f64>) {
        let elapsed = (now - self.sampled_at).num_milliseconds() as f64 / 1000.0;
        self.packet_rate = if elapsed > 0.0 && packet_count >= self.packet_count {
            (packet_count - self.packet_count) / elapsed
        } else {
            0.0
        };
        self.packet_count = packet_count;
        self.sampled_at = now;
        self.over_threshold = threshold.is_some_and(|limit| self.packet_rate > limit);
    }
}
