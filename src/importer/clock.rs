//! Cross-clock alignment markers.

/// Pairs a local trace timestamp with a reference timestamp from another
/// clock domain. Only the first record collected during a parse is
/// authoritative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSyncRecord {
    pub local_ts_us: f64,
    pub reference_ts_us: f64,
}

impl ClockSyncRecord {
    /// The additive offset this marker demands, or `None` for the no-shift
    /// markers: a reference timestamp of zero (used when user and kernel
    /// event clocks are identical), or reference and local already equal.
    pub fn time_shift(&self) -> Option<f64> {
        if self.reference_ts_us == 0.0 || self.reference_ts_us == self.local_ts_us {
            return None;
        }
        Some(self.reference_ts_us - self.local_ts_us)
    }
}
