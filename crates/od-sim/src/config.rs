//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! speed = 10.0
//! poll_interval_ms = 50
//! policy = "freeze"
//!
//! [cutoff_fractions]
//! R1 = 0.357
//! ```
//!
//! Missing keys take their defaults.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{SimError, SimResult};

/// Which reaction to newly published plans the engine uses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Defer departures that can still wait and freeze the resource.
    #[default]
    Freeze,
    /// Dispatch idle resources immediately.
    NoWaiting,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Simulated time units per wall-clock second.
    pub speed: f64,

    /// Upper bound on how long the run loop sleeps before re-checking the queue.
    pub poll_interval_ms: u64,

    /// Wall seconds of slack allowed when rewinding the clock.
    pub wall_time_tolerance_secs: f64,

    /// Wall seconds added to the freeze horizon to absorb processing latency.
    pub time_margin_wall_secs: f64,

    /// Decision events closer than this (simulated units) are coalesced.
    pub decision_dedup_tolerance: f64,

    /// Clock rewinds larger than this (simulated units) are logged as warnings.
    pub adjustment_warn_threshold: f64,

    /// The run is aborted once simulated time exceeds this multiple of the
    /// depot window end.
    pub overrun_factor: f64,

    pub policy: PolicyKind,

    /// Instance group → fraction of the depot horizon after which no new
    /// requests are expected.
    pub cutoff_fractions: BTreeMap<String, f64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let cutoff_fractions = [
            ("C1", 0.380),
            ("C2", 0.509),
            ("R1", 0.357),
            ("R2", 0.419),
            ("RC1", 0.321),
            ("RC2", 0.400),
        ]
        .into_iter()
        .map(|(g, f)| (g.to_string(), f))
        .collect();

        Self {
            speed:                     1.0,
            poll_interval_ms:          50,
            wall_time_tolerance_secs:  1.0,
            time_margin_wall_secs:     0.1,
            decision_dedup_tolerance:  0.01,
            adjustment_warn_threshold: 2.0,
            overrun_factor:            1.5,
            policy:                    PolicyKind::Freeze,
            cutoff_fractions,
        }
    }
}

impl DispatchConfig {
    pub fn from_toml_str(s: &str) -> SimResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| SimError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> SimResult<String> {
        toml::to_string(self).map_err(|e| SimError::Config(e.to_string()))
    }

    pub fn validate(&self) -> SimResult<()> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(SimError::Config(format!("speed must be positive, got {}", self.speed)));
        }
        if self.poll_interval_ms == 0 {
            return Err(SimError::Config("poll_interval_ms must be at least 1".into()));
        }
        let non_negative = [
            ("wall_time_tolerance_secs", self.wall_time_tolerance_secs),
            ("time_margin_wall_secs", self.time_margin_wall_secs),
            ("decision_dedup_tolerance", self.decision_dedup_tolerance),
            ("adjustment_warn_threshold", self.adjustment_warn_threshold),
        ];
        for (name, v) in non_negative {
            if !(v >= 0.0) {
                return Err(SimError::Config(format!("{name} must be non-negative, got {v}")));
            }
        }
        if !(self.overrun_factor > 1.0) {
            return Err(SimError::Config(format!(
                "overrun_factor must exceed 1, got {}",
                self.overrun_factor
            )));
        }
        for (group, f) in &self.cutoff_fractions {
            if !(0.0..=1.0).contains(f) {
                return Err(SimError::Config(format!("cutoff fraction for {group} outside [0, 1]: {f}")));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cutoff_fraction(&self, group: &str) -> Option<f64> {
        self.cutoff_fractions.get(group).copied()
    }
}
