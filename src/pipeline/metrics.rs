//! Per-phase execution counters.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

/// Counters for one phase. Every field only grows until an explicit reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseMetrics {
    /// Times `execute` was called.
    pub executions: u64,
    pub successes: u64,
    pub errors: u64,
    /// `should_run` false, or failed validation on an optional phase.
    pub skips: u64,
    #[serde(serialize_with = "serialize_millis")]
    pub total_duration: Duration,
}

impl PhaseMetrics {
    /// Mean execute duration, zero before the first execution.
    pub fn average_duration(&self) -> Duration {
        if self.executions == 0 {
            Duration::ZERO
        } else {
            let nanos = self.total_duration.as_nanos() / u128::from(self.executions);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// What happened to a phase in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Success,
    Error,
    Skipped,
}

/// Metrics for every registered phase, owned by one orchestrator instance
/// for the life of the process.
#[derive(Debug, Default)]
pub struct MetricsTable {
    phases: RwLock<BTreeMap<String, PhaseMetrics>>,
}

impl MetricsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a phase has a (zeroed) entry so snapshots list it.
    ///
    /// Sync so it can run during startup registration; if the lock is
    /// contended the entry is simply created on first record instead.
    pub fn register_sync(&self, phase: &str) {
        if let Ok(mut phases) = self.phases.try_write() {
            phases.entry(phase.to_string()).or_default();
        }
    }

    /// Record one outcome. `duration` is ignored for skips.
    pub async fn record(&self, phase: &str, outcome: PhaseOutcome, duration: Duration) {
        let mut phases = self.phases.write().await;
        let entry = phases.entry(phase.to_string()).or_default();
        match outcome {
            PhaseOutcome::Skipped => entry.skips += 1,
            PhaseOutcome::Success | PhaseOutcome::Error => {
                entry.executions += 1;
                entry.total_duration += duration;
                if outcome == PhaseOutcome::Success {
                    entry.successes += 1;
                } else {
                    entry.errors += 1;
                }
            }
        }
    }

    /// Count an error that happened without running `execute`
    /// (required-phase validation failure).
    pub async fn record_rejection(&self, phase: &str) {
        let mut phases = self.phases.write().await;
        phases.entry(phase.to_string()).or_default().errors += 1;
    }

    pub async fn get(&self, phase: &str) -> Option<PhaseMetrics> {
        self.phases.read().await.get(phase).cloned()
    }

    pub async fn snapshot(&self) -> BTreeMap<String, PhaseMetrics> {
        self.phases.read().await.clone()
    }

    /// Zero every counter, keeping the registered phase names.
    pub async fn reset(&self) {
        for metrics in self.phases.write().await.values_mut() {
            *metrics = PhaseMetrics::default();
        }
    }
}
