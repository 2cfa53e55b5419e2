//! Grid search over protocol tuning values.
//!
//! Every grid point is run `repetitions` times. A point scores the mean of
//! its runs' average delivered counts and the mean of their average finish
//! times, with runs that did not finish counted at the completion bound.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, HarnessConfig};
use crate::experiment::{self, ExperimentReport, HarnessError};
use crate::launch::ProtocolTuning;
use crate::netem::NetemGuard;

/// Values to try for each tuning parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepGrid {
    pub repetitions: usize,
    pub send_delay_ms: Vec<u64>,
    pub deliver_delay_ms: Vec<u64>,
    pub ack_timeout_ms: Vec<u64>,
    pub retries: Vec<u64>,
    pub window: Vec<u64>,
    pub window_delay_ms: Vec<u64>,
}

impl Default for SweepGrid {
    fn default() -> Self {
        Self {
            repetitions: 3,
            send_delay_ms: vec![25, 50],
            deliver_delay_ms: vec![150, 200, 250, 300, 350],
            ack_timeout_ms: vec![10, 15],
            retries: vec![2],
            window: vec![1400, 1500, 1600],
            window_delay_ms: vec![50, 100, 150],
        }
    }
}

impl SweepGrid {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repetitions == 0 {
            return Err(ConfigError::Invalid("sweep.repetitions must be at least 1".into()));
        }
        let axes = [
            ("send_delay_ms", &self.send_delay_ms),
            ("deliver_delay_ms", &self.deliver_delay_ms),
            ("ack_timeout_ms", &self.ack_timeout_ms),
            ("retries", &self.retries),
            ("window", &self.window),
            ("window_delay_ms", &self.window_delay_ms),
        ];
        for (name, values) in axes {
            if values.is_empty() {
                return Err(ConfigError::Invalid(format!("sweep.{} has no values", name)));
            }
        }
        Ok(())
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.send_delay_ms.len()
            * self.deliver_delay_ms.len()
            * self.ack_timeout_ms.len()
            * self.retries.len()
            * self.window.len()
            * self.window_delay_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cartesian product, send delay outermost and window delay innermost.
    pub fn points(&self) -> Vec<ProtocolTuning> {
        let mut points = Vec::with_capacity(self.len());
        for &send_delay_ms in &self.send_delay_ms {
            for &deliver_delay_ms in &self.deliver_delay_ms {
                for &ack_timeout_ms in &self.ack_timeout_ms {
                    for &retries in &self.retries {
                        for &window in &self.window {
                            for &window_delay_ms in &self.window_delay_ms {
                                points.push(ProtocolTuning {
                                    send_delay_ms,
                                    deliver_delay_ms,
                                    ack_timeout_ms,
                                    retries,
                                    window,
                                    window_delay_ms,
                                });
                            }
                        }
                    }
                }
            }
        }
        points
    }
}

/// Scores of one grid point over its repetitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointResult {
    pub tuning: ProtocolTuning,
    pub runs: usize,
    /// `None` when no run reported any delivered count.
    pub mean_delivered: Option<f64>,
    pub mean_finish_ms: f64,
}

/// Collects per-run scores for one grid point.
#[derive(Debug, Clone)]
pub struct PointAccumulator {
    tuning: ProtocolTuning,
    delivered: Vec<f64>,
    finishes: Vec<f64>,
}

impl PointAccumulator {
    pub fn new(tuning: ProtocolTuning) -> Self {
        Self {
            tuning,
            delivered: Vec::new(),
            finishes: Vec::new(),
        }
    }

    pub fn record(&mut self, average_delivered: Option<f64>, finish_ms: f64) {
        if let Some(delivered) = average_delivered {
            self.delivered.push(delivered);
        }
        self.finishes.push(finish_ms);
    }

    pub fn record_report(&mut self, report: &ExperimentReport) {
        self.record(report.average_delivered(), report.average_finish.or_bound());
    }

    pub fn finish(self) -> PointResult {
        PointResult {
            tuning: self.tuning,
            runs: self.finishes.len(),
            mean_delivered: mean(&self.delivered),
            mean_finish_ms: mean(&self.finishes).unwrap_or(f64::INFINITY),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// A tuning and the score that made it best.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Best {
    pub tuning: ProtocolTuning,
    pub value: f64,
}

/// Best point by delivered count (highest) and by finish time (lowest).
/// Ties keep the earlier point.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BestTracker {
    pub by_delivered: Option<Best>,
    pub by_finish: Option<Best>,
}

impl BestTracker {
    pub fn observe(&mut self, point: &PointResult) {
        if let Some(delivered) = point.mean_delivered {
            if self.by_delivered.as_ref().map_or(true, |b| delivered > b.value) {
                tracing::info!(tuning = %point.tuning, delivered, "new best delivered count");
                self.by_delivered = Some(Best {
                    tuning: point.tuning,
                    value: delivered,
                });
            }
        }
        let finish = point.mean_finish_ms;
        if finish.is_finite() && self.by_finish.as_ref().map_or(true, |b| finish < b.value) {
            tracing::info!(tuning = %point.tuning, finish_ms = finish, "new best finish time");
            self.by_finish = Some(Best {
                tuning: point.tuning,
                value: finish,
            });
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub points: Vec<PointResult>,
    pub best: BestTracker,
}

/// Run the whole grid with the impairment profile, if any, held for the
/// duration of the sweep.
pub async fn run_sweep(config: &HarnessConfig) -> Result<SweepReport, HarnessError> {
    config.validate()?;
    config.sweep.validate()?;
    config.require_runscript()?;

    let _netem = config.netem.clone().map(NetemGuard::apply).transpose()?;
    let grid = config.sweep.points();
    tracing::info!(points = grid.len(), repetitions = config.sweep.repetitions, "sweep started");

    let mut report = SweepReport::default();
    for (index, tuning) in grid.into_iter().enumerate() {
        tracing::info!(point = index + 1, %tuning, "sweep point");
        let mut acc = PointAccumulator::new(tuning);
        for repetition in 0..config.sweep.repetitions {
            let run = experiment::run(config, tuning).await?;
            tracing::debug!(point = index + 1, repetition, finish = %run.average_finish, "run finished");
            acc.record_report(&run);
        }
        let point = acc.finish();
        report.best.observe(&point);
        report.points.push(point);
    }

    if let Some(best) = &report.best.by_delivered {
        tracing::info!(tuning = %best.tuning, delivered = best.value, "best delivered count");
    }
    if let Some(best) = &report.best.by_finish {
        tracing::info!(tuning = %best.tuning, finish_ms = best.value, "best finish time");
    }
    Ok(report)
}
