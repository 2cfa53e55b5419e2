//! One experiment run: start the rendezvous services, launch participants,
//! wait for the barrier, inject faults, wait for completion, tear down,
//! and summarize what every participant did.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::{ConfigError, HarnessConfig};
use crate::fault::{FaultError, FaultInjectionEngine, FaultRunSummary, ProcessControl};
use crate::launch::{LaunchError, ParticipantLauncher, ProtocolTuning};
use crate::netem::NetemError;
use crate::participant::{EpochMillis, ParticipantId};
use crate::rendezvous::{
    CompletionReport, CompletionSignal, RendezvousBarrier, RendezvousConfig, RendezvousError,
};
use crate::validate::{
    validator_for, BroadcastValidation, DependencyMap, RunLayout, ValidationError,
    ValidationSummary,
};

/// Marker participants print before their final delivered count.
pub const DELIVERED_MARKER: &str = "Total message delivered:";

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fault(#[from] FaultError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Rendezvous(#[from] RendezvousError),

    #[error(transparent)]
    Netem(#[from] NetemError),

    #[error("Start barrier not released within {0:?}")]
    BarrierTimeout(Duration),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl HarnessError {
    /// Errors caught before any participant was started.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Config(_) | Self::Fault(_) => true,
            Self::Launch(e) => e.is_configuration(),
            Self::Validation(e) => matches!(
                e,
                ValidationError::NotADirectory(_)
                    | ValidationError::Dependencies(_)
                    | ValidationError::DependencyMismatch { .. }
                    | ValidationError::UnknownKind(_)
            ),
            Self::Rendezvous(RendezvousError::Bind { .. }) => true,
            _ => false,
        }
    }
}

/// Average time from barrier release to completion report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinishTime {
    Finished { average_ms: f64 },
    /// Not every participant reported within the completion bound.
    DidNotFinish { bound_ms: u64 },
}

impl FinishTime {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }

    /// The average, or the bound for runs that did not finish.
    pub fn or_bound(&self) -> f64 {
        match *self {
            Self::Finished { average_ms } => average_ms,
            Self::DidNotFinish { bound_ms } => bound_ms as f64,
        }
    }
}

impl fmt::Display for FinishTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished { average_ms } => write!(f, "{:.1} ms", average_ms),
            Self::DidNotFinish { bound_ms } => write!(f, "> {} ms", bound_ms),
        }
    }
}

/// Everything observed during one run.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub tuning: ProtocolTuning,
    pub start_times: BTreeMap<ParticipantId, EpochMillis>,
    pub completion: CompletionReport,
    /// Milliseconds from start to completion, for participants that reported.
    pub finish_times: BTreeMap<ParticipantId, i64>,
    pub average_finish: FinishTime,
    /// Parsed from each participant's stdout; `None` if no count was printed.
    pub delivered: BTreeMap<ParticipantId, Option<u64>>,
    /// Exit status text; `None` if the process had not exited in time.
    pub exit_statuses: BTreeMap<ParticipantId, Option<String>>,
    pub faults: FaultRunSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationSummary>,
}

impl ExperimentReport {
    pub fn average_delivered(&self) -> Option<f64> {
        let counts: Vec<u64> = self.delivered.values().flatten().copied().collect();
        if counts.is_empty() {
            return None;
        }
        Some(counts.iter().sum::<u64>() as f64 / counts.len() as f64)
    }

    /// Completed in time and, if validated, every log passed.
    pub fn succeeded(&self) -> bool {
        self.average_finish.is_finished()
            && self.validation.as_ref().map_or(true, ValidationSummary::passed)
    }
}

/// Count after the first [`DELIVERED_MARKER`] in a participant's stdout.
pub fn parse_delivered(stdout: &str) -> Option<u64> {
    stdout.lines().find_map(|line| {
        let (_, rest) = line.split_once(DELIVERED_MARKER)?;
        rest.trim().parse().ok()
    })
}

fn read_delivered(logs_dir: &Path, id: ParticipantId) -> Option<u64> {
    let path = id.stdout_path(logs_dir);
    match std::fs::read_to_string(&path) {
        Ok(contents) => parse_delivered(&contents),
        Err(e) => {
            tracing::debug!(participant = %id, path = %path.display(), error = %e, "no stdout capture");
            None
        }
    }
}

fn finish_durations(
    starts: &BTreeMap<ParticipantId, EpochMillis>,
    ends: &BTreeMap<ParticipantId, EpochMillis>,
) -> BTreeMap<ParticipantId, i64> {
    starts
        .iter()
        .filter_map(|(id, start)| ends.get(id).map(|end| (*id, end - start)))
        .collect()
}

/// The barrier and completion signal of one run, already listening.
pub struct RendezvousPair {
    pub barrier: RendezvousBarrier,
    pub signal: CompletionSignal,
    pub barrier_addr: SocketAddr,
    pub signal_addr: SocketAddr,
}

impl RendezvousPair {
    pub async fn start(config: &HarnessConfig) -> Result<Self, RendezvousError> {
        let mut barrier = RendezvousBarrier::new(RendezvousConfig::new(
            config.barrier_addr,
            config.processes,
        ));
        let mut signal = CompletionSignal::new(RendezvousConfig::new(
            config.signal_addr,
            config.processes,
        ));
        let barrier_addr = barrier.listen().await?;
        let signal_addr = signal.listen().await?;
        Ok(Self {
            barrier,
            signal,
            barrier_addr,
            signal_addr,
        })
    }

    pub fn shutdown(&self) {
        self.barrier.shutdown();
        self.signal.shutdown();
    }
}

/// Build the configured log checker. Fails on configuration problems.
pub fn build_validator(config: &HarnessConfig) -> Result<Box<dyn BroadcastValidation>, HarnessError> {
    let layout = RunLayout::new(config.processes, config.messages, &config.logs_dir)?
        .with_base_port(config.base_port);
    let dependencies = config
        .dependencies
        .as_deref()
        .map(DependencyMap::read)
        .transpose()?;
    Ok(validator_for(config.broadcast, layout, dependencies)?)
}

/// Run one experiment with `tuning` against the configured runscript.
pub async fn run(config: &HarnessConfig, tuning: ProtocolTuning) -> Result<ExperimentReport, HarnessError> {
    config.validate()?;
    let runscript = config.require_runscript()?;
    let validator = build_validator(config)?;
    let generated = validator.generate_config()?;

    let services = RendezvousPair::start(config).await?;
    let launcher = ParticipantLauncher::new(
        runscript,
        &config.logs_dir,
        services.barrier_addr,
        services.signal_addr,
        tuning,
    )?;
    let processes = launcher.spawn_all(
        config.processes,
        generated.hosts_path(),
        generated.config_path(),
    )?;

    let checker = config.validate.then_some(validator.as_ref());
    drive(config, tuning, services, processes, checker).await
}

/// Drive already-started participants through one run.
pub async fn drive<C>(
    config: &HarnessConfig,
    tuning: ProtocolTuning,
    services: RendezvousPair,
    processes: Vec<(ParticipantId, C)>,
    validator: Option<&dyn BroadcastValidation>,
) -> Result<ExperimentReport, HarnessError>
where
    C: ProcessControl + 'static,
{
    let engine = Arc::new(FaultInjectionEngine::new(processes, config.fault.clone())?);

    let start_times = match config.barrier_timeout() {
        Some(bound) => tokio::time::timeout(bound, services.barrier.wait())
            .await
            .map_err(|_| HarnessError::BarrierTimeout(bound))?,
        None => services.barrier.wait().await,
    };
    tracing::info!(participants = start_times.len(), "All processes have been initialized.");

    let faults = if config.fault.is_enabled() {
        let worker = Arc::clone(&engine);
        let summary = tokio::task::spawn_blocking(move || worker.run())
            .await
            .map_err(|e| HarnessError::Task(e.to_string()))?;
        let resumed = engine.continue_stopped();
        tracing::info!(resumed, "resumed stopped participants");
        summary
    } else {
        FaultRunSummary::default()
    };

    tracing::info!("Waiting until all running processes have finished broadcasting.");
    let completion = services.signal.wait_timeout(config.completion_timeout()).await;
    let finish_times = finish_durations(&start_times, &completion.end_times);
    for (id, ms) in &finish_times {
        tracing::info!(participant = %id, messages = config.messages, finish_ms = ms, "participant finished broadcasting");
    }

    let average_finish = if completion.is_complete() && !finish_times.is_empty() {
        let total: i64 = finish_times.values().sum();
        FinishTime::Finished {
            average_ms: total as f64 / finish_times.len() as f64,
        }
    } else {
        FinishTime::DidNotFinish {
            bound_ms: config.completion_timeout_ms,
        }
    };
    tracing::info!(average = %average_finish, "average time to finish broadcast");

    tokio::time::sleep(config.drain_grace()).await;
    engine.terminate_all();
    tokio::time::sleep(config.settle()).await;

    let delivered: BTreeMap<_, _> = ParticipantId::all(config.processes)
        .map(|id| (id, read_delivered(&config.logs_dir, id)))
        .collect();
    for (id, count) in &delivered {
        if let Some(count) = count {
            tracing::info!(participant = %id, delivered = count, "participant delivered messages");
        }
    }

    let reaper = Arc::clone(&engine);
    let exit_wait = config.exit_wait();
    let statuses = tokio::task::spawn_blocking(move || reaper.exit_statuses(exit_wait))
        .await
        .map_err(|e| HarnessError::Task(e.to_string()))?;
    engine.kill_all();
    let exit_statuses: BTreeMap<_, _> = statuses
        .into_iter()
        .map(|(id, status)| {
            let status = status.map(|s| s.to_string());
            tracing::info!(participant = %id, status = status.as_deref().unwrap_or("still running"), "participant exited");
            (id, status)
        })
        .collect();

    let validation = validator.map(|v| v.check_all(true)).transpose()?;
    services.shutdown();

    let report = ExperimentReport {
        tuning,
        start_times,
        completion,
        finish_times,
        average_finish,
        delivered,
        exit_statuses,
        faults,
        validation,
    };
    if let Some(avg) = report.average_delivered() {
        tracing::info!(average = avg, "average number of delivered messages");
    }
    Ok(report)
}
