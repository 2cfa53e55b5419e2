//! Randomized fault injection across a set of live participants.
//!
//! Each participant carries its own lock over `(control, state)`. Workers
//! share the termination counter and the candidate list, and never hold
//! the candidate lock while waiting on a participant lock.

use std::collections::BTreeMap;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::control::ProcessControl;
use super::counter::SaturatingCounter;
use super::operations::{OperationPicker, OperationWeights};
use super::state::{ControlSignal, FaultOperation, ProcessState};
use super::FaultError;
use crate::participant::ParticipantId;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Fault injection settings. Disabled when `concurrency` or `attempts` is 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Successful injections each worker performs.
    pub attempts: usize,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    /// Consecutive discarded attempts after which a worker gives up.
    pub max_idle_attempts: usize,
    /// Fixed seed for reproducible schedules. Worker `i` uses `seed + i`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub weights: OperationWeights,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            attempts: 0,
            jitter_min_ms: 50,
            jitter_max_ms: 500,
            max_idle_attempts: 10_000,
            seed: None,
            weights: OperationWeights::new(0.48, 0.48, 0.04),
        }
    }
}

impl FaultConfig {
    pub fn is_enabled(&self) -> bool {
        self.concurrency > 0 && self.attempts > 0
    }

    pub fn validate(&self) -> Result<(), FaultError> {
        if self.jitter_min_ms > self.jitter_max_ms {
            return Err(FaultError::InvalidJitter {
                min_ms: self.jitter_min_ms,
                max_ms: self.jitter_max_ms,
            });
        }
        if self.is_enabled() {
            self.weights.validate()?;
        }
        Ok(())
    }
}

/// Result of one injection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionOutcome {
    /// Signal delivered and state updated.
    Applied,
    /// The operation is not legal from the participant's current state.
    InvalidTransition,
    /// TERMINATE refused because the termination ceiling is reached.
    Saturated,
    /// Participant is unknown or already excluded from selection.
    Excluded,
    /// The OS refused the signal. A refused TERMINATE still retires the participant.
    SignalFailed,
}

/// Per-worker tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub worker: usize,
    pub applied: usize,
    pub discarded: usize,
    pub signal_failures: usize,
    /// True when the worker stopped before reaching its budget.
    pub exhausted: bool,
}

/// Aggregate of one [`FaultInjectionEngine::run`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct FaultRunSummary {
    pub workers: Vec<WorkerReport>,
    pub terminations: usize,
    pub termination_ceiling: usize,
}

impl FaultRunSummary {
    pub fn applied(&self) -> usize {
        self.workers.iter().map(|w| w.applied).sum()
    }
}

struct Slot {
    control: Box<dyn ProcessControl>,
    state: ProcessState,
}

struct ParticipantHandle {
    slot: Mutex<Slot>,
}

/// Drives STOP / CONTINUE / TERMINATE against live participants.
pub struct FaultInjectionEngine {
    config: FaultConfig,
    participants: BTreeMap<ParticipantId, ParticipantHandle>,
    candidates: Mutex<Vec<ParticipantId>>,
    terminations: SaturatingCounter,
    picker: Option<OperationPicker>,
}

impl FaultInjectionEngine {
    /// Take ownership of the participants. Every one starts `Running`.
    pub fn new<I, C>(processes: I, config: FaultConfig) -> Result<Self, FaultError>
    where
        I: IntoIterator<Item = (ParticipantId, C)>,
        C: ProcessControl + 'static,
    {
        config.validate()?;
        let mut participants = BTreeMap::new();
        for (id, control) in processes {
            let handle = ParticipantHandle {
                slot: Mutex::new(Slot {
                    control: Box::new(control),
                    state: ProcessState::Running,
                }),
            };
            if participants.insert(id, handle).is_some() {
                return Err(FaultError::DuplicateParticipant(id));
            }
        }

        let picker = if config.is_enabled() {
            Some(config.weights.picker()?)
        } else {
            None
        };
        let candidates = participants.keys().copied().collect();
        let terminations = SaturatingCounter::for_participants(participants.len());

        Ok(Self {
            config,
            participants,
            candidates: Mutex::new(candidates),
            terminations,
            picker,
        })
    }

    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn state_of(&self, id: ParticipantId) -> Option<ProcessState> {
        self.participants.get(&id).map(|h| h.slot.lock().state)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.value()
    }

    pub fn termination_ceiling(&self) -> usize {
        self.terminations.ceiling()
    }

    /// Ids still eligible for random selection.
    pub fn candidates(&self) -> Vec<ParticipantId> {
        self.candidates.lock().clone()
    }

    /// Run the configured workers to completion.
    ///
    /// One worker runs on the calling thread; more fan out on scoped threads
    /// and are all joined before returning.
    pub fn run(&self) -> FaultRunSummary {
        let Some(picker) = self.picker.as_ref().filter(|_| self.config.is_enabled()) else {
            tracing::debug!("fault injection disabled");
            return self.summary(Vec::new());
        };

        tracing::info!(
            workers = self.config.concurrency,
            attempts = self.config.attempts,
            ceiling = self.termination_ceiling(),
            "fault injection started"
        );

        let reports = if self.config.concurrency == 1 {
            vec![self.worker(0, picker)]
        } else {
            std::thread::scope(|scope| {
                let handles: Vec<_> = (0..self.config.concurrency)
                    .map(|index| scope.spawn(move || self.worker(index, picker)))
                    .collect();
                handles
                    .into_iter()
                    .enumerate()
                    .map(|(index, handle)| {
                        handle.join().unwrap_or_else(|_| {
                            tracing::error!(worker = index, "fault worker panicked");
                            WorkerReport {
                                worker: index,
                                exhausted: true,
                                ..WorkerReport::default()
                            }
                        })
                    })
                    .collect()
            })
        };

        let summary = self.summary(reports);
        tracing::info!(
            applied = summary.applied(),
            terminations = summary.terminations,
            "fault injection finished"
        );
        summary
    }

    fn summary(&self, workers: Vec<WorkerReport>) -> FaultRunSummary {
        FaultRunSummary {
            workers,
            terminations: self.terminations(),
            termination_ceiling: self.termination_ceiling(),
        }
    }

    fn worker_rng(&self, index: usize) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => StdRng::from_entropy(),
        }
    }

    fn jitter<R: Rng>(&self, rng: &mut R) -> Duration {
        let (min, max) = (self.config.jitter_min_ms, self.config.jitter_max_ms);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng.gen_range(min..=max))
    }

    fn worker(&self, index: usize, picker: &OperationPicker) -> WorkerReport {
        let mut rng = self.worker_rng(index);
        let mut report = WorkerReport {
            worker: index,
            ..WorkerReport::default()
        };
        let mut idle = 0usize;

        while report.applied < self.config.attempts {
            let Some(id) = self.candidates.lock().choose(&mut rng).copied() else {
                tracing::info!(worker = index, "no participants left to inject faults into");
                report.exhausted = true;
                break;
            };
            let operation = picker.pick(&mut rng);
            let jitter = self.jitter(&mut rng);

            match self.inject_after(id, operation, jitter) {
                InjectionOutcome::Applied => {
                    report.applied += 1;
                    idle = 0;
                }
                InjectionOutcome::SignalFailed => {
                    report.signal_failures += 1;
                    idle += 1;
                }
                InjectionOutcome::InvalidTransition
                | InjectionOutcome::Saturated
                | InjectionOutcome::Excluded => {
                    report.discarded += 1;
                    idle += 1;
                }
            }

            if idle >= self.config.max_idle_attempts {
                tracing::warn!(
                    worker = index,
                    applied = report.applied,
                    idle,
                    "fault worker made no progress, giving up"
                );
                report.exhausted = true;
                break;
            }
        }
        report
    }

    /// Attempt one operation on one participant without jitter.
    pub fn inject(&self, id: ParticipantId, operation: FaultOperation) -> InjectionOutcome {
        self.inject_after(id, operation, Duration::ZERO)
    }

    fn inject_after(
        &self,
        id: ParticipantId,
        operation: FaultOperation,
        jitter: Duration,
    ) -> InjectionOutcome {
        let Some(handle) = self.participants.get(&id) else {
            return InjectionOutcome::Excluded;
        };
        let mut slot = handle.slot.lock();
        let desired = operation.target_state();

        if slot.state.is_terminated() {
            return InjectionOutcome::Excluded;
        }
        if !slot.state.valid_transition(desired) {
            return InjectionOutcome::InvalidTransition;
        }
        if operation == FaultOperation::Terminate {
            if !self.terminations.reserve() {
                return InjectionOutcome::Saturated;
            }
            self.exclude(id);
        }

        if !jitter.is_zero() {
            std::thread::sleep(jitter);
        }

        let signal = operation.signal();
        match slot.control.send_signal(signal) {
            Ok(()) => {
                tracing::info!(participant = %id, %signal, "signal sent");
                slot.state = desired;
                InjectionOutcome::Applied
            }
            Err(e) => {
                tracing::warn!(participant = %id, %signal, error = %e, "signal delivery failed");
                if operation == FaultOperation::Terminate {
                    slot.state = ProcessState::Terminated;
                }
                InjectionOutcome::SignalFailed
            }
        }
    }

    fn exclude(&self, id: ParticipantId) {
        self.candidates.lock().retain(|c| *c != id);
    }

    /// Resume every stopped participant. Returns how many were resumed.
    pub fn continue_stopped(&self) -> usize {
        let mut resumed = 0;
        for (id, handle) in &self.participants {
            let mut slot = handle.slot.lock();
            if slot.state != ProcessState::Stopped {
                continue;
            }
            match slot.control.send_signal(ControlSignal::Continue) {
                Ok(()) => {
                    slot.state = ProcessState::Running;
                    resumed += 1;
                }
                Err(e) => {
                    tracing::warn!(participant = %id, error = %e, "failed to resume participant");
                }
            }
        }
        resumed
    }

    /// Terminate every participant still alive, resuming stopped ones first.
    ///
    /// Bypasses the termination ceiling. Delivery failures are logged and the
    /// participant is still marked terminated. Returns how many were signalled.
    pub fn terminate_all(&self) -> usize {
        let mut signalled = 0;
        for (id, handle) in &self.participants {
            let mut slot = handle.slot.lock();
            if slot.state.is_terminated() {
                continue;
            }
            if slot.state == ProcessState::Stopped {
                if let Err(e) = slot.control.send_signal(ControlSignal::Continue) {
                    tracing::warn!(participant = %id, error = %e, "failed to resume before terminate");
                }
            }
            match slot.control.send_signal(ControlSignal::Terminate) {
                Ok(()) => signalled += 1,
                Err(e) => {
                    tracing::warn!(participant = %id, error = %e, "failed to terminate participant");
                }
            }
            slot.state = ProcessState::Terminated;
        }
        self.candidates.lock().clear();
        tracing::debug!(signalled, "terminated remaining participants");
        signalled
    }

    /// Send SIGKILL to every participant regardless of tracked state.
    pub fn kill_all(&self) {
        for (id, handle) in &self.participants {
            let mut slot = handle.slot.lock();
            if let Ok(Some(_)) = slot.control.try_exit_status() {
                slot.state = ProcessState::Terminated;
                continue;
            }
            if let Err(e) = slot.control.send_signal(ControlSignal::Kill) {
                tracing::debug!(participant = %id, error = %e, "kill failed");
            }
            slot.state = ProcessState::Terminated;
        }
        self.candidates.lock().clear();
    }

    /// Participants not yet terminated, or `None` when all are gone.
    pub fn remaining_alive(&self) -> Option<Vec<ParticipantId>> {
        let alive: Vec<_> = self
            .participants
            .iter()
            .filter(|(_, h)| !h.slot.lock().state.is_terminated())
            .map(|(id, _)| *id)
            .collect();
        (!alive.is_empty()).then_some(alive)
    }

    /// Poll each participant for an exit status until all have exited or
    /// `timeout` elapses. Participants still running map to `None`.
    pub fn exit_statuses(&self, timeout: Duration) -> BTreeMap<ParticipantId, Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        let mut statuses: BTreeMap<ParticipantId, Option<ExitStatus>> =
            self.participants.keys().map(|id| (*id, None)).collect();

        loop {
            for (id, handle) in &self.participants {
                if statuses.get(id).is_some_and(Option::is_some) {
                    continue;
                }
                let mut slot = handle.slot.lock();
                match slot.control.try_exit_status() {
                    Ok(Some(status)) => {
                        statuses.insert(*id, Some(status));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(participant = %id, error = %e, "exit status unavailable");
                    }
                }
            }
            if statuses.values().all(Option::is_some) || Instant::now() >= deadline {
                return statuses;
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}
