//! Fault injection against real child processes.
#![cfg(unix)]

use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use nix::sys::signal::Signal;

use bcast_harness::fault::{
    FaultConfig, FaultError, FaultInjectionEngine, FaultOperation, InjectionOutcome,
    OperationWeights, ProcessState,
};
use bcast_harness::participant::ParticipantId;

fn sleeper() -> Child {
    Command::new("sleep")
        .arg("30")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("sleep should spawn")
}

fn engine(n: u32, config: FaultConfig) -> FaultInjectionEngine {
    let processes = ParticipantId::all(n).map(|id| (id, sleeper()));
    FaultInjectionEngine::new(processes, config).unwrap()
}

fn fast(concurrency: usize, attempts: usize) -> FaultConfig {
    FaultConfig {
        concurrency,
        attempts,
        jitter_min_ms: 0,
        jitter_max_ms: 5,
        seed: Some(7),
        ..FaultConfig::default()
    }
}

#[test]
fn test_stop_then_continue_real_process() {
    let engine = engine(1, FaultConfig::default());
    let id = ParticipantId(1);

    assert_eq!(engine.inject(id, FaultOperation::Stop), InjectionOutcome::Applied);
    assert_eq!(engine.state_of(id), Some(ProcessState::Stopped));
    assert_eq!(
        engine.inject(id, FaultOperation::Stop),
        InjectionOutcome::InvalidTransition
    );

    assert_eq!(engine.continue_stopped(), 1);
    assert_eq!(engine.state_of(id), Some(ProcessState::Running));
    assert_eq!(engine.continue_stopped(), 0);

    engine.kill_all();
}

#[test]
fn test_terminations_capped_at_half() {
    let engine = engine(5, FaultConfig::default());
    assert_eq!(engine.termination_ceiling(), 2);

    let outcomes: Vec<_> = ParticipantId::all(5)
        .map(|id| engine.inject(id, FaultOperation::Terminate))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            InjectionOutcome::Applied,
            InjectionOutcome::Applied,
            InjectionOutcome::Saturated,
            InjectionOutcome::Saturated,
            InjectionOutcome::Saturated,
        ]
    );
    assert_eq!(engine.terminations(), 2);
    assert_eq!(engine.candidates(), vec![ParticipantId(3), ParticipantId(4), ParticipantId(5)]);

    // Terminated participants are excluded from further operations.
    assert_eq!(
        engine.inject(ParticipantId(1), FaultOperation::Continue),
        InjectionOutcome::Excluded
    );
    engine.kill_all();
}

#[test]
fn test_terminate_all_reaps_stopped_participants() {
    let engine = engine(3, FaultConfig::default());
    engine.inject(ParticipantId(2), FaultOperation::Stop);

    assert_eq!(engine.terminate_all(), 3);
    assert!(engine.remaining_alive().is_none());

    let statuses = engine.exit_statuses(Duration::from_secs(5));
    assert_eq!(statuses.len(), 3);
    for (id, status) in statuses {
        let status = status.unwrap_or_else(|| panic!("participant {} did not exit", id));
        assert_eq!(status.signal(), Some(Signal::SIGTERM as i32));
    }
}

#[test]
fn test_exit_statuses_times_out_for_running_participants() {
    let engine = engine(2, FaultConfig::default());
    engine.inject(ParticipantId(1), FaultOperation::Terminate);

    let statuses = engine.exit_statuses(Duration::from_millis(300));
    assert!(statuses[&ParticipantId(1)].is_some());
    assert!(statuses[&ParticipantId(2)].is_none());
    assert_eq!(engine.remaining_alive(), Some(vec![ParticipantId(2)]));
    engine.kill_all();
}

#[test]
fn test_concurrent_workers_against_live_processes() {
    let engine = engine(6, fast(3, 5));
    let summary = engine.run();

    assert_eq!(summary.workers.len(), 3);
    assert!(summary.terminations <= 3);
    assert_eq!(summary.termination_ceiling, 3);
    for worker in &summary.workers {
        assert!(worker.exhausted || worker.applied == 5);
    }

    engine.continue_stopped();
    let alive = engine.remaining_alive().unwrap_or_default();
    assert!(alive.len() >= 3);
    for id in alive {
        assert_eq!(engine.state_of(id), Some(ProcessState::Running));
    }
    engine.kill_all();
}

#[test]
fn test_disabled_engine_sends_nothing() {
    let engine = engine(2, fast(0, 10));
    let summary = engine.run();
    assert!(summary.workers.is_empty());
    assert_eq!(summary.applied(), 0);
    assert_eq!(engine.state_of(ParticipantId(1)), Some(ProcessState::Running));
    engine.kill_all();
}

#[test]
fn test_invalid_weights_rejected() {
    let config = FaultConfig {
        weights: OperationWeights {
            stop: 0.5,
            cont: 0.5,
            term: 0.5,
        },
        ..fast(1, 1)
    };
    let result = FaultInjectionEngine::new(Vec::<(ParticipantId, Child)>::new(), config);
    assert!(matches!(result, Err(FaultError::InvalidWeights(_))));
}
