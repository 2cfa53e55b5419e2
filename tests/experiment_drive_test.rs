//! End-to-end run over real rendezvous sockets with mock participants.
#![cfg(unix)]

use std::io;
use std::net::SocketAddr;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bcast_harness::config::HarnessConfig;
use bcast_harness::experiment::{drive, FinishTime, HarnessError, RendezvousPair};
use bcast_harness::fault::{ControlSignal, FaultConfig, ProcessControl};
use bcast_harness::launch::ProtocolTuning;
use bcast_harness::participant::ParticipantId;
use bcast_harness::rendezvous::RendezvousClient;
use bcast_harness::validate::{FifoValidator, RunLayout};

type SignalLog = Arc<Mutex<Vec<(ParticipantId, ControlSignal)>>>;

/// Exits on TERM or KILL, records everything it receives.
struct MockParticipant {
    id: ParticipantId,
    exited: bool,
    log: SignalLog,
}

impl ProcessControl for MockParticipant {
    fn os_pid(&self) -> Option<u32> {
        None
    }

    fn send_signal(&mut self, signal: ControlSignal) -> io::Result<()> {
        if self.exited {
            return Err(io::Error::new(io::ErrorKind::NotFound, "already exited"));
        }
        self.log.lock().unwrap().push((self.id, signal));
        if matches!(signal, ControlSignal::Terminate | ControlSignal::Kill) {
            self.exited = true;
        }
        Ok(())
    }

    fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>> {
        Ok(self.exited.then(|| ExitStatus::from_raw(15)))
    }
}

fn mocks(n: u32, log: &SignalLog) -> Vec<(ParticipantId, MockParticipant)> {
    ParticipantId::all(n)
        .map(|id| {
            (
                id,
                MockParticipant {
                    id,
                    exited: false,
                    log: log.clone(),
                },
            )
        })
        .collect()
}

fn test_config(logs_dir: &Path, processes: u32) -> HarnessConfig {
    let any_port: SocketAddr = "127.0.0.1:0".parse().unwrap();
    HarnessConfig {
        processes,
        messages: 2,
        logs_dir: logs_dir.to_path_buf(),
        barrier_addr: any_port,
        signal_addr: any_port,
        completion_timeout_ms: 3000,
        drain_grace_ms: 0,
        settle_ms: 0,
        exit_wait_ms: 500,
        ..HarnessConfig::default()
    }
}

fn write_outputs(dir: &Path, processes: u32) {
    for id in ParticipantId::all(processes) {
        let mut log = String::from("b 1\nb 2\n");
        for sender in ParticipantId::all(processes) {
            log.push_str(&format!("d {} 1\nd {} 2\n", sender, sender));
        }
        std::fs::write(id.output_path(dir), log).unwrap();
        std::fs::write(
            id.stdout_path(dir),
            format!("booting\nTotal message delivered: {}\n", 2 * processes),
        )
        .unwrap();
    }
}

/// Spawn participants that pass the barrier and report completion.
fn spawn_clients(services: &RendezvousPair, ids: &[u32], finish: bool) -> Vec<tokio::task::JoinHandle<()>> {
    ids.iter()
        .map(|&id| {
            let client = RendezvousClient::new(
                ParticipantId(id),
                services.barrier_addr,
                services.signal_addr,
            );
            tokio::spawn(async move {
                if client.wait_on_barrier().await.is_err() {
                    return;
                }
                if finish {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let _ = client.finished().await;
                }
            })
        })
        .collect()
}

#[tokio::test]
async fn test_full_run_reports_finish_delivery_and_validation() {
    let dir = tempfile::tempdir().unwrap();
    write_outputs(dir.path(), 3);
    let config = test_config(dir.path(), 3);
    let validator = FifoValidator::new(RunLayout::new(3, 2, dir.path()).unwrap());

    let services = RendezvousPair::start(&config).await.unwrap();
    let clients = spawn_clients(&services, &[1, 2, 3], true);
    let log = SignalLog::default();

    let report = drive(
        &config,
        ProtocolTuning::default(),
        services,
        mocks(3, &log),
        Some(&validator),
    )
    .await
    .unwrap();
    for client in clients {
        client.await.unwrap();
    }

    assert_eq!(report.start_times.len(), 3);
    assert!(report.completion.is_complete());
    assert!(matches!(report.average_finish, FinishTime::Finished { average_ms } if average_ms >= 0.0));
    assert_eq!(report.average_delivered(), Some(6.0));
    assert!(report.exit_statuses.values().all(Option::is_some));
    assert!(report.validation.as_ref().unwrap().passed());
    assert!(report.succeeded());

    // Fault injection was disabled: only the final terminate went out.
    let sent = log.lock().unwrap().clone();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|(_, s)| *s == ControlSignal::Terminate));
}

#[tokio::test]
async fn test_missing_completion_is_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    write_outputs(dir.path(), 3);
    let config = HarnessConfig {
        completion_timeout_ms: 300,
        ..test_config(dir.path(), 3)
    };

    let services = RendezvousPair::start(&config).await.unwrap();
    let mut clients = spawn_clients(&services, &[1, 2], true);
    clients.extend(spawn_clients(&services, &[3], false));
    let log = SignalLog::default();

    let report = drive(&config, ProtocolTuning::default(), services, mocks(3, &log), None)
        .await
        .unwrap();

    assert!(report.completion.timed_out);
    assert_eq!(report.completion.missing(), vec![ParticipantId(3)]);
    assert_eq!(report.finish_times.len(), 2);
    assert_eq!(report.average_finish, FinishTime::DidNotFinish { bound_ms: 300 });
    assert!(report.validation.is_none());
    assert!(!report.succeeded());
}

#[tokio::test]
async fn test_barrier_timeout_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarnessConfig {
        barrier_timeout_ms: Some(200),
        ..test_config(dir.path(), 3)
    };

    let services = RendezvousPair::start(&config).await.unwrap();
    let _clients = spawn_clients(&services, &[1, 2], true);
    let log = SignalLog::default();

    let err = drive(&config, ProtocolTuning::default(), services, mocks(3, &log), None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::BarrierTimeout(d) if d == Duration::from_millis(200)));
    assert!(!err.is_configuration());
}

#[tokio::test]
async fn test_faults_leave_no_participant_stopped() {
    let dir = tempfile::tempdir().unwrap();
    write_outputs(dir.path(), 4);
    let config = HarnessConfig {
        fault: FaultConfig {
            concurrency: 2,
            attempts: 4,
            jitter_min_ms: 0,
            jitter_max_ms: 2,
            seed: Some(3),
            ..FaultConfig::default()
        },
        ..test_config(dir.path(), 4)
    };

    let services = RendezvousPair::start(&config).await.unwrap();
    let clients = spawn_clients(&services, &[1, 2, 3, 4], true);
    let log = SignalLog::default();

    let report = drive(&config, ProtocolTuning::default(), services, mocks(4, &log), None)
        .await
        .unwrap();
    for client in clients {
        client.await.unwrap();
    }

    assert_eq!(report.faults.workers.len(), 2);
    assert!(report.faults.terminations <= 2);
    assert_eq!(report.faults.termination_ceiling, 2);

    // Every STOP was followed by a CONT before the participant was terminated.
    let sent = log.lock().unwrap().clone();
    for id in ParticipantId::all(4) {
        let mut stopped = false;
        for (_, signal) in sent.iter().filter(|(p, _)| *p == id) {
            match signal {
                ControlSignal::Stop => stopped = true,
                ControlSignal::Continue => stopped = false,
                ControlSignal::Terminate | ControlSignal::Kill => {
                    assert!(!stopped, "participant {} terminated while stopped", id)
                }
            }
        }
        assert!(!stopped, "participant {} left stopped", id);
    }
}
