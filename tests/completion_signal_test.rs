//! Tests for the completion signal.

use std::net::SocketAddr;
use std::time::Duration;

use bcast_harness::participant::ParticipantId;
use bcast_harness::rendezvous::{
    CompletionSignal, RejectReason, RendezvousClient, RendezvousConfig, RendezvousError,
};

async fn signal(expected: u32) -> (CompletionSignal, SocketAddr) {
    let localhost: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let mut signal = CompletionSignal::new(RendezvousConfig::new(localhost, expected));
    let addr = signal.listen().await.unwrap();
    (signal, addr)
}

fn client(id: u32, addr: SocketAddr) -> RendezvousClient {
    RendezvousClient::new(ParticipantId(id), addr, addr)
}

#[tokio::test]
async fn test_reports_are_acknowledged_immediately() {
    let (signal, addr) = signal(3).await;

    // Returns without waiting for the other participants.
    tokio::time::timeout(Duration::from_secs(2), client(2, addr).finished_at(500))
        .await
        .expect("ack should not wait for others")
        .unwrap();
    assert_eq!(signal.end_times().get(&ParticipantId(2)), Some(&500));
}

#[tokio::test]
async fn test_all_reported_resolves_complete() {
    let (signal, addr) = signal(3).await;
    for id in 1..=3 {
        client(id, addr).finished_at(100 * id as i64).await.unwrap();
    }

    let report = signal.wait_timeout(Duration::from_secs(2)).await;
    assert!(report.is_complete());
    assert!(!report.timed_out);
    assert!(report.missing().is_empty());
    assert_eq!(report.end_times[&ParticipantId(3)], 300);
}

#[tokio::test]
async fn test_partial_report_on_timeout() {
    let (signal, addr) = signal(4).await;
    for id in [1u32, 2, 4] {
        client(id, addr).finished().await.unwrap();
    }

    let report = signal.wait_timeout(Duration::from_millis(200)).await;
    assert!(report.timed_out);
    assert!(!report.is_complete());
    assert_eq!(report.end_times.len(), 3);
    assert_eq!(report.missing(), vec![ParticipantId(3)]);
}

#[tokio::test]
async fn test_duplicate_report_keeps_first_timestamp() {
    let (signal, addr) = signal(2).await;
    client(1, addr).finished_at(10).await.unwrap();

    let err = client(1, addr).finished_at(20).await.unwrap_err();
    assert!(matches!(err, RendezvousError::Rejected(RejectReason::Duplicate)));
    assert_eq!(signal.end_times()[&ParticipantId(1)], 10);
}

#[tokio::test]
async fn test_late_report_wakes_waiter() {
    let (signal, addr) = signal(2).await;
    client(1, addr).finished().await.unwrap();

    let late = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        client(2, addr).finished().await
    });
    let report = signal.wait_timeout(Duration::from_secs(5)).await;
    late.await.unwrap().unwrap();
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_empty_signal_is_complete_at_once() {
    let (signal, _addr) = signal(0).await;

    let report = signal.wait_timeout(Duration::from_millis(500)).await;
    assert!(report.is_complete());
    assert!(report.missing().is_empty());
}
