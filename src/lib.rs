//! bcast-harness
//!
//! Drives repeated experiments against a broadcast protocol implementation:
//! launches N participant processes, synchronizes their start over a TCP
//! barrier, injects STOP/CONT/TERM faults while they run, collects
//! completion reports, and checks every delivery log for FIFO or causal
//! order.
//!
//! # Flow of one run
//!
//! 1. [`rendezvous::RendezvousBarrier`] and [`rendezvous::CompletionSignal`] start listening.
//! 2. [`launch::ParticipantLauncher`] spawns `run.sh` once per participant.
//! 3. The barrier releases when all N ids have registered.
//! 4. [`fault::FaultInjectionEngine`] signals random participants.
//! 5. The completion signal is awaited under a bound; stragglers are terminated.
//! 6. [`validate::BroadcastValidation`] checks each `procNN.output`.
//!
//! [`experiment::run`] ties the steps together; [`sweep::run_sweep`] repeats
//! it over a tuning grid.

pub mod cli;
pub mod config;
pub mod experiment;
pub mod fault;
pub mod launch;
pub mod membership;
pub mod netem;
pub mod participant;
pub mod rendezvous;
pub mod sweep;
pub mod telemetry;
pub mod validate;

pub use config::HarnessConfig;
pub use experiment::{ExperimentReport, HarnessError};
pub use participant::ParticipantId;
