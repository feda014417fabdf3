#![doc = include_str!("../README.md")]

pub mod account;
pub mod cert;
pub mod challenge;
pub mod config;
pub mod endpoints;
pub mod errors;
#[cfg(test)]
mod fixtures;
pub mod key;
pub mod keystore;
pub mod orchestrator;
pub mod poll;
pub mod protocol;
pub mod scheduler;
pub mod schema;
pub mod service;
pub mod session;
mod storage;

pub use errors::RenewError;
pub use orchestrator::{Orchestrator, RenewalOutcome, ReloadSignal};
pub use scheduler::{RenewalScheduler, SchedulerHandle};
