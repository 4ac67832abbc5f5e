//! Bluetooth LE adapter, scan and connection lifecycle orchestration.
//!
//! The [`orchestrator::Orchestrator`] keeps the local adapter enabled
//! (polling until it comes up when an enable request fails), runs
//! time-bounded discovery scans and tracks discovered versus connected
//! devices. The native radio is reached through [`bluetooth::BleStack`] and
//! every user-visible event goes to an [`event::NotificationSink`].

pub mod bluetooth;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod orchestrator;

#[cfg(test)]
mod mock;

pub use error::{OrchestratorError, Result};
