//! Notifications emitted by the orchestrator.
//!
//! The orchestrator reports every user-visible lifecycle change and every
//! failure through a [`NotificationSink`]; presentation is left entirely to
//! the sink implementation.

use std::sync::Arc;

use crate::{
   device::Device,
   error::{ErrorKind, OrchestratorError},
};

/// Events that can be emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
   AdapterDisabled,
   AdapterEnabled,
   AdapterEnableFailed { reason: String },
   ScanStarted,
   ScanStopped { count: usize },
   DeviceConnected { device: Device },
   Error { kind: ErrorKind, message: String },
}

impl Notification {
   pub fn error(err: &OrchestratorError) -> Self {
      Self::Error {
         kind: err.kind(),
         message: err.to_string(),
      }
   }
}

/// Trait for implementing notification delivery.
pub trait NotificationSink: Send + Sync {
   /// Delivers a notification. Must not block.
   fn notify(&self, notification: Notification);
}

/// Type alias for a thread-safe notification sink.
pub type NotificationSender = Arc<dyn NotificationSink>;
