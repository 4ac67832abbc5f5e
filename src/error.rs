//! Error types for the BLE orchestrator.
//!
//! Every failure coming out of the native stack is caught at the
//! orchestration boundary and converted into one of the kinds defined here
//! before being forwarded to the notification sink.

use std::fmt;

use smol_str::SmolStr;
use thiserror::Error;

/// Opaque failure reported by the native Bluetooth stack.
///
/// Carries the stack's own kind label (e.g. `PermissionDenied`) and a
/// human readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackError {
   pub kind: SmolStr,
   pub message: String,
}

impl StackError {
   pub fn new(kind: impl Into<SmolStr>, message: impl Into<String>) -> Self {
      Self {
         kind: kind.into(),
         message: message.into(),
      }
   }

   pub(crate) fn adapter_disabled() -> Self {
      Self::new("AdapterDisabled", "Bluetooth adapter is not enabled")
   }

   pub(crate) fn not_initialized() -> Self {
      Self::new("NotInitialized", "Bluetooth adapter has not been initialized")
   }
}

impl fmt::Display for StackError {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      if self.message.is_empty() {
         f.write_str(&self.kind)
      } else {
         write!(f, "{}: {}", self.kind, self.message)
      }
   }
}

impl std::error::Error for StackError {}

impl From<bluer::Error> for StackError {
   fn from(err: bluer::Error) -> Self {
      Self::new(format!("{:?}", err.kind), err.message)
   }
}

/// Label attached to `Error` notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
   InitFailed,
   EnableFailed,
   ScanStartFailed,
   ConnectFailed,
   StackError,
   Internal,
}

/// Main error type for the orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
   #[error("Bluetooth initialization failed: {0}")]
   InitFailed(StackError),

   #[error("Bluetooth couldn't be enabled: {0}")]
   EnableFailed(StackError),

   #[error("Scan couldn't be started: {0}")]
   ScanStartFailed(StackError),

   #[error("Connection to {device_id} failed: {source}")]
   ConnectFailed {
      device_id: SmolStr,
      source: StackError,
   },

   #[error("Bluetooth stack error: {0}")]
   Stack(#[from] StackError),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),

   #[error("Orchestrator has been shut down")]
   ManagerShutdown,
}

impl OrchestratorError {
   /// Notification label for this error.
   pub const fn kind(&self) -> ErrorKind {
      match self {
         Self::InitFailed(_) => ErrorKind::InitFailed,
         Self::EnableFailed(_) => ErrorKind::EnableFailed,
         Self::ScanStartFailed(_) => ErrorKind::ScanStartFailed,
         Self::ConnectFailed { .. } => ErrorKind::ConnectFailed,
         Self::Stack(_) => ErrorKind::StackError,
         Self::Io(_)
         | Self::ConfigDirNotFound
         | Self::TomlParse(_)
         | Self::TomlSerialize(_)
         | Self::ManagerShutdown => ErrorKind::Internal,
      }
   }
}

/// Convenience type alias for Results with `OrchestratorError`.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
