//! Configuration management for the orchestrator.
//!
//! This module handles loading and saving configuration from disk,
//! including adapter selection, scan parameters and known devices.

use std::{
   env, fs,
   path::{Path, PathBuf},
   time::Duration,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
   bluetooth::{InitOptions, ScanFilters},
   error::{OrchestratorError, Result},
};

/// Main configuration structure for the service.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
   /// Adapter name (e.g. `hci0`); the system default when unset.
   #[serde(default)]
   pub adapter: Option<String>,

   #[serde(default = "default_never_for_location")]
   pub never_for_location: bool,

   #[serde(default = "default_scan_timeout")]
   pub scan_timeout_ms: u64,

   #[serde(default = "default_poll_interval")]
   pub enable_poll_interval_ms: u64,

   #[serde(default)]
   pub scan_services: Vec<Uuid>,

   #[serde(default)]
   pub scan_name_prefix: Option<String>,

   /// Services used to look up devices already connected at system level.
   #[serde(default)]
   pub connected_services: Vec<Uuid>,

   #[serde(default)]
   pub auto_connect: Vec<KnownDevice>,
}

/// A device to connect to automatically once it is discovered.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct KnownDevice {
   pub address: String,
   pub name: String,
}

/// Lower bound for the enablement poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

const fn default_never_for_location() -> bool {
   true
}

const fn default_scan_timeout() -> u64 {
   60_000
}

const fn default_poll_interval() -> u64 {
   5_000
}

impl Default for Config {
   fn default() -> Self {
      Self {
         adapter: None,
         never_for_location: default_never_for_location(),
         scan_timeout_ms: default_scan_timeout(),
         enable_poll_interval_ms: default_poll_interval(),
         scan_services: vec![],
         scan_name_prefix: None,
         connected_services: vec![],
         auto_connect: vec![],
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      Self::load_from(&Self::config_path()?)
   }

   pub fn load_from(path: &Path) -> Result<Self> {
      if path.exists() {
         let contents = fs::read_to_string(path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         let config = Self::default();
         config.save_to(path)?;
         Ok(config)
      }
   }

   /// Saves the current configuration to disk.
   pub fn save(&self) -> Result<()> {
      self.save_to(&Self::config_path()?)
   }

   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(home) = env::var("BLEORCH_HOME") {
         PathBuf::from(home)
      } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else {
         dirs::config_dir().ok_or(OrchestratorError::ConfigDirNotFound)?
      };

      Ok(config_dir.join("bleorch").join("config.toml"))
   }

   pub const fn scan_timeout(&self) -> Duration {
      Duration::from_millis(self.scan_timeout_ms)
   }

   /// Interval between enablement polls, never zero.
   pub fn poll_interval(&self) -> Duration {
      Duration::from_millis(self.enable_poll_interval_ms).max(MIN_POLL_INTERVAL)
   }

   pub fn init_options(&self) -> InitOptions {
      InitOptions {
         adapter: self.adapter.as_deref().map(Into::into),
         never_for_location: self.never_for_location,
      }
   }

   pub fn scan_filters(&self) -> ScanFilters {
      ScanFilters {
         services: self.scan_services.clone(),
         name: None,
         name_prefix: self.scan_name_prefix.as_deref().map(Into::into),
      }
   }

   /// Checks if the given address is a known device and returns its name.
   pub fn is_known_device(&self, address: &str) -> Option<&str> {
      self
         .auto_connect
         .iter()
         .find(|d| d.address.eq_ignore_ascii_case(address))
         .map(|d| d.name.as_str())
   }
}
