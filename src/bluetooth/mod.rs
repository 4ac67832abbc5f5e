//! Native Bluetooth stack boundary.
//!
//! The orchestrator talks to the radio exclusively through [`BleStack`].
//! [`bluez::BluezStack`] implements it on top of BlueZ; tests use a scripted
//! mock.

use std::sync::Arc;

use async_trait::async_trait;
use smol_str::SmolStr;
use uuid::Uuid;

use crate::{
   device::{Device, DeviceId, ScanResult},
   error::StackError,
};

pub mod bluez;

/// Convenience type alias for native stack results.
pub type StackResult<T> = std::result::Result<T, StackError>;

/// Invoked by the stack for every advertisement seen during a scan, in the
/// order the stack receives them.
pub type DiscoveryCallback = Box<dyn FnMut(ScanResult) + Send>;

/// Type alias for a shareable stack handle.
pub type SharedStack = Arc<dyn BleStack>;

/// Options for one-time radio initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
   /// Adapter to use; the system default when `None`.
   pub adapter: Option<SmolStr>,
   /// Scanning is not used to derive location, so location permission
   /// requirements may be relaxed where the platform supports it.
   pub never_for_location: bool,
}

/// Filters applied to a discovery scan. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilters {
   pub services: Vec<Uuid>,
   pub name: Option<SmolStr>,
   pub name_prefix: Option<SmolStr>,
}

impl ScanFilters {
   /// Checks an advertised name against the name filters.
   pub fn matches_name(&self, name: Option<&str>) -> bool {
      if let Some(expected) = &self.name
         && name != Some(expected.as_str())
      {
         return false;
      }
      if let Some(prefix) = &self.name_prefix {
         return name.is_some_and(|n| n.starts_with(prefix.as_str()));
      }
      true
   }
}

/// Capability contract of the native Bluetooth LE stack.
#[async_trait]
pub trait BleStack: Send + Sync {
   async fn initialize(&self, options: &InitOptions) -> StackResult<()>;

   async fn is_enabled(&self) -> bool;

   async fn enable(&self) -> StackResult<()>;

   /// Starts discovery. `on_device` stays registered until [`Self::stop_scan`].
   async fn request_scan(
      &self,
      filters: &ScanFilters,
      on_device: DiscoveryCallback,
   ) -> StackResult<()>;

   async fn stop_scan(&self) -> StackResult<()>;

   /// Devices already connected at the system level, optionally restricted
   /// to those exposing one of `service_ids`.
   async fn connected_devices(&self, service_ids: &[Uuid]) -> StackResult<Vec<Device>>;

   async fn connect(&self, device_id: &DeviceId) -> StackResult<()>;
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_empty_filter_matches_everything() {
      let filters = ScanFilters::default();
      assert!(filters.matches_name(None));
      assert!(filters.matches_name(Some("Thermometer")));
   }

   #[test]
   fn test_name_prefix_filter() {
      let filters = ScanFilters {
         name_prefix: Some("Therm".into()),
         ..Default::default()
      };
      assert!(filters.matches_name(Some("Thermometer")));
      assert!(!filters.matches_name(Some("Scale")));
      assert!(!filters.matches_name(None));
   }

   #[test]
   fn test_exact_name_filter() {
      let filters = ScanFilters {
         name: Some("Scale".into()),
         ..Default::default()
      };
      assert!(filters.matches_name(Some("Scale")));
      assert!(!filters.matches_name(Some("Scale 2")));
   }
}
