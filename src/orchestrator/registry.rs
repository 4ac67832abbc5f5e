//! Discovered and connected device sets.

use log::debug;

use crate::device::Device;

/// Two disjoint device collections keyed by device id.
///
/// `discovered` keeps insertion order and may hold the same device several
/// times (one entry per advertisement). A device is never present in both
/// collections at once.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
   discovered: Vec<Device>,
   connected: Vec<Device>,
}

impl DeviceRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn discovered(&self) -> &[Device] {
      &self.discovered
   }

   pub fn connected(&self) -> &[Device] {
      &self.connected
   }

   pub fn is_connected(&self, device_id: &str) -> bool {
      self.connected.iter().any(|d| d.device_id == device_id)
   }

   pub(crate) fn clear_discovered(&mut self) {
      self.discovered.clear();
   }

   /// Appends a discovered device. Returns `false` if the device is already
   /// connected and was therefore not recorded.
   pub(crate) fn record_discovery(&mut self, device: Device) -> bool {
      if self.is_connected(&device.device_id) {
         return false;
      }
      self.discovered.push(device);
      true
   }

   /// Moves a device into `connected`, removing every discovered entry for
   /// it. Already connected devices are not duplicated.
   pub(crate) fn promote(&mut self, device_id: &str) -> Device {
      let known = self
         .discovered
         .iter()
         .chain(&self.connected)
         .find(|d| d.device_id == device_id)
         .cloned();
      let device = known.unwrap_or_else(|| Device::new(device_id));

      self.discovered.retain(|d| d.device_id != device_id);
      if !self.is_connected(device_id) {
         self.connected.push(device.clone());
      }
      device
   }

   /// Merges devices connected at system level. Returns how many were new.
   pub(crate) fn merge_connected(&mut self, devices: impl IntoIterator<Item = Device>) -> usize {
      let mut added = 0;
      for device in devices {
         self.discovered.retain(|d| d.device_id != device.device_id);
         if self.is_connected(&device.device_id) {
            continue;
         }
         debug!("Tracking already connected device {device}");
         self.connected.push(device);
         added += 1;
      }
      added
   }

   fn is_disjoint(&self) -> bool {
      self
         .discovered
         .iter()
         .all(|d| !self.is_connected(&d.device_id))
   }

   pub(crate) fn check_invariants(&self) {
      debug_assert!(self.is_disjoint(), "device both discovered and connected");
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn ids(devices: &[Device]) -> Vec<&str> {
      devices.iter().map(|d| d.device_id.as_str()).collect()
   }

   fn registry_with(discovered: &[&str]) -> DeviceRegistry {
      let mut registry = DeviceRegistry::new();
      for id in discovered {
         assert!(registry.record_discovery(Device::new(*id)));
      }
      registry
   }

   #[test]
   fn test_discovery_keeps_repeats_in_order() {
      let registry = registry_with(&["A", "B", "A"]);
      assert_eq!(ids(registry.discovered()), ["A", "B", "A"]);
      assert!(registry.connected().is_empty());
   }

   #[test]
   fn test_promote_moves_device() {
      let mut registry = registry_with(&["A", "B", "A"]);
      let device = registry.promote("B");

      assert_eq!(device.device_id, "B");
      assert_eq!(ids(registry.discovered()), ["A", "A"]);
      assert_eq!(ids(registry.connected()), ["B"]);
      assert!(registry.is_disjoint());
   }

   #[test]
   fn test_promote_removes_every_repeat() {
      let mut registry = registry_with(&["A", "B", "A"]);
      registry.promote("A");

      assert_eq!(ids(registry.discovered()), ["B"]);
      assert_eq!(ids(registry.connected()), ["A"]);
   }

   #[test]
   fn test_promote_is_idempotent() {
      let mut registry = registry_with(&["A"]);
      registry.promote("A");
      registry.promote("A");
      registry.promote("Z");

      assert_eq!(ids(registry.connected()), ["A", "Z"]);
      assert!(registry.discovered().is_empty());
   }

   #[test]
   fn test_promote_keeps_resolved_name() {
      let mut registry = DeviceRegistry::new();
      registry.record_discovery(Device::new("A").with_name("Sensor"));
      let device = registry.promote("A");
      assert_eq!(device.name.as_deref(), Some("Sensor"));
   }

   #[test]
   fn test_connected_device_not_rediscovered() {
      let mut registry = registry_with(&["A"]);
      registry.promote("A");

      assert!(!registry.record_discovery(Device::new("A")));
      assert!(registry.discovered().is_empty());
      assert!(registry.is_disjoint());
   }

   #[test]
   fn test_merge_connected() {
      let mut registry = registry_with(&["A", "B"]);
      registry.promote("C");

      let added = registry.merge_connected([Device::new("B"), Device::new("C")]);
      assert_eq!(added, 1);
      assert_eq!(ids(registry.discovered()), ["A"]);
      assert_eq!(ids(registry.connected()), ["C", "B"]);
      assert!(registry.is_disjoint());
   }

   #[test]
   fn test_clear_discovered_keeps_connected() {
      let mut registry = registry_with(&["A", "B"]);
      registry.promote("B");
      registry.clear_discovered();

      assert!(registry.discovered().is_empty());
      assert_eq!(ids(registry.connected()), ["B"]);
   }
}
