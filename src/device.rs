//! Device identity and scan result types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use smol_str::SmolStr;

/// Opaque identifier of a physical device, stable for the session.
pub type DeviceId = SmolStr;

/// A Bluetooth LE device as tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
   pub device_id: DeviceId,
   /// Display name, resolved once at discovery time.
   pub name: Option<SmolStr>,
}

impl Device {
   pub fn new(device_id: impl Into<DeviceId>) -> Self {
      Self {
         device_id: device_id.into(),
         name: None,
      }
   }

   #[must_use]
   pub fn with_name(mut self, name: impl Into<SmolStr>) -> Self {
      self.name = Some(name.into());
      self
   }

   /// Name to present to the user, falling back to the identifier.
   pub fn display_name(&self) -> &str {
      self.name.as_deref().unwrap_or(&self.device_id)
   }

   pub fn to_json(&self) -> serde_json::Value {
      json!({
         "id": self.device_id,
         "name": self.name,
      })
   }
}

impl fmt::Display for Device {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match &self.name {
         Some(name) => write!(f, "{name} ({})", self.device_id),
         None => f.write_str(&self.device_id),
      }
   }
}

/// A single discovery event delivered by the native stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
   pub device: Device,
   /// Per-advertisement name override.
   pub local_name: Option<SmolStr>,
   pub rssi: Option<i16>,
}

impl ScanResult {
   pub const fn new(device: Device) -> Self {
      Self {
         device,
         local_name: None,
         rssi: None,
      }
   }

   #[must_use]
   pub fn with_local_name(mut self, local_name: impl Into<SmolStr>) -> Self {
      self.local_name = Some(local_name.into());
      self
   }

   /// Resolves the display name (`local_name` wins over `name`) and returns
   /// the device to record.
   pub fn into_device(self) -> Device {
      let mut device = self.device;
      if let Some(local_name) = self.local_name {
         device.name = Some(local_name);
      }
      device
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_local_name_overrides_name() {
      let result = ScanResult::new(Device::new("AA").with_name("Vendor")).with_local_name("Local");
      assert_eq!(result.into_device().name.as_deref(), Some("Local"));
   }

   #[test]
   fn test_name_kept_without_local_name() {
      let device = ScanResult::new(Device::new("AA").with_name("Vendor")).into_device();
      assert_eq!(device.name.as_deref(), Some("Vendor"));
      assert_eq!(device.display_name(), "Vendor");
   }

   #[test]
   fn test_display_name_falls_back_to_id() {
      let device = ScanResult::new(Device::new("AA:BB")).into_device();
      assert_eq!(device.display_name(), "AA:BB");
      assert_eq!(device.to_string(), "AA:BB");
      assert_eq!(device.to_json()["name"], serde_json::Value::Null);
   }
}
