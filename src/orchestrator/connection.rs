//! Promotion of discovered devices to connected ones.

use log::{info, warn};
use uuid::Uuid;

use super::registry::DeviceRegistry;
use crate::{
   bluetooth::SharedStack,
   device::{Device, DeviceId},
   error::{OrchestratorError, Result, StackError},
   event::{Notification, NotificationSender},
};

pub struct ConnectionManager {
   stack: SharedStack,
   events: NotificationSender,
   service_ids: Vec<Uuid>,
}

impl ConnectionManager {
   pub fn new(stack: SharedStack, events: NotificationSender, service_ids: Vec<Uuid>) -> Self {
      Self {
         stack,
         events,
         service_ids,
      }
   }

   /// Connects to `device_id` and moves it from `discovered` to `connected`.
   ///
   /// On failure the registry is left untouched so the device can be retried.
   pub async fn connect(
      &self,
      registry: &mut DeviceRegistry,
      adapter_enabled: bool,
      device_id: DeviceId,
   ) -> Result<Device> {
      if !adapter_enabled {
         return Err(self.fail(device_id, StackError::adapter_disabled()));
      }

      info!("Connecting to {device_id}");
      if let Err(e) = self.stack.connect(&device_id).await {
         return Err(self.fail(device_id, e));
      }

      let device = registry.promote(&device_id);
      registry.check_invariants();
      info!("Connected to {device}");
      self.events.notify(Notification::DeviceConnected {
         device: device.clone(),
      });
      Ok(device)
   }

   fn fail(&self, device_id: DeviceId, source: StackError) -> OrchestratorError {
      let err = OrchestratorError::ConnectFailed { device_id, source };
      warn!("{err}");
      self.events.notify(Notification::error(&err));
      err
   }

   /// Queries devices already connected at system level and merges them
   /// into `connected`.
   pub async fn connected_devices(&self, registry: &mut DeviceRegistry) -> Result<Vec<Device>> {
      let devices = match self.stack.connected_devices(&self.service_ids).await {
         Ok(devices) => devices,
         Err(e) => {
            let err = OrchestratorError::Stack(e);
            warn!("Failed to query connected devices: {err}");
            self.events.notify(Notification::error(&err));
            return Err(err);
         },
      };

      let added = registry.merge_connected(devices.iter().cloned());
      registry.check_invariants();
      info!(
         "Found {} connected devices ({added} new)",
         devices.len()
      );
      Ok(devices)
   }
}
