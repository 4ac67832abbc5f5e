//! BlueZ backed implementation of [`BleStack`].

use std::{pin::pin, str::FromStr};

use async_trait::async_trait;
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::stream::StreamExt;
use log::{debug, info, warn};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::{sync::oneshot, task::JoinHandle};
use uuid::Uuid;

use super::{BleStack, DiscoveryCallback, InitOptions, ScanFilters, StackResult};
use crate::{
   device::{Device, DeviceId, ScanResult},
   error::StackError,
};

/// Native stack talking to `bluetoothd` over D-Bus.
#[derive(Default)]
pub struct BluezStack {
   adapter: Mutex<Option<(Session, Adapter)>>,
   discovery: Mutex<Option<JoinHandle<()>>>,
}

impl BluezStack {
   pub fn new() -> Self {
      Self::default()
   }

   fn adapter(&self) -> StackResult<Adapter> {
      self
         .adapter
         .lock()
         .as_ref()
         .map(|(_, adapter)| adapter.clone())
         .ok_or_else(StackError::not_initialized)
   }

   async fn scan_result(adapter: &Adapter, addr: Address) -> Option<ScanResult> {
      let device = adapter.device(addr).ok()?;
      let mut result = ScanResult::new(Device::new(addr.to_string()));

      // BlueZ falls back to the address when no alias is set
      if let Ok(alias) = device.alias().await
         && alias != addr.to_string()
      {
         result.device.name = Some(alias.into());
      }
      result.local_name = device.name().await.ok().flatten().map(SmolStr::from);
      result.rssi = device.rssi().await.ok().flatten();
      Some(result)
   }

   fn parse_address(device_id: &str) -> StackResult<Address> {
      Address::from_str(device_id)
         .map_err(|e| StackError::new("InvalidArgs", format!("{device_id}: {e}")))
   }
}

impl Drop for BluezStack {
   fn drop(&mut self) {
      if let Some(handle) = self.discovery.get_mut().take() {
         handle.abort();
      }
   }
}

#[async_trait]
impl BleStack for BluezStack {
   async fn initialize(&self, options: &InitOptions) -> StackResult<()> {
      if options.never_for_location {
         debug!("Location relaxation flag has no effect on BlueZ");
      }

      let session = Session::new().await?;
      let adapter = match &options.adapter {
         Some(name) => session.adapter(name)?,
         None => session.default_adapter().await?,
      };
      info!("Using Bluetooth adapter {}", adapter.name());

      *self.adapter.lock() = Some((session, adapter));
      Ok(())
   }

   async fn is_enabled(&self) -> bool {
      let Ok(adapter) = self.adapter() else {
         return false;
      };
      match adapter.is_powered().await {
         Ok(powered) => powered,
         Err(e) => {
            warn!("Failed to read adapter power state: {e}");
            false
         },
      }
   }

   async fn enable(&self) -> StackResult<()> {
      self.adapter()?.set_powered(true).await?;
      Ok(())
   }

   async fn request_scan(
      &self,
      filters: &ScanFilters,
      mut on_device: DiscoveryCallback,
   ) -> StackResult<()> {
      let adapter = self.adapter()?;

      let mut filter = DiscoveryFilter::default();
      filter.transport = DiscoveryTransport::Le;
      filter.uuids = filters.services.iter().copied().collect();
      filter.pattern = filters.name_prefix.as_ref().map(ToString::to_string);
      filter.duplicate_data = true;
      adapter.set_discovery_filter(filter).await?;

      let filters = filters.clone();
      let (started_tx, started_rx) = oneshot::channel();
      let handle = tokio::spawn(async move {
         // Property changes are reported as repeated `DeviceAdded` events, so
         // every advertisement reaches the callback
         let events = match adapter.discover_devices_with_changes().await {
            Ok(events) => {
               let _ = started_tx.send(Ok(()));
               events
            },
            Err(e) => {
               let _ = started_tx.send(Err(StackError::from(e)));
               return;
            },
         };
         let mut events = pin!(events);

         while let Some(event) = events.next().await {
            let AdapterEvent::DeviceAdded(addr) = event else {
               continue;
            };
            let Some(result) = Self::scan_result(&adapter, addr).await else {
               continue;
            };
            let name = result.local_name.as_deref().or(result.device.name.as_deref());
            if filters.matches_name(name) {
               on_device(result);
            }
         }
         debug!("Discovery stream ended");
      });

      match started_rx.await {
         Ok(Ok(())) => {
            if let Some(previous) = self.discovery.lock().replace(handle) {
               previous.abort();
            }
            Ok(())
         },
         Ok(Err(e)) => Err(e),
         Err(_) => Err(StackError::new("Failed", "discovery task exited early")),
      }
   }

   async fn stop_scan(&self) -> StackResult<()> {
      // Dropping the discovery stream ends the BlueZ discovery session
      if let Some(handle) = self.discovery.lock().take() {
         handle.abort();
      }
      Ok(())
   }

   async fn connected_devices(&self, service_ids: &[Uuid]) -> StackResult<Vec<Device>> {
      let adapter = self.adapter()?;
      let mut devices = Vec::new();

      for addr in adapter.device_addresses().await? {
         let Ok(device) = adapter.device(addr) else {
            continue;
         };
         if !device.is_connected().await.unwrap_or(false) {
            continue;
         }
         if !service_ids.is_empty() {
            let uuids = device.uuids().await.ok().flatten().unwrap_or_default();
            if !service_ids.iter().any(|id| uuids.contains(id)) {
               continue;
            }
         }

         let mut found = Device::new(addr.to_string());
         found.name = device.name().await.ok().flatten().map(SmolStr::from);
         devices.push(found);
      }

      Ok(devices)
   }

   async fn connect(&self, device_id: &DeviceId) -> StackResult<()> {
      let addr = Self::parse_address(device_id)?;
      let device = self.adapter()?.device(addr)?;
      device.connect().await?;
      Ok(())
   }
}
