//! Scripted stack and recording sink for tests.

use std::{
   collections::{HashMap, VecDeque},
   sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
   bluetooth::{BleStack, DiscoveryCallback, InitOptions, ScanFilters, StackResult},
   device::{Device, DeviceId, ScanResult},
   error::StackError,
   event::{Notification, NotificationSink},
};

/// Number of calls made into each stack operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calls {
   pub initialize: usize,
   pub is_enabled: usize,
   pub enable: usize,
   pub request_scan: usize,
   pub stop_scan: usize,
   pub connected_devices: usize,
   pub connect: Vec<DeviceId>,
}

#[derive(Default)]
struct MockState {
   enabled: bool,
   enabled_script: VecDeque<bool>,
   init_error: Option<StackError>,
   enable_error: Option<StackError>,
   scan_error: Option<StackError>,
   stop_error: Option<StackError>,
   connected_error: Option<StackError>,
   crash_on_poll: bool,
   connect_errors: HashMap<DeviceId, StackError>,
   system_connected: Vec<Device>,
   on_device: Option<DiscoveryCallback>,
   calls: Calls,
}

#[derive(Default)]
pub struct MockStack {
   state: Mutex<MockState>,
}

impl MockStack {
   pub fn new() -> Arc<Self> {
      Arc::new(Self::default())
   }

   pub fn set_enabled(&self, enabled: bool) {
      self.state.lock().enabled = enabled;
   }

   /// Answers for the next `is_enabled` calls, before falling back to the
   /// current enablement.
   pub fn script_enabled(&self, answers: &[bool]) {
      self.state.lock().enabled_script.extend(answers);
   }

   pub fn fail_init(&self, kind: &str) {
      self.state.lock().init_error = Some(StackError::new(kind, "mock init failure"));
   }

   pub fn clear_init_failure(&self) {
      self.state.lock().init_error = None;
   }

   pub fn fail_enable(&self, kind: &str) {
      self.state.lock().enable_error = Some(StackError::new(kind, "mock enable failure"));
   }

   pub fn clear_enable_failure(&self) {
      self.state.lock().enable_error = None;
   }

   pub fn fail_scan(&self, kind: &str) {
      self.state.lock().scan_error = Some(StackError::new(kind, "mock scan failure"));
   }

   pub fn fail_stop_scan(&self, kind: &str) {
      self.state.lock().stop_error = Some(StackError::new(kind, "mock stop failure"));
   }

   pub fn fail_connected_devices(&self, kind: &str) {
      self.state.lock().connected_error = Some(StackError::new(kind, "mock query failure"));
   }

   /// Makes every `is_enabled` call panic, as a crashing driver would.
   pub fn crash_on_poll(&self) {
      self.state.lock().crash_on_poll = true;
   }

   pub fn fail_connect(&self, device_id: &str, kind: &str) {
      self
         .state
         .lock()
         .connect_errors
         .insert(device_id.into(), StackError::new(kind, "mock connect failure"));
   }

   pub fn clear_connect_failure(&self, device_id: &str) {
      self.state.lock().connect_errors.remove(device_id);
   }

   pub fn set_system_connected(&self, devices: Vec<Device>) {
      self.state.lock().system_connected = devices;
   }

   /// Delivers an advertisement to the registered discovery callback.
   /// Returns `false` when no scan is running.
   pub fn advertise(&self, result: ScanResult) -> bool {
      let mut state = self.state.lock();
      match state.on_device.as_mut() {
         Some(on_device) => {
            on_device(result);
            true
         },
         None => false,
      }
   }

   pub fn advertise_id(&self, device_id: &str) -> bool {
      self.advertise(ScanResult::new(Device::new(device_id)))
   }

   pub fn is_scanning(&self) -> bool {
      self.state.lock().on_device.is_some()
   }

   pub fn calls(&self) -> Calls {
      self.state.lock().calls.clone()
   }
}

#[async_trait]
impl BleStack for MockStack {
   async fn initialize(&self, _options: &InitOptions) -> StackResult<()> {
      let mut state = self.state.lock();
      state.calls.initialize += 1;
      state.init_error.clone().map_or(Ok(()), Err)
   }

   async fn is_enabled(&self) -> bool {
      let mut state = self.state.lock();
      state.calls.is_enabled += 1;
      assert!(!state.crash_on_poll, "mock driver crashed");
      let scripted = state.enabled_script.pop_front();
      scripted.unwrap_or(state.enabled)
   }

   async fn enable(&self) -> StackResult<()> {
      let mut state = self.state.lock();
      state.calls.enable += 1;
      if let Some(e) = state.enable_error.clone() {
         return Err(e);
      }
      state.enabled = true;
      Ok(())
   }

   async fn request_scan(
      &self,
      _filters: &ScanFilters,
      on_device: DiscoveryCallback,
   ) -> StackResult<()> {
      let mut state = self.state.lock();
      state.calls.request_scan += 1;
      if let Some(e) = state.scan_error.clone() {
         return Err(e);
      }
      state.on_device = Some(on_device);
      Ok(())
   }

   async fn stop_scan(&self) -> StackResult<()> {
      let mut state = self.state.lock();
      state.calls.stop_scan += 1;
      if let Some(e) = state.stop_error.clone() {
         return Err(e);
      }
      state.on_device = None;
      Ok(())
   }

   async fn connected_devices(&self, _service_ids: &[Uuid]) -> StackResult<Vec<Device>> {
      let mut state = self.state.lock();
      state.calls.connected_devices += 1;
      if let Some(e) = state.connected_error.clone() {
         return Err(e);
      }
      Ok(state.system_connected.clone())
   }

   async fn connect(&self, device_id: &DeviceId) -> StackResult<()> {
      let mut state = self.state.lock();
      state.calls.connect.push(device_id.clone());
      state.connect_errors.get(device_id).cloned().map_or(Ok(()), Err)
   }
}

/// Sink that keeps every notification for later inspection.
#[derive(Default)]
pub struct RecordingSink {
   events: Mutex<Vec<Notification>>,
}

impl RecordingSink {
   pub fn new() -> Arc<Self> {
      Arc::new(Self::default())
   }

   pub fn events(&self) -> Vec<Notification> {
      self.events.lock().clone()
   }

   pub fn count(&self, pred: impl Fn(&Notification) -> bool) -> usize {
      self.events.lock().iter().filter(|n| pred(n)).count()
   }
}

impl NotificationSink for RecordingSink {
   fn notify(&self, notification: Notification) {
      self.events.lock().push(notification);
   }
}
