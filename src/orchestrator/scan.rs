//! Time-bounded discovery scans.
//!
//! A scan owns its deadline and its discovery subscription together; both
//! are released when the session stops, whichever path stops it.

use std::{future, pin::Pin, time::Duration};

use log::{debug, info, warn};
use tokio::{
   select,
   sync::mpsc,
   time::{self, Sleep},
};

use super::registry::DeviceRegistry;
use crate::{
   bluetooth::{ScanFilters, SharedStack},
   device::ScanResult,
   error::{OrchestratorError, Result, StackError},
   event::{Notification, NotificationSender},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum ScanState {
   #[default]
   Idle,
   Scanning,
   Stopping,
}

/// Something the active scan needs the owner to handle.
#[derive(Debug)]
pub enum ScanEvent {
   Discovered(ScanResult),
   TimedOut,
}

struct ActiveScan {
   deadline: Pin<Box<Sleep>>,
   discoveries: mpsc::UnboundedReceiver<ScanResult>,
}

pub struct ScanSession {
   stack: SharedStack,
   events: NotificationSender,
   state: ScanState,
   active: Option<ActiveScan>,
}

impl ScanSession {
   pub fn new(stack: SharedStack, events: NotificationSender) -> Self {
      Self {
         stack,
         events,
         state: ScanState::Idle,
         active: None,
      }
   }

   pub const fn state(&self) -> ScanState {
      self.state
   }

   /// Starts a scan that stops on its own after `timeout`.
   ///
   /// `discovered` is cleared first and stays cleared if the stack rejects
   /// the request. A scan that is already running is stopped beforehand.
   pub async fn start(
      &mut self,
      registry: &mut DeviceRegistry,
      adapter_enabled: bool,
      filters: &ScanFilters,
      timeout: Duration,
   ) -> Result<()> {
      if self.active.is_some() {
         debug!("Restarting scan");
         self.stop(registry).await;
      }

      registry.clear_discovered();
      if !adapter_enabled {
         return Err(self.fail(StackError::adapter_disabled()));
      }

      info!("Starting device scan");
      let (tx, rx) = mpsc::unbounded_channel();
      let on_device = Box::new(move |result: ScanResult| {
         // Fails only once the session is gone
         let _ = tx.send(result);
      });

      self.state = ScanState::Scanning;
      if let Err(e) = self.stack.request_scan(filters, on_device).await {
         self.state = ScanState::Idle;
         return Err(self.fail(e));
      }

      self.active = Some(ActiveScan {
         deadline: Box::pin(time::sleep(timeout)),
         discoveries: rx,
      });
      info!("Scan started, stopping in {timeout:?}");
      self.events.notify(Notification::ScanStarted);
      Ok(())
   }

   fn fail(&self, e: StackError) -> OrchestratorError {
      let err = OrchestratorError::ScanStartFailed(e);
      warn!("{err}");
      self.events.notify(Notification::error(&err));
      err
   }

   /// Waits for the next discovery or the deadline. Discoveries already
   /// queued win over an expired deadline. Pending forever while idle.
   pub async fn next_event(&mut self) -> ScanEvent {
      let Some(active) = self.active.as_mut() else {
         return future::pending().await;
      };

      select! {
         biased;
         Some(result) = active.discoveries.recv() => ScanEvent::Discovered(result),
         () = active.deadline.as_mut() => ScanEvent::TimedOut,
      }
   }

   /// Records a discovery in the registry.
   pub fn accept(&self, registry: &mut DeviceRegistry, result: ScanResult) {
      let rssi = result.rssi;
      let device = result.into_device();
      let name = device.display_name().to_owned();
      if registry.record_discovery(device) {
         debug!("New device found: {name} (rssi {rssi:?})");
      } else {
         debug!("Ignoring advertisement from connected device {name}");
      }
   }

   /// Stops the active scan and reports the number of discovered devices.
   ///
   /// Events delivered before the stack acknowledged the stop are kept,
   /// later ones are dropped. Returns `None` when no scan was running.
   pub async fn stop(&mut self, registry: &mut DeviceRegistry) -> Option<usize> {
      let mut active = self.active.take()?;

      info!("Stopping scan");
      self.state = ScanState::Stopping;
      if let Err(e) = self.stack.stop_scan().await {
         let err = OrchestratorError::Stack(e);
         warn!("Failed to stop scan: {err}");
         self.events.notify(Notification::error(&err));
      }

      active.discoveries.close();
      while let Ok(result) = active.discoveries.try_recv() {
         self.accept(registry, result);
      }
      drop(active);

      self.state = ScanState::Idle;
      let count = registry.discovered().len();
      info!("Scan stopped, found {count} devices");
      self.events.notify(Notification::ScanStopped { count });
      Some(count)
   }
}
