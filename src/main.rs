//! Bluetooth LE orchestration daemon.
//!
//! Brings the local adapter up, scans for nearby devices and connects to
//! the ones listed in the configuration, logging every lifecycle event.

use std::{collections::HashSet, sync::Arc, time::Duration};

use bleorch::{
   Result,
   bluetooth::{SharedStack, bluez::BluezStack},
   config::Config,
   event::{Notification, NotificationSink},
   orchestrator::{AdapterState, Orchestrator},
};
use crossbeam::queue::SegQueue;
use log::{error, info, warn};
use tokio::{select, signal, sync::Notify, time};

#[tokio::main]
async fn main() -> Result<()> {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   info!("Starting bleorch service...");

   // Load configuration
   let config = Config::load()?;
   info!(
      "Loaded configuration with {} auto-connect devices",
      config.auto_connect.len()
   );

   let event_bus = EventProcessor::new();
   let stack: SharedStack = Arc::new(BluezStack::new());
   let orchestrator = Orchestrator::new(stack, event_bus.clone(), config.clone());
   let mut daemon = Daemon {
      orchestrator,
      config,
      scanned: false,
   };

   // An init failure is reported on the event bus; keep running until asked
   // to stop
   match daemon.orchestrator.initialize().await {
      Ok(state) => {
         info!("Adapter state after initialization: {state}");
         if state == AdapterState::Enabled {
            daemon.scan().await;
         }
      },
      Err(e) => warn!("Continuing without an initialized adapter: {e}"),
   }

   let shutdown = signal::ctrl_c();
   tokio::pin!(shutdown);

   loop {
      select! {
         res = &mut shutdown => {
            if let Err(e) = res {
               warn!("Failed to listen for shutdown signal: {e}");
            }
            break;
         }
         Some(notification) = event_bus.recv() => {
            daemon.handle(notification).await;
         }
      }
   }

   info!("Shutting down bleorch service...");
   daemon.orchestrator.shutdown().await?;

   Ok(())
}

struct Daemon {
   orchestrator: Orchestrator,
   config: Config,
   scanned: bool,
}

impl Daemon {
   async fn scan(&mut self) {
      self.scanned = true;
      if let Err(e) = self
         .orchestrator
         .start_scan(self.config.scan_filters(), self.config.scan_timeout())
         .await
      {
         warn!("Scan not started: {e}");
      }
   }

   async fn handle(&mut self, notification: Notification) {
      match notification {
         Notification::AdapterDisabled => {
            warn!("Bluetooth is disabled, trying to enable it...");
         },
         Notification::AdapterEnabled => {
            info!("Bluetooth enabled, you can now scan for devices");
            if !self.scanned {
               self.scan().await;
            }
         },
         Notification::AdapterEnableFailed { reason } => {
            warn!("Bluetooth couldn't be enabled ({reason}), please enable it manually");
         },
         Notification::ScanStarted => {
            info!("Scanning for devices...");
         },
         Notification::ScanStopped { count } => {
            info!("Scan stopped, found {count} devices");
            self.auto_connect().await;
         },
         Notification::DeviceConnected { device } => {
            info!("Device connected: {}", device.to_json());
         },
         Notification::Error { kind, message } => {
            error!("{kind}: {message}");
         },
      }
   }

   async fn auto_connect(&self) {
      if self.config.auto_connect.is_empty() {
         return;
      }
      let Ok(snapshot) = self.orchestrator.snapshot().await else {
         return;
      };

      let mut seen = HashSet::new();
      for device in snapshot.discovered {
         if !seen.insert(device.device_id.clone()) {
            continue;
         }
         let Some(name) = self.config.is_known_device(&device.device_id) else {
            continue;
         };
         info!("Connecting to known device {name} ({})", device.device_id);
         // Failures are reported through the event bus
         let _ = self.orchestrator.connect(device.device_id).await;
      }
   }
}

struct EventProcessor {
   queue: SegQueue<Notification>,
   notifier: Notify,
}

impl EventProcessor {
   fn new() -> Arc<Self> {
      Arc::new(Self {
         queue: SegQueue::new(),
         notifier: Notify::new(),
      })
   }

   async fn recv(self: &Arc<Self>) -> Option<Notification> {
      loop {
         if let Some(event) = self.queue.pop() {
            return Some(event);
         }
         let notify = self.notifier.notified();
         if let Some(event) = self.queue.pop() {
            return Some(event);
         }
         if Arc::strong_count(self) == 1 {
            return None;
         }
         let _ = time::timeout(Duration::from_secs(1), notify).await;
      }
   }
}

impl NotificationSink for EventProcessor {
   fn notify(&self, notification: Notification) {
      self.queue.push(notification);
      self.notifier.notify_waiters();
   }
}
