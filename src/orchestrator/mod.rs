//! Adapter, scan and connection orchestration.
//!
//! A single actor task owns all orchestration state and serialises every
//! operation, so registry mutations never race each other. [`Orchestrator`]
//! is the cheap, cloneable handle used to talk to it.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::{
   select,
   sync::{mpsc, oneshot},
};

use crate::{
   bluetooth::{InitOptions, ScanFilters, SharedStack},
   config::Config,
   device::{Device, DeviceId},
   error::{OrchestratorError, Result},
   event::NotificationSender,
};

pub mod adapter;
pub mod connection;
pub mod registry;
pub mod scan;

pub use adapter::{AdapterManager, AdapterState};
pub use connection::ConnectionManager;
pub use registry::DeviceRegistry;
pub use scan::{ScanEvent, ScanSession, ScanState};

/// Channel buffer size
const CHANNEL_BUFFER_SIZE: usize = 64;

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
   pub adapter: AdapterState,
   pub scan: ScanState,
   pub discovered: Vec<Device>,
   pub connected: Vec<Device>,
}

/// Everything the orchestrator tracks.
pub struct OrchestratorState {
   pub adapter: AdapterManager,
   pub registry: DeviceRegistry,
   pub scan: ScanSession,
   pub connections: ConnectionManager,
}

impl OrchestratorState {
   pub fn new(stack: SharedStack, events: NotificationSender, config: &Config) -> Self {
      Self {
         adapter: AdapterManager::new(stack.clone(), events.clone(), config.poll_interval()),
         registry: DeviceRegistry::new(),
         scan: ScanSession::new(stack.clone(), events.clone()),
         connections: ConnectionManager::new(stack, events, config.connected_services.clone()),
      }
   }

   pub fn snapshot(&self) -> Snapshot {
      Snapshot {
         adapter: self.adapter.state(),
         scan: self.scan.state(),
         discovered: self.registry.discovered().to_vec(),
         connected: self.registry.connected().to_vec(),
      }
   }
}

// === Commands ===

enum Command {
   Initialize(oneshot::Sender<Result<AdapterState>>),
   CheckEnabled(oneshot::Sender<bool>),
   Enable(oneshot::Sender<Result<()>>),
   StartScan {
      filters: ScanFilters,
      timeout: Duration,
      reply: oneshot::Sender<Result<()>>,
   },
   StopScan(oneshot::Sender<Option<usize>>),
   Connect(DeviceId, oneshot::Sender<Result<Device>>),
   ConnectedDevices(oneshot::Sender<Result<Vec<Device>>>),
   Snapshot(oneshot::Sender<Snapshot>),
   Shutdown(oneshot::Sender<()>),
}

// === Handle ===

/// Handle to the orchestrator actor.
///
/// The actor tears itself down once every handle is dropped or
/// [`Orchestrator::shutdown`] is called.
#[derive(Clone)]
pub struct Orchestrator {
   inbox: mpsc::Sender<Command>,
}

impl Orchestrator {
   /// Spawns the orchestrator actor on the current tokio runtime.
   pub fn new(stack: SharedStack, events: NotificationSender, config: Config) -> Self {
      let (command_tx, command_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      tokio::spawn(OrchestratorActor::new(stack, events, config, command_rx).run());
      Self { inbox: command_tx }
   }

   async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
      let (tx, rx) = oneshot::channel();
      self
         .inbox
         .send(command(tx))
         .await
         .map_err(|_| OrchestratorError::ManagerShutdown)?;
      rx.await.map_err(|_| OrchestratorError::ManagerShutdown)
   }

   /// Initializes the radio and brings it up, returning the resulting state.
   ///
   /// An already enabled adapter has its connected devices queried; a
   /// disabled one is enabled, falling back to polling if that fails.
   pub async fn initialize(&self) -> Result<AdapterState> {
      self.request(Command::Initialize).await?
   }

   pub async fn check_enabled(&self) -> Result<bool> {
      self.request(Command::CheckEnabled).await
   }

   pub async fn enable(&self) -> Result<()> {
      self.request(Command::Enable).await?
   }

   pub async fn start_scan(&self, filters: ScanFilters, timeout: Duration) -> Result<()> {
      self
         .request(|reply| Command::StartScan {
            filters,
            timeout,
            reply,
         })
         .await?
   }

   /// Stops the running scan. Returns the discovered count, or `None` if no
   /// scan was running.
   pub async fn stop_scan(&self) -> Result<Option<usize>> {
      self.request(Command::StopScan).await
   }

   pub async fn connect(&self, device_id: impl Into<DeviceId>) -> Result<Device> {
      let device_id = device_id.into();
      self
         .request(|reply| Command::Connect(device_id, reply))
         .await?
   }

   pub async fn connected_devices(&self) -> Result<Vec<Device>> {
      self.request(Command::ConnectedDevices).await?
   }

   pub async fn snapshot(&self) -> Result<Snapshot> {
      self.request(Command::Snapshot).await
   }

   /// Stops any active scan and poll loop, then ends the actor.
   pub async fn shutdown(&self) -> Result<()> {
      self.request(Command::Shutdown).await
   }
}

// === Actor ===

struct OrchestratorActor {
   state: OrchestratorState,
   init_options: InitOptions,
   command_rx: mpsc::Receiver<Command>,
}

impl OrchestratorActor {
   fn new(
      stack: SharedStack,
      events: NotificationSender,
      config: Config,
      command_rx: mpsc::Receiver<Command>,
   ) -> Self {
      Self {
         state: OrchestratorState::new(stack, events, &config),
         init_options: config.init_options(),
         command_rx,
      }
   }

   async fn run(mut self) {
      info!("Orchestrator starting up");

      let shutdown_reply = loop {
         select! {
            cmd = self.command_rx.recv() => {
               match cmd {
                  Some(Command::Shutdown(reply)) => break Some(reply),
                  Some(cmd) => self.handle_command(cmd).await,
                  None => break None,
               }
            }
            event = self.state.scan.next_event() => {
               self.handle_scan_event(event).await;
            }
            Some(polls) = self.state.adapter.poll_finished() => {
               self.handle_recovered(polls).await;
            }
         }
      };

      self.cleanup().await;
      if let Some(reply) = shutdown_reply {
         let _ = reply.send(());
      }
      info!("Orchestrator shut down");
   }

   async fn handle_command(&mut self, cmd: Command) {
      match cmd {
         Command::Initialize(reply) => {
            let result = self.initialize().await;
            let _ = reply.send(result);
         },
         Command::CheckEnabled(reply) => {
            let enabled = self.state.adapter.check_enabled().await;
            let _ = reply.send(enabled);
         },
         Command::Enable(reply) => {
            let result = self.enable().await;
            let _ = reply.send(result);
         },
         Command::StartScan {
            filters,
            timeout,
            reply,
         } => {
            let enabled = self.state.adapter.is_enabled();
            let result = self
               .state
               .scan
               .start(&mut self.state.registry, enabled, &filters, timeout)
               .await;
            let _ = reply.send(result);
         },
         Command::StopScan(reply) => {
            let count = self.state.scan.stop(&mut self.state.registry).await;
            let _ = reply.send(count);
         },
         Command::Connect(device_id, reply) => {
            let enabled = self.state.adapter.is_enabled();
            let result = self
               .state
               .connections
               .connect(&mut self.state.registry, enabled, device_id)
               .await;
            let _ = reply.send(result);
         },
         Command::ConnectedDevices(reply) => {
            let result = self
               .state
               .connections
               .connected_devices(&mut self.state.registry)
               .await;
            let _ = reply.send(result);
         },
         Command::Snapshot(reply) => {
            let _ = reply.send(self.state.snapshot());
         },
         Command::Shutdown(reply) => {
            // Intercepted by the run loop
            let _ = reply.send(());
         },
      }
   }

   async fn initialize(&mut self) -> Result<AdapterState> {
      if self.state.adapter.state().is_initialized() {
         debug!("Ignoring repeated initialization");
         return Ok(self.state.adapter.state());
      }

      self.state.adapter.initialize(&self.init_options).await?;

      let enabled = self.state.adapter.check_enabled().await;
      self.state.adapter.observe_enabled(enabled);
      if enabled {
         self.refresh_connected().await;
      } else if let Err(e) = self.enable().await {
         debug!("Adapter left disabled after initialization: {e}");
      }

      Ok(self.state.adapter.state())
   }

   async fn enable(&mut self) -> Result<()> {
      if self.state.adapter.enable().await? {
         self.refresh_connected().await;
      }
      Ok(())
   }

   async fn handle_recovered(&mut self, polls: u32) {
      self.state.adapter.recovered(polls);
      self.refresh_connected().await;
   }

   async fn refresh_connected(&mut self) {
      // Failures are already reported to the sink
      let _ = self
         .state
         .connections
         .connected_devices(&mut self.state.registry)
         .await;
   }

   async fn handle_scan_event(&mut self, event: ScanEvent) {
      match event {
         ScanEvent::Discovered(result) => {
            self.state.scan.accept(&mut self.state.registry, result);
         },
         ScanEvent::TimedOut => {
            debug!("Scan timeout reached");
            self.state.scan.stop(&mut self.state.registry).await;
         },
      }
   }

   async fn cleanup(&mut self) {
      info!("Cleaning up orchestrator");
      self.state.adapter.teardown();
      if self.state.scan.stop(&mut self.state.registry).await.is_some() {
         warn!("Scan was still running at shutdown");
      }
   }
}
