//! Adapter initialization, enablement and recovery polling.

use std::{future, time::Duration};

use log::{debug, info, warn};
use tokio::{
   task::JoinHandle,
   time::{self, Instant, MissedTickBehavior},
};

use crate::{
   bluetooth::{InitOptions, SharedStack},
   config::MIN_POLL_INTERVAL,
   error::{OrchestratorError, Result, StackError},
   event::{Notification, NotificationSender},
};

/// Lifecycle state of the local radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum AdapterState {
   #[default]
   Uninitialized,
   Initializing,
   Enabled,
   Disabled,
   Enabling,
   EnableFailed,
   Polling,
}

impl AdapterState {
   pub const fn is_initialized(self) -> bool {
      !matches!(self, Self::Uninitialized | Self::Initializing)
   }
}

/// Background task re-checking enablement until the radio comes up.
///
/// Aborted when dropped, so the task never outlives its owner.
struct PollLoop {
   handle: JoinHandle<u32>,
}

impl Drop for PollLoop {
   fn drop(&mut self) {
      self.handle.abort();
   }
}

pub struct AdapterManager {
   stack: SharedStack,
   events: NotificationSender,
   state: AdapterState,
   poll_interval: Duration,
   poll: Option<PollLoop>,
}

impl AdapterManager {
   pub fn new(stack: SharedStack, events: NotificationSender, poll_interval: Duration) -> Self {
      Self {
         stack,
         events,
         state: AdapterState::Uninitialized,
         poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
         poll: None,
      }
   }

   pub const fn state(&self) -> AdapterState {
      self.state
   }

   pub const fn is_enabled(&self) -> bool {
      matches!(self.state, AdapterState::Enabled)
   }

   pub fn is_polling(&self) -> bool {
      self.poll.is_some()
   }

   /// Performs one-time radio initialization. No-op once it has succeeded.
   pub async fn initialize(&mut self, options: &InitOptions) -> Result<()> {
      if self.state.is_initialized() {
         debug!("Adapter already initialized ({})", self.state);
         return Ok(());
      }

      self.state = AdapterState::Initializing;
      if let Err(e) = self.stack.initialize(options).await {
         self.state = AdapterState::Uninitialized;
         return Err(self.report(OrchestratorError::InitFailed(e)));
      }

      info!("Bluetooth initialized");
      self.state = AdapterState::Disabled;
      Ok(())
   }

   /// Queries current enablement without touching the tracked state.
   pub async fn check_enabled(&self) -> bool {
      self.stack.is_enabled().await
   }

   /// Records the outcome of the post-initialization enablement check.
   pub fn observe_enabled(&mut self, enabled: bool) {
      if enabled {
         info!("Bluetooth is enabled");
         self.state = AdapterState::Enabled;
      } else {
         info!("Bluetooth is disabled");
         self.state = AdapterState::Disabled;
         self.events.notify(Notification::AdapterDisabled);
      }
   }

   /// Requests the radio be turned on.
   ///
   /// Returns `Ok(true)` when the adapter transitioned to enabled, `Ok(false)`
   /// when it already was. On failure the error is reported once and the
   /// poll loop is started.
   pub async fn enable(&mut self) -> Result<bool> {
      match self.state {
         AdapterState::Enabled => return Ok(false),
         AdapterState::Uninitialized | AdapterState::Initializing => {
            let err = OrchestratorError::EnableFailed(StackError::not_initialized());
            return Err(self.report(err));
         },
         _ => {},
      }

      // A manual attempt replaces any running poll loop
      self.poll = None;
      self.state = AdapterState::Enabling;

      match self.stack.enable().await {
         Ok(()) => {
            self.mark_enabled();
            Ok(true)
         },
         Err(e) => {
            warn!("Bluetooth couldn't be enabled: {e}");
            self.state = AdapterState::EnableFailed;
            self.events.notify(Notification::AdapterEnableFailed {
               reason: e.to_string(),
            });
            self.start_poll();
            Err(OrchestratorError::EnableFailed(e))
         },
      }
   }

   fn start_poll(&mut self) {
      if self.poll.is_some() {
         return;
      }

      let stack = self.stack.clone();
      let interval = self.poll_interval;
      info!("Polling adapter every {interval:?} until it is enabled");

      let handle = tokio::spawn(async move {
         let mut ticker = time::interval_at(Instant::now() + interval, interval);
         ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

         let mut polls = 0;
         loop {
            ticker.tick().await;
            polls += 1;
            if stack.is_enabled().await {
               return polls;
            }
            debug!("Adapter still disabled after {polls} polls");
         }
      });

      self.poll = Some(PollLoop { handle });
      self.state = AdapterState::Polling;
   }

   /// Resolves once the poll loop observes the adapter enabled. Pending
   /// forever while no poll loop is running.
   ///
   /// A loop that dies without seeing the adapter enabled is reported once
   /// and not restarted; a manual `enable` starts a fresh one.
   pub async fn poll_finished(&mut self) -> Option<u32> {
      let Some(poll) = self.poll.as_mut() else {
         return future::pending().await;
      };
      let result = (&mut poll.handle).await;
      self.poll = None;

      match result {
         Ok(polls) => Some(polls),
         Err(e) => {
            self.state = AdapterState::EnableFailed;
            let err = StackError::new("PollFailed", format!("adapter poll loop ended: {e}"));
            self.report(OrchestratorError::Stack(err));
            None
         },
      }
   }

   /// Handles the poll loop observing the adapter enabled.
   pub fn recovered(&mut self, polls: u32) {
      info!("Bluetooth enabled after {polls} polls");
      self.mark_enabled();
   }

   fn mark_enabled(&mut self) {
      self.state = AdapterState::Enabled;
      self.events.notify(Notification::AdapterEnabled);
   }

   fn report(&self, err: OrchestratorError) -> OrchestratorError {
      warn!("{err}");
      self.events.notify(Notification::error(&err));
      err
   }

   /// Stops the poll loop, if any.
   pub fn teardown(&mut self) {
      if self.poll.take().is_some() {
         debug!("Adapter poll loop cancelled");
      }
   }
}
