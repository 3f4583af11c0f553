//! Pairing session controller.
//!
//! This module owns the session state and translates discrete intents
//! (refresh, remove-all, scan, select) into calls against the active
//! dongle. All state mutations flow through a single actor task, so the
//! keypress path and the device attach/detach path can never race.
//! Long-running provider calls (pairing, connecting, the bulk unpair
//! loop) and the scan stream run in spawned tasks that report back
//! through a loopback channel, keeping the actor responsive to detach
//! events.

use std::{future::Future, time::Duration};

use futures::StreamExt;
use log::{debug, info, warn};
use smol_str::SmolStr;
use tokio::{
   select,
   sync::{mpsc, oneshot},
   task::JoinHandle,
   time,
};

use crate::{
   config::Config,
   error::{PairingError, Result},
   event::{EventSender, Outcome, SessionEvent},
   provider::{ConnectionStatus, Dongle, PairingListEntry, ScanEntry},
   session::{InteractionMode, SessionState},
};

/// Channel buffer size
const CHANNEL_BUFFER_SIZE: usize = 64;

// === Reports ===

/// Aggregate result of a bulk unpair.
#[derive(Debug, Clone)]
pub struct RemoveAllReport {
   /// False if any entry failed to disconnect or unpair.
   pub success: bool,
   pub removed: usize,
   /// One message per failed entry.
   pub failures: Vec<String>,
}

// === Commands ===

enum ControllerCommand<D: Dongle> {
   // Watcher events
   BindDongle(SmolStr, D, oneshot::Sender<Result<()>>),
   DongleDetached(SmolStr),

   // User commands
   RefreshPairingList(oneshot::Sender<Result<Vec<PairingListEntry>>>),
   RemoveAllPairings(oneshot::Sender<Result<RemoveAllReport>>),
   StartScan(Duration, oneshot::Sender<Result<()>>),
   StopScan(oneshot::Sender<Result<()>>),
   Select(usize, oneshot::Sender<Result<()>>),
   PairWithScanResult(usize, Duration, oneshot::Sender<Result<()>>),
   ToggleConnection(usize, oneshot::Sender<Result<()>>),

   // Loopback from spawned tasks
   ScanEntryFound(ScanEntry),
   ScanFinished(Option<PairingError>),
   RemoveAllFinished(
      Result<RemoveAllReport>,
      oneshot::Sender<Result<RemoveAllReport>>,
   ),
   PairFinished(ScanEntry, Result<()>, oneshot::Sender<Result<()>>),
   ToggleFinished(
      PairingListEntry,
      &'static str,
      Result<()>,
      oneshot::Sender<Result<()>>,
   ),
}

// === Public handle ===

/// Handle to the session controller actor.
///
/// Methods send a command and await the reply. Validation failures
/// (no dongle, index out of range) surface as errors; operational
/// failures are reported through the event bus as [`Outcome`]s.
pub struct SessionController<D: Dongle> {
   inbox: mpsc::Sender<ControllerCommand<D>>,
}

impl<D: Dongle> Clone for SessionController<D> {
   fn clone(&self) -> Self {
      Self {
         inbox: self.inbox.clone(),
      }
   }
}

impl<D: Dongle> SessionController<D> {
   pub fn new(event_tx: EventSender, config: Config) -> Self {
      let (command_tx, command_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      let (loopback_tx, loopback_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      let actor = ControllerActor {
         config,
         event_tx,
         command_rx,
         loopback_rx,
         loopback_tx,
         state: SessionState::new(),
         scan_task: None,
      };
      tokio::spawn(actor.run());
      Self { inbox: command_tx }
   }

   async fn request<T>(
      &self,
      build: impl FnOnce(oneshot::Sender<Result<T>>) -> ControllerCommand<D>,
   ) -> Result<T> {
      let (tx, rx) = oneshot::channel();
      self
         .inbox
         .send(build(tx))
         .await
         .map_err(|_| PairingError::ControllerShutdown)?;
      rx.await.map_err(|_| PairingError::ControllerShutdown)?
   }

   /// Binds a dongle and performs the initial pairing-list refresh.
   /// Returns once both are done, so callers can sequence attach
   /// handling before accepting further input.
   pub async fn bind_dongle(&self, id: SmolStr, dongle: D) -> Result<()> {
      self
         .request(|tx| ControllerCommand::BindDongle(id, dongle, tx))
         .await
   }

   /// Reports a device detach. Ignored unless `id` is the bound dongle.
   pub async fn dongle_detached(&self, id: SmolStr) -> Result<()> {
      self
         .inbox
         .send(ControllerCommand::DongleDetached(id))
         .await
         .map_err(|_| PairingError::ControllerShutdown)
   }

   pub async fn refresh_pairing_list(&self) -> Result<Vec<PairingListEntry>> {
      self.request(ControllerCommand::RefreshPairingList).await
   }

   pub async fn remove_all_pairings(&self) -> Result<RemoveAllReport> {
      self.request(ControllerCommand::RemoveAllPairings).await
   }

   pub async fn start_scan(&self, duration: Duration) -> Result<()> {
      self
         .request(|tx| ControllerCommand::StartScan(duration, tx))
         .await
   }

   pub async fn stop_scan(&self) -> Result<()> {
      self.request(ControllerCommand::StopScan).await
   }

   /// Applies an index selection to whichever list the current
   /// interaction mode makes active.
   pub async fn select(&self, index: usize) -> Result<()> {
      self
         .request(|tx| ControllerCommand::Select(index, tx))
         .await
   }

   pub async fn pair_with_scan_result(&self, index: usize, timeout: Duration) -> Result<()> {
      self
         .request(|tx| ControllerCommand::PairWithScanResult(index, timeout, tx))
         .await
   }

   pub async fn toggle_connection(&self, index: usize) -> Result<()> {
      self
         .request(|tx| ControllerCommand::ToggleConnection(index, tx))
         .await
   }
}

// === Controller actor ===

struct ControllerActor<D: Dongle> {
   config: Config,
   event_tx: EventSender,
   command_rx: mpsc::Receiver<ControllerCommand<D>>,
   loopback_rx: mpsc::Receiver<ControllerCommand<D>>,
   loopback_tx: mpsc::Sender<ControllerCommand<D>>,
   state: SessionState<D>,
   scan_task: Option<JoinHandle<()>>,
}

impl<D: Dongle> ControllerActor<D> {
   async fn run(mut self) {
      loop {
         select! {
             cmd = self.command_rx.recv() => {
                 let Some(cmd) = cmd else {
                     info!("Session controller shutting down");
                     break;
                 };
                 self.handle_command(cmd).await;
             }
             Some(cmd) = self.loopback_rx.recv() => {
                 self.handle_command(cmd).await;
             }
         }
      }
      self.cancel_scan();
   }

   async fn handle_command(&mut self, cmd: ControllerCommand<D>) {
      match cmd {
         ControllerCommand::BindDongle(id, dongle, reply) => {
            self.cancel_scan();
            info!("Dongle bound: {} ({id})", dongle.name());
            self.state.bind(id, dongle);
            self
               .event_tx
               .emit(SessionEvent::DongleBound(self.state.dongle_name().clone()));
            let result = self.refresh().await;
            let _ = reply.send(result.map(|_| ()));
         },
         ControllerCommand::DongleDetached(id) => {
            self.handle_detached(&id);
         },
         ControllerCommand::RefreshPairingList(reply) => {
            let _ = reply.send(self.refresh().await);
         },
         ControllerCommand::RemoveAllPairings(reply) => {
            self.remove_all_pairings(reply);
         },
         ControllerCommand::StartScan(duration, reply) => {
            let _ = reply.send(self.start_scan(duration).await);
         },
         ControllerCommand::StopScan(reply) => {
            let _ = reply.send(self.stop_scan().await);
         },
         ControllerCommand::Select(index, reply) => {
            match self.state.mode() {
               InteractionMode::Pairing => {
                  let timeout = self.config.pair_timeout();
                  self.pair_with_scan_result(index, timeout, reply);
               },
               InteractionMode::ConnectDisconnect => {
                  self.toggle_connection(index, reply);
               },
               InteractionMode::Idle => {
                  let error = match self.state.dongle() {
                     Ok(_) => PairingError::IndexOutOfRange { index, len: 0 },
                     Err(e) => e,
                  };
                  let _ = reply.send(Err(error));
               },
            };
         },
         ControllerCommand::PairWithScanResult(index, timeout, reply) => {
            self.pair_with_scan_result(index, timeout, reply);
         },
         ControllerCommand::ToggleConnection(index, reply) => {
            self.toggle_connection(index, reply);
         },
         ControllerCommand::ScanEntryFound(entry) => {
            self.handle_scan_entry(entry);
         },
         ControllerCommand::ScanFinished(error) => {
            // A pair cancels the scan and reports its end directly; the
            // scan task's own notice then arrives late and is dropped.
            if self.scan_task.take().is_none() {
               debug!("Dropping scan-finished notice for a cancelled scan");
               return;
            }
            if let Some(e) = &error {
               warn!("Scan ended with error: {e}");
            }
            self.event_tx.emit(SessionEvent::ScanFinished {
               error: error.map(|e| e.to_string()),
            });
         },
         ControllerCommand::RemoveAllFinished(result, reply) => {
            if let Ok(report) = &result {
               let message = if report.success {
                  format!("removed {} pairings", report.removed)
               } else {
                  report.failures.join("; ")
               };
               self.event_tx.emit(SessionEvent::OperationReported(Outcome {
                  operation: "remove-all",
                  success: report.success,
                  message,
               }));
               if let Err(e) = self.refresh().await {
                  warn!("Pairing list refresh after remove-all failed: {e}");
               }
            }
            let _ = reply.send(result);
         },
         ControllerCommand::PairFinished(entry, result, reply) => {
            self
               .report_and_refresh("pair", &result, format!("paired and connected {}", entry.name))
               .await;
            let _ = reply.send(Ok(()));
         },
         ControllerCommand::ToggleFinished(entry, action, result, reply) => {
            self
               .report_and_refresh(action, &result, format!("{action}ed {}", entry.name))
               .await;
            let _ = reply.send(Ok(()));
         },
      }
   }

   fn handle_detached(&mut self, id: &str) {
      if !self.state.is_bound_to(id) {
         debug!("Ignoring detach of unbound device {id}");
         return;
      }
      self.cancel_scan();
      let name = self.state.dongle_name().clone();
      self.state.clear();
      info!("Dongle detached: {name}");
      self.event_tx.emit(SessionEvent::DongleLost(name));
   }

   /// Fetches the pairing list, replaces session state, and redisplays.
   async fn refresh(&mut self) -> Result<Vec<PairingListEntry>> {
      let dongle = self.state.dongle()?.clone();
      let list = dongle.pairing_list().await?;
      self.state.set_pairing_list(list.clone());
      self
         .event_tx
         .emit(SessionEvent::PairingListUpdated(list.clone()));
      Ok(list)
   }

   fn remove_all_pairings(&mut self, reply: oneshot::Sender<Result<RemoveAllReport>>) {
      let dongle = match self.state.dongle().cloned() {
         Ok(dongle) => dongle,
         Err(e) => {
            let _ = reply.send(Err(e));
            return;
         },
      };

      // The bulk loop runs off the actor with every provider call
      // individually time-bounded, so a hung dongle cannot starve
      // detach handling.
      let per_call_timeout = self.config.connect_timeout();
      let loopback = self.loopback_tx.clone();
      tokio::spawn(async move {
         let result = run_remove_all(&dongle, per_call_timeout).await;
         let _ = loopback
            .send(ControllerCommand::RemoveAllFinished(result, reply))
            .await;
      });
   }

   async fn start_scan(&mut self, duration: Duration) -> Result<()> {
      let dongle = self.state.dongle()?.clone();
      if self.scan_task.is_some() {
         return Err(PairingError::ScanInProgress);
      }

      let mut scan = dongle.scan_for_pairing_devices(duration).await?;
      self.state.begin_scan();
      self.event_tx.emit(SessionEvent::ScanStarted);

      let loopback = self.loopback_tx.clone();
      self.scan_task = Some(tokio::spawn(async move {
         let deadline = time::sleep(duration);
         tokio::pin!(deadline);

         let error = loop {
            select! {
                () = &mut deadline => break None,
                item = scan.next() => match item {
                    Some(Ok(entry)) => {
                        if loopback
                            .send(ControllerCommand::ScanEntryFound(entry))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    },
                    Some(Err(e)) => break Some(e),
                    None => break None,
                }
            }
         };

         if let Err(e) = dongle.stop_scanning().await {
            debug!("stop_scanning at scan end failed: {e}");
         }
         let _ = loopback.send(ControllerCommand::ScanFinished(error)).await;
      }));

      Ok(())
   }

   async fn stop_scan(&mut self) -> Result<()> {
      // Idempotent when no scan is active.
      if self.scan_task.is_none() {
         return Ok(());
      }
      // Cooperative: the provider ends the stream, the scan task then
      // reports ScanFinished through the loopback.
      let dongle = self.state.dongle()?.clone();
      dongle.stop_scanning().await?;
      Ok(())
   }

   fn handle_scan_entry(&mut self, entry: ScanEntry) {
      // Entries may still arrive after a stop or mode change; drop them.
      if self.scan_task.is_none() || self.state.mode() != InteractionMode::Pairing {
         debug!("Dropping late scan entry {}", entry.name);
         return;
      }
      let index = self.state.push_scan_entry(entry.clone());
      self
         .event_tx
         .emit(SessionEvent::ScanEntryFound(index, entry));
   }

   fn pair_with_scan_result(
      &mut self,
      index: usize,
      timeout: Duration,
      reply: oneshot::Sender<Result<()>>,
   ) {
      let validated = self
         .state
         .dongle()
         .cloned()
         .and_then(|dongle| Ok((dongle, self.state.scan_entry(index)?.clone())));
      let (dongle, entry) = match validated {
         Ok(v) => v,
         Err(e) => {
            let _ = reply.send(Err(e));
            return;
         },
      };

      // Invoking a pair terminates the scan.
      if self.scan_task.is_some() {
         self.cancel_scan();
         self.event_tx.emit(SessionEvent::ScanFinished { error: None });
      }

      info!("Pairing with {} ({})", entry.name, entry.address);
      let loopback = self.loopback_tx.clone();
      tokio::spawn(async move {
         let result = timed(timeout, dongle.pair_and_connect(&entry, timeout)).await;
         let _ = loopback
            .send(ControllerCommand::PairFinished(entry, result, reply))
            .await;
      });
   }

   fn toggle_connection(&mut self, index: usize, reply: oneshot::Sender<Result<()>>) {
      let validated = self
         .state
         .dongle()
         .cloned()
         .and_then(|dongle| Ok((dongle, self.state.pairing_entry(index)?.clone())));
      let (dongle, entry) = match validated {
         Ok(v) => v,
         Err(e) => {
            let _ = reply.send(Err(e));
            return;
         },
      };

      let action = match entry.status {
         ConnectionStatus::Connected | ConnectionStatus::None => "disconnect",
         _ => "connect",
      };
      let connect_timeout = self.config.connect_timeout();

      info!("{action} requested for {} ({})", entry.name, entry.address);
      let loopback = self.loopback_tx.clone();
      tokio::spawn(async move {
         let result = if action == "disconnect" {
            dongle.disconnect(&entry).await
         } else {
            timed(connect_timeout, dongle.connect(&entry, connect_timeout)).await
         };
         let _ = loopback
            .send(ControllerCommand::ToggleFinished(entry, action, result, reply))
            .await;
      });
   }

   /// Emits the operation outcome and re-fetches the pairing list. The
   /// provider-side state may have changed even on failure, so the
   /// refresh happens unconditionally.
   async fn report_and_refresh(
      &mut self,
      operation: &'static str,
      result: &Result<()>,
      success_message: String,
   ) {
      let (success, message) = match result {
         Ok(()) => (true, success_message),
         Err(e) => (false, format!("{operation} failed: {e}")),
      };
      if !success {
         warn!("{message}");
      }
      self.event_tx.emit(SessionEvent::OperationReported(Outcome {
         operation,
         success,
         message,
      }));

      if let Err(e) = self.refresh().await {
         warn!("Pairing list refresh after {operation} failed: {e}");
      }
   }

   fn cancel_scan(&mut self) {
      let Some(handle) = self.scan_task.take() else {
         return;
      };
      handle.abort();
      // Ask the provider to stop as well; entries already in flight are
      // tolerated by handle_scan_entry.
      if let Ok(dongle) = self.state.dongle() {
         let dongle = dongle.clone();
         tokio::spawn(async move {
            if let Err(e) = dongle.stop_scanning().await {
               debug!("stop_scanning after cancel failed: {e}");
            }
         });
      }
   }
}

/// Bounds a provider call, mapping expiry to [`PairingError::RequestTimeout`].
async fn timed<T>(limit: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
   match time::timeout(limit, call).await {
      Ok(result) => result,
      Err(_) => Err(PairingError::RequestTimeout),
   }
}

async fn run_remove_all<D: Dongle>(dongle: &D, per_call_timeout: Duration) -> Result<RemoveAllReport> {
   let entries = timed(per_call_timeout, dongle.pairing_list()).await?;

   let mut report = RemoveAllReport {
      success: true,
      removed: 0,
      failures: Vec::new(),
   };

   for entry in &entries {
      let mut failed = false;

      // An entry the dongle reports no link state for has nothing to
      // tear down; everything else gets a disconnect before unpair.
      if entry.status != ConnectionStatus::None
         && let Err(e) = timed(per_call_timeout, dongle.disconnect(entry)).await
      {
         // The unpair may still succeed; note the failure and go on.
         report.failures.push(format!("disconnect {} failed: {e}", entry.name));
         failed = true;
      }

      match timed(per_call_timeout, dongle.unpair(entry)).await {
         Ok(()) => report.removed += 1,
         Err(e) => {
            report.failures.push(format!("unpair {} failed: {e}", entry.name));
            failed = true;
         },
      }

      if failed {
         report.success = false;
      }
   }

   Ok(report)
}
