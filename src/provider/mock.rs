//! Call-recording provider used by controller and watcher tests.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::sync::mpsc;

use crate::{
   error::{PairingError, Result},
   provider::{
      ConnectionStatus, DeviceDescriptor, DeviceEvent, DeviceEvents, Dongle, DongleProvider,
      PairingListEntry, ScanEntry, ScanStream,
   },
};

/// One recorded provider call, by entry name where applicable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
   PairingList,
   Scan,
   StopScan,
   PairAndConnect(SmolStr),
   Connect(SmolStr),
   Disconnect(SmolStr),
   Unpair(SmolStr),
}

#[derive(Debug, Default)]
struct MockInner {
   pairing_list: Mutex<Vec<PairingListEntry>>,
   calls: Mutex<Vec<MockCall>>,
   scan_tx: Mutex<Option<mpsc::UnboundedSender<Result<ScanEntry>>>>,
   fail_pair: Mutex<bool>,
   fail_unpair: Mutex<Vec<SmolStr>>,
   hang_disconnect: Mutex<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct MockDongle(Arc<MockInner>);

impl MockDongle {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn set_pairing_list(&self, list: Vec<PairingListEntry>) {
      *self.0.pairing_list.lock() = list;
   }

   pub fn calls(&self) -> Vec<MockCall> {
      self.0.calls.lock().clone()
   }

   /// Feeds an entry into the active scan stream.
   pub fn push_scan_entry(&self, entry: ScanEntry) {
      if let Some(tx) = &*self.0.scan_tx.lock() {
         let _ = tx.send(Ok(entry));
      }
   }

   /// Makes the active scan stream report an error.
   pub fn push_scan_error(&self, message: &str) {
      if let Some(tx) = &*self.0.scan_tx.lock() {
         let _ = tx.send(Err(PairingError::Scan(message.into())));
      }
   }

   /// Makes subsequent pair attempts time out.
   pub fn fail_pair(&self, fail: bool) {
      *self.0.fail_pair.lock() = fail;
   }

   /// Makes unpairing the named entry fail.
   pub fn fail_unpair_of(&self, name: &str) {
      self.0.fail_unpair.lock().push(name.into());
   }

   /// Makes disconnect calls never return.
   pub fn hang_disconnect(&self) {
      *self.0.hang_disconnect.lock() = true;
   }

   fn record(&self, call: MockCall) {
      self.0.calls.lock().push(call);
   }
}

impl Dongle for MockDongle {
   fn name(&self) -> SmolStr {
      SmolStr::new_static("Mock Dongle")
   }

   async fn pairing_list(&self) -> Result<Vec<PairingListEntry>> {
      self.record(MockCall::PairingList);
      Ok(self.0.pairing_list.lock().clone())
   }

   async fn scan_for_pairing_devices(&self, _duration: Duration) -> Result<ScanStream> {
      self.record(MockCall::Scan);
      let (tx, mut rx) = mpsc::unbounded_channel();
      *self.0.scan_tx.lock() = Some(tx);
      Ok(Box::pin(futures::stream::poll_fn(move |cx| {
         rx.poll_recv(cx)
      })))
   }

   async fn stop_scanning(&self) -> Result<()> {
      self.record(MockCall::StopScan);
      // Dropping the sender ends the stream.
      self.0.scan_tx.lock().take();
      Ok(())
   }

   async fn pair_and_connect(&self, entry: &ScanEntry, _timeout: Duration) -> Result<()> {
      self.record(MockCall::PairAndConnect(entry.name.clone()));
      if *self.0.fail_pair.lock() {
         return Err(PairingError::RequestTimeout);
      }
      self.0.pairing_list.lock().push(PairingListEntry {
         name: entry.name.clone(),
         address: entry.address.clone(),
         status: ConnectionStatus::Connected,
      });
      Ok(())
   }

   async fn connect(&self, entry: &PairingListEntry, _timeout: Duration) -> Result<()> {
      self.record(MockCall::Connect(entry.name.clone()));
      Ok(())
   }

   async fn disconnect(&self, entry: &PairingListEntry) -> Result<()> {
      self.record(MockCall::Disconnect(entry.name.clone()));
      if *self.0.hang_disconnect.lock() {
         futures::future::pending::<()>().await;
      }
      Ok(())
   }

   async fn unpair(&self, entry: &PairingListEntry) -> Result<()> {
      self.record(MockCall::Unpair(entry.name.clone()));
      if self.0.fail_unpair.lock().contains(&entry.name) {
         return Err(PairingError::Provider(format!(
            "dongle is busy with {}",
            entry.name
         )));
      }
      self
         .0
         .pairing_list
         .lock()
         .retain(|e| e.address != entry.address);
      Ok(())
   }
}

/// Provider handing out a single shared [`MockDongle`]. Devices whose
/// name does not contain "Dongle" are rejected as non-dongles.
pub struct MockProvider {
   dongle: MockDongle,
   events_tx: mpsc::UnboundedSender<DeviceEvent>,
   events_rx: Mutex<Option<mpsc::UnboundedReceiver<DeviceEvent>>>,
}

impl MockProvider {
   pub fn new(dongle: MockDongle) -> Self {
      let (events_tx, events_rx) = mpsc::unbounded_channel();
      Self {
         dongle,
         events_tx,
         events_rx: Mutex::new(Some(events_rx)),
      }
   }

   pub fn emit(&self, event: DeviceEvent) {
      let _ = self.events_tx.send(event);
   }
}

impl DongleProvider for MockProvider {
   type Dongle = MockDongle;

   async fn events(&self) -> Result<DeviceEvents> {
      let mut rx = self
         .events_rx
         .lock()
         .take()
         .ok_or_else(|| PairingError::Provider("event stream already taken".into()))?;
      Ok(Box::pin(futures::stream::poll_fn(move |cx| {
         rx.poll_recv(cx)
      })))
   }

   async fn create_dongle(&self, device: &DeviceDescriptor) -> Result<Option<MockDongle>> {
      if device.name.contains("Dongle") {
         Ok(Some(self.dongle.clone()))
      } else {
         Ok(None)
      }
   }
}
