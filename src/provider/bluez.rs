//! BlueZ-backed dongle capability provider.
//!
//! An attached Bluetooth adapter plays the dongle role: the adapter's
//! device list is the pairing list, discovery is the pairing-mode scan,
//! and pair/connect/disconnect/remove-device are the dongle operations.
//! No pairing protocol is implemented here; BlueZ is the black box.

use std::{collections::HashSet, sync::Arc, time::Duration};

use bluer::{Adapter, AdapterEvent, Address, Session};
use futures::{StreamExt, stream};
use log::{debug, info, warn};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::{select, sync::mpsc, task::JoinHandle, time};

use crate::{
   error::{PairingError, Result},
   provider::{
      ConnectionStatus, DeviceDescriptor, DeviceEvent, DeviceEvents, Dongle, DongleProvider,
      PairingListEntry, ScanEntry, ScanStream,
   },
};

/// Interval to poll for adapters appearing or disappearing.
const ADAPTER_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Provider backed by the system BlueZ daemon.
pub struct BlueZProvider {
   session: Session,
}

impl BlueZProvider {
   pub async fn new() -> Result<Self> {
      Ok(Self {
         session: Session::new().await?,
      })
   }
}

impl DongleProvider for BlueZProvider {
   type Dongle = BlueZDongle;

   async fn events(&self) -> Result<DeviceEvents> {
      let session = self.session.clone();
      let (tx, mut rx) = mpsc::unbounded_channel();

      // BlueZ has no adapter hotplug stream we can rely on, so poll the
      // adapter list and diff it, reporting adapters present at startup
      // as attached.
      tokio::spawn(async move {
         let mut known: HashSet<SmolStr> = HashSet::new();
         let mut poll = time::interval(ADAPTER_POLL_INTERVAL);
         poll.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

         loop {
            poll.tick().await;
            // Stop polling D-Bus once the event stream is gone.
            if tx.is_closed() {
               return;
            }

            let names = match session.adapter_names().await {
               Ok(names) => names,
               Err(e) => {
                  warn!("Failed to poll adapter names: {e}. Retrying later.");
                  continue;
               },
            };

            let current: HashSet<SmolStr> = names.into_iter().map(SmolStr::from).collect();

            for name in current.difference(&known) {
               let descriptor = describe_adapter(&session, name).await;
               if tx.send(DeviceEvent::Attached(descriptor)).is_err() {
                  return;
               }
            }
            for name in known.difference(&current) {
               let descriptor = DeviceDescriptor {
                  id: name.clone(),
                  name: name.clone(),
               };
               if tx.send(DeviceEvent::Detached(descriptor)).is_err() {
                  return;
               }
            }

            known = current;
         }
      });

      Ok(Box::pin(stream::poll_fn(move |cx| rx.poll_recv(cx))))
   }

   async fn create_dongle(&self, device: &DeviceDescriptor) -> Result<Option<BlueZDongle>> {
      let Ok(adapter) = self.session.adapter(&device.id) else {
         // Already gone again; not a dongle we can drive.
         return Ok(None);
      };

      if let Ok(powered) = adapter.is_powered().await
         && !powered
      {
         adapter.set_powered(true).await?;
         info!("Powered on adapter {}", device.id);
      }

      Ok(Some(BlueZDongle {
         adapter,
         name: device.name.clone(),
         scan_task: Arc::new(Mutex::new(None)),
      }))
   }
}

async fn describe_adapter(session: &Session, name: &SmolStr) -> DeviceDescriptor {
   let alias = match session.adapter(name) {
      Ok(adapter) => adapter.alias().await.ok().map(SmolStr::from),
      Err(_) => None,
   };
   DeviceDescriptor {
      id: name.clone(),
      name: alias.unwrap_or_else(|| name.clone()),
   }
}

/// One BlueZ adapter acting as the active dongle.
#[derive(Clone)]
pub struct BlueZDongle {
   adapter: Adapter,
   name: SmolStr,
   scan_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl BlueZDongle {
   fn parse_address(address: &str) -> Result<Address> {
      address
         .parse()
         .map_err(|_| PairingError::Provider(format!("invalid address {address}")))
   }

   fn abort_scan_task(&self) {
      if let Some(handle) = self.scan_task.lock().take() {
         // Dropping the discovery stream ends the BlueZ discovery
         // session.
         handle.abort();
      }
   }
}

impl Dongle for BlueZDongle {
   fn name(&self) -> SmolStr {
      self.name.clone()
   }

   async fn pairing_list(&self) -> Result<Vec<PairingListEntry>> {
      let mut entries = Vec::new();
      for addr in self.adapter.device_addresses().await? {
         let Ok(device) = self.adapter.device(addr) else {
            continue;
         };
         if !device.is_paired().await.unwrap_or(false) {
            continue;
         }
         let name = device
            .name()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| addr.to_string());
         let status = if device.is_connected().await.unwrap_or(false) {
            ConnectionStatus::Connected
         } else {
            ConnectionStatus::Disconnected
         };
         entries.push(PairingListEntry {
            name: name.into(),
            address: addr.to_string().into(),
            status,
         });
      }
      Ok(entries)
   }

   async fn scan_for_pairing_devices(&self, duration: Duration) -> Result<ScanStream> {
      self.abort_scan_task();

      let adapter = self.adapter.clone();
      let (tx, mut rx) = mpsc::unbounded_channel();

      let handle = tokio::spawn(async move {
         let resolver = adapter.clone();
         let discovery = match adapter.discover_devices().await {
            Ok(discovery) => discovery,
            Err(e) => {
               let _ = tx.send(Err(PairingError::Scan(e.to_string())));
               return;
            },
         };
         tokio::pin!(discovery);

         let deadline = time::sleep(duration);
         tokio::pin!(deadline);

         let mut seen = HashSet::new();
         loop {
            select! {
                () = &mut deadline => break,
                event = discovery.next() => {
                    let Some(event) = event else { break };
                    let AdapterEvent::DeviceAdded(addr) = event else { continue };
                    if !seen.insert(addr) {
                        continue;
                    }
                    let Ok(device) = resolver.device(addr) else { continue };
                    // Already-paired devices are not pairing candidates.
                    if device.is_paired().await.unwrap_or(false) {
                        debug!("Skipping already-paired device {addr}");
                        continue;
                    }
                    let name = device
                        .name()
                        .await
                        .ok()
                        .flatten()
                        .unwrap_or_else(|| addr.to_string());
                    let entry = ScanEntry {
                        name: name.into(),
                        address: addr.to_string().into(),
                    };
                    if tx.send(Ok(entry)).is_err() {
                        break;
                    }
                }
            }
         }
      });

      *self.scan_task.lock() = Some(handle);
      Ok(Box::pin(stream::poll_fn(move |cx| rx.poll_recv(cx))))
   }

   async fn stop_scanning(&self) -> Result<()> {
      self.abort_scan_task();
      Ok(())
   }

   async fn pair_and_connect(&self, entry: &ScanEntry, timeout: Duration) -> Result<()> {
      let addr = Self::parse_address(&entry.address)?;
      let device = self.adapter.device(addr)?;

      let pair_and_connect = async {
         if !device.is_paired().await.unwrap_or(false) {
            device.pair().await?;
         }
         device.connect().await?;
         Ok::<(), PairingError>(())
      };
      time::timeout(timeout, pair_and_connect)
         .await
         .map_err(|_| PairingError::RequestTimeout)?
   }

   async fn connect(&self, entry: &PairingListEntry, timeout: Duration) -> Result<()> {
      let addr = Self::parse_address(&entry.address)?;
      let device = self.adapter.device(addr)?;
      time::timeout(timeout, device.connect())
         .await
         .map_err(|_| PairingError::RequestTimeout)?
         .map_err(Into::into)
   }

   async fn disconnect(&self, entry: &PairingListEntry) -> Result<()> {
      let addr = Self::parse_address(&entry.address)?;
      let device = self.adapter.device(addr)?;
      device.disconnect().await?;
      Ok(())
   }

   async fn unpair(&self, entry: &PairingListEntry) -> Result<()> {
      let addr = Self::parse_address(&entry.address)?;
      self.adapter.remove_device(addr).await?;
      Ok(())
   }
}
