//! Dongle capability provider surface.
//!
//! Everything behind these traits is a black box: device discovery,
//! the pairing state machine, and dongle firmware communication are the
//! provider's problem. The rest of the crate only consumes attach/detach
//! events, dongle construction, and the per-dongle operations below.

use std::{future::Future, time::Duration};

use futures::stream::BoxStream;
use smol_str::SmolStr;

use crate::error::Result;

pub mod bluez;
#[cfg(test)]
pub mod mock;

/// Identity of an attached device as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
   /// Stable identifier while the device stays attached.
   pub id: SmolStr,
   /// Display name, matched against the configured dongle patterns.
   pub name: SmolStr,
}

/// Link state of a paired device as known to the dongle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
   /// The dongle reports no link state for this entry.
   None,
   Disconnected,
   Connected,
   Connecting,
   Disconnecting,
}

impl ConnectionStatus {
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::None => "none",
         Self::Disconnected => "disconnected",
         Self::Connected => "connected",
         Self::Connecting => "connecting",
         Self::Disconnecting => "disconnecting",
      }
   }
}

/// A remote device the dongle remembers as paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingListEntry {
   pub name: SmolStr,
   pub address: SmolStr,
   pub status: ConnectionStatus,
}

/// A nearby device found during a pairing-mode scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
   pub name: SmolStr,
   pub address: SmolStr,
}

/// Attach/detach notifications for provider-visible devices.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
   Attached(DeviceDescriptor),
   Detached(DeviceDescriptor),
}

pub type DeviceEvents = BoxStream<'static, DeviceEvent>;
pub type ScanStream = BoxStream<'static, Result<ScanEntry>>;

/// Entry point into the capability provider.
pub trait DongleProvider: Send + Sync + 'static {
   type Dongle: Dongle;

   /// Stream of device attach/detach events. Devices already attached
   /// when the stream is created are reported as attached.
   fn events(&self) -> impl Future<Output = Result<DeviceEvents>> + Send;

   /// Turns an attached device into a dongle handle, or `None` if the
   /// device is not a dongle the provider can drive.
   fn create_dongle(
      &self,
      device: &DeviceDescriptor,
   ) -> impl Future<Output = Result<Option<Self::Dongle>>> + Send;
}

/// One attached Bluetooth dongle.
///
/// Handles are cheap to clone; all clones drive the same dongle.
pub trait Dongle: Clone + Send + Sync + 'static {
   fn name(&self) -> SmolStr;

   /// Fetches the dongle's current pairing list. Order is defined by
   /// the provider and must be preserved.
   fn pairing_list(&self) -> impl Future<Output = Result<Vec<PairingListEntry>>> + Send;

   /// Starts a pairing-mode scan. Entries are yielded as they are
   /// discovered. `duration` is a hint; the caller bounds the stream
   /// as well.
   fn scan_for_pairing_devices(
      &self,
      duration: Duration,
   ) -> impl Future<Output = Result<ScanStream>> + Send;

   /// Asks the provider to end an in-progress scan. Entries already in
   /// flight may still arrive after this returns.
   fn stop_scanning(&self) -> impl Future<Output = Result<()>> + Send;

   fn pair_and_connect(
      &self,
      entry: &ScanEntry,
      timeout: Duration,
   ) -> impl Future<Output = Result<()>> + Send;

   fn connect(
      &self,
      entry: &PairingListEntry,
      timeout: Duration,
   ) -> impl Future<Output = Result<()>> + Send;

   fn disconnect(&self, entry: &PairingListEntry) -> impl Future<Output = Result<()>> + Send;

   fn unpair(&self, entry: &PairingListEntry) -> impl Future<Output = Result<()>> + Send;
}
