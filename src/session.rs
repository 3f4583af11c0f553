//! Session state owned by the controller.
//!
//! One active dongle, one pairing list, one scan-result list, and an
//! explicit interaction mode that says which of the two lists a letter
//! selection applies to. Indices are only valid for the current display
//! cycle; both list setters invalidate prior selections.

use smol_str::SmolStr;

use crate::{
   error::{PairingError, Result},
   provider::{Dongle, PairingListEntry, ScanEntry},
};

/// What a letter-key selection currently means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
   /// No list has been populated yet.
   Idle,
   /// Selections pair with scan results.
   Pairing,
   /// Selections toggle connect/disconnect on pairing-list entries.
   ConnectDisconnect,
}

pub struct SessionState<D> {
   dongle: Option<D>,
   dongle_id: SmolStr,
   dongle_name: SmolStr,
   pairing_list: Vec<PairingListEntry>,
   scan_entries: Vec<ScanEntry>,
   mode: InteractionMode,
}

impl<D: Dongle> SessionState<D> {
   pub fn new() -> Self {
      Self {
         dongle: None,
         dongle_id: SmolStr::default(),
         dongle_name: SmolStr::default(),
         pairing_list: Vec::new(),
         scan_entries: Vec::new(),
         mode: InteractionMode::Idle,
      }
   }

   /// Binds a dongle as the active one, dropping any previous session
   /// state.
   pub fn bind(&mut self, id: SmolStr, dongle: D) {
      self.dongle_name = dongle.name();
      self.dongle_id = id;
      self.dongle = Some(dongle);
      self.pairing_list.clear();
      self.scan_entries.clear();
      self.mode = InteractionMode::Idle;
   }

   /// Clears everything; used on dongle detach.
   pub fn clear(&mut self) {
      self.dongle = None;
      self.dongle_id = SmolStr::default();
      self.dongle_name = SmolStr::default();
      self.pairing_list.clear();
      self.scan_entries.clear();
      self.mode = InteractionMode::Idle;
   }

   pub fn dongle(&self) -> Result<&D> {
      self.dongle.as_ref().ok_or(PairingError::NoActiveDongle)
   }

   pub fn is_bound_to(&self, id: &str) -> bool {
      self.dongle.is_some() && self.dongle_id == id
   }

   pub fn dongle_name(&self) -> &SmolStr {
      &self.dongle_name
   }

   pub const fn mode(&self) -> InteractionMode {
      self.mode
   }

   /// Replaces the pairing list and makes selections mean
   /// connect/disconnect.
   pub fn set_pairing_list(&mut self, list: Vec<PairingListEntry>) {
      self.pairing_list = list;
      self.mode = InteractionMode::ConnectDisconnect;
   }

   pub fn pairing_entry(&self, index: usize) -> Result<&PairingListEntry> {
      self.pairing_list.get(index).ok_or(PairingError::IndexOutOfRange {
         index,
         len: self.pairing_list.len(),
      })
   }

   /// Clears scan results and makes selections mean pairing.
   pub fn begin_scan(&mut self) {
      self.scan_entries.clear();
      self.mode = InteractionMode::Pairing;
   }

   /// Appends a freshly discovered entry, returning its display index.
   pub fn push_scan_entry(&mut self, entry: ScanEntry) -> usize {
      self.scan_entries.push(entry);
      self.scan_entries.len() - 1
   }

   pub fn scan_entry(&self, index: usize) -> Result<&ScanEntry> {
      self.scan_entries.get(index).ok_or(PairingError::IndexOutOfRange {
         index,
         len: self.scan_entries.len(),
      })
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::provider::{ConnectionStatus, mock::MockDongle};

   fn entry(name: &str) -> PairingListEntry {
      PairingListEntry {
         name: name.into(),
         address: "00:11:22:33:44:55".into(),
         status: ConnectionStatus::Disconnected,
      }
   }

   #[test]
   fn test_selection_bounds() {
      let mut state = SessionState::<MockDongle>::new();
      state.set_pairing_list(vec![entry("Headset-A")]);

      assert!(state.pairing_entry(0).is_ok());
      let err = state.pairing_entry(1).unwrap_err();
      assert!(matches!(
         err,
         PairingError::IndexOutOfRange { index: 1, len: 1 }
      ));

      let err = state.scan_entry(0).unwrap_err();
      assert!(matches!(
         err,
         PairingError::IndexOutOfRange { index: 0, len: 0 }
      ));
   }

   #[test]
   fn test_mode_follows_lists() {
      let mut state = SessionState::<MockDongle>::new();
      assert_eq!(state.mode(), InteractionMode::Idle);

      state.set_pairing_list(vec![entry("Headset-A")]);
      assert_eq!(state.mode(), InteractionMode::ConnectDisconnect);

      state.begin_scan();
      assert_eq!(state.mode(), InteractionMode::Pairing);

      state.set_pairing_list(Vec::new());
      assert_eq!(state.mode(), InteractionMode::ConnectDisconnect);
   }

   #[test]
   fn test_bind_and_clear() {
      let mut state = SessionState::new();
      assert!(matches!(
         state.dongle().unwrap_err(),
         PairingError::NoActiveDongle
      ));

      state.bind("usb-1".into(), MockDongle::new());
      assert!(state.dongle().is_ok());
      assert!(state.is_bound_to("usb-1"));
      assert!(!state.is_bound_to("usb-2"));
      assert_eq!(state.dongle_name(), "Mock Dongle");

      state.clear();
      assert!(state.dongle().is_err());
      assert!(!state.is_bound_to("usb-1"));
      assert_eq!(state.mode(), InteractionMode::Idle);
   }
}
