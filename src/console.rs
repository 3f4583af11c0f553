//! Interactive single-key command surface.
//!
//! Key map: `1` list pairings, `2` remove all pairings, `3` start a
//! scan, `q` stop it, letters select an index into whichever list the
//! session mode makes active, `?` reprints the help, Esc or Ctrl+C
//! quits. `q` is never a selector; displayed index letters skip it so
//! every letter shown next to an entry is pressable.

use std::io::{self, Write};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::{
   error::PairingError,
   event::{EventBus, SessionEvent},
   provider::PairingListEntry,
};

/// A decoded keypress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
   ListPairings,
   RemoveAllPairings,
   StartScan,
   StopScan,
   Select(usize),
   Help,
   Quit,
}

/// Maps a keypress to a command, or `None` for keys without a meaning.
pub fn decode_key(key: &KeyEvent) -> Option<ConsoleCommand> {
   if key.modifiers.contains(KeyModifiers::CONTROL) {
      return match key.code {
         KeyCode::Char('c') => Some(ConsoleCommand::Quit),
         _ => None,
      };
   }
   match key.code {
      KeyCode::Char('1') => Some(ConsoleCommand::ListPairings),
      KeyCode::Char('2') => Some(ConsoleCommand::RemoveAllPairings),
      KeyCode::Char('3') => Some(ConsoleCommand::StartScan),
      KeyCode::Char('q') => Some(ConsoleCommand::StopScan),
      KeyCode::Char('?') => Some(ConsoleCommand::Help),
      KeyCode::Esc => Some(ConsoleCommand::Quit),
      KeyCode::Char(c @ 'a'..='z') => letter_index(c).map(ConsoleCommand::Select),
      _ => None,
   }
}

/// Index selected by a letter key. `q` is the stop-scan command and
/// never selects; letters after it shift down one slot to match
/// [`index_letter`].
fn letter_index(c: char) -> Option<usize> {
   match c {
      'a'..='p' => Some(c as usize - 'a' as usize),
      'q' => None,
      'r'..='z' => Some(c as usize - 'a' as usize - 1),
      _ => None,
   }
}

/// Display letter for a list position, skipping the reserved `q`.
/// Positions past the last selectable letter are shown as `-`.
fn index_letter(index: usize) -> char {
   match index {
      0..=15 => (b'a' + index as u8) as char,
      16..=24 => (b'a' + index as u8 + 1) as char,
      _ => '-',
   }
}

/// Event-bus implementation that renders session events to stdout.
pub struct ConsoleReporter;

impl ConsoleReporter {
   pub const fn new() -> Self {
      Self
   }

   // Raw mode needs an explicit carriage return per line.
   fn say(&self, line: &str) {
      let mut out = io::stdout();
      let _ = write!(out, "{line}\r\n");
      let _ = out.flush();
   }

   pub fn help(&self) {
      self.say("Commands:");
      self.say("  1      list pairings");
      self.say("  2      remove all pairings");
      self.say("  3      scan for devices in pairing mode");
      self.say("  q      stop the scan");
      self.say("  a-z    select a listed device (pair, or connect/disconnect)");
      self.say("  ?      show this help");
      self.say("  Esc    quit");
   }

   pub fn error(&self, error: &PairingError) {
      self.say(&format!("Error: {error}"));
   }

   fn show_pairing_list(&self, list: &[PairingListEntry]) {
      if list.is_empty() {
         self.say("Pairing list is empty.");
         return;
      }
      self.say("Pairing list (press a letter to connect/disconnect):");
      for (index, entry) in list.iter().enumerate() {
         self.say(&format!(
            "  [{}] {} ({}) - {}",
            index_letter(index),
            entry.name,
            entry.address,
            entry.status.as_str()
         ));
      }
   }
}

impl EventBus for ConsoleReporter {
   fn emit(&self, event: SessionEvent) {
      match event {
         SessionEvent::DongleBound(name) => {
            self.say(&format!("> Dongle attached: {name}"));
         },
         SessionEvent::DongleLost(name) => {
            self.say(&format!("< Dongle detached: {name}"));
         },
         SessionEvent::PairingListUpdated(list) => {
            self.show_pairing_list(&list);
         },
         SessionEvent::ScanStarted => {
            self.say("Scanning for devices in pairing mode... press 'q' to stop.");
         },
         SessionEvent::ScanEntryFound(index, entry) => {
            self.say(&format!(
               "  [{}] {} ({})",
               index_letter(index),
               entry.name,
               entry.address
            ));
         },
         SessionEvent::ScanFinished { error: None } => {
            self.say("Scan finished.");
         },
         SessionEvent::ScanFinished { error: Some(e) } => {
            self.say(&format!("Scan failed: {e}"));
         },
         SessionEvent::OperationReported(outcome) => {
            let verdict = if outcome.success { "ok" } else { "FAILED" };
            self.say(&format!(
               "{} {}: {}",
               outcome.operation, verdict, outcome.message
            ));
         },
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn key(code: KeyCode) -> KeyEvent {
      KeyEvent::new(code, KeyModifiers::NONE)
   }

   #[test]
   fn test_command_keys() {
      assert_eq!(
         decode_key(&key(KeyCode::Char('1'))),
         Some(ConsoleCommand::ListPairings)
      );
      assert_eq!(
         decode_key(&key(KeyCode::Char('2'))),
         Some(ConsoleCommand::RemoveAllPairings)
      );
      assert_eq!(
         decode_key(&key(KeyCode::Char('3'))),
         Some(ConsoleCommand::StartScan)
      );
      assert_eq!(decode_key(&key(KeyCode::Esc)), Some(ConsoleCommand::Quit));
      assert_eq!(decode_key(&key(KeyCode::Char('4'))), None);
      assert_eq!(decode_key(&key(KeyCode::Enter)), None);
   }

   #[test]
   fn test_letters_select_indices() {
      assert_eq!(
         decode_key(&key(KeyCode::Char('a'))),
         Some(ConsoleCommand::Select(0))
      );
      assert_eq!(
         decode_key(&key(KeyCode::Char('b'))),
         Some(ConsoleCommand::Select(1))
      );
      assert_eq!(
         decode_key(&key(KeyCode::Char('p'))),
         Some(ConsoleCommand::Select(15))
      );
      // Letters after the reserved 'q' shift down one slot.
      assert_eq!(
         decode_key(&key(KeyCode::Char('r'))),
         Some(ConsoleCommand::Select(16))
      );
      assert_eq!(
         decode_key(&key(KeyCode::Char('z'))),
         Some(ConsoleCommand::Select(24))
      );
      // Uppercase letters carry no meaning.
      assert_eq!(decode_key(&key(KeyCode::Char('A'))), None);
   }

   #[test]
   fn test_reserved_keys_beat_selection() {
      // 'q' is a command, never an index.
      assert_eq!(
         decode_key(&key(KeyCode::Char('q'))),
         Some(ConsoleCommand::StopScan)
      );
      assert_eq!(
         decode_key(&key(KeyCode::Char('?'))),
         Some(ConsoleCommand::Help)
      );
   }

   #[test]
   fn test_every_displayed_letter_is_pressable() {
      for index in 0..25 {
         let letter = index_letter(index);
         assert_eq!(
            decode_key(&key(KeyCode::Char(letter))),
            Some(ConsoleCommand::Select(index)),
            "letter {letter} does not select the entry it labels"
         );
      }
   }

   #[test]
   fn test_ctrl_c_quits() {
      let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
      assert_eq!(decode_key(&ctrl_c), Some(ConsoleCommand::Quit));
      // Plain 'c' is a selection.
      assert_eq!(
         decode_key(&key(KeyCode::Char('c'))),
         Some(ConsoleCommand::Select(2))
      );
   }

   #[test]
   fn test_index_letters() {
      assert_eq!(index_letter(0), 'a');
      assert_eq!(index_letter(15), 'p');
      assert_eq!(index_letter(16), 'r');
      assert_eq!(index_letter(24), 'z');
      assert_eq!(index_letter(25), '-');
   }
}
