//! Session events emitted for display.
//!
//! The controller reports everything user-visible through this bus:
//! list updates, streamed scan entries, and operation outcomes.

use std::sync::Arc;

use smol_str::SmolStr;

use crate::provider::{PairingListEntry, ScanEntry};

/// Reported result of a single controller operation.
#[derive(Debug, Clone)]
pub struct Outcome {
   pub operation: &'static str,
   pub success: bool,
   pub message: String,
}

/// Events that can be emitted by the pairing session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
   DongleBound(SmolStr),
   DongleLost(SmolStr),
   PairingListUpdated(Vec<PairingListEntry>),
   ScanStarted,
   /// A scan entry arrived, already appended at the given index.
   ScanEntryFound(usize, ScanEntry),
   ScanFinished { error: Option<String> },
   OperationReported(Outcome),
}

/// Trait for implementing event emission.
pub trait EventBus: Send + Sync {
   /// Emits an event to the display layer.
   fn emit(&self, event: SessionEvent);
}

/// Type alias for a thread-safe event sender.
pub type EventSender = Arc<dyn EventBus>;
