//! Error types for the pairing console.
//!
//! This module defines all error types that can occur while driving the
//! dongle capability provider, including Bluetooth, I/O, and
//! configuration errors.

use thiserror::Error;

/// Main error type for the pairing console.
#[derive(Error, Debug)]
pub enum PairingError {
   #[error("no active dongle")]
   NoActiveDongle,

   #[error("selection {index} is out of range for a list of {len}")]
   IndexOutOfRange { index: usize, len: usize },

   #[error("a scan is already in progress")]
   ScanInProgress,

   #[error("provider operation failed: {0}")]
   Provider(String),

   #[error("scan stream error: {0}")]
   Scan(String),

   #[error("request timeout")]
   RequestTimeout,

   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("Controller has been shut down")]
   ControllerShutdown,
}

/// Convenience type alias for Results with `PairingError`.
pub type Result<T> = std::result::Result<T, PairingError>;
