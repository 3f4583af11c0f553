//! Configuration management for the pairing console.
//!
//! This module handles loading and saving configuration from disk,
//! including the supported dongle name patterns and operation timeouts.

use std::{env, fs, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{PairingError, Result};

/// Main configuration structure for the console.
#[derive(Serialize, Deserialize, Clone)]
pub struct Config {
   /// Name patterns of supported dongles, matched case-insensitively as
   /// substrings. An empty list accepts any device the provider is
   /// willing to turn into a dongle.
   #[serde(default)]
   pub supported_dongles: Vec<String>,

   #[serde(default = "default_scan_duration")]
   pub scan_duration_sec: u64,

   #[serde(default = "default_pair_timeout")]
   pub pair_timeout_sec: u64,

   #[serde(default = "default_connect_timeout")]
   pub connect_timeout_sec: u64,
}

const fn default_scan_duration() -> u64 {
   30
}

const fn default_pair_timeout() -> u64 {
   30
}

const fn default_connect_timeout() -> u64 {
   10
}

impl Default for Config {
   fn default() -> Self {
      Self {
         supported_dongles: vec![],
         scan_duration_sec: default_scan_duration(),
         pair_timeout_sec: default_pair_timeout(),
         connect_timeout_sec: default_connect_timeout(),
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      let config_path = Self::config_path()?;

      if config_path.exists() {
         let contents = fs::read_to_string(&config_path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         // Create default config
         let config = Self::default();
         config.save()?;
         Ok(config)
      }
   }

   /// Saves the current configuration to disk.
   pub fn save(&self) -> Result<()> {
      let config_path = Self::config_path()?;

      // Ensure directory exists
      if let Some(parent) = config_path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(&config_path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(pairctl_home) = env::var("PAIRCTL_HOME") {
         PathBuf::from(pairctl_home)
      } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else if let Ok(home) = env::var("HOME") {
         PathBuf::from(home).join(".config")
      } else {
         return Err(PairingError::ConfigDirNotFound);
      };

      Ok(config_dir.join("pairctl").join("config.toml"))
   }

   /// Checks whether an attached device name matches a supported dongle.
   pub fn is_supported_dongle(&self, name: &str) -> bool {
      if self.supported_dongles.is_empty() {
         return true;
      }
      let name = name.to_ascii_lowercase();
      self
         .supported_dongles
         .iter()
         .any(|pattern| name.contains(&pattern.to_ascii_lowercase()))
   }

   pub const fn scan_duration(&self) -> Duration {
      Duration::from_secs(self.scan_duration_sec)
   }

   pub const fn pair_timeout(&self) -> Duration {
      Duration::from_secs(self.pair_timeout_sec)
   }

   pub const fn connect_timeout(&self) -> Duration {
      Duration::from_secs(self.connect_timeout_sec)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_defaults() {
      let config = Config::default();
      assert!(config.supported_dongles.is_empty());
      assert_eq!(config.scan_duration(), Duration::from_secs(30));
      assert_eq!(config.pair_timeout(), Duration::from_secs(30));
      assert_eq!(config.connect_timeout(), Duration::from_secs(10));
   }

   #[test]
   fn test_dongle_matching() {
      let mut config = Config::default();
      // Empty pattern list accepts anything.
      assert!(config.is_supported_dongle("Some Random Dongle"));

      config.supported_dongles = vec!["Link 380".into(), "Link 390".into()];
      assert!(config.is_supported_dongle("BT Link 380"));
      assert!(config.is_supported_dongle("bt link 390"));
      assert!(!config.is_supported_dongle("BT Link 370"));
      assert!(!config.is_supported_dongle("Headset-A"));
   }

   #[test]
   fn test_save_and_load_roundtrip() {
      let dir = tempfile::tempdir().unwrap();
      // Point the config path at a throwaway directory.
      unsafe {
         env::set_var("PAIRCTL_HOME", dir.path());
      }

      let mut config = Config::default();
      config.supported_dongles = vec!["Link 380".into()];
      config.scan_duration_sec = 12;
      config.save().unwrap();

      let loaded = Config::load().unwrap();
      assert_eq!(loaded.supported_dongles, vec!["Link 380".to_string()]);
      assert_eq!(loaded.scan_duration_sec, 12);
      assert_eq!(loaded.pair_timeout_sec, default_pair_timeout());

      unsafe {
         env::remove_var("PAIRCTL_HOME");
      }
   }
}
