//! Interactive Bluetooth dongle pairing console.
//!
//! Drives a dongle capability provider to enumerate, pair, connect,
//! disconnect, and unpair headset devices through single-key commands.
//! The pairing machinery itself lives behind the provider; this binary
//! wires the session controller, the device watcher, and the keyboard.

use std::sync::Arc;

use crossterm::{
   event::{Event, EventStream, KeyEventKind},
   terminal::{disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use log::info;

mod config;
mod console;
mod controller;
mod error;
mod event;
mod provider;
mod session;
mod watcher;

use crate::{
   config::Config,
   console::{ConsoleCommand, ConsoleReporter},
   controller::SessionController,
   error::Result,
   provider::bluez::{BlueZDongle, BlueZProvider},
};

#[tokio::main]
async fn main() -> Result<()> {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   info!("Starting pairctl...");

   let config = Config::load()?;

   // Provider initialization is the one unrecoverable failure; every
   // later provider error is reported and the session continues.
   let provider = Arc::new(BlueZProvider::new().await?);

   let reporter = Arc::new(ConsoleReporter::new());
   let controller = SessionController::new(reporter.clone(), config.clone());
   let watcher = watcher::watch(provider, config.clone(), controller.clone()).await?;

   reporter.help();
   info!("Listening for dongles...");

   enable_raw_mode()?;
   let result = run_key_loop(&controller, &config, &reporter).await;
   disable_raw_mode()?;
   drop(watcher);

   info!("Shutting down pairctl");
   result
}

async fn run_key_loop(
   controller: &SessionController<BlueZDongle>,
   config: &Config,
   reporter: &ConsoleReporter,
) -> Result<()> {
   let mut keys = EventStream::new();

   while let Some(event) = keys.next().await {
      let Event::Key(key) = event? else {
         continue;
      };
      if key.kind != KeyEventKind::Press {
         continue;
      }
      let Some(command) = console::decode_key(&key) else {
         continue;
      };

      let outcome = match command {
         ConsoleCommand::Quit => break,
         ConsoleCommand::Help => {
            reporter.help();
            Ok(())
         },
         ConsoleCommand::ListPairings => controller.refresh_pairing_list().await.map(|_| ()),
         ConsoleCommand::RemoveAllPairings => controller.remove_all_pairings().await.map(|_| ()),
         ConsoleCommand::StartScan => controller.start_scan(config.scan_duration()).await,
         ConsoleCommand::StopScan => controller.stop_scan().await,
         ConsoleCommand::Select(index) => controller.select(index).await,
      };

      if let Err(e) = outcome {
         reporter.error(&e);
      }
   }

   Ok(())
}
