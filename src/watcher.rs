//! Device attachment watcher.
//!
//! Thin adapter between the provider's attach/detach stream and the
//! session controller. Attached devices are filtered against the
//! configured dongle name patterns; matches are turned into dongles and
//! bound. Binding is awaited to completion (including the initial
//! pairing-list refresh) before the next event is taken, so a keypress
//! arriving right after an attach always sees a consistent session.

use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::{
   config::Config,
   controller::SessionController,
   error::Result,
   provider::{DeviceEvent, DongleProvider},
};

/// Subscription to provider attach/detach events.
///
/// Dropping the handle unregisters the listener.
pub struct WatcherHandle {
   task: JoinHandle<()>,
}

impl Drop for WatcherHandle {
   fn drop(&mut self) {
      self.task.abort();
   }
}

pub async fn watch<P: DongleProvider>(
   provider: Arc<P>,
   config: Config,
   controller: SessionController<P::Dongle>,
) -> Result<WatcherHandle> {
   let mut events = provider.events().await?;

   let task = tokio::spawn(async move {
      while let Some(event) = events.next().await {
         match event {
            DeviceEvent::Attached(descriptor) => {
               info!("Device attached: {} ({})", descriptor.name, descriptor.id);
               if !config.is_supported_dongle(&descriptor.name) {
                  debug!("Ignoring unsupported device {}", descriptor.name);
                  continue;
               }
               match provider.create_dongle(&descriptor).await {
                  Ok(Some(dongle)) => {
                     if let Err(e) = controller.bind_dongle(descriptor.id.clone(), dongle).await {
                        warn!("Binding dongle {} failed: {e}", descriptor.name);
                     }
                  },
                  Ok(None) => {
                     debug!("{} is not a dongle", descriptor.name);
                  },
                  Err(e) => {
                     warn!("Failed to create dongle for {}: {e}", descriptor.name);
                  },
               }
            },
            DeviceEvent::Detached(descriptor) => {
               info!("Device detached: {} ({})", descriptor.name, descriptor.id);
               if controller.dongle_detached(descriptor.id).await.is_err() {
                  // Controller gone, nothing left to watch.
                  break;
               }
            },
         }
      }
      debug!("Device event stream ended");
   });

   Ok(WatcherHandle { task })
}
