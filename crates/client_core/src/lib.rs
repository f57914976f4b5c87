use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::info;

pub mod controls;
pub mod discovery;
pub mod error;
pub mod hub;
pub mod indicators;
pub mod ingest;
pub mod layout;
pub mod race;
pub mod remote;
pub mod sequences;
pub mod transport;

pub use controls::install_controls;
pub use error::{SyncError, SyncResult};
pub use hub::{sync_watcher, watcher, SyncHub, ValueOverride, ValueStrategy, WatchFn, WatchHandle};
pub use indicators::{IndicatorColor, IndicatorLight, LiveIndicator};
pub use layout::PanelLayout;
pub use race::{GuardToken, RaceGuard, StaleOperationAbort};
pub use remote::{DisconnectedRemote, RemoteControl, RemoteEvent};
pub use sequences::{ComeBackOptions, PresetMatcher, PresetState, Sequencer, TaskHandle};
pub use transport::{ConnectOptions, ObsTransport};

/// A hub wired up the way every panel needs it: built-in overrides installed
/// and event ingestion running.
pub struct PanelSession {
    pub hub: Arc<SyncHub>,
    pub layout: Arc<PanelLayout>,
    pub sequencer: Arc<Sequencer>,
    ingestion: JoinHandle<()>,
}

impl PanelSession {
    pub async fn connect(options: ConnectOptions, layout: PanelLayout) -> Result<Self> {
        let url = options.url.clone();
        let transport = ObsTransport::connect(options).await?;
        info!(url = %url, "panel session connected");
        Ok(Self::with_remote(transport, layout))
    }

    pub fn with_remote(remote: Arc<dyn RemoteControl>, layout: PanelLayout) -> Self {
        let layout = Arc::new(layout);
        let hub = SyncHub::new(remote);
        install_controls(&hub, Arc::clone(&layout));
        let ingestion = hub.spawn_ingestion();
        let sequencer = Arc::new(Sequencer::new(Arc::clone(&hub), Arc::clone(&layout)));
        Self {
            hub,
            layout,
            sequencer,
            ingestion,
        }
    }

    pub fn presets(&self) -> PresetMatcher {
        PresetMatcher::new(Arc::clone(&self.hub), Arc::clone(&self.layout))
    }

    /// Resolves once the remote event stream has ended.
    pub async fn closed(&mut self) {
        let _ = (&mut self.ingestion).await;
    }

    pub fn shutdown(self) {
        self.sequencer.cancel_pending();
        self.ingestion.abort();
    }
}

#[cfg(test)]
#[path = "tests/fake_remote.rs"]
pub(crate) mod fake_remote;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
