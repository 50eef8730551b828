//! Shared application state for HTTP handlers

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::event_store::{BroadcastNotifier, ChangeMessage, EventStore, StoreConfig};
use crate::parser::EventParser;
use crate::search::InMemoryIndex;
use crate::upgrade::UpgradePipeline;

/// Buffer for change messages; subscribers that fall further behind miss
/// messages and should reload.
const CHANGE_BUFFER: usize = 1024;

pub struct AppState {
    /// The event store over the in-process index
    pub store: Arc<EventStore<InMemoryIndex>>,

    /// Payload parser with the default decoders registered
    pub parser: Arc<EventParser>,

    /// Change stream the store publishes to
    pub notifier: Arc<BroadcastNotifier>,
}

impl AppState {
    /// State over a fresh in-memory index
    pub fn new(config: StoreConfig) -> Self {
        Self::with_index(Arc::new(InMemoryIndex::new()), config)
    }

    pub fn with_index(index: Arc<InMemoryIndex>, config: StoreConfig) -> Self {
        let notifier = Arc::new(BroadcastNotifier::new(CHANGE_BUFFER));
        let store = EventStore::with_config(index, config).with_notifier(notifier.clone());
        let parser = EventParser::with_default_decoders(Arc::new(UpgradePipeline::with_default_steps()));

        Self {
            store: Arc::new(store),
            parser: Arc::new(parser),
            notifier,
        }
    }

    /// Sequence id of the last published change, for cache invalidation
    pub fn current_sequence_id(&self) -> u64 {
        self.notifier.current_sequence_id()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeMessage> {
        self.notifier.subscribe()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
