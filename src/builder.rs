//! Ergonomic construction for `EdgeNode`, mirroring the teacher's
//! `CacheSystemBuilder` shape: sensible defaults, optional overrides for
//! every swappable seam.

use std::sync::Arc;

use crate::config::NodeConfig;
use crate::engine::CacheEngine;
use crate::error::Result;
use crate::pipeline::{EchoTranslationEngine, RemoteTranslationEngine, RequestPipeline, TranslationEngine};
use crate::store::EntryStore;
use crate::sync::{CloudClient, ReqwestCloudClient, SyncManager};
use crate::EdgeNode;

#[derive(Default)]
pub struct EdgeNodeBuilder {
    config: Option<NodeConfig>,
    cloud_client: Option<Arc<dyn CloudClient>>,
    local_engine: Option<Arc<dyn TranslationEngine>>,
    remote_engine: Option<Arc<dyn TranslationEngine>>,
}

impl EdgeNodeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_cloud_client(mut self, client: Arc<dyn CloudClient>) -> Self {
        self.cloud_client = Some(client);
        self
    }

    #[must_use]
    pub fn with_local_engine(mut self, engine: Arc<dyn TranslationEngine>) -> Self {
        self.local_engine = Some(engine);
        self
    }

    #[must_use]
    pub fn with_remote_engine(mut self, engine: Arc<dyn TranslationEngine>) -> Self {
        self.remote_engine = Some(engine);
        self
    }

    /// Build the node: loads `NodeConfig` from the environment unless
    /// `with_config` was called, reloads persisted cache/sync state from
    /// disk, and wires up default implementations for any seam not
    /// overridden. Does not start the periodic tickers: call
    /// `EdgeNode::start()` for that.
    pub async fn build(self) -> Result<EdgeNode> {
        let config = Arc::new(match self.config {
            Some(config) => config,
            None => NodeConfig::from_env()?,
        });

        let store = Arc::new(EntryStore::new(config.cache_dir.clone()));
        let engine = CacheEngine::new(Arc::clone(&config), store);
        engine.load_from_disk().await;

        let cloud_client = self
            .cloud_client
            .unwrap_or_else(|| Arc::new(ReqwestCloudClient::new(config.api_base_url.clone())));
        let sync = SyncManager::new(Arc::clone(&config), cloud_client);
        sync.load_from_disk().await;

        let local_engine = self.local_engine.unwrap_or_else(|| Arc::new(EchoTranslationEngine));
        let remote_engine = self
            .remote_engine
            .unwrap_or_else(|| Arc::new(RemoteTranslationEngine::new(config.api_base_url.clone())));

        let pipeline = RequestPipeline::new(Arc::clone(&engine), Arc::clone(&sync), local_engine, remote_engine);

        Ok(EdgeNode::from_parts(config, engine, sync, pipeline))
    }
}
