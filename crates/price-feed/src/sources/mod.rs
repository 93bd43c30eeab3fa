//! Market-data source adapters
//!
//! Every source, on-chain or off, is reached through [`SourceAdapter`]; the
//! oracle never sees anything more concrete.

mod dex;
mod feed;
mod rest;

pub use dex::DexAdapter;
pub use feed::{FeedAdapter, FeedTick};
pub use rest::{RestApiAdapter, RestPriceResponse};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use oracle_core::{OracleConfig, Quote, SourceId, SourceKind, SourceResult, TokenPair};

/// Base trait for price sources
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> &SourceId;

    fn kind(&self) -> SourceKind;

    /// Produce a quote for `pair` within `timeout`.
    ///
    /// Expected "nothing to report" cases return `SourceError::NoData` or
    /// `SourceError::Unsupported` rather than a transport error.
    async fn fetch(&self, pair: TokenPair, timeout: Duration) -> SourceResult<Quote>;

    /// Liveness as last observed by the adapter
    fn is_online(&self) -> bool {
        true
    }

    /// Open any persistent connection
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Close any persistent connection
    async fn disconnect(&self) {}
}

/// Build adapters for every enabled source that has connection settings
pub fn build_adapters(config: &OracleConfig) -> Vec<Arc<dyn SourceAdapter>> {
    let client = reqwest::Client::new();
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = vec![];

    for source in &config.enabled_sources {
        let pools: Vec<_> = config
            .sources
            .dex_pools
            .iter()
            .filter(|p| &p.source == source)
            .cloned()
            .collect();

        if !pools.is_empty() {
            adapters.push(Arc::new(DexAdapter::new(
                source.clone(),
                config.rpc_url.clone(),
                pools,
                client.clone(),
            )));
        } else if let Some(feed) = config.sources.feeds.iter().find(|f| &f.source == source) {
            adapters.push(Arc::new(FeedAdapter::new(feed.clone(), config.websocket.clone())));
        } else if let Some(api) = config.sources.rest_apis.iter().find(|a| &a.source == source) {
            adapters.push(Arc::new(RestApiAdapter::new(api.clone(), client.clone())));
        } else {
            warn!("No connection settings for source {}, skipping", source);
            continue;
        }

        info!("Configured {} source ({:?})", source, source.kind());
    }

    adapters
}

/// Map reqwest failures onto the source error taxonomy
pub(crate) fn transport_error(source: &SourceId, err: reqwest::Error) -> oracle_core::SourceError {
    if err.is_timeout() {
        oracle_core::SourceError::Timeout(source.clone())
    } else {
        oracle_core::SourceError::Transport(format!("{}: {}", source, err))
    }
}
