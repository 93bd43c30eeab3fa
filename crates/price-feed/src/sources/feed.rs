//! Streaming oracle feed over a persistent WebSocket
//!
//! A background task keeps the latest tick per pair and reconnects on
//! failure; `fetch` only reads what the stream has delivered.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use oracle_core::{
    to_fixed, FeedSourceConfig, Quote, SourceError, SourceId, SourceKind, SourceResult,
    TokenPair, WebSocketConfig,
};

use super::SourceAdapter;

/// Price tick pushed by the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedTick {
    pub base: Address,
    pub quote: Address,
    pub price: Decimal,
    #[serde(default)]
    pub confidence: Option<u8>,
    #[serde(default)]
    pub spread: Option<f64>,
    #[serde(default)]
    pub volume_24h: Option<Decimal>,
    pub timestamp: u64,
}

impl FeedTick {
    pub fn pair(&self) -> TokenPair {
        TokenPair::new(self.base, self.quote)
    }
}

/// State shared between the adapter and its listener task
struct FeedShared {
    config: FeedSourceConfig,
    policy: WebSocketConfig,
    ticks: DashMap<TokenPair, FeedTick>,
    connected: AtomicBool,
}

impl FeedShared {
    async fn run(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) {
        let name = self.config.source.clone();
        let mut reconnect_count = 0;

        loop {
            tokio::select! {
                result = self.connect_and_listen() => {
                    // A session that got as far as connecting resets the budget
                    if self.connected.swap(false, Ordering::Relaxed) {
                        reconnect_count = 0;
                    }

                    match result {
                        Ok(()) => info!("Feed {} closed by server", name),
                        Err(e) => error!("Feed {} error: {}", name, e),
                    }

                    reconnect_count += 1;
                    if reconnect_count > self.policy.max_reconnects {
                        error!("Max reconnects reached for {}", name);
                        break;
                    }

                    warn!(
                        "Reconnecting {} in {:?} (attempt {}/{})",
                        name,
                        self.policy.reconnect_delay(),
                        reconnect_count,
                        self.policy.max_reconnects
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(self.policy.reconnect_delay()) => {}
                        _ = &mut shutdown => break,
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        self.connected.store(false, Ordering::Relaxed);
        info!("Feed {} stopped", name);
    }

    async fn connect_and_listen(&self) -> anyhow::Result<()> {
        info!("Connecting to {} at {}", self.config.source, self.config.ws_url);

        let (ws_stream, _) = connect_async(self.config.ws_url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        self.connected.store(true, Ordering::Relaxed);
        info!("Connected to {}", self.config.source);

        if let Some(subscribe) = &self.config.subscribe {
            write.send(Message::Text(subscribe.clone())).await?;
        }

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => self.handle_text(&text),
                Ok(Message::Ping(data)) => {
                    write.send(Message::Pong(data)).await?;
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket closed by server");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    return Err(e.into());
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<FeedTick>(text) {
            Ok(tick) => {
                let pair = tick.pair();
                // Out-of-order ticks never overwrite newer ones
                let newer = self
                    .ticks
                    .get(&pair)
                    .map_or(true, |current| current.timestamp <= tick.timestamp);
                if newer {
                    self.ticks.insert(pair, tick);
                }
            }
            Err(e) => debug!("Ignoring {} message: {}", self.config.source, e),
        }
    }
}

/// Oracle feed source backed by a WebSocket subscription
pub struct FeedAdapter {
    id: SourceId,
    shared: Arc<FeedShared>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FeedAdapter {
    pub fn new(config: FeedSourceConfig, policy: WebSocketConfig) -> Self {
        Self {
            id: config.source.clone(),
            shared: Arc::new(FeedShared {
                config,
                policy,
                ticks: DashMap::new(),
                connected: AtomicBool::new(false),
            }),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Latest tick for a pair, if the stream has delivered one
    pub fn latest(&self, pair: &TokenPair) -> Option<FeedTick> {
        self.shared.ticks.get(pair).map(|t| t.value().clone())
    }

    fn tick_to_quote(&self, tick: &FeedTick) -> SourceResult<Quote> {
        let price = to_fixed(tick.price).ok_or_else(|| {
            SourceError::InvalidResponse(format!("{}: negative price {}", self.id, tick.price))
        })?;

        Ok(Quote {
            source: self.id.clone(),
            token_a: tick.base,
            token_b: tick.quote,
            price,
            liquidity: U256::ZERO,
            volume_24h: tick.volume_24h.and_then(to_fixed).unwrap_or(U256::ZERO),
            timestamp_ms: tick.timestamp,
            block_height: 0,
            confidence: tick
                .confidence
                .unwrap_or(self.shared.config.default_confidence),
            spread: tick.spread.unwrap_or(0.0),
            slippage: 0.0,
        })
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::OracleFeed
    }

    async fn fetch(&self, pair: TokenPair, _timeout: Duration) -> SourceResult<Quote> {
        match self.latest(&pair) {
            Some(tick) => self.tick_to_quote(&tick),
            None if self.is_online() => Err(SourceError::NoData(pair)),
            None => Err(SourceError::Disconnected),
        }
    }

    fn is_online(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    async fn connect(&self) -> anyhow::Result<()> {
        let mut task = self.task.lock();
        if task.as_ref().map_or(false, |t| !t.is_finished()) {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown.lock() = Some(shutdown_tx);
        *task = Some(tokio::spawn(Arc::clone(&self.shared).run(shutdown_rx)));

        info!("Started {} feed", self.id);
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(shutdown) = self.shutdown.lock().take() {
            let _ = shutdown.send(());
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Feed {} task ended abnormally: {}", self.id, e);
            }
        }

        self.shared.connected.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_core::PRICE_SCALE;
    use tokio::net::TcpListener;

    fn feed_config(ws_url: String) -> FeedSourceConfig {
        FeedSourceConfig {
            source: SourceId::Chainlink,
            ws_url,
            subscribe: Some(r#"{"op":"subscribe"}"#.to_string()),
            default_confidence: 95,
        }
    }

    fn tick(price: &str, timestamp: u64) -> FeedTick {
        FeedTick {
            base: Address::repeat_byte(1),
            quote: Address::repeat_byte(2),
            price: price.parse().unwrap(),
            confidence: None,
            spread: Some(0.001),
            volume_24h: None,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_fetch_without_connection() {
        let adapter = FeedAdapter::new(
            feed_config("ws://127.0.0.1:1".into()),
            WebSocketConfig::default(),
        );
        let pair = TokenPair::new(Address::repeat_byte(1), Address::repeat_byte(2));

        let err = adapter.fetch(pair, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, SourceError::Disconnected));
        assert!(!adapter.is_online());
    }

    #[test]
    fn test_handle_text_keeps_newest_tick() {
        let adapter = FeedAdapter::new(
            feed_config("ws://127.0.0.1:1".into()),
            WebSocketConfig::default(),
        );
        let pair = TokenPair::new(Address::repeat_byte(1), Address::repeat_byte(2));

        adapter
            .shared
            .handle_text(&serde_json::to_string(&tick("2001.5", 2_000)).unwrap());
        adapter
            .shared
            .handle_text(&serde_json::to_string(&tick("1999", 1_000)).unwrap());
        adapter.shared.handle_text("not json");

        let latest = adapter.latest(&pair).unwrap();
        assert_eq!(latest.timestamp, 2_000);

        let quote = adapter.tick_to_quote(&latest).unwrap();
        assert_eq!(quote.price, PRICE_SCALE * U256::from(20015u64) / U256::from(10u64));
        assert_eq!(quote.confidence, 95);
        assert_eq!(quote.block_height, 0);
        assert!(quote.liquidity.is_zero());
    }

    #[tokio::test]
    async fn test_streams_ticks_and_disconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let frame = serde_json::to_string(&tick("1500", 1_700_000_000_000)).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            // Wait for the subscription before publishing
            let subscribe = ws.next().await.unwrap().unwrap();
            assert_eq!(subscribe, Message::Text(r#"{"op":"subscribe"}"#.to_string()));

            ws.send(Message::Text(frame)).await.unwrap();
            // Hold the connection open until the client goes away
            while let Some(Ok(_)) = ws.next().await {}
        });

        let adapter = FeedAdapter::new(
            feed_config(format!("ws://{}", addr)),
            WebSocketConfig {
                reconnect_delay_ms: 50,
                max_reconnects: 1,
            },
        );
        adapter.connect().await.unwrap();

        let pair = TokenPair::new(Address::repeat_byte(1), Address::repeat_byte(2));
        let mut quote = None;
        for _ in 0..100 {
            if let Ok(q) = adapter.fetch(pair, Duration::from_secs(1)).await {
                quote = Some(q);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let quote = quote.expect("tick never arrived");
        assert_eq!(quote.price, PRICE_SCALE * U256::from(1500u64));
        assert!(adapter.is_online());

        adapter.disconnect().await;
        assert!(!adapter.is_online());

        // Tick is still served after disconnect; staleness is the filter's call
        assert!(adapter.fetch(pair, Duration::from_secs(1)).await.is_ok());

        server.abort();
    }
}
