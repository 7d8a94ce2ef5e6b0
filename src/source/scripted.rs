/// Scripted quote source (simulation mode): replays queued payloads per symbol
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::source::{QuoteSource, RawQuote, SymbolFetch};
use crate::types::SymbolMetadata;

#[derive(Debug, Clone)]
enum ScriptedQuote {
    Quote(RawQuote),
    Failure(String),
}

/// Quote source that hands out queued payloads in order
#[derive(Default)]
pub struct ScriptedQuoteSource {
    queues: Arc<RwLock<HashMap<String, VecDeque<ScriptedQuote>>>>,
    metadata: Arc<RwLock<HashMap<String, SymbolMetadata>>>,
}

impl ScriptedQuoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a payload for the symbol's next fetch
    pub async fn push_quote(&self, symbol: &str, quote: RawQuote) {
        let mut queues = self.queues.write().await;
        queues
            .entry(symbol.to_string())
            .or_default()
            .push_back(ScriptedQuote::Quote(quote));
    }

    /// Queue an upstream failure for the symbol's next fetch
    pub async fn push_failure(&self, symbol: &str, message: &str) {
        let mut queues = self.queues.write().await;
        queues
            .entry(symbol.to_string())
            .or_default()
            .push_back(ScriptedQuote::Failure(message.to_string()));
    }

    pub async fn set_metadata(&self, symbol: &str, metadata: SymbolMetadata) {
        self.metadata.write().await.insert(symbol.to_string(), metadata);
    }

    pub async fn pending(&self, symbol: &str) -> usize {
        self.queues.read().await.get(symbol).map_or(0, |q| q.len())
    }
}

#[async_trait]
impl QuoteSource for ScriptedQuoteSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_quotes(&self, symbols: &[String]) -> Vec<SymbolFetch> {
        let mut queues = self.queues.write().await;

        symbols
            .iter()
            .map(|symbol| {
                let next = queues.get_mut(symbol).and_then(|q| q.pop_front());
                let result = match next {
                    Some(ScriptedQuote::Quote(raw)) => Ok(raw),
                    Some(ScriptedQuote::Failure(message)) => Err(PipelineError::UpstreamFetch {
                        symbol: symbol.clone(),
                        message,
                    }),
                    None => Err(PipelineError::UpstreamFetch {
                        symbol: symbol.clone(),
                        message: "no scripted quote queued".to_string(),
                    }),
                };
                debug!("📝 [SCRIPTED] {} -> ok={}", symbol, result.is_ok());
                SymbolFetch {
                    symbol: symbol.clone(),
                    result,
                }
            })
            .collect()
    }

    async fn fetch_metadata(&self, symbol: &str) -> Result<SymbolMetadata> {
        self.metadata
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| PipelineError::UpstreamFetch {
                symbol: symbol.to_string(),
                message: "no scripted metadata".to_string(),
            })
    }
}
