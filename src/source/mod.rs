//! Upstream quote sources and the normalizer that turns their payloads into ticks

pub mod http;
pub mod normalizer;
pub mod scripted;

pub use http::HttpQuoteSource;
pub use normalizer::{metadata_from_info, QuoteNormalizer};
pub use scripted::ScriptedQuoteSource;

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::SymbolMetadata;

/// Raw upstream record: heterogeneous field names, JSON values
pub type RawQuote = serde_json::Map<String, serde_json::Value>;

/// Outcome of fetching one symbol
#[derive(Debug)]
pub struct SymbolFetch {
    pub symbol: String,
    pub result: Result<RawQuote>,
}

/// Trait for quote providers
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Label written into every tick's `source` column
    fn name(&self) -> &'static str;

    /// One outcome per requested symbol; a failing symbol never aborts the batch
    async fn fetch_quotes(&self, symbols: &[String]) -> Vec<SymbolFetch>;

    /// Relatively static descriptive fields (exchange, currency, short name)
    async fn fetch_metadata(&self, symbol: &str) -> Result<SymbolMetadata>;
}

/// Load metadata once for every symbol; failures yield empty metadata
pub async fn load_metadata(source: &dyn QuoteSource, symbols: &[String]) -> HashMap<String, SymbolMetadata> {
    let mut metadata = HashMap::with_capacity(symbols.len());

    for symbol in symbols {
        let meta = match source.fetch_metadata(symbol).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Error loading metadata for {}: {} ({})", symbol, e, e.error_code());
                SymbolMetadata::default()
            }
        };
        metadata.insert(symbol.clone(), meta);
    }

    info!("📋 Loaded metadata for {} symbols", metadata.len());
    metadata
}
