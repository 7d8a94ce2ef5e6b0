/// HTTP quote provider: one JSON object per symbol from `{base}/quote/{symbol}`
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::source::normalizer::metadata_from_info;
use crate::source::{QuoteSource, RawQuote, SymbolFetch};
use crate::types::SymbolMetadata;

/// Quote client backed by reqwest
pub struct HttpQuoteSource {
    client: Client,
    base_url: String,
}

impl HttpQuoteSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(HttpQuoteSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn quote_url(&self, symbol: &str) -> String {
        format!("{}/quote/{}", self.base_url, symbol)
    }

    pub fn info_url(&self, symbol: &str) -> String {
        format!("{}/info/{}", self.base_url, symbol)
    }

    async fn get_object(&self, url: &str) -> Result<RawQuote> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        debug!("GET {} -> {}", url, status);

        if !status.is_success() {
            return Err(PipelineError::UpstreamApi {
                status: status.as_u16(),
                message: body,
            });
        }

        match serde_json::from_str::<Value>(&body)? {
            Value::Object(map) => Ok(map),
            other => Err(PipelineError::UpstreamApi {
                status: status.as_u16(),
                message: format!("expected a JSON object, got {}", other),
            }),
        }
    }

    async fn fetch_one(&self, symbol: &str) -> SymbolFetch {
        let result = self
            .get_object(&self.quote_url(symbol))
            .await
            .map_err(|e| PipelineError::UpstreamFetch {
                symbol: symbol.to_string(),
                message: e.to_string(),
            });

        SymbolFetch {
            symbol: symbol.to_string(),
            result,
        }
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_quotes(&self, symbols: &[String]) -> Vec<SymbolFetch> {
        join_all(symbols.iter().map(|symbol| self.fetch_one(symbol))).await
    }

    async fn fetch_metadata(&self, symbol: &str) -> Result<SymbolMetadata> {
        let info = self.get_object(&self.info_url(symbol)).await?;
        Ok(metadata_from_info(&info))
    }
}
