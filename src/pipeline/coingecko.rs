//! CoinGecko markets API integration
//!
//! ## API Reference
//!
//! Endpoint: https://api.coingecko.com/api/v3/coins/markets
//! Query: `vs_currency=usd&ids=bitcoin,ethereum,zcash&order=market_cap_desc&per_page=100&page=1&sparkline=false`
//! Returns: Array of market records (`symbol`, `current_price`, `total_volume`, ...)
//!
//! ## Usage
//!
//! ```ignore
//! use coinwatch::pipeline::coingecko::{CoinGeckoFetcher, MarketFetcher};
//!
//! let fetcher = CoinGeckoFetcher::new(&config)?;
//! let observations = fetcher.fetch().await?;
//! ```

use super::config::PipelineConfig;
use super::error::{classify_status, FetchError};
use super::types::Observation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Source of market snapshots
///
/// One call returns the current observation for every instrument the
/// source could price. Must be safe to retry.
#[async_trait]
pub trait MarketFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Observation>, FetchError>;
}

/// CoinGecko market record (only the fields we use)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRecord {
    pub symbol: String,
    pub current_price: Option<f64>,
    pub total_volume: Option<f64>,
}

pub struct CoinGeckoFetcher {
    client: reqwest::Client,
    api_url: String,
    coin_ids: Vec<String>,
    vs_currency: String,
}

impl CoinGeckoFetcher {
    pub fn new(config: &PipelineConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.fetch_timeout_ms))
            .user_agent(concat!("coinwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Unexpected(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            coin_ids: config.coin_ids.clone(),
            vs_currency: config.vs_currency.clone(),
        })
    }
}

#[async_trait]
impl MarketFetcher for CoinGeckoFetcher {
    async fn fetch(&self) -> Result<Vec<Observation>, FetchError> {
        let ids = self.coin_ids.join(",");

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("vs_currency", self.vs_currency.as_str()),
                ("ids", ids.as_str()),
                ("order", "market_cap_desc"),
                ("per_page", "100"),
                ("page", "1"),
                ("sparkline", "false"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(
                status.as_u16(),
                format!("CoinGecko API error: {}", status),
            ));
        }

        let body = response.text().await?;
        let observations = parse_markets(&body, Utc::now())?;

        if observations.len() < self.coin_ids.len() {
            log::warn!(
                "⚠️  Partial batch: {} of {} instruments priced",
                observations.len(),
                self.coin_ids.len()
            );
        }

        Ok(observations)
    }
}

/// Decode a markets response into observations stamped with `fetched_at`
///
/// Records without a price or volume are skipped; the rest of the batch
/// is still returned. A body that is not a market array is `Unexpected`.
pub fn parse_markets(body: &str, fetched_at: DateTime<Utc>) -> Result<Vec<Observation>, FetchError> {
    let records: Vec<MarketRecord> = serde_json::from_str(body)
        .map_err(|e| FetchError::Unexpected(format!("invalid markets payload: {}", e)))?;

    let observations = records
        .into_iter()
        .filter_map(|record| {
            let symbol = record.symbol.trim().to_uppercase();
            match (record.current_price, record.total_volume) {
                (Some(price), Some(volume)) if !symbol.is_empty() => {
                    Some(Observation::new(fetched_at, symbol, price, volume))
                }
                _ => {
                    log::warn!("⚠️  Skipping incomplete market record for '{}'", record.symbol);
                    None
                }
            }
        })
        .collect();

    Ok(observations)
}
