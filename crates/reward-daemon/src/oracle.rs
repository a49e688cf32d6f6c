//! Price oracle client: fetches USD quotes over HTTP, cached for
//! [`OracleConfig::cache_ttl_secs`] and served stale (flagged) for up to
//! [`OracleConfig::stale_after_secs`] past that when the upstream is down.

use crate::config::OracleConfig;
use parking_lot::RwLock;
use reward_types::{RewardError, RewardResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub struct Quote {
    pub price_usd: f64,
    pub as_of: Instant,
    pub stale: bool,
}

struct CacheEntry {
    quote: Quote,
    fetched_at: Instant,
}

#[derive(Deserialize)]
struct QuoteResponse {
    price: f64,
}

#[derive(Clone)]
pub struct PriceOracleClient {
    http: reqwest::Client,
    endpoint: String,
    cache_ttl: Duration,
    stale_after: Duration,
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl PriceOracleClient {
    pub fn new(config: &OracleConfig) -> RewardResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| RewardError::Config(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            stale_after: Duration::from_secs(config.stale_after_secs),
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Returns a USD quote for `asset`, refreshing from the upstream when
    /// the cached entry has aged past the TTL. Falls back to the last known
    /// quote (marked `stale: true`) when the fetch fails, up to the
    /// staleness horizon; beyond that, returns [`RewardError::PriceUnavailable`].
    pub async fn quote_usd(&self, asset: &str) -> RewardResult<Quote> {
        if let Some(entry) = self.cache.read().get(asset) {
            if entry.fetched_at.elapsed() < self.cache_ttl {
                return Ok(entry.quote);
            }
        }

        match self.fetch(asset).await {
            Ok(price) => {
                let quote = Quote {
                    price_usd: price,
                    as_of: Instant::now(),
                    stale: false,
                };
                self.cache.write().insert(
                    asset.to_string(),
                    CacheEntry { quote, fetched_at: Instant::now() },
                );
                Ok(quote)
            }
            Err(fetch_err) => {
                let stale = self.cache.read().get(asset).map(|e| (e.quote, e.fetched_at));
                match stale {
                    Some((quote, fetched_at)) if fetched_at.elapsed() < self.stale_after => {
                        tracing::warn!(asset, error = %fetch_err, "serving stale price quote");
                        Ok(Quote { stale: true, ..quote })
                    }
                    _ => Err(RewardError::PriceUnavailable),
                }
            }
        }
    }

    async fn fetch(&self, asset: &str) -> RewardResult<f64> {
        let url = format!("{}?asset={}", self.endpoint, asset);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RewardError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RewardError::Transient(format!("oracle returned {}", response.status())));
        }
        let body: QuoteResponse = response
            .json()
            .await
            .map_err(|e| RewardError::Unavailable(e.to_string()))?;
        Ok(body.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Port 1 is a reserved, unassignable port; connecting to it fails fast
    /// with "connection refused" instead of waiting out the client timeout,
    /// letting these tests exercise the unreachable-upstream branches.
    fn unreachable_client(cache_ttl_secs: u64, stale_after_secs: u64) -> PriceOracleClient {
        PriceOracleClient::new(&OracleConfig {
            endpoint: "http://127.0.0.1:1/quote".into(),
            cache_ttl_secs,
            stale_after_secs,
        })
        .unwrap()
    }

    fn seed_cache(client: &PriceOracleClient, asset: &str, price_usd: f64, age: Duration) {
        let quote = Quote { price_usd, as_of: Instant::now() - age, stale: false };
        client
            .cache
            .write()
            .insert(asset.to_string(), CacheEntry { quote, fetched_at: Instant::now() - age });
    }

    #[tokio::test]
    async fn fresh_cached_quote_is_served_without_refetch() {
        let client = unreachable_client(60, 600);
        seed_cache(&client, "native", 2.5, Duration::from_secs(5));

        let quote = client.quote_usd("native").await.unwrap();
        assert_eq!(quote.price_usd, 2.5);
        assert!(!quote.stale);
    }

    #[tokio::test]
    async fn expired_cache_falls_back_to_stale_quote_when_upstream_unreachable() {
        let client = unreachable_client(10, 600);
        seed_cache(&client, "native", 2.5, Duration::from_secs(30));

        let quote = client.quote_usd("native").await.unwrap();
        assert_eq!(quote.price_usd, 2.5);
        assert!(quote.stale);
    }

    #[tokio::test]
    async fn no_cache_and_unreachable_upstream_is_price_unavailable() {
        let client = unreachable_client(10, 600);
        let err = client.quote_usd("native").await.unwrap_err();
        assert!(matches!(err, RewardError::PriceUnavailable));
    }

    #[tokio::test]
    async fn cache_past_staleness_horizon_is_price_unavailable() {
        let client = unreachable_client(10, 60);
        seed_cache(&client, "native", 2.5, Duration::from_secs(120));

        let err = client.quote_usd("native").await.unwrap_err();
        assert!(matches!(err, RewardError::PriceUnavailable));
    }

    #[test]
    fn cache_entry_considered_stale_past_horizon() {
        let entry = CacheEntry {
            quote: Quote { price_usd: 1.0, as_of: Instant::now(), stale: false },
            fetched_at: Instant::now() - Duration::from_secs(700),
        };
        assert!(entry.fetched_at.elapsed() > Duration::from_secs(600));
    }
}
