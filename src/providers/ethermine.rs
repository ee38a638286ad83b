//! Ethermine pool API. Balances are public per wallet address, so there is no
//! login step.

use anyhow::{Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{AuthStatus, BalanceProvider, BalanceReading, ProviderError};
use crate::config::EthermineConfig;
use crate::models::Source;

pub const DEFAULT_BASE_URL: &str = "https://api.ethermine.org";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct CurrentStats {
    /// Unpaid balance in wei.
    unpaid: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct PoolStats {
    price: PoolPrice,
}

#[derive(Debug, Deserialize)]
struct PoolPrice {
    usd: Decimal,
}

/// Converts a wei amount to ETH.
pub fn wei_to_eth(wei: Decimal) -> Decimal {
    (wei * Decimal::new(1, 18)).normalize()
}

/// `(eth, usd)` for an unpaid wei balance at `price_usd` per ETH.
pub fn unpaid_amounts(unpaid_wei: Decimal, price_usd: Decimal) -> (Decimal, Decimal) {
    let eth = wei_to_eth(unpaid_wei);
    let usd = (eth * price_usd).round_dp(2);
    (eth, usd)
}

/// Ethermine balance provider.
pub struct EthermineProvider {
    client: Client,
    base_url: String,
    address: String,
}

impl EthermineProvider {
    pub fn new(config: EthermineConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("minerwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            address: config.address,
        })
    }

    async fn request<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::connection(&url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::connection(&url, e))?;
        debug!(url = %url, status = %status, "ethermine response");

        let parsed: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(error = %err, "Unexpected ethermine payload");
                return Err(Self::not_found());
            }
        };
        if !status.is_success() || parsed.status != "OK" {
            return Err(Self::not_found());
        }
        Ok(parsed.data)
    }

    fn not_found() -> anyhow::Error {
        ProviderError::BalanceMarkupNotFound {
            provider: Source::Ethermine,
        }
        .into()
    }
}

#[async_trait::async_trait]
impl BalanceProvider for EthermineProvider {
    fn source(&self) -> Source {
        Source::Ethermine
    }

    async fn authenticate(&mut self) -> Result<AuthStatus> {
        Ok(AuthStatus::Authenticated)
    }

    async fn fetch_balance(&mut self) -> Result<BalanceReading> {
        let stats: CurrentStats = self
            .request(&format!("/miner/{}/currentStats", self.address))
            .await?;
        let unpaid = stats.unpaid.ok_or_else(Self::not_found)?;

        let pool: PoolStats = self.request("/poolStats").await?;

        let (eth, usd) = unpaid_amounts(unpaid, pool.price.usd);
        Ok(BalanceReading::observed(eth, usd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_wei() {
        assert_eq!(
            wei_to_eth(Decimal::from(1_230_000_000_000_000u64)),
            Decimal::new(123, 5)
        );
        assert_eq!(wei_to_eth(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn usd_is_rounded_to_cents() {
        let (eth, usd) = unpaid_amounts(
            Decimal::from(1_230_000_000_000_000u64),
            Decimal::from(33_740),
        );
        assert_eq!(eth, Decimal::new(123, 5));
        assert_eq!(usd, Decimal::new(4150, 2));
    }
}
