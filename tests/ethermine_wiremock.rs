mod support;

use anyhow::Result;
use minerwatch::models::Source;
use minerwatch::providers::{AuthStatus, BalanceProvider, BalanceReading, EthermineProvider, ProviderError};
use rust_decimal::Decimal;
use support::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MINER_PATH: &str = "/miner/0x0892c9b9b58ad5a7878d5dcd4da4ee72109c32c6/currentStats";

async fn mount_json(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn reads_unpaid_balance_and_price() -> Result<()> {
    let server = MockServer::start().await;
    mount_json(&server, MINER_PATH, current_stats_body("1230000000000000")).await;
    mount_json(&server, "/poolStats", pool_stats_body("33740")).await;

    let mut provider = EthermineProvider::new(ethermine_config(&server.uri()))?;
    assert_eq!(provider.source(), Source::Ethermine);
    assert_eq!(provider.authenticate().await?, AuthStatus::Authenticated);

    let reading = provider.fetch_balance().await?;
    assert_eq!(
        reading,
        BalanceReading::observed(Decimal::new(123, 5), Decimal::new(4150, 2))
    );
    Ok(())
}

#[tokio::test]
async fn authenticate_makes_no_request() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut provider = EthermineProvider::new(ethermine_config(&server.uri()))?;
    assert!(provider.authenticate().await?.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn api_error_status_is_markup_not_found() -> Result<()> {
    let server = MockServer::start().await;
    mount_json(
        &server,
        MINER_PATH,
        r#"{"status":"ERROR","error":"Invalid address"}"#.to_string(),
    )
    .await;

    let mut provider = EthermineProvider::new(ethermine_config(&server.uri()))?;
    let err = provider.fetch_balance().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProviderError>(),
        Some(ProviderError::BalanceMarkupNotFound {
            provider: Source::Ethermine
        })
    ));
    Ok(())
}

#[tokio::test]
async fn missing_unpaid_field_is_markup_not_found() -> Result<()> {
    let server = MockServer::start().await;
    mount_json(&server, MINER_PATH, current_stats_body("null")).await;
    mount_json(&server, "/poolStats", pool_stats_body("33740")).await;

    let mut provider = EthermineProvider::new(ethermine_config(&server.uri()))?;
    let err = provider.fetch_balance().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProviderError>(),
        Some(ProviderError::BalanceMarkupNotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn unreachable_api_is_connection_failed() -> Result<()> {
    let mut provider = EthermineProvider::new(ethermine_config("http://127.0.0.1:9"))?;
    let err = provider.fetch_balance().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProviderError>(),
        Some(ProviderError::ConnectionFailed { .. })
    ));
    Ok(())
}
