#![allow(dead_code)]

use std::path::Path;

use anyhow::Result;
use minerwatch::config::{CloudAtCostConfig, EthermineConfig};
use minerwatch::providers::CloudAtCostProvider;
use minerwatch::session::SessionCache;
use secrecy::SecretString;

/// RFC 6238 test seed ("12345678901234567890").
pub const TOTP_SEED: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

pub const CSRF_TOKEN: &str = "tok-42";

pub const LANDING_AUTHENTICATED: &str =
    r#"<ul class="menu"><li><a href="/miners">Miners</a></li><li><a href="/wallet">Wallet</a></li></ul>"#;

pub const LANDING_ANONYMOUS: &str = r#"<a href="/login">Sign in</a>"#;

pub const LANDING_CHALLENGE: &str = r#"<h3>Two Factor Auth</h3><form action="/auth"></form>"#;

pub const WALLET_PAGE: &str = "<div class=\"card\">\n\
    <h1 class=\"font-30\">$41.50&nbsp;USD</h1>\n\
    <h1 class=\"font-30\">0.00123000&nbsp;BTC</h1>\n</div>";

pub fn login_page(token: &str) -> String {
    format!(
        r#"<form method="post" action="/login"><input type="hidden" name="_csrf" value="{token}"><input name="email"></form>"#
    )
}

pub fn cloudatcost_config(base_url: &str, code_2fa: Option<&str>) -> CloudAtCostConfig {
    CloudAtCostConfig {
        username: "miner@example.com".to_string(),
        password: SecretString::from("hunter2".to_string()),
        code_2fa: code_2fa.map(|seed| SecretString::from(seed.to_string())),
        base_url: Some(base_url.to_string()),
        goal_usd: None,
        goal_btc: None,
    }
}

pub fn cloudatcost_provider(
    base_url: &str,
    code_2fa: Option<&str>,
    cache_dir: &Path,
) -> Result<CloudAtCostProvider> {
    Ok(CloudAtCostProvider::new(cloudatcost_config(base_url, code_2fa))?
        .with_session_cache(SessionCache::with_path(cache_dir)?))
}

pub fn ethermine_config(base_url: &str) -> EthermineConfig {
    EthermineConfig {
        address: "0x0892c9b9b58ad5a7878d5dcd4da4ee72109c32c6".to_string(),
        base_url: Some(base_url.to_string()),
        goal_usd: None,
        goal_eth: None,
    }
}

pub fn current_stats_body(unpaid_wei: &str) -> String {
    format!(r#"{{"status":"OK","data":{{"time":1651893420,"unpaid":{unpaid_wei},"activeWorkers":2}}}}"#)
}

pub fn pool_stats_body(price_usd: &str) -> String {
    format!(r#"{{"status":"OK","data":{{"price":{{"time":1651893420,"usd":{price_usd},"btc":0.0741}}}}}}"#)
}
