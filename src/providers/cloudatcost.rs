//! CloudAtCost wallet panel.
//!
//! The panel is a server-rendered site with a cookie session and a `_csrf`
//! form token. Login is:
//!
//! 1. replay the cached cookie jar and probe the landing page;
//! 2. otherwise GET `/login` for a token, POST the credentials;
//! 3. answer the "Two Factor Auth" challenge with a TOTP code if one is shown;
//! 4. look for the miners menu on the landing page.
//!
//! The balance is then scraped from `/wallet`.

use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::header::{COOKIE, ORIGIN, REFERER};
use reqwest::{redirect, Client, RequestBuilder};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use super::{totp, AuthStatus, BalanceProvider, BalanceReading, ProviderError};
use crate::clock::{Clock, SystemClock};
use crate::config::CloudAtCostConfig;
use crate::models::Source;
use crate::session::{SessionCache, SessionData};

pub const DEFAULT_BASE_URL: &str = "https://wallet.cloudatcost.com";

/// Cache key of the persisted cookie jar.
pub const SESSION_KEY: &str = "wallet_cloudatcost";

const USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 6.0; Nexus 5 Build/MRA58N) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.212 Mobile Safari/537.36";

/// Only rendered for a logged-in account with the mining feature.
const AUTHENTICATED_MARKER: &str = ">Miners<";
const SECOND_FACTOR_MARKER: &str = "Two Factor Auth";

static CSRF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"_csrf" value="([^"]+)""#).expect("valid csrf regex"));

static WALLET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"font-30">\$(?P<usd>.+)&nbsp;USD</h1>\n.*font-30">(?P<btc>.+)&nbsp;BTC<"#)
        .expect("valid wallet regex")
});

/// Anti-forgery token embedded in the login form.
pub fn extract_csrf(page: &str) -> Option<String> {
    CSRF_RE
        .captures(page)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// `(btc, usd)` from the wallet page, if the balance block is present and
/// both amounts parse.
pub fn extract_wallet(page: &str) -> Option<(Decimal, Decimal)> {
    let caps = WALLET_RE.captures(page)?;
    let usd = Decimal::from_str(caps.name("usd")?.as_str().trim()).ok()?;
    let btc = Decimal::from_str(caps.name("btc")?.as_str().trim()).ok()?;
    Some((btc, usd))
}

pub fn shows_authenticated(page: &str) -> bool {
    page.contains(AUTHENTICATED_MARKER)
}

pub fn shows_second_factor_challenge(page: &str) -> bool {
    page.contains(SECOND_FACTOR_MARKER)
}

/// CloudAtCost balance provider.
pub struct CloudAtCostProvider {
    client: Client,
    base_url: String,
    username: String,
    password: SecretString,
    code_2fa: Option<SecretString>,
    session_cache: SessionCache,
    session: SessionData,
    authenticated: bool,
    clock: Arc<dyn Clock>,
}

impl CloudAtCostProvider {
    pub fn new(config: CloudAtCostConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            // Set-Cookie on redirects must land in our own jar.
            .redirect(redirect::Policy::none())
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
            username: config.username,
            password: config.password,
            code_2fa: config.code_2fa.filter(|seed| !seed.expose_secret().trim().is_empty()),
            session_cache: SessionCache::new(),
            session: SessionData::new(),
            authenticated: false,
            clock: Arc::new(SystemClock),
        })
    }

    /// Use a different location for the persisted cookie jar.
    pub fn with_session_cache(mut self, session_cache: SessionCache) -> Self {
        self.session_cache = session_cache;
        self
    }

    /// Time source for one-time codes and session capture stamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_cookies(&self, req: RequestBuilder) -> RequestBuilder {
        if self.session.is_empty() {
            req
        } else {
            req.header(COOKIE, self.session.cookie_header())
        }
    }

    /// Send a request and return the body. Status codes are not checked: the
    /// markers in the body decide what happened.
    async fn send(&mut self, url: String, req: RequestBuilder) -> Result<String> {
        let response = self
            .with_cookies(req)
            .send()
            .await
            .map_err(|e| ProviderError::connection(&url, e))?;

        debug!(url = %url, status = %response.status(), "cloudatcost response");
        self.session.absorb_set_cookies(response.headers());

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::connection(&url, e))?;
        Ok(body)
    }

    async fn get_page(&mut self, path: &str) -> Result<String> {
        let url = self.url(path);
        let req = self.client.get(&url);
        self.send(url, req).await
    }

    async fn post_form(&mut self, path: &str, form: &[(&str, &str)]) -> Result<String> {
        let url = self.url(path);
        let req = self
            .client
            .post(&url)
            .header(ORIGIN, self.base_url.as_str())
            .header(REFERER, self.url("/login"))
            .form(form);
        self.send(url, req).await
    }

    /// Replay a persisted cookie jar. True when the landing page shows the
    /// authenticated marker.
    ///
    /// An unreadable blob is discarded so the login form can replace it.
    async fn resume_session(&mut self) -> Result<bool> {
        let cached = match self.session_cache.get(SESSION_KEY) {
            Ok(Some(cached)) => cached,
            Ok(None) => return Ok(false),
            Err(err) => {
                warn!("Discarding unreadable cloudatcost session: {err:#}");
                self.session_cache.delete(SESSION_KEY)?;
                return Ok(false);
            }
        };

        info!(
            path = %self.session_cache.session_file(SESSION_KEY).display(),
            "Reusing cached cloudatcost session"
        );
        self.session = cached;
        let landing = self.get_page("/").await?;
        Ok(shows_authenticated(&landing))
    }

    async fn fetch_csrf(&mut self) -> Result<String> {
        debug!("Fetching cloudatcost login form");
        let page = self.get_page("/login").await?;
        match extract_csrf(&page) {
            Some(token) => Ok(token),
            None => Err(ProviderError::CsrfUnavailable.into()),
        }
    }

    /// POST the credentials and return the landing page that follows.
    ///
    /// The cookie jar is persisted right after the POST, before any second
    /// factor is answered.
    async fn submit_credentials(&mut self, csrf: &str) -> Result<String> {
        debug!(username = %self.username, "Submitting cloudatcost credentials");
        let username = self.username.clone();
        let password = self.password.expose_secret().to_string();
        self.post_form(
            "/login",
            &[
                ("email", username.as_str()),
                ("password", password.as_str()),
                ("_csrf", csrf),
            ],
        )
        .await?;

        self.session.captured_at = Some(self.clock.unix_timestamp());
        self.session_cache
            .set(SESSION_KEY, &self.session)
            .context("Failed to persist cloudatcost session")?;

        self.get_page("/").await
    }

    async fn resolve_second_factor(&mut self, csrf: &str, landing: String) -> Result<String> {
        let challenged = shows_second_factor_challenge(&landing);
        let code = match (challenged, &self.code_2fa) {
            (true, None) => return Err(ProviderError::MissingSecondFactor.into()),
            (false, Some(_)) => return Err(ProviderError::UnexpectedAbsentChallenge.into()),
            (false, None) => return Ok(landing),
            (true, Some(seed)) => {
                totp::current_code(seed.expose_secret(), self.clock.unix_timestamp())?
            }
        };

        debug!("Answering cloudatcost second-factor challenge");
        self.post_form("/auth", &[("authCode", code.as_str()), ("_csrf", csrf)])
            .await?;
        self.get_page("/").await
    }
}

#[async_trait::async_trait]
impl BalanceProvider for CloudAtCostProvider {
    fn source(&self) -> Source {
        Source::CloudAtCost
    }

    async fn authenticate(&mut self) -> Result<AuthStatus> {
        if self.resume_session().await? {
            self.authenticated = true;
            return Ok(AuthStatus::Authenticated);
        }

        let csrf = self.fetch_csrf().await?;
        let landing = self.submit_credentials(&csrf).await?;
        let landing = self.resolve_second_factor(&csrf, landing).await?;

        self.authenticated = shows_authenticated(&landing);
        if self.authenticated {
            info!("Logged in to cloudatcost");
            Ok(AuthStatus::Authenticated)
        } else {
            warn!("Cloudatcost login did not reach the miners page");
            Ok(AuthStatus::Rejected)
        }
    }

    async fn fetch_balance(&mut self) -> Result<BalanceReading> {
        if !self.authenticated {
            return Ok(BalanceReading::Unauthenticated);
        }

        let page = self.get_page("/wallet").await?;
        match extract_wallet(&page) {
            Some((btc, usd)) => Ok(BalanceReading::observed(btc, usd)),
            None => Err(ProviderError::BalanceMarkupNotFound {
                provider: Source::CloudAtCost,
            }
            .into()),
        }
    }
}
