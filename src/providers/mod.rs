//! Balance providers: one per external platform.
//!
//! Every provider owns its authentication state and turns a page or API
//! response into a native-coin amount plus its USD equivalent. The scheduler
//! only talks to [`BalanceProvider`].

pub mod cloudatcost;
pub mod ethermine;
pub mod totp;

pub use cloudatcost::CloudAtCostProvider;
pub use ethermine::EthermineProvider;

use anyhow::Result;
use rust_decimal::Decimal;

use crate::models::Source;

/// Failures raised at the provider boundary. None of them are retried.
///
/// Providers return `anyhow::Result`; these travel inside it unchanged so the
/// binary can map each kind to its own exit status.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Can't get the anti-forgery token from the login page")]
    CsrfUnavailable,

    #[error("Login requires a second factor but no seed is configured")]
    MissingSecondFactor,

    #[error("A second-factor seed is configured but the login did not ask for it")]
    UnexpectedAbsentChallenge,

    #[error("Second-factor seed is not valid base32")]
    InvalidSecondFactorSeed,

    #[error("Connection problem to {url}")]
    ConnectionFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Can't find the balance in the {provider} response")]
    BalanceMarkupNotFound { provider: Source },
}

impl ProviderError {
    pub(crate) fn connection(url: impl Into<String>, source: reqwest::Error) -> Self {
        ProviderError::ConnectionFailed {
            url: url.into(),
            source,
        }
    }
}

/// Whether the provider ended up with a usable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Authenticated,
    /// Login went through every step but the landing page never showed the
    /// authenticated marker. Balance fetches return the sentinel.
    Rejected,
}

impl AuthStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthStatus::Authenticated)
    }
}

/// One balance observation from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceReading {
    Observed { value: Decimal, usd: Decimal },
    /// The provider has no authenticated session; no request was made.
    Unauthenticated,
}

impl BalanceReading {
    /// Value used for the sentinel on both amounts.
    pub const SENTINEL: Decimal = Decimal::NEGATIVE_ONE;

    pub fn observed(value: Decimal, usd: Decimal) -> Self {
        BalanceReading::Observed { value, usd }
    }

    /// `(value, usd)`, with both set to -1 for the unauthenticated sentinel.
    pub fn amounts(&self) -> (Decimal, Decimal) {
        match self {
            BalanceReading::Observed { value, usd } => (*value, *usd),
            BalanceReading::Unauthenticated => (Self::SENTINEL, Self::SENTINEL),
        }
    }
}

/// Contract shared by every balance source.
#[async_trait::async_trait]
pub trait BalanceProvider: Send {
    fn source(&self) -> Source;

    /// Establish (or reuse) a session. Fatal conditions are errors; a login
    /// that simply did not stick is [`AuthStatus::Rejected`].
    async fn authenticate(&mut self) -> Result<AuthStatus>;

    /// Current balance, or the sentinel when not authenticated.
    async fn fetch_balance(&mut self) -> Result<BalanceReading>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_amounts_are_out_of_domain() {
        let (value, usd) = BalanceReading::Unauthenticated.amounts();
        assert_eq!(value, Decimal::NEGATIVE_ONE);
        assert_eq!(usd, Decimal::NEGATIVE_ONE);
    }

    #[test]
    fn observed_amounts_pass_through() {
        let reading = BalanceReading::observed(Decimal::new(123, 5), Decimal::new(4150, 2));
        assert_eq!(reading.amounts(), (Decimal::new(123, 5), Decimal::new(4150, 2)));
    }
}
