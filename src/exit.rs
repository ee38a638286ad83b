//! Process exit statuses, one per failure kind, so a cron job or systemd
//! unit can tell causes apart.

use crate::config::ConfigError;
use crate::providers::ProviderError;

pub const SUCCESS: i32 = 0;
pub const GENERAL_FAILURE: i32 = 1;
pub const CONNECTION_FAILED: i32 = 2;
pub const CSRF_UNAVAILABLE: i32 = 3;
pub const MISSING_SECOND_FACTOR: i32 = 4;
pub const BALANCE_MARKUP_NOT_FOUND: i32 = 5;
pub const UNEXPECTED_ABSENT_CHALLENGE: i32 = 6;
pub const INVALID_SECOND_FACTOR_SEED: i32 = 7;

pub fn provider_exit_code(err: &ProviderError) -> i32 {
    match err {
        ProviderError::ConnectionFailed { .. } => CONNECTION_FAILED,
        ProviderError::CsrfUnavailable => CSRF_UNAVAILABLE,
        ProviderError::MissingSecondFactor => MISSING_SECOND_FACTOR,
        ProviderError::BalanceMarkupNotFound { .. } => BALANCE_MARKUP_NOT_FOUND,
        ProviderError::UnexpectedAbsentChallenge => UNEXPECTED_ABSENT_CHALLENGE,
        ProviderError::InvalidSecondFactorSeed => INVALID_SECOND_FACTOR_SEED,
    }
}

/// Status for an error that ended the run. Looks through any context layers.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(provider) = cause.downcast_ref::<ProviderError>() {
            return provider_exit_code(provider);
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return GENERAL_FAILURE;
        }
    }
    GENERAL_FAILURE
}
