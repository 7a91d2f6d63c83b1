//! Login token errors

use thiserror::Error;

/// Errors returned by the login token cache
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    /// Token is unknown: never issued, already redeemed, or expired
    #[error("login token not found")]
    RedemptionNotFound,
}

impl LoginError {
    /// Stale tokens are an expected client-side outcome
    pub fn is_fatal(&self) -> bool {
        false
    }
}
