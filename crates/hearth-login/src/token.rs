//! Login tokens and issuance ids
//!
//! A [`TokenId`] packs the issuance time into its upper bits:
//!
//! ```text
//!  63                    22 21            0
//! +------------------------+---------------+
//! | ms since 2020-01-01    |   sequence    |
//! +------------------------+---------------+
//! ```
//!
//! so sorting ids sorts tokens by issuance time, which is what lets the cache
//! expire tokens by scanning only its oldest prefix.

use std::fmt;

/// Unix milliseconds of 2020-01-01T00:00:00Z
pub const TOKEN_EPOCH_MS: u64 = 1_577_836_800_000;

const SEQUENCE_BITS: u32 = 22;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Opaque login credential handed to a client
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LoginToken(String);

impl LoginToken {
    /// Render a random 64-bit value as a token
    pub fn from_random(value: u64) -> Self {
        Self(value.to_string())
    }

    /// Wrap token text presented by a client
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the token text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are credentials; keep them out of debug logs.
impl fmt::Debug for LoginToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoginToken(..)")
    }
}

impl fmt::Display for LoginToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issuance-ordered token id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(u64);

impl TokenId {
    /// Raw id value
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Unix milliseconds at which this id was issued
    pub fn issued_at_ms(&self) -> u64 {
        (self.0 >> SEQUENCE_BITS) + TOKEN_EPOCH_MS
    }
}

/// Generator of strictly increasing [`TokenId`]s
///
/// If the clock stalls or steps backwards, ids keep the last timestamp and
/// bump the sequence; a full sequence borrows the next millisecond.
#[derive(Debug, Default)]
pub struct TokenIdGenerator {
    last_ms: u64,
    sequence: u64,
}

impl TokenIdGenerator {
    /// Create a generator
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id for a token issued at `now_ms`
    pub fn next_id(&mut self, now_ms: u64) -> TokenId {
        let elapsed = now_ms.saturating_sub(TOKEN_EPOCH_MS);
        if elapsed > self.last_ms {
            self.last_ms = elapsed;
            self.sequence = 0;
        } else {
            self.sequence += 1;
            if self.sequence > SEQUENCE_MASK {
                self.last_ms += 1;
                self.sequence = 0;
            }
        }
        TokenId((self.last_ms << SEQUENCE_BITS) | self.sequence)
    }
}
