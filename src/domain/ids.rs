//! Type-safe identifiers for the settlement domain.
//!
//! Newtypes prevent a builder id from being confused with an arbitrary UUID,
//! a claim-token id from a quantity, or a wallet string from a transaction
//! hash. Addresses and hashes are validated at the boundary so that every
//! value inside the engine is well-formed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Unique identifier for a builder (contributor) account.
///
/// Wraps a UUID v4. Generated once at registration time and immutable
/// thereafter. Used as the key in the builder registry, the gem receipt
/// index, and the points receipt index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuilderId(uuid::Uuid);

impl BuilderId {
    /// Creates a new random `BuilderId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `BuilderId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for BuilderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BuilderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for BuilderId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl From<BuilderId> for uuid::Uuid {
    fn from(id: BuilderId) -> Self {
        id.0
    }
}

/// Season number. Seasons partition stake and payout cohorts; week numbering
/// resets per calendar year, seasons only grow.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Season(pub u32);

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// ISO week key, e.g. `2026-W08`.
///
/// Weeks are always passed explicitly through ledger and distribution calls
/// so that back-dated reprocessing of a past week is deterministic; there is
/// no ambient "current week" anywhere in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Week {
    year: i32,
    number: u8,
}

impl Week {
    /// Creates a week key. The week number is clamped to the ISO range 1–53.
    #[must_use]
    pub fn new(year: i32, number: u8) -> Self {
        Self {
            year,
            number: number.clamp(1, 53),
        }
    }

    /// Year component.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// ISO week number component (1–53).
    #[must_use]
    pub const fn number(&self) -> u8 {
        self.number
    }
}

impl fmt::Display for Week {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.number)
    }
}

impl FromStr for Week {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidRequest(format!("invalid week key: {s}"));
        let (year, number) = s.split_once("-W").ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let number: u8 = number.parse().map_err(|_| invalid())?;
        if !(1..=53).contains(&number) {
            return Err(invalid());
        }
        Ok(Self { year, number })
    }
}

impl Serialize for Week {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Week {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// On-chain claim-token id: the token representing a backer's stake in one
/// builder. One claim id per builder per season.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClaimId(pub u64);

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated, lowercase EVM wallet address (`0x` + 40 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Parses and normalizes an address string.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedAddress`] unless the input is `0x`
    /// followed by exactly 40 hex characters.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        let hex = s
            .strip_prefix("0x")
            .ok_or_else(|| EngineError::MalformedAddress(s.to_string()))?;
        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(EngineError::MalformedAddress(s.to_string()));
        }
        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    /// The zero (mint/burn) address.
    #[must_use]
    pub fn zero() -> Self {
        Self(format!("0x{}", "0".repeat(40)))
    }

    /// Returns `true` if this is the zero address.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.bytes().skip(2).all(|b| b == b'0')
    }

    /// String form (`0x`-prefixed, lowercase).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated, lowercase transaction hash (`0x` + 64 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    /// Parses and normalizes a transaction hash string.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRequest`] unless the input is `0x`
    /// followed by exactly 64 hex characters.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        let hex = s
            .strip_prefix("0x")
            .ok_or_else(|| EngineError::InvalidRequest(format!("invalid tx hash: {s}")))?;
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(EngineError::InvalidRequest(format!("invalid tx hash: {s}")));
        }
        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    /// String form (`0x`-prefixed, lowercase).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
