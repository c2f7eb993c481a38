use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Token quantity in minimal units.
pub type Amount = u64;

/// Opaque account identity (address-equivalent).
///
/// The ledger never authenticates an identity; whoever hosts it resolves
/// "who is calling" and passes the resulting id in.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(LedgerError::InvalidAccount {
                value: s.to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Descriptive token data. Carried by the ledger, never consulted by it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenMetadata {
    /// Minimal units in one whole token, if it fits in [`Amount`].
    pub fn unit(&self) -> Option<Amount> {
        (10 as Amount).checked_pow(u32::from(self.decimals))
    }
}

impl Default for TokenMetadata {
    fn default() -> Self {
        Self {
            name: "HelloToken33".to_string(),
            symbol: "HT33".to_string(),
            decimals: 18,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_parsing_trims_and_rejects_blank() {
        let id: AccountId = "  alice ".parse().unwrap();
        assert_eq!(id.as_str(), "alice");
        assert!(matches!(
            "   ".parse::<AccountId>(),
            Err(LedgerError::InvalidAccount { .. })
        ));
    }

    #[test]
    fn account_id_serializes_as_plain_string() {
        let id = AccountId::from("0xabc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"0xabc\"");
    }

    #[test]
    fn metadata_unit_respects_decimals() {
        let meta = TokenMetadata::default();
        assert_eq!(meta.unit(), Some(1_000_000_000_000_000_000));
        let too_wide = TokenMetadata {
            decimals: 20,
            ..TokenMetadata::default()
        };
        assert_eq!(too_wide.unit(), None);
    }
}
