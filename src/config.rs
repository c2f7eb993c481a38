use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LedgerError;
use crate::event::LedgerEvent;
use crate::ledger::TokenLedger;
use crate::types::{AccountId, Amount, TokenMetadata};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed genesis config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid genesis config: {0}")]
    Invalid(String),
    #[error("genesis allocation failed: {0}")]
    Ledger(#[from] LedgerError),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Allocation {
    pub account: AccountId,
    pub amount: Amount,
}

/// Genesis description of a ledger: who administers it, what it is called,
/// and which balances exist before the first operation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    #[serde(default)]
    pub metadata: TokenMetadata,
    pub admin: AccountId,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    #[serde(default)]
    pub paused: bool,
}

impl LedgerConfig {
    pub fn new(admin: AccountId) -> Self {
        Self {
            metadata: TokenMetadata::default(),
            admin,
            allocations: Vec::new(),
            paused: false,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admin.as_str().trim().is_empty() {
            return Err(ConfigError::Invalid("admin must not be empty".into()));
        }
        if self.metadata.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("symbol must not be empty".into()));
        }
        if self.metadata.unit().is_none() {
            return Err(ConfigError::Invalid(format!(
                "decimals {} too large for a 64-bit amount",
                self.metadata.decimals
            )));
        }
        if self
            .allocations
            .iter()
            .any(|a| a.account.as_str().trim().is_empty())
        {
            return Err(ConfigError::Invalid("allocation account must not be empty".into()));
        }
        self.allocations
            .iter()
            .try_fold(0 as Amount, |total, a| total.checked_add(a.amount))
            .ok_or_else(|| ConfigError::Invalid("allocations overflow the total supply".into()))?;
        Ok(())
    }

    /// Builds the ledger, minting each allocation as the admin.
    ///
    /// Returns the genesis `Mint` events alongside the ledger.
    pub fn build(&self) -> Result<(TokenLedger, Vec<LedgerEvent>), ConfigError> {
        self.validate()?;
        let mut ledger = TokenLedger::new(self.admin.clone(), self.metadata.clone());
        let mut events = Vec::with_capacity(self.allocations.len());
        for allocation in &self.allocations {
            events.extend(ledger.mint(&self.admin, &allocation.account, allocation.amount)?);
        }
        if self.paused {
            ledger.pause(&self.admin)?;
        }
        info!(
            symbol = %self.metadata.symbol,
            admin = %self.admin,
            total_supply = ledger.total_supply(),
            paused = ledger.paused(),
            "genesis ledger built"
        );
        Ok((ledger, events))
    }
}
