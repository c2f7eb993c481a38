use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Amount};

/// Events emitted by successful ledger operations.
///
/// Variant names and field order match what external tooling subscribes
/// to: `Mint(to, amount)`, `Burn(from, amount)`,
/// `Transfer(from, to, amount)`, `Approval(owner, spender, amount)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LedgerEvent {
    Mint {
        to: AccountId,
        amount: Amount,
    },
    Burn {
        from: AccountId,
        amount: Amount,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    Approval {
        owner: AccountId,
        spender: AccountId,
        amount: Amount,
    },
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Mint { .. } => "Mint",
            LedgerEvent::Burn { .. } => "Burn",
            LedgerEvent::Transfer { .. } => "Transfer",
            LedgerEvent::Approval { .. } => "Approval",
        }
    }
}
