use thiserror::Error;

use crate::types::{AccountId, Amount};

/// Failures reported by the ledger. A failed operation never changes state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Admin-only operation invoked by someone else.
    #[error("caller {caller} is not the token admin")]
    Unauthorized { caller: AccountId },

    /// Source account lacks funds for a burn or transfer.
    #[error("Insufficient balance")]
    InsufficientBalance {
        account: AccountId,
        balance: Amount,
        requested: Amount,
    },

    /// Delegated transfer exceeds what the owner approved.
    #[error("insufficient allowance: {spender} may move {allowance} of {owner}, not {requested}")]
    InsufficientAllowance {
        owner: AccountId,
        spender: AccountId,
        allowance: Amount,
        requested: Amount,
    },

    /// Transfer-family operation while the ledger is paused.
    #[error("token transfers are paused")]
    Paused,

    /// Mint would push the total supply past `Amount::MAX`.
    #[error("mint of {requested} overflows total supply {total_supply}")]
    SupplyOverflow {
        total_supply: Amount,
        requested: Amount,
    },

    #[error("invalid account id {value:?}")]
    InvalidAccount { value: String },
}
