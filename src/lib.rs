//! Fungible token ledger.
//!
//! [`TokenLedger`] is a single-writer state machine over balances,
//! allowances, a pause flag and an admin identity. Every mutating operation
//! takes the caller explicitly and returns the events it emitted:
//!
//! * [`ledger`] — mint, burn, transfer, approve, transfer-from, pause.
//! * [`shared`] — a mutex-guarded handle for multi-threaded hosts.
//! * [`config`] — JSON genesis files.
//! * [`script`] — JSON-lines operation scripts and their replay.

pub mod config;
pub mod error;
pub mod event;
pub mod ledger;
pub mod script;
pub mod shared;
pub mod types;

pub use config::{Allocation, ConfigError, LedgerConfig};
pub use error::LedgerError;
pub use event::LedgerEvent;
pub use ledger::{LedgerSnapshot, Operation, Outcome, SnapshotError, TokenLedger};
pub use shared::SharedLedger;
pub use types::{AccountId, Amount, TokenMetadata};
