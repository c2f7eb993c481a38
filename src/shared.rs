use std::sync::Arc;

use parking_lot::Mutex;

use crate::ledger::{LedgerSnapshot, Operation, Outcome, TokenLedger};
use crate::types::AccountId;

/// Cloneable handle that serializes every operation on one ledger.
///
/// The lock is held for the whole operation, so concurrent callers always
/// observe some strict sequential order.
#[derive(Clone, Debug)]
pub struct SharedLedger {
    inner: Arc<Mutex<TokenLedger>>,
}

impl SharedLedger {
    pub fn new(ledger: TokenLedger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    pub fn execute(&self, caller: &AccountId, operation: &Operation) -> Outcome {
        self.inner.lock().execute(caller, operation)
    }

    /// Runs `f` against a consistent view of the ledger.
    pub fn read<R>(&self, f: impl FnOnce(&TokenLedger) -> R) -> R {
        f(&self.inner.lock())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.inner.lock().snapshot()
    }

    /// Returns the ledger if this is the last handle, otherwise a clone of it.
    pub fn into_inner(self) -> TokenLedger {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().clone(),
        }
    }
}
