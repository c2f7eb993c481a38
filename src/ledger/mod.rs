use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::event::LedgerEvent;
use crate::types::{AccountId, Amount, TokenMetadata};

mod snapshot;

pub use snapshot::{AllowanceEntry, LedgerSnapshot, SnapshotError};

pub type Outcome = Result<Vec<LedgerEvent>, LedgerError>;

/// A state-changing request, as submitted by an already-resolved caller.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Mint {
        to: AccountId,
        amount: Amount,
    },
    Burn {
        amount: Amount,
    },
    Transfer {
        to: AccountId,
        amount: Amount,
    },
    Approve {
        spender: AccountId,
        amount: Amount,
    },
    TransferFrom {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    Pause,
    Unpause,
}

/// Fungible token ledger.
///
/// Owns balances, allowances, the pause flag and the admin identity. Every
/// mutating method validates all of its preconditions before touching any
/// state, so an `Err` always leaves the ledger exactly as it was.
#[derive(Clone, Debug)]
pub struct TokenLedger {
    metadata: TokenMetadata,
    admin: AccountId,
    balances: BTreeMap<AccountId, Amount>,
    allowances: BTreeMap<(AccountId, AccountId), Amount>,
    paused: bool,
    total_supply: Amount,
    height: u64,
}

impl TokenLedger {
    pub fn new(admin: AccountId, metadata: TokenMetadata) -> Self {
        Self {
            metadata,
            admin,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            paused: false,
            total_supply: 0,
            height: 0,
        }
    }

    pub fn with_admin(admin: impl Into<AccountId>) -> Self {
        Self::new(admin.into(), TokenMetadata::default())
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn admin(&self) -> &AccountId {
        &self.admin
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Count of successfully applied mutating operations.
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// Accounts holding a non-zero balance, in identity order.
    pub fn holders(&self) -> impl Iterator<Item = (&AccountId, Amount)> {
        self.balances.iter().map(|(account, amount)| (account, *amount))
    }

    pub fn execute(&mut self, caller: &AccountId, operation: &Operation) -> Outcome {
        match operation {
            Operation::Mint { to, amount } => self.mint(caller, to, *amount),
            Operation::Burn { amount } => self.burn(caller, *amount),
            Operation::Transfer { to, amount } => self.transfer(caller, to, *amount),
            Operation::Approve { spender, amount } => self.approve(caller, spender, *amount),
            Operation::TransferFrom { from, to, amount } => {
                self.transfer_from(caller, from, to, *amount)
            }
            Operation::Pause => self.pause(caller),
            Operation::Unpause => self.unpause(caller),
        }
    }

    pub fn mint(&mut self, caller: &AccountId, to: &AccountId, amount: Amount) -> Outcome {
        self.require_admin(caller)?;
        let total_supply =
            self.total_supply
                .checked_add(amount)
                .ok_or(LedgerError::SupplyOverflow {
                    total_supply: self.total_supply,
                    requested: amount,
                })?;
        self.total_supply = total_supply;
        self.credit(to, amount);
        debug!(%to, amount, total_supply, "mint");
        Ok(self.commit(LedgerEvent::Mint {
            to: to.clone(),
            amount,
        }))
    }

    pub fn burn(&mut self, caller: &AccountId, amount: Amount) -> Outcome {
        self.debit(caller, amount)?;
        self.total_supply -= amount;
        debug!(from = %caller, amount, total_supply = self.total_supply, "burn");
        Ok(self.commit(LedgerEvent::Burn {
            from: caller.clone(),
            amount,
        }))
    }

    pub fn transfer(&mut self, caller: &AccountId, to: &AccountId, amount: Amount) -> Outcome {
        self.require_active()?;
        self.debit(caller, amount)?;
        self.credit(to, amount);
        debug!(from = %caller, %to, amount, "transfer");
        Ok(self.commit(LedgerEvent::Transfer {
            from: caller.clone(),
            to: to.clone(),
            amount,
        }))
    }

    pub fn approve(&mut self, caller: &AccountId, spender: &AccountId, amount: Amount) -> Outcome {
        self.set_allowance(caller, spender, amount);
        debug!(owner = %caller, %spender, amount, "approve");
        Ok(self.commit(LedgerEvent::Approval {
            owner: caller.clone(),
            spender: spender.clone(),
            amount,
        }))
    }

    pub fn transfer_from(
        &mut self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Outcome {
        self.require_active()?;
        let allowance = self.allowance(from, caller);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: from.clone(),
                spender: caller.clone(),
                allowance,
                requested: amount,
            });
        }
        // Balance is checked by debit before anything below is written.
        self.debit(from, amount)?;
        self.set_allowance(from, caller, allowance - amount);
        self.credit(to, amount);
        debug!(spender = %caller, %from, %to, amount, "transfer_from");
        Ok(self.commit(LedgerEvent::Transfer {
            from: from.clone(),
            to: to.clone(),
            amount,
        }))
    }

    pub fn pause(&mut self, caller: &AccountId) -> Outcome {
        self.set_paused(caller, true)
    }

    pub fn unpause(&mut self, caller: &AccountId) -> Outcome {
        self.set_paused(caller, false)
    }

    fn set_paused(&mut self, caller: &AccountId, paused: bool) -> Outcome {
        self.require_admin(caller)?;
        if self.paused != paused {
            info!(paused, "ledger pause state changed");
        }
        self.paused = paused;
        self.height += 1;
        Ok(Vec::new())
    }

    fn require_admin(&self, caller: &AccountId) -> Result<(), LedgerError> {
        if caller != &self.admin {
            return Err(LedgerError::Unauthorized {
                caller: caller.clone(),
            });
        }
        Ok(())
    }

    fn require_active(&self) -> Result<(), LedgerError> {
        if self.paused {
            return Err(LedgerError::Paused);
        }
        Ok(())
    }

    fn credit(&mut self, account: &AccountId, amount: Amount) {
        if amount == 0 {
            return;
        }
        let balance = self.balances.entry(account.clone()).or_default();
        *balance += amount;
    }

    fn debit(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.balance_of(account);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: account.clone(),
                balance,
                requested: amount,
            });
        }
        let remaining = balance - amount;
        if remaining == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(account.clone(), remaining);
        }
        Ok(())
    }

    fn set_allowance(&mut self, owner: &AccountId, spender: &AccountId, amount: Amount) {
        let key = (owner.clone(), spender.clone());
        if amount == 0 {
            self.allowances.remove(&key);
        } else {
            self.allowances.insert(key, amount);
        }
    }

    fn commit(&mut self, event: LedgerEvent) -> Vec<LedgerEvent> {
        self.height += 1;
        vec![event]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(s: &str) -> AccountId {
        AccountId::from(s)
    }

    fn fixture() -> (TokenLedger, AccountId, AccountId, AccountId) {
        let owner = id("owner");
        (TokenLedger::with_admin(owner.clone()), owner, id("addr1"), id("addr2"))
    }

    fn sum_of_balances(ledger: &TokenLedger) -> Amount {
        ledger.holders().map(|(_, amount)| amount).sum()
    }

    #[test]
    fn owner_can_mint_and_mint_event_is_emitted() {
        let (mut ledger, owner, _, _) = fixture();
        let events = ledger.mint(&owner, &owner, 100).unwrap();
        assert_eq!(ledger.balance_of(&owner), 100);
        assert_eq!(ledger.total_supply(), 100);
        assert_eq!(
            events,
            vec![LedgerEvent::Mint {
                to: owner.clone(),
                amount: 100
            }]
        );
    }

    #[test]
    fn non_admin_mint_is_rejected_without_state_change() {
        let (mut ledger, owner, addr1, _) = fixture();
        ledger.mint(&owner, &owner, 10).unwrap();
        let before = ledger.snapshot();
        let err = ledger.mint(&addr1, &addr1, 100).unwrap_err();
        assert_eq!(err, LedgerError::Unauthorized { caller: addr1.clone() });
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn mint_overflow_is_reported() {
        let (mut ledger, owner, addr1, _) = fixture();
        ledger.mint(&owner, &owner, Amount::MAX).unwrap();
        let err = ledger.mint(&owner, &addr1, 1).unwrap_err();
        assert!(matches!(err, LedgerError::SupplyOverflow { .. }));
        assert_eq!(ledger.balance_of(&addr1), 0);
        assert_eq!(ledger.total_supply(), Amount::MAX);
    }

    #[test]
    fn transfer_moves_funds_and_emits_event() {
        let (mut ledger, owner, addr1, _) = fixture();
        ledger.mint(&owner, &owner, 100).unwrap();
        let events = ledger.transfer(&owner, &addr1, 50).unwrap();
        assert_eq!(ledger.balance_of(&addr1), 50);
        assert_eq!(ledger.balance_of(&owner), 50);
        assert_eq!(
            events,
            vec![LedgerEvent::Transfer {
                from: owner,
                to: addr1,
                amount: 50
            }]
        );
    }

    #[test]
    fn transfer_from_empty_account_reports_insufficient_balance() {
        let (mut ledger, _, addr1, addr2) = fixture();
        let height = ledger.height();
        let err = ledger.transfer(&addr1, &addr2, 50).unwrap_err();
        assert_eq!(err.to_string(), "Insufficient balance");
        assert_eq!(ledger.balance_of(&addr2), 0);
        assert_eq!(ledger.height(), height);
    }

    #[test]
    fn self_transfer_is_a_no_op_that_still_emits() {
        let (mut ledger, owner, _, _) = fixture();
        ledger.mint(&owner, &owner, 30).unwrap();
        let events = ledger.transfer(&owner, &owner, 30).unwrap();
        assert_eq!(ledger.balance_of(&owner), 30);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn approve_sets_absolute_allowance() {
        let (mut ledger, owner, addr1, _) = fixture();
        ledger.mint(&owner, &owner, 100).unwrap();
        let events = ledger.approve(&owner, &addr1, 50).unwrap();
        assert_eq!(ledger.allowance(&owner, &addr1), 50);
        ledger.approve(&owner, &addr1, 20).unwrap();
        assert_eq!(ledger.allowance(&owner, &addr1), 20);
        assert_eq!(
            events,
            vec![LedgerEvent::Approval {
                owner,
                spender: addr1,
                amount: 50
            }]
        );
    }

    #[test]
    fn delegated_transfer_consumes_allowance() {
        let (mut ledger, owner, addr1, addr2) = fixture();
        ledger.mint(&owner, &owner, 100).unwrap();
        ledger.approve(&owner, &addr1, 50).unwrap();
        let events = ledger.transfer_from(&addr1, &owner, &addr2, 50).unwrap();
        assert_eq!(ledger.balance_of(&addr2), 50);
        assert_eq!(ledger.balance_of(&owner), 50);
        assert_eq!(ledger.allowance(&owner, &addr1), 0);
        assert_eq!(
            events,
            vec![LedgerEvent::Transfer {
                from: owner,
                to: addr2,
                amount: 50
            }]
        );
    }

    #[test]
    fn partial_delegated_transfer_leaves_remainder() {
        let (mut ledger, owner, addr1, addr2) = fixture();
        ledger.mint(&owner, &owner, 100).unwrap();
        ledger.approve(&owner, &addr1, 80).unwrap();
        ledger.transfer_from(&addr1, &owner, &addr2, 30).unwrap();
        assert_eq!(ledger.allowance(&owner, &addr1), 50);
    }

    #[test]
    fn delegated_transfer_checks_allowance_then_balance() {
        let (mut ledger, owner, addr1, addr2) = fixture();
        ledger.mint(&owner, &owner, 10).unwrap();

        let err = ledger.transfer_from(&addr1, &owner, &addr2, 20).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientAllowance { allowance: 0, .. }));

        ledger.approve(&owner, &addr1, 20).unwrap();
        let before = ledger.snapshot();
        let err = ledger.transfer_from(&addr1, &owner, &addr2, 20).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { balance: 10, .. }));
        assert_eq!(ledger.snapshot(), before);
        assert_eq!(ledger.allowance(&owner, &addr1), 20);
    }

    #[test]
    fn pause_cycle_gates_transfers_only() {
        let (mut ledger, owner, addr1, addr2) = fixture();
        ledger.mint(&owner, &owner, 100).unwrap();
        ledger.approve(&owner, &addr1, 40).unwrap();

        ledger.pause(&owner).unwrap();
        assert!(ledger.paused());
        assert_eq!(ledger.transfer(&owner, &addr1, 10), Err(LedgerError::Paused));
        assert_eq!(
            ledger.transfer_from(&addr1, &owner, &addr2, 10),
            Err(LedgerError::Paused)
        );
        ledger.mint(&owner, &addr2, 5).unwrap();
        ledger.burn(&owner, 5).unwrap();
        ledger.approve(&owner, &addr1, 60).unwrap();

        ledger.unpause(&owner).unwrap();
        assert!(!ledger.paused());
        ledger.transfer(&owner, &addr1, 10).unwrap();
        assert_eq!(ledger.balance_of(&addr1), 10);
    }

    #[test]
    fn paused_check_wins_over_insufficient_balance() {
        let (mut ledger, owner, addr1, addr2) = fixture();
        ledger.pause(&owner).unwrap();
        assert_eq!(ledger.transfer(&addr1, &addr2, 1_000), Err(LedgerError::Paused));
    }

    #[test]
    fn pause_is_admin_only_and_idempotent() {
        let (mut ledger, owner, addr1, _) = fixture();
        assert!(matches!(
            ledger.pause(&addr1),
            Err(LedgerError::Unauthorized { .. })
        ));
        assert!(!ledger.paused());
        ledger.pause(&owner).unwrap();
        assert_eq!(ledger.pause(&owner), Ok(vec![]));
        assert!(ledger.paused());
        ledger.unpause(&owner).unwrap();
        assert_eq!(ledger.unpause(&owner), Ok(vec![]));
        assert!(!ledger.paused());
    }

    #[test]
    fn burn_round_trip_restores_supply() {
        let (mut ledger, owner, addr1, _) = fixture();
        ledger.mint(&owner, &addr1, 100).unwrap();
        let events = ledger.burn(&addr1, 100).unwrap();
        assert_eq!(ledger.balance_of(&addr1), 0);
        assert_eq!(ledger.total_supply(), 0);
        assert_eq!(
            events,
            vec![LedgerEvent::Burn {
                from: addr1.clone(),
                amount: 100
            }]
        );
        assert!(matches!(
            ledger.burn(&addr1, 1),
            Err(LedgerError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn execute_dispatches_operations() {
        let (mut ledger, owner, addr1, _) = fixture();
        ledger
            .execute(&owner, &Operation::Mint { to: owner.clone(), amount: 100 })
            .unwrap();
        ledger
            .execute(&owner, &Operation::Transfer { to: addr1.clone(), amount: 25 })
            .unwrap();
        ledger.execute(&owner, &Operation::Pause).unwrap();
        assert!(ledger.paused());
        assert_eq!(ledger.balance_of(&addr1), 25);
        assert_eq!(ledger.height(), 3);
    }

    #[test]
    fn operation_wire_layout() {
        let op: Operation =
            serde_json::from_str(r#"{"op":"transfer_from","from":"a","to":"b","amount":7}"#)
                .unwrap();
        assert_eq!(
            op,
            Operation::TransferFrom {
                from: id("a"),
                to: id("b"),
                amount: 7
            }
        );
        let pause: Operation = serde_json::from_str(r#"{"op":"pause"}"#).unwrap();
        assert_eq!(pause, Operation::Pause);
    }

    fn account_strategy() -> impl Strategy<Value = AccountId> {
        prop_oneof![Just(id("owner")), Just(id("addr1")), Just(id("addr2"))]
    }

    fn step_strategy() -> impl Strategy<Value = (AccountId, Operation)> {
        let amount = 0u64..200;
        let op = prop_oneof![
            (account_strategy(), amount.clone())
                .prop_map(|(to, amount)| Operation::Mint { to, amount }),
            amount.clone().prop_map(|amount| Operation::Burn { amount }),
            (account_strategy(), amount.clone())
                .prop_map(|(to, amount)| Operation::Transfer { to, amount }),
            (account_strategy(), amount.clone())
                .prop_map(|(spender, amount)| Operation::Approve { spender, amount }),
            (account_strategy(), account_strategy(), amount)
                .prop_map(|(from, to, amount)| Operation::TransferFrom { from, to, amount }),
            Just(Operation::Pause),
            Just(Operation::Unpause),
        ];
        (account_strategy(), op)
    }

    proptest! {
        #[test]
        fn supply_is_conserved_and_failures_change_nothing(
            steps in proptest::collection::vec(step_strategy(), 0..64)
        ) {
            let (mut ledger, _, _, _) = fixture();
            for (caller, op) in &steps {
                let before = ledger.clone().snapshot();
                match ledger.execute(caller, op) {
                    Ok(_) => {}
                    Err(_) => prop_assert_eq!(ledger.snapshot(), before),
                }
                prop_assert_eq!(ledger.total_supply(), sum_of_balances(&ledger));
                prop_assert!(ledger.holders().all(|(_, amount)| amount > 0));
            }
        }
    }
}
