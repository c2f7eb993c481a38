use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::TokenLedger;
use crate::types::{AccountId, Amount, TokenMetadata};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("state root mismatch: recorded {recorded}, computed {computed}")]
    RootMismatch { recorded: String, computed: String },
    #[error("total supply {total_supply} does not match sum of balances {sum}")]
    SupplyMismatch { total_supply: Amount, sum: u128 },
    #[error("zero-valued entry recorded for {0}")]
    ZeroEntry(String),
    #[error("allowance entries out of order or duplicated at {owner} -> {spender}")]
    NonCanonical { owner: AccountId, spender: AccountId },
    #[error("invalid token metadata: {0}")]
    InvalidMetadata(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowanceEntry {
    pub owner: AccountId,
    pub spender: AccountId,
    pub amount: Amount,
}

/// Point-in-time copy of the ledger with a Merkle commitment to its state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub metadata: TokenMetadata,
    pub admin: AccountId,
    pub paused: bool,
    pub total_supply: Amount,
    pub height: u64,
    pub balances: BTreeMap<AccountId, Amount>,
    pub allowances: Vec<AllowanceEntry>,
    #[serde(with = "hex_root")]
    pub state_root: [u8; 32],
}

impl LedgerSnapshot {
    pub fn state_root_hex(&self) -> String {
        hex::encode(self.state_root)
    }

    /// Recomputes the state root and re-checks supply conservation.
    pub fn verify(&self) -> Result<(), SnapshotError> {
        if self.metadata.symbol.trim().is_empty() {
            return Err(SnapshotError::InvalidMetadata("empty symbol".into()));
        }
        if self.metadata.unit().is_none() {
            return Err(SnapshotError::InvalidMetadata(format!(
                "decimals {} too large",
                self.metadata.decimals
            )));
        }
        let sum: u128 = self.balances.values().map(|v| u128::from(*v)).sum();
        if sum != u128::from(self.total_supply) {
            return Err(SnapshotError::SupplyMismatch {
                total_supply: self.total_supply,
                sum,
            });
        }
        if let Some((account, _)) = self.balances.iter().find(|(_, v)| **v == 0) {
            return Err(SnapshotError::ZeroEntry(account.to_string()));
        }
        if let Some(entry) = self.allowances.iter().find(|e| e.amount == 0) {
            return Err(SnapshotError::ZeroEntry(format!(
                "{} -> {}",
                entry.owner, entry.spender
            )));
        }
        // Allowances must be strictly increasing by (owner, spender), the
        // order the ledger itself emits, so each pair hashes exactly once.
        if let Some(pair) = self
            .allowances
            .windows(2)
            .find(|w| (&w[0].owner, &w[0].spender) >= (&w[1].owner, &w[1].spender))
        {
            return Err(SnapshotError::NonCanonical {
                owner: pair[1].owner.clone(),
                spender: pair[1].spender.clone(),
            });
        }
        let computed = compute_state_root(
            MetaLeaf {
                metadata: &self.metadata,
                admin: &self.admin,
                paused: self.paused,
                total_supply: self.total_supply,
                height: self.height,
            },
            self.balances.iter().map(|(a, v)| (a, *v)),
            self.allowances
                .iter()
                .map(|e| (&e.owner, &e.spender, e.amount)),
        );
        if computed != self.state_root {
            return Err(SnapshotError::RootMismatch {
                recorded: self.state_root_hex(),
                computed: hex::encode(computed),
            });
        }
        Ok(())
    }
}

impl TokenLedger {
    pub fn snapshot(&self) -> LedgerSnapshot {
        let allowances = self
            .allowances
            .iter()
            .map(|((owner, spender), amount)| AllowanceEntry {
                owner: owner.clone(),
                spender: spender.clone(),
                amount: *amount,
            })
            .collect();
        LedgerSnapshot {
            metadata: self.metadata.clone(),
            admin: self.admin.clone(),
            paused: self.paused,
            total_supply: self.total_supply,
            height: self.height,
            balances: self.balances.clone(),
            allowances,
            state_root: self.state_root(),
        }
    }

    pub fn state_root(&self) -> [u8; 32] {
        compute_state_root(
            MetaLeaf {
                metadata: &self.metadata,
                admin: &self.admin,
                paused: self.paused,
                total_supply: self.total_supply,
                height: self.height,
            },
            self.balances.iter().map(|(a, v)| (a, *v)),
            self.allowances.iter().map(|((o, s), v)| (o, s, *v)),
        )
    }

    /// Rebuilds a ledger from a snapshot that passes [`LedgerSnapshot::verify`].
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, SnapshotError> {
        snapshot.verify()?;
        let recorded = snapshot.state_root;
        let allowances = snapshot
            .allowances
            .into_iter()
            .map(|e| ((e.owner, e.spender), e.amount))
            .collect();
        let ledger = Self {
            metadata: snapshot.metadata,
            admin: snapshot.admin,
            balances: snapshot.balances,
            allowances,
            paused: snapshot.paused,
            total_supply: snapshot.total_supply,
            height: snapshot.height,
        };
        let computed = ledger.state_root();
        if computed != recorded {
            return Err(SnapshotError::RootMismatch {
                recorded: hex::encode(recorded),
                computed: hex::encode(computed),
            });
        }
        Ok(ledger)
    }
}

/// Everything outside the two maps that the root commits to.
struct MetaLeaf<'a> {
    metadata: &'a TokenMetadata,
    admin: &'a AccountId,
    paused: bool,
    total_supply: Amount,
    height: u64,
}

impl MetaLeaf<'_> {
    fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"meta");
        update_str(&mut hasher, &self.metadata.name);
        update_str(&mut hasher, &self.metadata.symbol);
        hasher.update([self.metadata.decimals]);
        update_id(&mut hasher, self.admin);
        hasher.update([self.paused as u8]);
        hasher.update(self.total_supply.to_le_bytes());
        hasher.update(self.height.to_le_bytes());
        hasher.finalize().into()
    }
}

fn compute_state_root<'a>(
    meta: MetaLeaf<'_>,
    balances: impl Iterator<Item = (&'a AccountId, Amount)>,
    allowances: impl Iterator<Item = (&'a AccountId, &'a AccountId, Amount)>,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    for (account, amount) in balances {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        update_id(&mut hasher, account);
        hasher.update(amount.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for (owner, spender, amount) in allowances {
        let mut hasher = Sha256::new();
        hasher.update(b"allow");
        update_id(&mut hasher, owner);
        update_id(&mut hasher, spender);
        hasher.update(amount.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    leaves.push(meta.digest());
    build_merkle(leaves)
}

fn update_id(hasher: &mut Sha256, id: &AccountId) {
    update_str(hasher, id.as_str());
}

// Length prefix keeps ("ab", "c") and ("a", "bc") apart.
fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"token-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            if chunk.len() == 2 {
                hasher.update(chunk[1]);
            } else {
                hasher.update(chunk[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

mod hex_root {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(encoded.trim()).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("state root must be 32 bytes"))
    }
}
