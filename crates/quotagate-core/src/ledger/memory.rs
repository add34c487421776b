//! In-memory ledger (for testing and ephemeral deployments)

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;

use super::{Ledger, LedgerTx};
use crate::error::{StoreError, StoreResult};
use crate::keys::RecoveryKey;
use crate::records::{IdentityRecord, RecoveryRecord};

#[derive(Default)]
struct Tables {
    identities: HashMap<String, IdentityRecord>,
    /// purchase token -> record
    recovery: HashMap<String, RecoveryRecord>,
    /// recovery key -> purchase token
    keys: HashMap<String, String>,
}

impl Tables {
    fn remove_recovery(&mut self, token: &str) {
        if let Some(current) = self.recovery.remove(token) {
            self.keys.remove(current.recovery_key.as_str());
        }
    }

    fn insert_recovery(&mut self, record: RecoveryRecord) {
        self.keys
            .insert(record.recovery_key.as_str().to_string(), record.purchase_token.clone());
        self.recovery.insert(record.purchase_token.clone(), record);
    }
}

/// Process-local ledger.
///
/// A transaction holds the table lock from `begin` until it is committed or
/// dropped, so transactions are fully serialized.
pub struct InMemoryLedger {
    tables: Mutex<Tables>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger for InMemoryLedger {
    fn begin(&self) -> StoreResult<Box<dyn LedgerTx + '_>> {
        Ok(Box::new(MemoryTx {
            tables: self.tables.lock(),
            undo: Vec::new(),
            committed: false,
        }))
    }
}

enum Undo {
    Identity {
        identity: String,
        previous: Option<IdentityRecord>,
    },
    Recovery {
        purchase_token: String,
        previous: Option<RecoveryRecord>,
    },
}

struct MemoryTx<'a> {
    tables: MutexGuard<'a, Tables>,
    undo: Vec<Undo>,
    committed: bool,
}

impl LedgerTx for MemoryTx<'_> {
    fn identity(&mut self, identity: &str) -> StoreResult<Option<IdentityRecord>> {
        Ok(self.tables.identities.get(identity).cloned())
    }

    fn put_identity(&mut self, record: &IdentityRecord) -> StoreResult<()> {
        let previous = self
            .tables
            .identities
            .insert(record.identity.clone(), record.clone());
        self.undo.push(Undo::Identity {
            identity: record.identity.clone(),
            previous,
        });
        Ok(())
    }

    fn recovery_by_key(&mut self, key: &RecoveryKey) -> StoreResult<Option<RecoveryRecord>> {
        let tables = &self.tables;
        Ok(tables
            .keys
            .get(key.as_str())
            .and_then(|token| tables.recovery.get(token))
            .cloned())
    }

    fn recovery_by_token(&mut self, purchase_token: &str) -> StoreResult<Option<RecoveryRecord>> {
        Ok(self.tables.recovery.get(purchase_token).cloned())
    }

    fn recoveries_bound_to(&mut self, identity: &str) -> StoreResult<Vec<RecoveryRecord>> {
        let mut bound: Vec<RecoveryRecord> = self
            .tables
            .recovery
            .values()
            .filter(|record| record.bound_identity == identity)
            .cloned()
            .collect();
        bound.sort_by(|a, b| a.purchase_token.cmp(&b.purchase_token));
        Ok(bound)
    }

    fn put_recovery(&mut self, record: &RecoveryRecord) -> StoreResult<()> {
        if let Some(owner) = self.tables.keys.get(record.recovery_key.as_str()) {
            if owner != &record.purchase_token {
                return Err(StoreError::KeyCollision);
            }
        }

        let previous = self.tables.recovery.get(&record.purchase_token).cloned();
        self.tables.remove_recovery(&record.purchase_token);
        self.tables.insert_recovery(record.clone());
        self.undo.push(Undo::Recovery {
            purchase_token: record.purchase_token.clone(),
            previous,
        });
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.committed = true;
        Ok(())
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Identity { identity, previous } => match previous {
                    Some(record) => {
                        self.tables.identities.insert(identity, record);
                    }
                    None => {
                        self.tables.identities.remove(&identity);
                    }
                },
                Undo::Recovery {
                    purchase_token,
                    previous,
                } => {
                    self.tables.remove_recovery(&purchase_token);
                    if let Some(record) = previous {
                        self.tables.insert_recovery(record);
                    }
                }
            }
        }
    }
}
