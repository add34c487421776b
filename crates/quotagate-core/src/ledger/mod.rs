//! Ledger - transactional persistence for both relations
//!
//! The identity store and the recovery store live behind one [`Ledger`]
//! so that a single transaction can span them:
//! - quota checks read-decide-write one identity atomically
//! - activation writes the identity and its recovery record together
//! - restore re-binds a key and moves the entitlement together
//!
//! A [`LedgerTx`] that is dropped without [`LedgerTx::commit`] rolls back.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryLedger;
pub use sqlite::SqliteLedger;

use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::keys::RecoveryKey;
use crate::records::{IdentityRecord, RecoveryRecord};

/// Transactional store of identity and recovery records
pub trait Ledger: Send + Sync {
    /// Open an exclusive transaction
    fn begin(&self) -> StoreResult<Box<dyn LedgerTx + '_>>;
}

/// One open ledger transaction
pub trait LedgerTx {
    /// Get identity record
    fn identity(&mut self, identity: &str) -> StoreResult<Option<IdentityRecord>>;

    /// Insert or replace identity record
    fn put_identity(&mut self, record: &IdentityRecord) -> StoreResult<()>;

    /// Get recovery record by recovery key
    fn recovery_by_key(&mut self, key: &RecoveryKey) -> StoreResult<Option<RecoveryRecord>>;

    /// Get recovery record by purchase token
    fn recovery_by_token(&mut self, purchase_token: &str) -> StoreResult<Option<RecoveryRecord>>;

    /// Every recovery record currently bound to `identity`, by purchase token
    fn recoveries_bound_to(&mut self, identity: &str) -> StoreResult<Vec<RecoveryRecord>>;

    /// Insert or replace the recovery record of `record.purchase_token`.
    ///
    /// Fails with [`StoreError::KeyCollision`] when the key already belongs
    /// to another purchase token; the transaction stays usable.
    fn put_recovery(&mut self, record: &RecoveryRecord) -> StoreResult<()>;

    /// Make every write of this transaction durable
    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Run `work` in one ledger transaction on the blocking pool.
///
/// The transaction commits only if `work` returns `Ok`.
pub async fn transact<T, E, F>(ledger: Arc<dyn Ledger>, work: F) -> Result<T, E>
where
    T: Send + 'static,
    E: From<StoreError> + Send + 'static,
    F: FnOnce(&mut dyn LedgerTx) -> Result<T, E> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut tx = ledger.begin()?;
        let out = work(&mut *tx)?;
        tx.commit()?;
        Ok(out)
    })
    .await
    .map_err(|err| E::from(StoreError::Unavailable(format!("ledger task failed: {err}"))))?
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Behaviour every ledger adapter must share.

    use super::*;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn recovery(token: &str, key: &str, identity: &str) -> RecoveryRecord {
        RecoveryRecord {
            purchase_token: token.into(),
            product_id: "prod-x".into(),
            recovery_key: RecoveryKey::from_stored(key.into()),
            bound_identity: identity.into(),
            expires_on: date(31),
        }
    }

    pub(crate) fn identity_roundtrip(ledger: &dyn Ledger) {
        let record = IdentityRecord::entitled("u1", date(1), date(31));

        let mut tx = ledger.begin().unwrap();
        assert!(tx.identity("u1").unwrap().is_none());
        tx.put_identity(&record).unwrap();
        assert_eq!(tx.identity("u1").unwrap().as_ref(), Some(&record));
        tx.commit().unwrap();

        let mut tx = ledger.begin().unwrap();
        assert_eq!(tx.identity("u1").unwrap(), Some(record));
    }

    pub(crate) fn rollback_on_drop(ledger: &dyn Ledger) {
        {
            let mut tx = ledger.begin().unwrap();
            tx.put_identity(&IdentityRecord::new("u1", date(1))).unwrap();
            tx.put_recovery(&recovery("tok-1", "AAAA1111", "u1")).unwrap();
        }

        let mut tx = ledger.begin().unwrap();
        assert!(tx.identity("u1").unwrap().is_none());
        assert!(tx.recovery_by_token("tok-1").unwrap().is_none());
        let key = RecoveryKey::from_stored("AAAA1111".into());
        assert!(tx.recovery_by_key(&key).unwrap().is_none());
    }

    pub(crate) fn rollback_restores_previous(ledger: &dyn Ledger) {
        let mut tx = ledger.begin().unwrap();
        tx.put_recovery(&recovery("tok-1", "AAAA1111", "u1")).unwrap();
        tx.commit().unwrap();

        {
            let mut tx = ledger.begin().unwrap();
            tx.put_recovery(&recovery("tok-1", "BBBB2222", "u2")).unwrap();
        }

        let mut tx = ledger.begin().unwrap();
        let old_key = RecoveryKey::from_stored("AAAA1111".into());
        let new_key = RecoveryKey::from_stored("BBBB2222".into());
        let record = tx.recovery_by_key(&old_key).unwrap().unwrap();
        assert_eq!(record.bound_identity, "u1");
        assert!(tx.recovery_by_key(&new_key).unwrap().is_none());
    }

    pub(crate) fn key_uniqueness(ledger: &dyn Ledger) {
        let mut tx = ledger.begin().unwrap();
        tx.put_recovery(&recovery("tok-1", "AAAA1111", "u1")).unwrap();

        let clash = tx.put_recovery(&recovery("tok-2", "AAAA1111", "u2"));
        assert!(matches!(clash, Err(StoreError::KeyCollision)));

        // transaction still usable after the collision
        tx.put_recovery(&recovery("tok-2", "BBBB2222", "u2")).unwrap();
        tx.commit().unwrap();

        let mut tx = ledger.begin().unwrap();
        assert_eq!(tx.recovery_by_token("tok-2").unwrap().unwrap().recovery_key.as_str(), "BBBB2222");
    }

    pub(crate) fn rebind_same_token(ledger: &dyn Ledger) {
        let mut tx = ledger.begin().unwrap();
        tx.put_recovery(&recovery("tok-1", "AAAA1111", "u1")).unwrap();
        tx.put_recovery(&recovery("tok-1", "AAAA1111", "u2")).unwrap();
        tx.put_recovery(&recovery("tok-1", "CCCC3333", "u2")).unwrap();
        tx.commit().unwrap();

        let mut tx = ledger.begin().unwrap();
        let old_key = RecoveryKey::from_stored("AAAA1111".into());
        assert!(tx.recovery_by_key(&old_key).unwrap().is_none());
        let record = tx.recovery_by_token("tok-1").unwrap().unwrap();
        assert_eq!(record.recovery_key.as_str(), "CCCC3333");
        assert_eq!(record.bound_identity, "u2");
    }

    pub(crate) fn bound_records(ledger: &dyn Ledger) {
        let mut tx = ledger.begin().unwrap();
        tx.put_recovery(&recovery("tok-1", "AAAA1111", "u1")).unwrap();
        tx.put_recovery(&RecoveryRecord {
            expires_on: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            ..recovery("tok-2", "BBBB2222", "u1")
        })
        .unwrap();
        tx.put_recovery(&recovery("tok-3", "CCCC3333", "u2")).unwrap();
        tx.commit().unwrap();

        let mut tx = ledger.begin().unwrap();
        let bound = tx.recoveries_bound_to("u1").unwrap();
        let tokens: Vec<&str> = bound.iter().map(|r| r.purchase_token.as_str()).collect();
        assert_eq!(tokens, ["tok-1", "tok-2"]);
        assert_eq!(bound[1].expires_on, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());

        // rebinding moves the record between identities
        tx.put_recovery(&recovery("tok-1", "AAAA1111", "u2")).unwrap();
        assert_eq!(tx.recoveries_bound_to("u1").unwrap().len(), 1);
        assert_eq!(tx.recoveries_bound_to("u2").unwrap().len(), 2);
        assert!(tx.recoveries_bound_to("u3").unwrap().is_empty());
    }
}
