//! Test doubles shared by the service tests

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{StoreError, StoreResult, VerifierError};
use crate::ledger::{Ledger, LedgerTx};
use crate::verifier::{BillingVerifier, Verification};

/// Ledger whose every transaction fails to open
pub(crate) struct FailingLedger;

impl Ledger for FailingLedger {
    fn begin(&self) -> StoreResult<Box<dyn LedgerTx + '_>> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
}

/// Verifier answering from a script, counting calls
pub(crate) struct ScriptedVerifier {
    answer: Mutex<Result<Verification, VerifierError>>,
    calls: AtomicUsize,
}

impl ScriptedVerifier {
    pub(crate) fn expiring(expires_on: NaiveDate) -> Self {
        Self {
            answer: Mutex::new(Ok(Verification { expires_on })),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(err: VerifierError) -> Self {
        Self {
            answer: Mutex::new(Err(err)),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_expiring(&self, expires_on: NaiveDate) {
        *self.answer.lock() = Ok(Verification { expires_on });
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BillingVerifier for ScriptedVerifier {
    async fn verify(&self, _purchase_token: &str, _product_id: &str) -> Result<Verification, VerifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.lock().clone()
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
