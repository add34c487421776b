//! Premium derived from bound purchases
//!
//! Each recovery record carries the verified expiration of its purchase.
//! An identity's `premium_expires_on` is settled from the records bound to
//! it, so moving one purchase away never touches another.

use chrono::NaiveDate;

use crate::config::RecoveryPolicy;
use crate::error::StoreResult;
use crate::ledger::LedgerTx;
use crate::records::{held_expiration, IdentityRecord};

/// Settle an identity that just lost a purchase binding.
///
/// Keeps the latest expiration among its remaining purchases; `None` when
/// nothing is left. Returns `false` if the identity is unknown.
pub(crate) fn release(tx: &mut dyn LedgerTx, identity: &str) -> StoreResult<bool> {
    let Some(mut holder) = tx.identity(identity)? else {
        return Ok(false);
    };
    holder.premium_expires_on = held_expiration(&tx.recoveries_bound_to(identity)?);
    tx.put_identity(&holder)?;
    Ok(true)
}

/// Write a fresh premium record for an identity that just gained a binding.
///
/// Under [`RecoveryPolicy::Share`] premium left over from purchases that
/// moved elsewhere is kept as well.
pub(crate) fn entitle(
    tx: &mut dyn LedgerTx,
    identity: &str,
    today: NaiveDate,
    policy: RecoveryPolicy,
) -> StoreResult<NaiveDate> {
    let held = held_expiration(&tx.recoveries_bound_to(identity)?);
    let kept = match policy {
        RecoveryPolicy::Transfer => None,
        RecoveryPolicy::Share => tx.identity(identity)?.and_then(|record| record.premium_expires_on),
    };

    let expires_on = held.max(kept).unwrap_or(today);
    tx.put_identity(&IdentityRecord::entitled(identity, today, expires_on))?;
    Ok(expires_on)
}
