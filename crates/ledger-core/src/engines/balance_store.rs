//! Balance store: lazy balance records, RP earning and log reconciliation.

use shared_types::{Currency, MemberId, Metadata, Timestamp};
use std::sync::Arc;
use tracing::{info, warn};

use super::transaction_log::fold_entries;
use crate::domain::{
    invariant_positive, Balance, LedgerError, Movement, RewardsConfig, RpMovement,
    TransactionLogEntry,
};
use crate::ports::outbound::{LedgerStore, LockScope, TimeSource, UnitOfWork};

/// Apply one movement inside `uow`.
///
/// Reads the balance (zero if the member never held the currency), computes
/// the new balance, and writes it together with its log entry. Nothing is
/// written if the movement is rejected.
pub(crate) fn post_movement(
    uow: &mut dyn UnitOfWork,
    member_id: &MemberId,
    movement: Movement,
    source: &str,
    metadata: Metadata,
    now: Timestamp,
) -> Result<Balance, LedgerError> {
    let currency = movement.currency();
    let current = uow
        .balance(member_id, currency)?
        .unwrap_or_else(|| Balance::zero(member_id.clone(), currency, now));
    let next = current.apply(&movement, now)?;
    let entry = TransactionLogEntry::for_movement(member_id, &movement, source, metadata, now)?;
    uow.record(next.clone(), entry)?;
    Ok(next)
}

/// Per-member balances and the RP earning path.
pub struct BalanceStore<S, T> {
    store: Arc<S>,
    clock: Arc<T>,
    rewards: RewardsConfig,
}

impl<S: LedgerStore, T: TimeSource> BalanceStore<S, T> {
    pub fn new(store: Arc<S>, clock: Arc<T>, rewards: RewardsConfig) -> Self {
        Self {
            store,
            clock,
            rewards,
        }
    }

    /// Current balance; a zero balance if the member never held the currency.
    pub fn get_balance(&self, member_id: &MemberId, currency: Currency) -> Result<Balance, LedgerError> {
        Ok(self
            .store
            .balance(member_id, currency)?
            .unwrap_or_else(|| Balance::zero(member_id.clone(), currency, self.clock.now())))
    }

    /// Credit RP for a contribution. This is the only path that creates RP.
    pub fn earn_reward_points(
        &self,
        member_id: &MemberId,
        amount: u64,
        source: &str,
        metadata: Metadata,
    ) -> Result<Balance, LedgerError> {
        invariant_positive(amount)?;
        if source.trim().is_empty() {
            return Err(LedgerError::Validation {
                field: "source",
                reason: "cannot be empty".to_string(),
            });
        }

        let now = self.clock.now();
        let scope = LockScope::new().balance(member_id, Currency::Rp);
        let balance = self.store.atomically(&scope, |uow| {
            post_movement(
                uow,
                member_id,
                Movement::Rp(RpMovement::Earn(amount)),
                source,
                metadata,
                now,
            )
        })?;

        info!(
            member_id = %member_id,
            amount,
            source,
            available = balance.available,
            "[ledger/balance] RP earned"
        );
        Ok(balance)
    }

    /// Credit RP according to the configured earning table.
    pub fn award_contribution(
        &self,
        member_id: &MemberId,
        event_type: &str,
        source: &str,
    ) -> Result<Balance, LedgerError> {
        let amount = self
            .rewards
            .rp_earnings
            .get(event_type)
            .copied()
            .ok_or_else(|| LedgerError::Validation {
                field: "event_type",
                reason: format!("no RP earning rule for {event_type:?}"),
            })?;

        let mut metadata = Metadata::new();
        metadata.insert("event_type".to_string(), event_type.into());
        self.earn_reward_points(member_id, amount, source, metadata)
    }

    /// Compare the stored balance with a replay of the log.
    pub fn reconcile(&self, member_id: &MemberId, currency: Currency) -> Result<Balance, LedgerError> {
        let stored = self.store.balance(member_id, currency)?;
        let entries = self.store.entries(member_id, Some(currency))?;
        let replayed = fold_entries(member_id, currency, &entries)?;

        match (stored, replayed) {
            (None, None) => Ok(Balance::zero(member_id.clone(), currency, self.clock.now())),
            (Some(stored), Some(replayed)) if stored.same_amounts(&replayed) => Ok(stored),
            (stored, replayed) => {
                let detail = format!(
                    "stored {:?} vs replayed {:?}",
                    stored.map(|b| b.view()),
                    replayed.map(|b| b.view())
                );
                warn!(member_id = %member_id, %currency, %detail, "[ledger/balance] reconciliation mismatch");
                Err(LedgerError::Inconsistent {
                    member_id: member_id.clone(),
                    currency,
                    detail,
                })
            }
        }
    }
}
