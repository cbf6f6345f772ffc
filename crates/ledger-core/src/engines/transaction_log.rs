//! Transaction log queries: history, window sums and balance replay.
//!
//! Entries are appended only through [`UnitOfWork::record`], one per balance
//! change, so folding a member's entries for a currency rebuilds the balance.
//!
//! [`UnitOfWork::record`]: crate::ports::outbound::UnitOfWork::record

use shared_types::{Currency, MemberId, Page, Timestamp};
use std::sync::Arc;
use tracing::debug;

use crate::domain::{
    Balance, EntryType, HistoryConfig, HistoryFilter, LedgerError, TransactionLogEntry,
};
use crate::ports::outbound::LedgerStore;

/// Read side of the append-only transaction log.
pub struct TransactionLog<S> {
    store: Arc<S>,
    config: HistoryConfig,
}

impl<S: LedgerStore> TransactionLog<S> {
    pub fn new(store: Arc<S>, config: HistoryConfig) -> Self {
        Self { store, config }
    }

    /// Paginated history, newest first.
    pub fn history(
        &self,
        member_id: &MemberId,
        filter: &HistoryFilter,
    ) -> Result<Page<TransactionLogEntry>, LedgerError> {
        let request = filter
            .page
            .clamp(self.config.default_page_size, self.config.max_page_size);

        let mut entries: Vec<TransactionLogEntry> = self
            .store
            .entries(member_id, filter.currency)?
            .into_iter()
            .filter(|e| filter.entry_type.map_or(true, |t| e.entry_type == t))
            .filter(|e| filter.since.map_or(true, |since| e.created_at >= since))
            .filter(|e| filter.until.map_or(true, |until| e.created_at < until))
            .collect();
        entries.sort_by(|a, b| b.sequence.cmp(&a.sequence));

        debug!(
            member_id = %member_id,
            matched = entries.len(),
            "[ledger/log] history query"
        );
        Ok(Page::from_ordered(entries, request))
    }

    /// Sum of `|amount|` for matching entries with `created_at` in `[start, end)`.
    pub fn sum_by_member_and_window(
        &self,
        member_id: &MemberId,
        currency: Currency,
        entry_type: EntryType,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<u64, LedgerError> {
        Ok(self
            .store
            .entries(member_id, Some(currency))?
            .iter()
            .filter(|e| e.entry_type == entry_type && e.created_at >= start && e.created_at < end)
            .fold(0u64, |acc, e| acc.saturating_add(e.magnitude())))
    }

    /// Rebuild a balance purely from the log.
    ///
    /// Returns `None` if the member has no entries for the currency.
    pub fn replay(
        &self,
        member_id: &MemberId,
        currency: Currency,
    ) -> Result<Option<Balance>, LedgerError> {
        let entries = self.store.entries(member_id, Some(currency))?;
        fold_entries(member_id, currency, &entries)
    }
}

/// Fold entries (in commit order) into a balance.
pub fn fold_entries(
    member_id: &MemberId,
    currency: Currency,
    entries: &[TransactionLogEntry],
) -> Result<Option<Balance>, LedgerError> {
    let Some(first) = entries.first() else {
        return Ok(None);
    };
    let mut balance = Balance::zero(member_id.clone(), currency, first.created_at);
    for entry in entries {
        let movement = entry.movement().ok_or_else(|| LedgerError::Inconsistent {
            member_id: member_id.clone(),
            currency,
            detail: format!(
                "entry {} has no valid movement ({} {})",
                entry.id, entry.entry_type, entry.amount
            ),
        })?;
        balance = balance.apply(&movement, entry.created_at)?;
    }
    Ok(Some(balance))
}
