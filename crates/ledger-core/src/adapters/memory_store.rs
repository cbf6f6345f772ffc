//! In-memory ledger store.
//!
//! Row locks are per-key `parking_lot` mutexes taken in [`LockKey`] order.
//! Writes go to a staging overlay and are published in one short write
//! section of the table lock, so readers never observe a half-applied unit.

use parking_lot::{Mutex, RwLock};
use shared_types::{
    AllocationId, AllocationTarget, Currency, EventId, MemberId, ServiceId, Timestamp,
    TransactionId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use crate::domain::{
    invariant_within_cap, Balance, ConversionRecord, EntityKind, EntryType, LedgerError,
    LimitKind, ShPurchaseEvent, ShPurchaseTransaction, SpAllocation, TimebankService,
    TimebankTransaction, TransactionLogEntry,
};
use crate::ports::outbound::{LedgerStore, LockKey, LockScope, UnitOfWork};

type BalanceKey = (MemberId, Currency);

#[derive(Debug, Default)]
struct Tables {
    balances: HashMap<BalanceKey, Balance>,
    log: Vec<TransactionLogEntry>,
    next_sequence: u64,
    allocations: HashMap<AllocationId, SpAllocation>,
    conversions: Vec<ConversionRecord>,
    escrows: HashMap<TransactionId, TimebankTransaction>,
    events: HashMap<EventId, ShPurchaseEvent>,
    purchases: Vec<ShPurchaseTransaction>,
    services: HashMap<ServiceId, TimebankService>,
}

#[derive(Debug, Default)]
struct Staged {
    balances: HashMap<BalanceKey, Balance>,
    log: Vec<TransactionLogEntry>,
    allocations: HashMap<AllocationId, SpAllocation>,
    conversions: Vec<ConversionRecord>,
    escrows: HashMap<TransactionId, TimebankTransaction>,
    events: HashMap<EventId, ShPurchaseEvent>,
    purchases: Vec<ShPurchaseTransaction>,
    services: HashMap<ServiceId, TimebankService>,
}

/// Thread-safe in-memory implementation of [`LedgerStore`].
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    row_locks: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
    tables: RwLock<Tables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed log entries.
    pub fn entry_count(&self) -> usize {
        self.tables.read().log.len()
    }

    fn row_lock_handles(&self, scope: &LockScope) -> Vec<Arc<Mutex<()>>> {
        let mut table = self.row_locks.lock();
        scope
            .keys()
            .iter()
            .map(|key| Arc::clone(table.entry(key.clone()).or_default()))
            .collect()
    }

    fn commit(&self, staged: Staged) {
        let mut tables = self.tables.write();
        tables.balances.extend(staged.balances);
        for mut entry in staged.log {
            tables.next_sequence += 1;
            entry.sequence = tables.next_sequence;
            tables.log.push(entry);
        }
        tables.allocations.extend(staged.allocations);
        tables.conversions.extend(staged.conversions);
        tables.escrows.extend(staged.escrows);
        tables.events.extend(staged.events);
        tables.purchases.extend(staged.purchases);
        tables.services.extend(staged.services);
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn atomically<R, F>(&self, scope: &LockScope, work: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<R, LedgerError>,
    {
        let handles = self.row_lock_handles(scope);
        let _guards: Vec<_> = handles.iter().map(|h| h.lock()).collect();

        let mut unit = MemoryUnit {
            tables: &self.tables,
            scope,
            staged: Staged::default(),
        };
        let result = work(&mut unit)?;

        trace!(
            keys = scope.keys().len(),
            entries = unit.staged.log.len(),
            "[ledger/store] committing unit of work"
        );
        self.commit(unit.staged);
        Ok(result)
    }

    fn balance(&self, member_id: &MemberId, currency: Currency) -> Result<Option<Balance>, LedgerError> {
        Ok(self
            .tables
            .read()
            .balances
            .get(&(member_id.clone(), currency))
            .cloned())
    }

    fn entries(
        &self,
        member_id: &MemberId,
        currency: Option<Currency>,
    ) -> Result<Vec<TransactionLogEntry>, LedgerError> {
        Ok(self
            .tables
            .read()
            .log
            .iter()
            .filter(|e| &e.member_id == member_id && currency.map_or(true, |c| e.currency == c))
            .cloned()
            .collect())
    }

    fn allocations_for_member(&self, member_id: &MemberId) -> Result<Vec<SpAllocation>, LedgerError> {
        Ok(self
            .tables
            .read()
            .allocations
            .values()
            .filter(|a| &a.member_id == member_id)
            .cloned()
            .collect())
    }

    fn allocations_for_target(&self, target: &AllocationTarget) -> Result<Vec<SpAllocation>, LedgerError> {
        Ok(self
            .tables
            .read()
            .allocations
            .values()
            .filter(|a| &a.target == target)
            .cloned()
            .collect())
    }

    fn conversions(&self, member_id: &MemberId) -> Result<Vec<ConversionRecord>, LedgerError> {
        Ok(self
            .tables
            .read()
            .conversions
            .iter()
            .filter(|c| &c.member_id == member_id)
            .cloned()
            .collect())
    }

    fn escrow(&self, id: TransactionId) -> Result<Option<TimebankTransaction>, LedgerError> {
        Ok(self.tables.read().escrows.get(&id).cloned())
    }

    fn escrows_for_member(&self, member_id: &MemberId) -> Result<Vec<TimebankTransaction>, LedgerError> {
        Ok(self
            .tables
            .read()
            .escrows
            .values()
            .filter(|t| t.is_party(member_id))
            .cloned()
            .collect())
    }

    fn event(&self, id: EventId) -> Result<Option<ShPurchaseEvent>, LedgerError> {
        Ok(self.tables.read().events.get(&id).cloned())
    }

    fn events(&self) -> Result<Vec<ShPurchaseEvent>, LedgerError> {
        Ok(self.tables.read().events.values().cloned().collect())
    }

    fn purchases(
        &self,
        member_id: &MemberId,
        event_id: Option<EventId>,
    ) -> Result<Vec<ShPurchaseTransaction>, LedgerError> {
        Ok(self
            .tables
            .read()
            .purchases
            .iter()
            .filter(|p| &p.member_id == member_id && event_id.map_or(true, |e| p.event_id == e))
            .cloned()
            .collect())
    }

    fn timebank_service(&self, id: ServiceId) -> Result<Option<TimebankService>, LedgerError> {
        Ok(self.tables.read().services.get(&id).cloned())
    }

    fn timebank_services(&self) -> Result<Vec<TimebankService>, LedgerError> {
        Ok(self.tables.read().services.values().cloned().collect())
    }
}

// =============================================================================
// UNIT OF WORK
// =============================================================================

struct MemoryUnit<'a> {
    tables: &'a RwLock<Tables>,
    scope: &'a LockScope,
    staged: Staged,
}

impl MemoryUnit<'_> {
    fn require_lock(&self, key: LockKey) -> Result<(), LedgerError> {
        if self.scope.contains(&key) {
            Ok(())
        } else {
            Err(LedgerError::Storage(format!("write to {key:?} outside lock scope")))
        }
    }

    /// Committed allocations overlaid with this unit's staged versions.
    fn merged_allocations(&self, keep: impl Fn(&SpAllocation) -> bool) -> Vec<SpAllocation> {
        let tables = self.tables.read();
        let mut merged: Vec<SpAllocation> = tables
            .allocations
            .values()
            .filter(|a| !self.staged.allocations.contains_key(&a.id) && keep(a))
            .cloned()
            .collect();
        merged.extend(self.staged.allocations.values().filter(|a| keep(a)).cloned());
        merged
    }
}

impl UnitOfWork for MemoryUnit<'_> {
    fn balance(&self, member_id: &MemberId, currency: Currency) -> Result<Option<Balance>, LedgerError> {
        let key = (member_id.clone(), currency);
        if let Some(staged) = self.staged.balances.get(&key) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.tables.read().balances.get(&key).cloned())
    }

    fn record(&mut self, balance: Balance, entry: TransactionLogEntry) -> Result<(), LedgerError> {
        self.require_lock(LockKey::Balance(balance.member_id.clone(), balance.currency))?;
        if entry.member_id != balance.member_id || entry.currency != balance.currency {
            return Err(LedgerError::Storage(format!(
                "log entry for {}/{} does not match balance {}/{}",
                entry.member_id, entry.currency, balance.member_id, balance.currency
            )));
        }
        self.staged
            .balances
            .insert((balance.member_id.clone(), balance.currency), balance);
        self.staged.log.push(entry);
        Ok(())
    }

    fn sum_window(
        &self,
        member_id: &MemberId,
        currency: Currency,
        entry_type: EntryType,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<u64, LedgerError> {
        let tables = self.tables.read();
        Ok(tables
            .log
            .iter()
            .chain(self.staged.log.iter())
            .filter(|e| {
                &e.member_id == member_id
                    && e.currency == currency
                    && e.entry_type == entry_type
                    && e.created_at >= start
                    && e.created_at < end
            })
            .fold(0u64, |acc, e| acc.saturating_add(e.magnitude())))
    }

    fn has_entry_with_source(
        &self,
        member_id: &MemberId,
        currency: Currency,
        source: &str,
    ) -> Result<bool, LedgerError> {
        let tables = self.tables.read();
        Ok(tables
            .log
            .iter()
            .chain(self.staged.log.iter())
            .any(|e| &e.member_id == member_id && e.currency == currency && e.source == source))
    }

    fn active_allocation(
        &self,
        member_id: &MemberId,
        target: &AllocationTarget,
    ) -> Result<Option<SpAllocation>, LedgerError> {
        Ok(self
            .merged_allocations(|a| a.is_active() && &a.member_id == member_id && &a.target == target)
            .into_iter()
            .next())
    }

    fn active_allocation_count(&self, member_id: &MemberId) -> Result<usize, LedgerError> {
        Ok(self
            .merged_allocations(|a| a.is_active() && &a.member_id == member_id)
            .len())
    }

    fn put_allocation(&mut self, allocation: SpAllocation) -> Result<(), LedgerError> {
        self.require_lock(LockKey::Balance(allocation.member_id.clone(), Currency::Sp))?;
        self.staged.allocations.insert(allocation.id, allocation);
        Ok(())
    }

    fn put_conversion(&mut self, record: ConversionRecord) -> Result<(), LedgerError> {
        self.require_lock(LockKey::Balance(record.member_id.clone(), Currency::Rp))?;
        self.staged.conversions.push(record);
        Ok(())
    }

    fn escrow(&self, id: TransactionId) -> Result<Option<TimebankTransaction>, LedgerError> {
        if let Some(staged) = self.staged.escrows.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.tables.read().escrows.get(&id).cloned())
    }

    fn put_escrow(&mut self, transaction: TimebankTransaction) -> Result<(), LedgerError> {
        self.require_lock(LockKey::Escrow(transaction.id))?;
        self.staged.escrows.insert(transaction.id, transaction);
        Ok(())
    }

    fn event(&self, id: EventId) -> Result<Option<ShPurchaseEvent>, LedgerError> {
        if let Some(staged) = self.staged.events.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.tables.read().events.get(&id).cloned())
    }

    fn put_event(&mut self, event: ShPurchaseEvent) -> Result<(), LedgerError> {
        self.require_lock(LockKey::Event(event.id))?;
        self.staged.events.insert(event.id, event);
        Ok(())
    }

    fn increment_distributed(&mut self, id: EventId, amount: u64) -> Result<u64, LedgerError> {
        self.require_lock(LockKey::Event(id))?;
        let mut event = self
            .event(id)?
            .ok_or_else(|| LedgerError::not_found(EntityKind::Event, id))?;

        invariant_within_cap(
            LimitKind::GlobalIssuance,
            event.sh_distributed,
            amount,
            event.global_sh_cap,
        )?;
        event.sh_distributed += amount;

        let total = event.sh_distributed;
        self.staged.events.insert(id, event);
        Ok(total)
    }

    fn purchased_in_event(&self, member_id: &MemberId, event_id: EventId) -> Result<u64, LedgerError> {
        let tables = self.tables.read();
        Ok(tables
            .purchases
            .iter()
            .chain(self.staged.purchases.iter())
            .filter(|p| &p.member_id == member_id && p.event_id == event_id)
            .fold(0u64, |acc, p| acc.saturating_add(p.sh_amount)))
    }

    fn put_purchase(&mut self, purchase: ShPurchaseTransaction) -> Result<(), LedgerError> {
        self.require_lock(LockKey::Balance(purchase.member_id.clone(), Currency::Sh))?;
        self.require_lock(LockKey::Event(purchase.event_id))?;
        self.staged.purchases.push(purchase);
        Ok(())
    }

    fn timebank_service(&self, id: ServiceId) -> Result<Option<TimebankService>, LedgerError> {
        if let Some(staged) = self.staged.services.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.tables.read().services.get(&id).cloned())
    }

    fn put_timebank_service(&mut self, service: TimebankService) -> Result<(), LedgerError> {
        self.require_lock(LockKey::Service(service.id))?;
        self.staged.services.insert(service.id, service);
        Ok(())
    }
}
