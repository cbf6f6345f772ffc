//! Outbound (Driven) ports for the ledger core.
//!
//! These traits define what the ledger needs from its environment: a
//! transactional store, a clock and a fiscal standing lookup.

use chrono::Utc;
use parking_lot::Mutex;
use shared_types::{
    AllocationTarget, Currency, EventId, MemberId, ServiceId, Timestamp, TransactionId,
};

use crate::domain::{
    Balance, ConversionRecord, EntryType, LedgerError, ShPurchaseEvent, ShPurchaseTransaction,
    SpAllocation, TimebankService, TimebankTransaction, TransactionLogEntry,
};

// =============================================================================
// LOCKING
// =============================================================================

/// Unit of mutual exclusion.
///
/// The derived `Ord` is the system-wide acquisition order: every balance key
/// sorts before every escrow key, then event keys, then service keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Balance(MemberId, Currency),
    Escrow(TransactionId),
    Event(EventId),
    Service(ServiceId),
}

/// Sorted, de-duplicated set of keys held for one unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockScope {
    keys: Vec<LockKey>,
}

impl LockScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(self, member_id: &MemberId, currency: Currency) -> Self {
        self.with(LockKey::Balance(member_id.clone(), currency))
    }

    pub fn escrow(self, id: TransactionId) -> Self {
        self.with(LockKey::Escrow(id))
    }

    pub fn event(self, id: EventId) -> Self {
        self.with(LockKey::Event(id))
    }

    pub fn service(self, id: ServiceId) -> Self {
        self.with(LockKey::Service(id))
    }

    fn with(mut self, key: LockKey) -> Self {
        if let Err(pos) = self.keys.binary_search(&key) {
            self.keys.insert(pos, key);
        }
        self
    }

    /// Keys in acquisition order.
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }

    pub fn contains(&self, key: &LockKey) -> bool {
        self.keys.binary_search(key).is_ok()
    }
}

// =============================================================================
// STORAGE
// =============================================================================

/// Reads and staged writes inside one atomic unit.
///
/// Reads observe this unit's own staged writes. Nothing written here is
/// visible to other callers until the unit commits.
pub trait UnitOfWork {
    /// Current balance, `None` if the member never held this currency.
    fn balance(&self, member_id: &MemberId, currency: Currency) -> Result<Option<Balance>, LedgerError>;

    /// Write a balance together with the log entry that explains it.
    ///
    /// This is the only way to change a balance. The balance's lock key must
    /// be in the unit's scope.
    fn record(&mut self, balance: Balance, entry: TransactionLogEntry) -> Result<(), LedgerError>;

    /// Sum of `|amount|` over matching log entries with `created_at` in `[start, end)`.
    fn sum_window(
        &self,
        member_id: &MemberId,
        currency: Currency,
        entry_type: EntryType,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<u64, LedgerError>;

    /// Whether any log entry for the pair carries `source`.
    fn has_entry_with_source(
        &self,
        member_id: &MemberId,
        currency: Currency,
        source: &str,
    ) -> Result<bool, LedgerError>;

    fn active_allocation(
        &self,
        member_id: &MemberId,
        target: &AllocationTarget,
    ) -> Result<Option<SpAllocation>, LedgerError>;

    fn active_allocation_count(&self, member_id: &MemberId) -> Result<usize, LedgerError>;

    fn put_allocation(&mut self, allocation: SpAllocation) -> Result<(), LedgerError>;

    fn put_conversion(&mut self, record: ConversionRecord) -> Result<(), LedgerError>;

    fn escrow(&self, id: TransactionId) -> Result<Option<TimebankTransaction>, LedgerError>;

    /// Insert or update an escrow transaction. Its lock key must be in scope.
    fn put_escrow(&mut self, transaction: TimebankTransaction) -> Result<(), LedgerError>;

    fn event(&self, id: EventId) -> Result<Option<ShPurchaseEvent>, LedgerError>;

    /// Insert or update an issuance event. Its lock key must be in scope.
    fn put_event(&mut self, event: ShPurchaseEvent) -> Result<(), LedgerError>;

    /// Add `amount` to the event's `sh_distributed` only if the result stays
    /// within `global_sh_cap`. Returns the new total.
    fn increment_distributed(&mut self, id: EventId, amount: u64) -> Result<u64, LedgerError>;

    /// SH bought by the member in this event so far.
    fn purchased_in_event(&self, member_id: &MemberId, event_id: EventId) -> Result<u64, LedgerError>;

    fn put_purchase(&mut self, purchase: ShPurchaseTransaction) -> Result<(), LedgerError>;

    fn timebank_service(&self, id: ServiceId) -> Result<Option<TimebankService>, LedgerError>;

    /// Insert or update a service offering. Its lock key must be in scope.
    fn put_timebank_service(&mut self, service: TimebankService) -> Result<(), LedgerError>;
}

/// Durable ledger storage.
///
/// Mutations go through [`LedgerStore::atomically`]; the remaining methods
/// are lock-free snapshot reads.
pub trait LedgerStore: Send + Sync {
    /// Run `work` with every key in `scope` held, committing its staged
    /// writes if and only if it returns `Ok`.
    fn atomically<R, F>(&self, scope: &LockScope, work: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<R, LedgerError>;

    fn balance(&self, member_id: &MemberId, currency: Currency) -> Result<Option<Balance>, LedgerError>;

    /// Log entries for a member in commit order, optionally for one currency.
    fn entries(
        &self,
        member_id: &MemberId,
        currency: Option<Currency>,
    ) -> Result<Vec<TransactionLogEntry>, LedgerError>;

    fn allocations_for_member(&self, member_id: &MemberId) -> Result<Vec<SpAllocation>, LedgerError>;

    fn allocations_for_target(&self, target: &AllocationTarget) -> Result<Vec<SpAllocation>, LedgerError>;

    fn conversions(&self, member_id: &MemberId) -> Result<Vec<ConversionRecord>, LedgerError>;

    fn escrow(&self, id: TransactionId) -> Result<Option<TimebankTransaction>, LedgerError>;

    fn escrows_for_member(&self, member_id: &MemberId) -> Result<Vec<TimebankTransaction>, LedgerError>;

    fn event(&self, id: EventId) -> Result<Option<ShPurchaseEvent>, LedgerError>;

    fn events(&self) -> Result<Vec<ShPurchaseEvent>, LedgerError>;

    /// A member's purchases, optionally within one event.
    fn purchases(
        &self,
        member_id: &MemberId,
        event_id: Option<EventId>,
    ) -> Result<Vec<ShPurchaseTransaction>, LedgerError>;

    fn timebank_service(&self, id: ServiceId) -> Result<Option<TimebankService>, LedgerError>;

    fn timebank_services(&self) -> Result<Vec<TimebankService>, LedgerError>;
}

// =============================================================================
// CLOCK
// =============================================================================

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Settable clock for tests and simulations.
#[derive(Debug)]
pub struct MockTimeSource {
    now: Mutex<Timestamp>,
}

impl MockTimeSource {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

// =============================================================================
// FISCAL STANDING
// =============================================================================

/// Whether a member is in fiscal good standing (dues paid up).
///
/// Consulted by issuance events that require fiscal regularity.
pub trait FiscalStanding: Send + Sync {
    fn is_regular(&self, member_id: &MemberId) -> bool;
}

/// Treats every member as regular.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeRegular;

impl FiscalStanding for AssumeRegular {
    fn is_regular(&self, _member_id: &MemberId) -> bool {
        true
    }
}
