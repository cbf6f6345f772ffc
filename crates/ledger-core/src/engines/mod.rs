//! Ledger engines.
//!
//! Each engine owns one family of operations and writes only through
//! [`LedgerStore::atomically`](crate::ports::outbound::LedgerStore::atomically).

pub mod allocation;
pub mod balance_store;
pub mod conversion;
pub mod escrow;
pub mod issuance;
pub mod transaction_log;

pub use allocation::{AllocationEngine, SOURCE_ALLOCATION, SOURCE_INITIAL_GRANT, SOURCE_SP_AWARD};
pub use balance_store::BalanceStore;
pub use conversion::{ConversionEngine, SOURCE_CONVERSION};
pub use escrow::{EscrowEngine, SOURCE_ESCROW_PAYOUT, SOURCE_ESCROW_RESERVE};
pub use issuance::{event_source, IssuanceEngine};
pub use transaction_log::{fold_entries, TransactionLog};
