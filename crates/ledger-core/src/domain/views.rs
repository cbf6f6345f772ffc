//! Read models and query filters returned by the ledger API.

use serde::{Deserialize, Serialize};
use shared_types::{AllocationTarget, Currency, MonthKey, PageRequest, Timestamp};

use super::balance::BalanceView;
use super::entities::{ConversionRecord, ShPurchaseTransaction, SpAllocation};
use super::value_objects::{EntryType, EscrowRole, EscrowStatus, EventStatus};

/// Filters for transaction log history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub currency: Option<Currency>,
    pub entry_type: Option<EntryType>,
    /// Inclusive lower bound on `created_at`.
    pub since: Option<Timestamp>,
    /// Exclusive upper bound on `created_at`.
    pub until: Option<Timestamp>,
    pub page: PageRequest,
}

impl HistoryFilter {
    pub fn currency(currency: Currency) -> Self {
        Self {
            currency: Some(currency),
            ..Self::default()
        }
    }
}

/// Filters for a member's escrow transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowFilter {
    pub role: EscrowRole,
    pub status: Option<EscrowStatus>,
    pub page: PageRequest,
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReceipt {
    pub record: ConversionRecord,
    pub rp_balance: BalanceView,
    pub tbc_balance: BalanceView,
}

/// Monthly conversion allowance for a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStatus {
    pub month: MonthKey,
    pub already_converted_this_month: u64,
    pub remaining_allowance: u64,
    /// RP per TBC.
    pub rate: u64,
    pub max_rp_per_month: u64,
    /// Largest amount `convert` would accept right now.
    pub max_convertible_now: u64,
}

/// Aggregate of active allocations on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAllocations {
    pub target: AllocationTarget,
    pub total: u64,
    pub count: usize,
    pub allocations: Vec<SpAllocation>,
}

/// Issuance progress of an event, optionally from one member's viewpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStatusView {
    pub status: EventStatus,
    pub distributed: u64,
    pub remaining_global: u64,
    pub global_cap: u64,
    pub cap_per_person: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchased_by_member: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_for_member: Option<u64>,
}

/// Result of a successful SH purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub transaction: ShPurchaseTransaction,
    pub rp_spent: u64,
    pub total_distributed: u64,
    pub remaining_global: u64,
    pub member_total: u64,
    pub member_remaining: u64,
}
