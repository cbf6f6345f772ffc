//! Value objects for the ledger core.

use serde::{Deserialize, Serialize};
use shared_types::Timestamp;
use std::fmt;

/// Kind of balance-affecting event recorded in the transaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Points created (RP/SP earn, TBC from conversion, SH mint).
    Earn,
    /// RP burned into TBC.
    SpendTbc,
    /// RP burned into SH.
    SpendSh,
    /// SP moved from available to allocated.
    Allocate,
    /// SP moved from allocated back to available.
    Reclaim,
    /// TBC received through escrow (payout or refund).
    TransferIn,
    /// TBC reserved by an escrow request.
    TransferOut,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Earn => "earn",
            EntryType::SpendTbc => "spend_tbc",
            EntryType::SpendSh => "spend_sh",
            EntryType::Allocate => "allocate",
            EntryType::Reclaim => "reclaim",
            EntryType::TransferIn => "transfer_in",
            EntryType::TransferOut => "transfer_out",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a support point allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    #[default]
    Active,
    Reclaimed,
}

/// Escrow transaction status.
///
/// ```text
/// PENDING ──confirm──→ CONFIRMED
///    │
///    └──dispute──→ DISPUTED ──resolve──→ RESOLVED
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Receiver's TBC reserved, provider not yet paid.
    #[default]
    Pending,
    /// Provider paid.
    Confirmed,
    /// Awaiting an administrator's decision.
    Disputed,
    /// Dispute settled by refund or payout.
    Resolved,
}

impl EscrowStatus {
    /// Check if transition to the target status is valid.
    pub fn can_transition_to(&self, target: EscrowStatus) -> bool {
        matches!(
            (self, target),
            (EscrowStatus::Pending, EscrowStatus::Confirmed)
                | (EscrowStatus::Pending, EscrowStatus::Disputed)
                | (EscrowStatus::Disputed, EscrowStatus::Resolved)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowStatus::Confirmed | EscrowStatus::Resolved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Pending => "pending",
            EscrowStatus::Confirmed => "confirmed",
            EscrowStatus::Disputed => "disputed",
            EscrowStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrator's decision on a disputed escrow transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeOutcome {
    /// Return the reserved TBC to the receiver.
    RefundReceiver,
    /// Release the reserved TBC to the provider.
    PayProvider,
}

/// Side of an escrow transaction a member is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowRole {
    Provider,
    Receiver,
    #[default]
    Any,
}

/// Where a timebank service can be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPreference {
    Remote,
    InPerson,
    Both,
}

/// Issuance event status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Before the window opens.
    #[default]
    Pending,
    /// Inside `[start, end)`; purchases accepted.
    Active,
    /// Window has ended.
    Closed,
}

impl EventStatus {
    /// Status implied by the wall clock for the window `[start, end)`.
    pub fn derive(now: Timestamp, start: Timestamp, end: Timestamp) -> Self {
        if now < start {
            EventStatus::Pending
        } else if now < end {
            EventStatus::Active
        } else {
            EventStatus::Closed
        }
    }
}
