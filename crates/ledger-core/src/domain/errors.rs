//! Error types for the ledger core.
//!
//! Every rejection carries the numbers a caller needs to explain it
//! (balance, limit, remaining allowance) or the current state of the record.

use serde::{Deserialize, Serialize};
use shared_types::{Currency, EventId, MemberId, TransactionId, TypeError};
use std::fmt;
use thiserror::Error;

use super::value_objects::EventStatus;

/// Coarse classification of ledger errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input.
    Validation,
    /// Not enough funds in the relevant balance.
    InsufficientBalance,
    /// A monthly, per-person, global or count cap would be exceeded.
    LimitExceeded,
    /// Unknown allocation, event or transaction.
    NotFound,
    /// Duplicate active allocation, double-confirm and similar.
    Conflict,
    /// The caller is not allowed to perform the operation.
    Forbidden,
    /// Operation not valid for the record's current status.
    State,
    /// Storage failure or ledger inconsistency.
    Internal,
}

impl ErrorKind {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::LimitExceeded => "limit_exceeded",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::State => "state",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Which cap a `LimitExceeded` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// RP converted to TBC within one calendar month.
    MonthlyConversion,
    /// SH bought by one member within one issuance event.
    PerPersonIssuance,
    /// SH distributed by one issuance event.
    GlobalIssuance,
    /// Concurrently active SP allocations per member.
    ActiveAllocations,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LimitKind::MonthlyConversion => "monthly conversion limit",
            LimitKind::PerPersonIssuance => "per-person issuance cap",
            LimitKind::GlobalIssuance => "global issuance cap",
            LimitKind::ActiveAllocations => "active allocation limit",
        };
        f.write_str(label)
    }
}

/// Ledger record kinds, for `NotFound` and `InvalidState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Allocation,
    Transaction,
    Event,
    Service,
    RewardRule,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Allocation => "allocation",
            EntityKind::Transaction => "transaction",
            EntityKind::Event => "event",
            EntityKind::Service => "timebank service",
            EntityKind::RewardRule => "reward rule",
        };
        f.write_str(label)
    }
}

/// Errors returned by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // ===== VALIDATION =====
    /// Amount outside the accepted range.
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: u64, reason: String },

    /// Malformed field other than an amount.
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Conversion amount is not a whole number of units.
    #[error("Amount {requested} is not a multiple of the minimum unit {unit}")]
    BelowMinimumUnit { requested: u64, unit: u64 },

    /// Arithmetic would overflow the balance representation.
    #[error("Arithmetic overflow on {currency} balance")]
    Overflow { currency: Currency },

    /// Event is not priced in RP.
    #[error("Event {event_id} does not accept RP pricing")]
    UnsupportedPricing { event_id: EventId },

    // ===== FUNDS =====
    /// Not enough available funds.
    #[error("Insufficient {currency}: required {required}, available {available}, short by {shortfall}")]
    InsufficientBalance {
        currency: Currency,
        required: u64,
        available: u64,
        shortfall: u64,
    },

    // ===== LIMITS =====
    /// A cap would be exceeded.
    #[error("{limit} exceeded: cap {cap}, used {used}, requested {requested}, remaining {remaining}")]
    LimitExceeded {
        limit: LimitKind,
        cap: u64,
        used: u64,
        requested: u64,
        remaining: u64,
    },

    // ===== LOOKUP =====
    /// Record does not exist (or is no longer active).
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    // ===== CONFLICTS =====
    /// An active allocation already exists on this target.
    #[error("Active allocation already exists for {target}")]
    DuplicateAllocation { target: String },

    /// Transaction was already confirmed.
    #[error("Transaction {transaction_id} already confirmed")]
    AlreadyConfirmed { transaction_id: TransactionId },

    // ===== AUTHORIZATION =====
    /// Caller lacks the role required for the action.
    #[error("Member {member_id} is not allowed to {action}")]
    Forbidden { member_id: MemberId, action: String },

    // ===== STATE =====
    /// Operation not valid in the record's current status.
    #[error("Cannot {attempted} {entity} {id} in status {current}")]
    InvalidState {
        entity: EntityKind,
        id: String,
        current: String,
        attempted: String,
    },

    /// Issuance event is not accepting purchases.
    #[error("Event {event_id} is not active (status: {status:?})")]
    EventNotActive {
        event_id: EventId,
        status: EventStatus,
    },

    // ===== INTERNAL =====
    /// Stored balance disagrees with the log replay.
    #[error("Ledger inconsistency for {member_id}/{currency}: {detail}")]
    Inconsistent {
        member_id: MemberId,
        currency: Currency,
        detail: String,
    },

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Map onto the coarse error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount { .. }
            | LedgerError::Validation { .. }
            | LedgerError::BelowMinimumUnit { .. }
            | LedgerError::Overflow { .. }
            | LedgerError::UnsupportedPricing { .. } => ErrorKind::Validation,
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::DuplicateAllocation { .. } | LedgerError::AlreadyConfirmed { .. } => {
                ErrorKind::Conflict
            }
            LedgerError::Forbidden { .. } => ErrorKind::Forbidden,
            LedgerError::InvalidState { .. } | LedgerError::EventNotActive { .. } => {
                ErrorKind::State
            }
            LedgerError::Inconsistent { .. } | LedgerError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Remaining allowance for `LimitExceeded` errors.
    pub fn remaining_allowance(&self) -> Option<u64> {
        match self {
            LedgerError::LimitExceeded { remaining, .. } => Some(*remaining),
            _ => None,
        }
    }

    pub(crate) fn insufficient(currency: Currency, required: u64, available: u64) -> Self {
        LedgerError::InsufficientBalance {
            currency,
            required,
            available,
            shortfall: required.saturating_sub(available),
        }
    }

    pub(crate) fn forbidden(member_id: &MemberId, action: &str) -> Self {
        LedgerError::Forbidden {
            member_id: member_id.clone(),
            action: action.to_string(),
        }
    }

    pub(crate) fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<TypeError> for LedgerError {
    fn from(err: TypeError) -> Self {
        LedgerError::Validation {
            field: "input",
            reason: err.to_string(),
        }
    }
}
