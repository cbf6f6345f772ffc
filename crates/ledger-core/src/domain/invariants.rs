//! # Domain Invariants
//!
//! Business rules enforced by the engines. Each check is a pure function so
//! it can be evaluated before any write and again inside the locked unit.

use shared_types::{Currency, MemberId};

use super::balance::Balance;
use super::errors::{LedgerError, LimitKind};

/// Invariant: amounts are strictly positive.
pub fn invariant_positive(amount: u64) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount {
            amount,
            reason: "must be positive".to_string(),
        });
    }
    Ok(())
}

/// Invariant: conversion amounts are whole multiples of the rate.
///
/// With 100 RP = 1 TBC this also means at least 100 RP.
pub fn invariant_minimum_unit(amount: u64, unit: u64) -> Result<(), LedgerError> {
    if unit == 0 || amount < unit || amount % unit != 0 {
        return Err(LedgerError::BelowMinimumUnit {
            requested: amount,
            unit,
        });
    }
    Ok(())
}

/// Invariant: `used + requested <= cap`.
///
/// The error reports the remaining allowance (`cap - used`, floored at 0).
pub fn invariant_within_cap(
    limit: LimitKind,
    used: u64,
    requested: u64,
    cap: u64,
) -> Result<(), LedgerError> {
    let remaining = cap.saturating_sub(used);
    if requested > remaining {
        return Err(LedgerError::LimitExceeded {
            limit,
            cap,
            used,
            requested,
            remaining,
        });
    }
    Ok(())
}

/// Invariant: enough spendable funds.
pub fn invariant_sufficient(
    currency: Currency,
    required: u64,
    available: u64,
) -> Result<(), LedgerError> {
    if required > available {
        return Err(LedgerError::insufficient(currency, required, available));
    }
    Ok(())
}

/// Invariant: single SP allocation size within `[min, max]`.
pub fn invariant_allocation_range(amount: u64, min: u64, max: u64) -> Result<(), LedgerError> {
    if amount < min || amount > max {
        return Err(LedgerError::InvalidAmount {
            amount,
            reason: format!("must be between {min} and {max}"),
        });
    }
    Ok(())
}

/// Invariant: SP `available + allocated == total`.
pub fn invariant_sp_conserved(balance: &Balance) -> Result<(), LedgerError> {
    if balance.currency == Currency::Sp && balance.sp_total() != balance.total_earned {
        return Err(LedgerError::Inconsistent {
            member_id: balance.member_id.clone(),
            currency: Currency::Sp,
            detail: format!(
                "available {} + allocated {} != total {}",
                balance.available, balance.allocated, balance.total_earned
            ),
        });
    }
    Ok(())
}

/// Invariant: RP burned never exceeds RP earned.
pub fn invariant_rp_conserved(balance: &Balance) -> Result<(), LedgerError> {
    if balance.currency != Currency::Rp {
        return Ok(());
    }
    let accounted = balance
        .available
        .checked_add(balance.spent_on_tbc)
        .and_then(|v| v.checked_add(balance.spent_on_sh));
    if accounted != Some(balance.total_earned) {
        return Err(LedgerError::Inconsistent {
            member_id: balance.member_id.clone(),
            currency: Currency::Rp,
            detail: format!(
                "available {} + spent_on_tbc {} + spent_on_sh {} != earned {}",
                balance.available, balance.spent_on_tbc, balance.spent_on_sh, balance.total_earned
            ),
        });
    }
    Ok(())
}

/// Invariant: escrow parties are distinct.
pub fn invariant_distinct_parties(
    receiver: &MemberId,
    provider: &MemberId,
) -> Result<(), LedgerError> {
    if receiver == provider {
        return Err(LedgerError::Validation {
            field: "provider_id",
            reason: "cannot request a service from yourself".to_string(),
        });
    }
    Ok(())
}
