//! Balance records and the movements allowed on each currency.
//!
//! A `Movement` is the only way a balance changes. Each currency has its own
//! movement enum, so operations that make no sense for a currency (spending
//! SP, allocating TBC, converting SP to RP) cannot be expressed.

use serde::{Deserialize, Serialize};
use shared_types::{Currency, MemberId, Timestamp};

use super::errors::LedgerError;
use super::value_objects::EntryType;

/// Log source tag for TBC credited back to a receiver after a dispute.
pub const SOURCE_ESCROW_REFUND: &str = "escrow_refund";

/// Reward point movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpMovement {
    /// Credit `available` and `total_earned`.
    Earn(u64),
    /// Burn from `available` into `spent_on_tbc`.
    BurnForTbc(u64),
    /// Burn from `available` into `spent_on_sh`.
    BurnForSh(u64),
}

/// Support point movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpMovement {
    /// Credit `available` and `total_earned`.
    Grant(u64),
    /// Move from `available` to `allocated`.
    Allocate(u64),
    /// Move from `allocated` back to `available`.
    Reclaim(u64),
}

/// Timebank credit movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TbcMovement {
    /// Credit from an RP conversion.
    Convert(u64),
    /// Escrow reservation: debit `available`, credit `total_spent`.
    Reserve(u64),
    /// Escrow release to the provider.
    Payout(u64),
    /// Escrow reservation returned to the receiver.
    Refund(u64),
}

/// Social Horizon movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShMovement {
    /// Credit `available` and `total_earned` (total issued).
    Mint(u64),
}

/// A single balance change on one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Movement {
    Rp(RpMovement),
    Sp(SpMovement),
    Tbc(TbcMovement),
    Sh(ShMovement),
}

impl Movement {
    pub fn currency(&self) -> Currency {
        match self {
            Movement::Rp(_) => Currency::Rp,
            Movement::Sp(_) => Currency::Sp,
            Movement::Tbc(_) => Currency::Tbc,
            Movement::Sh(_) => Currency::Sh,
        }
    }

    /// Unsigned magnitude of the movement.
    pub fn amount(&self) -> u64 {
        match *self {
            Movement::Rp(RpMovement::Earn(a))
            | Movement::Rp(RpMovement::BurnForTbc(a))
            | Movement::Rp(RpMovement::BurnForSh(a))
            | Movement::Sp(SpMovement::Grant(a))
            | Movement::Sp(SpMovement::Allocate(a))
            | Movement::Sp(SpMovement::Reclaim(a))
            | Movement::Tbc(TbcMovement::Convert(a))
            | Movement::Tbc(TbcMovement::Reserve(a))
            | Movement::Tbc(TbcMovement::Payout(a))
            | Movement::Tbc(TbcMovement::Refund(a))
            | Movement::Sh(ShMovement::Mint(a)) => a,
        }
    }

    /// Log entry type recorded for this movement.
    pub fn entry_type(&self) -> EntryType {
        match self {
            Movement::Rp(RpMovement::Earn(_))
            | Movement::Sp(SpMovement::Grant(_))
            | Movement::Tbc(TbcMovement::Convert(_))
            | Movement::Sh(ShMovement::Mint(_)) => EntryType::Earn,
            Movement::Rp(RpMovement::BurnForTbc(_)) => EntryType::SpendTbc,
            Movement::Rp(RpMovement::BurnForSh(_)) => EntryType::SpendSh,
            Movement::Sp(SpMovement::Allocate(_)) => EntryType::Allocate,
            Movement::Sp(SpMovement::Reclaim(_)) => EntryType::Reclaim,
            Movement::Tbc(TbcMovement::Reserve(_)) => EntryType::TransferOut,
            Movement::Tbc(TbcMovement::Payout(_)) | Movement::Tbc(TbcMovement::Refund(_)) => {
                EntryType::TransferIn
            }
        }
    }

    /// Whether `available` goes up.
    pub fn is_credit(&self) -> bool {
        !matches!(
            self,
            Movement::Rp(RpMovement::BurnForTbc(_))
                | Movement::Rp(RpMovement::BurnForSh(_))
                | Movement::Sp(SpMovement::Allocate(_))
                | Movement::Tbc(TbcMovement::Reserve(_))
        )
    }

    /// Amount as recorded in the log: negative when `available` decreases.
    pub fn signed_amount(&self) -> Result<i64, LedgerError> {
        let magnitude = i64::try_from(self.amount()).map_err(|_| LedgerError::Overflow {
            currency: self.currency(),
        })?;
        Ok(if self.is_credit() { magnitude } else { -magnitude })
    }

    /// Recover the movement a log entry was written for.
    pub fn from_logged(
        currency: Currency,
        entry_type: EntryType,
        amount: i64,
        source: &str,
    ) -> Option<Movement> {
        let a = amount.unsigned_abs();
        let movement = match (currency, entry_type) {
            (Currency::Rp, EntryType::Earn) => Movement::Rp(RpMovement::Earn(a)),
            (Currency::Rp, EntryType::SpendTbc) => Movement::Rp(RpMovement::BurnForTbc(a)),
            (Currency::Rp, EntryType::SpendSh) => Movement::Rp(RpMovement::BurnForSh(a)),
            (Currency::Sp, EntryType::Earn) => Movement::Sp(SpMovement::Grant(a)),
            (Currency::Sp, EntryType::Allocate) => Movement::Sp(SpMovement::Allocate(a)),
            (Currency::Sp, EntryType::Reclaim) => Movement::Sp(SpMovement::Reclaim(a)),
            (Currency::Tbc, EntryType::Earn) => Movement::Tbc(TbcMovement::Convert(a)),
            (Currency::Tbc, EntryType::TransferOut) => Movement::Tbc(TbcMovement::Reserve(a)),
            (Currency::Tbc, EntryType::TransferIn) if source == SOURCE_ESCROW_REFUND => {
                Movement::Tbc(TbcMovement::Refund(a))
            }
            (Currency::Tbc, EntryType::TransferIn) => Movement::Tbc(TbcMovement::Payout(a)),
            (Currency::Sh, EntryType::Earn) => Movement::Sh(ShMovement::Mint(a)),
            _ => return None,
        };
        let sign_matches = (amount >= 0) == movement.is_credit();
        sign_matches.then_some(movement)
    }
}

/// One member's holdings of one currency.
///
/// Field meaning by currency:
///
/// | Field          | RP | SP | TBC | SH |
/// |----------------|----|----|-----|----|
/// | `total_earned` | earned | granted | earned | issued |
/// | `available`    | spendable | unallocated | balance | balance |
/// | `allocated`    | - | active allocations | - | - |
/// | `spent_on_tbc` | burned to TBC | - | - | - |
/// | `spent_on_sh`  | burned to SH | - | - | - |
/// | `total_spent`  | - | - | reserved by escrow | - |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub member_id: MemberId,
    pub currency: Currency,
    pub total_earned: u64,
    pub available: u64,
    pub allocated: u64,
    pub spent_on_tbc: u64,
    pub spent_on_sh: u64,
    pub total_spent: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Balance {
    /// Fresh zero balance.
    pub fn zero(member_id: MemberId, currency: Currency, now: Timestamp) -> Self {
        Self {
            member_id,
            currency,
            total_earned: 0,
            available: 0,
            allocated: 0,
            spent_on_tbc: 0,
            spent_on_sh: 0,
            total_spent: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// SP total (`available + allocated`).
    pub fn sp_total(&self) -> u64 {
        self.available.saturating_add(self.allocated)
    }

    /// Compute the balance after `movement` without touching `self`.
    ///
    /// Fails without side effects on a zero amount, a currency mismatch,
    /// insufficient funds or overflow.
    pub fn apply(&self, movement: &Movement, now: Timestamp) -> Result<Balance, LedgerError> {
        if movement.currency() != self.currency {
            return Err(LedgerError::Inconsistent {
                member_id: self.member_id.clone(),
                currency: self.currency,
                detail: format!("{} movement applied to {} balance", movement.currency(), self.currency),
            });
        }
        let amount = movement.amount();
        if amount == 0 {
            return Err(LedgerError::InvalidAmount {
                amount,
                reason: "must be positive".to_string(),
            });
        }

        let mut next = self.clone();
        match *movement {
            Movement::Rp(RpMovement::Earn(a))
            | Movement::Sp(SpMovement::Grant(a))
            | Movement::Tbc(TbcMovement::Convert(a))
            | Movement::Tbc(TbcMovement::Payout(a))
            | Movement::Sh(ShMovement::Mint(a)) => {
                next.available = self.add(self.available, a)?;
                next.total_earned = self.add(self.total_earned, a)?;
            }
            Movement::Rp(RpMovement::BurnForTbc(a)) => {
                next.available = self.debit_available(a)?;
                next.spent_on_tbc = self.add(self.spent_on_tbc, a)?;
            }
            Movement::Rp(RpMovement::BurnForSh(a)) => {
                next.available = self.debit_available(a)?;
                next.spent_on_sh = self.add(self.spent_on_sh, a)?;
            }
            Movement::Sp(SpMovement::Allocate(a)) => {
                next.available = self.debit_available(a)?;
                next.allocated = self.add(self.allocated, a)?;
            }
            Movement::Sp(SpMovement::Reclaim(a)) => {
                next.allocated = self.allocated.checked_sub(a).ok_or_else(|| {
                    self.inconsistent(format!("reclaim of {a} exceeds allocated {}", self.allocated))
                })?;
                next.available = self.add(self.available, a)?;
            }
            Movement::Tbc(TbcMovement::Reserve(a)) => {
                next.available = self.debit_available(a)?;
                next.total_spent = self.add(self.total_spent, a)?;
            }
            Movement::Tbc(TbcMovement::Refund(a)) => {
                next.total_spent = self.total_spent.checked_sub(a).ok_or_else(|| {
                    self.inconsistent(format!("refund of {a} exceeds total spent {}", self.total_spent))
                })?;
                next.available = self.add(self.available, a)?;
            }
        }
        next.updated_at = now;
        Ok(next)
    }

    /// Caller-facing projection with currency-specific fields.
    pub fn view(&self) -> BalanceView {
        let rp = self.currency == Currency::Rp;
        BalanceView {
            member_id: self.member_id.clone(),
            currency: self.currency,
            available: self.available,
            total_earned: self.total_earned,
            allocated: (self.currency == Currency::Sp).then_some(self.allocated),
            spent_on_tbc: rp.then_some(self.spent_on_tbc),
            spent_on_sh: rp.then_some(self.spent_on_sh),
            total_spent: (self.currency == Currency::Tbc).then_some(self.total_spent),
        }
    }

    /// Compare the ledger-relevant fields, ignoring timestamps.
    pub fn same_amounts(&self, other: &Balance) -> bool {
        self.total_earned == other.total_earned
            && self.available == other.available
            && self.allocated == other.allocated
            && self.spent_on_tbc == other.spent_on_tbc
            && self.spent_on_sh == other.spent_on_sh
            && self.total_spent == other.total_spent
    }

    fn add(&self, current: u64, amount: u64) -> Result<u64, LedgerError> {
        current.checked_add(amount).ok_or(LedgerError::Overflow {
            currency: self.currency,
        })
    }

    fn debit_available(&self, amount: u64) -> Result<u64, LedgerError> {
        self.available
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::insufficient(self.currency, amount, self.available))
    }

    fn inconsistent(&self, detail: String) -> LedgerError {
        LedgerError::Inconsistent {
            member_id: self.member_id.clone(),
            currency: self.currency,
            detail,
        }
    }
}

/// Read snapshot of a balance.
///
/// Optional fields are present only for the currency they apply to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    pub member_id: MemberId,
    pub currency: Currency,
    pub available: u64,
    pub total_earned: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocated: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spent_on_tbc: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spent_on_sh: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_spent: Option<u64>,
}
