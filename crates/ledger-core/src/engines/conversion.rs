//! # RP to TBC Conversion
//!
//! Burns reward points into timebank credits at a fixed rate, subject to a
//! per-member calendar-month cap computed from the transaction log.
//!
//! The cap check, both balance writes and the conversion record happen in
//! one unit holding the member's RP and TBC row locks, so two concurrent
//! conversions cannot both pass the cap.

use serde_json::json;
use shared_types::{ConversionId, Currency, MemberId, Metadata, MonthKey};
use std::sync::Arc;
use tracing::{debug, info};

use super::balance_store::post_movement;
use crate::domain::{
    invariant_minimum_unit, invariant_positive, invariant_rp_conserved, invariant_sufficient,
    invariant_within_cap,
    ConversionConfig, ConversionReceipt, ConversionRecord, ConversionStatus, EntryType,
    LedgerError, LimitKind, Movement, RpMovement, TbcMovement,
};
use crate::ports::outbound::{LedgerStore, LockScope, TimeSource};

/// Log source for conversion burns and credits.
pub const SOURCE_CONVERSION: &str = "conversion";

pub struct ConversionEngine<S, T> {
    store: Arc<S>,
    clock: Arc<T>,
    config: ConversionConfig,
}

impl<S: LedgerStore, T: TimeSource> ConversionEngine<S, T> {
    pub fn new(store: Arc<S>, clock: Arc<T>, config: ConversionConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Convert `rp_amount` RP into `rp_amount / rp_per_tbc` TBC.
    ///
    /// Rejections, in order: zero amount, not a whole number of units,
    /// monthly cap, insufficient RP.
    pub fn convert(&self, member_id: &MemberId, rp_amount: u64) -> Result<ConversionReceipt, LedgerError> {
        let rate = self.config.rp_per_tbc;
        invariant_positive(rp_amount)?;
        invariant_minimum_unit(rp_amount, rate)?;
        let tbc_amount = rp_amount / rate;

        let scope = LockScope::new()
            .balance(member_id, Currency::Rp)
            .balance(member_id, Currency::Tbc);

        let receipt = self.store.atomically(&scope, |uow| {
            // Read under the RP lock so the month matches the commit.
            let now = self.clock.now();
            let month = MonthKey::containing(now);
            let converted = uow.sum_window(
                member_id,
                Currency::Rp,
                EntryType::SpendTbc,
                month.start(),
                month.end(),
            )?;
            invariant_within_cap(
                LimitKind::MonthlyConversion,
                converted,
                rp_amount,
                self.config.max_rp_per_month,
            )?;

            let available = uow
                .balance(member_id, Currency::Rp)?
                .map_or(0, |b| b.available);
            invariant_sufficient(Currency::Rp, rp_amount, available)?;

            let mut metadata = Metadata::new();
            metadata.insert("tbcReceived".to_string(), json!(tbc_amount));
            let rp = post_movement(
                uow,
                member_id,
                Movement::Rp(RpMovement::BurnForTbc(rp_amount)),
                SOURCE_CONVERSION,
                metadata,
                now,
            )?;
            invariant_rp_conserved(&rp)?;

            let mut metadata = Metadata::new();
            metadata.insert("rpSpent".to_string(), json!(rp_amount));
            let tbc = post_movement(
                uow,
                member_id,
                Movement::Tbc(TbcMovement::Convert(tbc_amount)),
                SOURCE_CONVERSION,
                metadata,
                now,
            )?;

            let record = ConversionRecord {
                id: ConversionId::new(),
                member_id: member_id.clone(),
                rp_spent: rp_amount,
                tbc_received: tbc_amount,
                conversion_month: month,
                rate_used: rate,
                created_at: now,
            };
            uow.put_conversion(record.clone())?;

            Ok(ConversionReceipt {
                record,
                rp_balance: rp.view(),
                tbc_balance: tbc.view(),
            })
        })?;

        info!(
            member_id = %member_id,
            rp_spent = rp_amount,
            tbc_received = tbc_amount,
            month = %receipt.record.conversion_month,
            "[ledger/conversion] RP converted to TBC"
        );
        Ok(receipt)
    }

    /// Allowance for the calendar month containing now.
    pub fn status(&self, member_id: &MemberId) -> Result<ConversionStatus, LedgerError> {
        let now = self.clock.now();
        let month = MonthKey::containing(now);
        let converted: u64 = self
            .store
            .entries(member_id, Some(Currency::Rp))?
            .iter()
            .filter(|e| e.entry_type == EntryType::SpendTbc && month.contains(e.created_at))
            .fold(0, |acc, e| acc.saturating_add(e.magnitude()));
        let remaining = self.config.max_rp_per_month.saturating_sub(converted);

        let available = self
            .store
            .balance(member_id, Currency::Rp)?
            .map_or(0, |b| b.available);
        let rate = self.config.rp_per_tbc.max(1);
        let max_convertible_now = remaining.min(available) / rate * rate;

        debug!(
            member_id = %member_id,
            converted,
            remaining,
            "[ledger/conversion] status query"
        );
        Ok(ConversionStatus {
            month,
            already_converted_this_month: converted,
            remaining_allowance: remaining,
            rate: self.config.rp_per_tbc,
            max_rp_per_month: self.config.max_rp_per_month,
            max_convertible_now,
        })
    }

    /// All conversions by the member, newest first.
    pub fn conversions(&self, member_id: &MemberId) -> Result<Vec<ConversionRecord>, LedgerError> {
        let mut records = self.store.conversions(member_id)?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}
