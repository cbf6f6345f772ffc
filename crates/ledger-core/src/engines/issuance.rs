//! # Social Horizon Issuance
//!
//! Time-boxed events during which members burn RP to receive SH, under a
//! per-person cap and a global cap.
//!
//! A purchase holds the member's RP and SH row locks and the event row lock.
//! The event's status and both caps are re-checked under those locks, and
//! `sh_distributed` is raised with a conditional increment that refuses to
//! pass the global cap.

use serde_json::json;
use shared_types::{Caller, Currency, EventId, MemberId, Metadata, PurchaseId, Timestamp};
use std::sync::Arc;
use tracing::{debug, info};

use super::balance_store::post_movement;
use crate::domain::{
    invariant_positive, invariant_rp_conserved, invariant_sufficient, invariant_within_cap,
    EntityKind, EventStatus, EventStatusView, IssuanceConfig, LedgerError, LimitKind, Movement,
    NewIssuanceEvent, PurchaseReceipt, RpMovement, ShMovement, ShPurchaseEvent,
    ShPurchaseTransaction,
};
use crate::ports::outbound::{FiscalStanding, LedgerStore, LockScope, TimeSource, UnitOfWork};

/// Log source for burns and mints of one event.
pub fn event_source(event_id: EventId) -> String {
    format!("sh_event_{event_id}")
}

pub struct IssuanceEngine<S, T, F> {
    store: Arc<S>,
    clock: Arc<T>,
    fiscal: Arc<F>,
    config: IssuanceConfig,
}

impl<S: LedgerStore, T: TimeSource, F: FiscalStanding> IssuanceEngine<S, T, F> {
    pub fn new(store: Arc<S>, clock: Arc<T>, fiscal: Arc<F>, config: IssuanceConfig) -> Self {
        Self {
            store,
            clock,
            fiscal,
            config,
        }
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    /// Create an event. Caps and the fiscal flag default from configuration.
    pub fn create_event(
        &self,
        caller: &Caller,
        request: NewIssuanceEvent,
    ) -> Result<ShPurchaseEvent, LedgerError> {
        require_admin(caller, "create issuance events")?;

        let event_name = request.event_name.trim().to_string();
        if event_name.is_empty() {
            return Err(LedgerError::Validation {
                field: "event_name",
                reason: "cannot be empty".to_string(),
            });
        }
        if request.end_date <= request.start_date {
            return Err(LedgerError::Validation {
                field: "end_date",
                reason: "must be after start_date".to_string(),
            });
        }
        let priced = |p: Option<u64>| p.map_or(false, |v| v > 0);
        if !priced(request.rp_per_sh) && !priced(request.money_per_sh) {
            return Err(LedgerError::Validation {
                field: "pricing",
                reason: "rp_per_sh or money_per_sh must be positive".to_string(),
            });
        }
        let sh_cap_per_person = request
            .sh_cap_per_person
            .unwrap_or(self.config.default_sh_cap_per_person);
        let global_sh_cap = request
            .global_sh_cap
            .unwrap_or(self.config.default_global_sh_cap);
        if sh_cap_per_person == 0 || global_sh_cap == 0 {
            return Err(LedgerError::Validation {
                field: "caps",
                reason: "caps must be positive".to_string(),
            });
        }

        let now = self.clock.now();
        let event = ShPurchaseEvent {
            id: EventId::new(),
            event_name,
            cycle_id: request.cycle_id,
            start_date: request.start_date,
            end_date: request.end_date,
            rp_per_sh: request.rp_per_sh.filter(|v| *v > 0),
            money_per_sh: request.money_per_sh.filter(|v| *v > 0),
            sh_cap_per_person,
            global_sh_cap,
            sh_distributed: 0,
            status_override: None,
            fiscal_regularity_required: request
                .fiscal_regularity_required
                .unwrap_or(self.config.default_fiscal_regularity_required),
            metadata: request.metadata,
            created_by: caller.member_id.clone(),
            created_at: now,
            updated_at: now,
        };
        self.store
            .atomically(&LockScope::new().event(event.id), |uow| uow.put_event(event.clone()))?;

        info!(
            event_id = %event.id,
            event_name = %event.event_name,
            status = ?event.status_at(now),
            global_sh_cap,
            sh_cap_per_person,
            "[ledger/issuance] event created"
        );
        Ok(event)
    }

    /// Force an event's status regardless of its window.
    pub fn update_status(
        &self,
        caller: &Caller,
        event_id: EventId,
        status: EventStatus,
    ) -> Result<ShPurchaseEvent, LedgerError> {
        require_admin(caller, "update issuance events")?;
        let event = self.set_override(event_id, Some(status))?;
        info!(event_id = %event_id, status = ?status, "[ledger/issuance] status overridden");
        Ok(event)
    }

    /// Return an event to its time-derived status.
    pub fn clear_status_override(
        &self,
        caller: &Caller,
        event_id: EventId,
    ) -> Result<ShPurchaseEvent, LedgerError> {
        require_admin(caller, "update issuance events")?;
        let event = self.set_override(event_id, None)?;
        info!(event_id = %event_id, "[ledger/issuance] status override cleared");
        Ok(event)
    }

    fn set_override(
        &self,
        event_id: EventId,
        status: Option<EventStatus>,
    ) -> Result<ShPurchaseEvent, LedgerError> {
        let now = self.clock.now();
        self.store.atomically(&LockScope::new().event(event_id), |uow| {
            let mut event = load(uow, event_id)?;
            event.status_override = status;
            event.updated_at = now;
            uow.put_event(event.clone())?;
            Ok(event)
        })
    }

    // =========================================================================
    // PURCHASE
    // =========================================================================

    /// Burn RP for `sh_amount` SH.
    pub fn purchase(
        &self,
        member_id: &MemberId,
        event_id: EventId,
        sh_amount: u64,
    ) -> Result<PurchaseReceipt, LedgerError> {
        invariant_positive(sh_amount)?;

        // Cheap rejection before taking locks; re-checked below.
        let snapshot = self
            .store
            .event(event_id)?
            .ok_or_else(|| LedgerError::not_found(EntityKind::Event, event_id))?;
        ensure_active(&snapshot, self.clock.now())?;

        let scope = LockScope::new()
            .balance(member_id, Currency::Rp)
            .balance(member_id, Currency::Sh)
            .event(event_id);
        let receipt = self.store.atomically(&scope, |uow| {
            // The end date may pass while waiting on the event lock.
            let now = self.clock.now();
            let event = load(uow, event_id)?;
            ensure_active(&event, now)?;
            let rate = event
                .rp_per_sh
                .ok_or(LedgerError::UnsupportedPricing { event_id })?;
            if event.fiscal_regularity_required && !self.fiscal.is_regular(member_id) {
                return Err(LedgerError::forbidden(
                    member_id,
                    "purchase SH without fiscal regularity",
                ));
            }
            let rp_required = sh_amount
                .checked_mul(rate)
                .ok_or(LedgerError::Overflow { currency: Currency::Rp })?;

            let already = uow.purchased_in_event(member_id, event_id)?;
            invariant_within_cap(
                LimitKind::PerPersonIssuance,
                already,
                sh_amount,
                event.sh_cap_per_person,
            )?;
            invariant_within_cap(
                LimitKind::GlobalIssuance,
                event.sh_distributed,
                sh_amount,
                event.global_sh_cap,
            )?;
            let available = uow
                .balance(member_id, Currency::Rp)?
                .map_or(0, |b| b.available);
            invariant_sufficient(Currency::Rp, rp_required, available)?;

            let source = event_source(event_id);
            let mut metadata = Metadata::new();
            metadata.insert("eventId".to_string(), json!(event_id.to_string()));
            metadata.insert("shAmount".to_string(), json!(sh_amount));
            metadata.insert("rpSpent".to_string(), json!(rp_required));

            let rp = post_movement(
                uow,
                member_id,
                Movement::Rp(RpMovement::BurnForSh(rp_required)),
                &source,
                metadata.clone(),
                now,
            )?;
            invariant_rp_conserved(&rp)?;
            post_movement(
                uow,
                member_id,
                Movement::Sh(ShMovement::Mint(sh_amount)),
                &source,
                metadata,
                now,
            )?;
            let total_distributed = uow.increment_distributed(event_id, sh_amount)?;

            let transaction = ShPurchaseTransaction {
                id: PurchaseId::new(),
                member_id: member_id.clone(),
                event_id,
                sh_amount,
                rp_spent: rp_required,
                rate_used: rate,
                created_at: now,
            };
            uow.put_purchase(transaction.clone())?;

            let member_total = already + sh_amount;
            Ok(PurchaseReceipt {
                transaction,
                rp_spent: rp_required,
                total_distributed,
                remaining_global: event.global_sh_cap.saturating_sub(total_distributed),
                member_total,
                member_remaining: event.sh_cap_per_person.saturating_sub(member_total),
            })
        })?;

        info!(
            member_id = %member_id,
            event_id = %event_id,
            sh_amount,
            rp_spent = receipt.rp_spent,
            total_distributed = receipt.total_distributed,
            "[ledger/issuance] SH purchased"
        );
        Ok(receipt)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Progress of an event, with the member's share if one is given.
    pub fn event_status(
        &self,
        event_id: EventId,
        member_id: Option<&MemberId>,
    ) -> Result<EventStatusView, LedgerError> {
        let event = self
            .store
            .event(event_id)?
            .ok_or_else(|| LedgerError::not_found(EntityKind::Event, event_id))?;

        let purchased_by_member = match member_id {
            Some(m) => Some(
                self.store
                    .purchases(m, Some(event_id))?
                    .iter()
                    .map(|p| p.sh_amount)
                    .sum::<u64>(),
            ),
            None => None,
        };

        Ok(EventStatusView {
            status: event.status_at(self.clock.now()),
            distributed: event.sh_distributed,
            remaining_global: event.remaining_global(),
            global_cap: event.global_sh_cap,
            cap_per_person: event.sh_cap_per_person,
            purchased_by_member,
            remaining_for_member: purchased_by_member
                .map(|p| event.sh_cap_per_person.saturating_sub(p)),
        })
    }

    /// Events by start date, newest first.
    pub fn events(&self, active_only: bool) -> Result<Vec<ShPurchaseEvent>, LedgerError> {
        let now = self.clock.now();
        let mut events: Vec<ShPurchaseEvent> = self
            .store
            .events()?
            .into_iter()
            .filter(|e| !active_only || e.status_at(now) == EventStatus::Active)
            .collect();
        events.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        debug!(count = events.len(), active_only, "[ledger/issuance] events listed");
        Ok(events)
    }

    /// A member's purchases across all events, newest first.
    pub fn member_purchases(&self, member_id: &MemberId) -> Result<Vec<ShPurchaseTransaction>, LedgerError> {
        let mut purchases = self.store.purchases(member_id, None)?;
        purchases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(purchases)
    }
}

fn require_admin(caller: &Caller, action: &str) -> Result<(), LedgerError> {
    if caller.is_admin {
        Ok(())
    } else {
        Err(LedgerError::forbidden(&caller.member_id, action))
    }
}

fn ensure_active(event: &ShPurchaseEvent, now: Timestamp) -> Result<(), LedgerError> {
    match event.status_at(now) {
        EventStatus::Active => Ok(()),
        status => Err(LedgerError::EventNotActive {
            event_id: event.id,
            status,
        }),
    }
}

fn load(uow: &dyn UnitOfWork, event_id: EventId) -> Result<ShPurchaseEvent, LedgerError> {
    uow.event(event_id)?
        .ok_or_else(|| LedgerError::not_found(EntityKind::Event, event_id))
}
