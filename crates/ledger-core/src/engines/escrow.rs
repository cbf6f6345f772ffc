//! # Timebank Escrow
//!
//! Service exchanges paid in TBC. The receiver's TBC is reserved when the
//! request is made; the provider is paid only on confirmation.
//!
//! ```text
//! [pending] ──confirm──→ [confirmed]
//!     │
//!     └──dispute──→ [disputed] ──resolve──→ [resolved]
//!                                   ├─ refund_receiver: TBC back to receiver
//!                                   └─ pay_provider:    TBC to provider
//! ```
//!
//! Party ids never change after creation, so the engine reads them from a
//! snapshot to build the lock scope and then re-reads the transaction under
//! its locks before deciding anything.
//!
//! Members may also list standing service offers. A request that names an
//! offer is checked against it under the offer's lock: the offer must exist,
//! be active and belong to the provider.

use serde_json::json;
use shared_types::{Caller, Currency, MemberId, Metadata, Page, ServiceId, TransactionId};
use std::sync::Arc;
use tracing::{debug, info};

use super::balance_store::post_movement;
use crate::domain::{
    invariant_distinct_parties, invariant_positive, invariant_sufficient, DisputeOutcome,
    EntityKind, EscrowFilter, EscrowRole, EscrowStatus, HistoryConfig, LedgerError, Movement,
    NewTimebankService, ServiceRequest, TbcMovement, TimebankService, TimebankTransaction,
    SOURCE_ESCROW_REFUND,
};
use crate::ports::outbound::{LedgerStore, LockScope, TimeSource, UnitOfWork};

/// Log source of the receiver's reservation.
pub const SOURCE_ESCROW_RESERVE: &str = "escrow_reserve";
/// Log source of the provider's payout.
pub const SOURCE_ESCROW_PAYOUT: &str = "escrow_payout";

pub struct EscrowEngine<S, T> {
    store: Arc<S>,
    clock: Arc<T>,
    history: HistoryConfig,
}

impl<S: LedgerStore, T: TimeSource> EscrowEngine<S, T> {
    pub fn new(store: Arc<S>, clock: Arc<T>, history: HistoryConfig) -> Self {
        Self {
            store,
            clock,
            history,
        }
    }

    /// Open a pending transaction and reserve the receiver's TBC.
    pub fn request_service(
        &self,
        receiver_id: &MemberId,
        provider_id: &MemberId,
        request: ServiceRequest,
    ) -> Result<TimebankTransaction, LedgerError> {
        invariant_distinct_parties(receiver_id, provider_id)?;
        invariant_positive(request.tbc_cost)?;
        if request.description.trim().is_empty() {
            return Err(LedgerError::Validation {
                field: "description",
                reason: "cannot be empty".to_string(),
            });
        }

        let now = self.clock.now();
        let id = TransactionId::new();
        let mut scope = LockScope::new()
            .balance(receiver_id, Currency::Tbc)
            .escrow(id);
        if let Some(service_id) = request.service_id {
            scope = scope.service(service_id);
        }

        let transaction = self.store.atomically(&scope, |uow| {
            if let Some(service_id) = request.service_id {
                let offer = load_service(uow, service_id)?;
                if !offer.active {
                    return Err(inactive(service_id, "request it"));
                }
                if &offer.member_id != provider_id {
                    return Err(LedgerError::Validation {
                        field: "service_id",
                        reason: format!("service {service_id} is not offered by {provider_id}"),
                    });
                }
            }
            let available = uow
                .balance(receiver_id, Currency::Tbc)?
                .map_or(0, |b| b.available);
            invariant_sufficient(Currency::Tbc, request.tbc_cost, available)?;

            let transaction = TimebankTransaction {
                id,
                provider_id: provider_id.clone(),
                receiver_id: receiver_id.clone(),
                service_id: request.service_id,
                description: request.description,
                tbc_cost: request.tbc_cost,
                hourly_rate: request.hourly_rate,
                hours_provided: request.hours_provided,
                status: EscrowStatus::Pending,
                outcome: None,
                dispute_reason: None,
                resolution_note: None,
                metadata: request.metadata,
                created_at: now,
                updated_at: now,
                confirmed_at: None,
                disputed_at: None,
                resolved_at: None,
            };
            post_movement(
                uow,
                receiver_id,
                Movement::Tbc(TbcMovement::Reserve(transaction.tbc_cost)),
                SOURCE_ESCROW_RESERVE,
                escrow_metadata(&transaction),
                now,
            )?;
            uow.put_escrow(transaction.clone())?;
            Ok(transaction)
        })?;

        info!(
            transaction_id = %transaction.id,
            receiver_id = %receiver_id,
            provider_id = %provider_id,
            tbc_cost = transaction.tbc_cost,
            "[ledger/escrow] service requested, TBC reserved"
        );
        Ok(transaction)
    }

    /// Pay the provider. Only the provider may confirm; administrators settle
    /// through [`EscrowEngine::resolve`].
    pub fn confirm(&self, id: TransactionId, caller: &Caller) -> Result<TimebankTransaction, LedgerError> {
        let parties = self.parties(id)?;
        if caller.member_id != parties.provider_id {
            return Err(LedgerError::forbidden(&caller.member_id, "confirm this transaction"));
        }

        let now = self.clock.now();
        let scope = LockScope::new()
            .balance(&parties.provider_id, Currency::Tbc)
            .escrow(id);
        let transaction = self.store.atomically(&scope, |uow| {
            let mut transaction = load(uow, id)?;
            if transaction.status == EscrowStatus::Confirmed {
                return Err(LedgerError::AlreadyConfirmed { transaction_id: id });
            }
            transaction.transition_to(EscrowStatus::Confirmed, now)?;
            post_movement(
                uow,
                &transaction.provider_id,
                Movement::Tbc(TbcMovement::Payout(transaction.tbc_cost)),
                SOURCE_ESCROW_PAYOUT,
                escrow_metadata(&transaction),
                now,
            )?;
            uow.put_escrow(transaction.clone())?;
            Ok(transaction)
        })?;

        info!(
            transaction_id = %id,
            provider_id = %transaction.provider_id,
            tbc_cost = transaction.tbc_cost,
            confirmed_by = %caller.member_id,
            "[ledger/escrow] transaction confirmed"
        );
        Ok(transaction)
    }

    /// Flag a pending transaction for administrator review.
    pub fn dispute(
        &self,
        id: TransactionId,
        caller: &Caller,
        reason: &str,
    ) -> Result<TimebankTransaction, LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::Validation {
                field: "reason",
                reason: "cannot be empty".to_string(),
            });
        }
        let parties = self.parties(id)?;
        if !parties.is_party(&caller.member_id) {
            return Err(LedgerError::forbidden(&caller.member_id, "dispute this transaction"));
        }

        let now = self.clock.now();
        let scope = LockScope::new().escrow(id);
        let transaction = self.store.atomically(&scope, |uow| {
            let mut transaction = load(uow, id)?;
            transaction.transition_to(EscrowStatus::Disputed, now)?;
            transaction.dispute_reason = Some(reason.to_string());
            uow.put_escrow(transaction.clone())?;
            Ok(transaction)
        })?;

        info!(
            transaction_id = %id,
            disputed_by = %caller.member_id,
            "[ledger/escrow] transaction disputed"
        );
        Ok(transaction)
    }

    /// Settle a disputed transaction with an explicit outcome. Administrators only.
    pub fn resolve(
        &self,
        id: TransactionId,
        caller: &Caller,
        outcome: DisputeOutcome,
        note: Option<String>,
    ) -> Result<TimebankTransaction, LedgerError> {
        if !caller.is_admin {
            return Err(LedgerError::forbidden(&caller.member_id, "resolve disputes"));
        }
        let parties = self.parties(id)?;
        let (payee, movement, source) = match outcome {
            DisputeOutcome::RefundReceiver => (
                parties.receiver_id.clone(),
                TbcMovement::Refund(parties.tbc_cost),
                SOURCE_ESCROW_REFUND,
            ),
            DisputeOutcome::PayProvider => (
                parties.provider_id.clone(),
                TbcMovement::Payout(parties.tbc_cost),
                SOURCE_ESCROW_PAYOUT,
            ),
        };

        let now = self.clock.now();
        let scope = LockScope::new().balance(&payee, Currency::Tbc).escrow(id);
        let transaction = self.store.atomically(&scope, |uow| {
            let mut transaction = load(uow, id)?;
            transaction.transition_to(EscrowStatus::Resolved, now)?;
            transaction.outcome = Some(outcome);
            transaction.resolution_note = note;

            let mut metadata = escrow_metadata(&transaction);
            metadata.insert("outcome".to_string(), json!(outcome));
            post_movement(uow, &payee, Movement::Tbc(movement), source, metadata, now)?;
            uow.put_escrow(transaction.clone())?;
            Ok(transaction)
        })?;

        info!(
            transaction_id = %id,
            outcome = ?outcome,
            payee = %payee,
            resolved_by = %caller.member_id,
            "[ledger/escrow] dispute resolved"
        );
        Ok(transaction)
    }

    // =========================================================================
    // SERVICE CATALOG
    // =========================================================================

    /// List a standing offer by `member_id`.
    pub fn offer_service(
        &self,
        member_id: &MemberId,
        offer: NewTimebankService,
    ) -> Result<TimebankService, LedgerError> {
        invariant_positive(offer.tbc_per_hour)?;
        for (field, value) in [("service_type", &offer.service_type), ("title", &offer.title)] {
            if value.trim().is_empty() {
                return Err(LedgerError::Validation {
                    field,
                    reason: "cannot be empty".to_string(),
                });
            }
        }

        let now = self.clock.now();
        let service = TimebankService {
            id: ServiceId::new(),
            member_id: member_id.clone(),
            service_type: offer.service_type.trim().to_string(),
            title: offer.title.trim().to_string(),
            description: offer.description,
            tbc_per_hour: offer.tbc_per_hour,
            availability: offer.availability,
            location_preference: offer.location_preference,
            city_id: offer.city_id,
            active: true,
            created_at: now,
            updated_at: now,
        };
        let scope = LockScope::new().service(service.id);
        self.store.atomically(&scope, |uow| uow.put_timebank_service(service.clone()))?;

        info!(
            service_id = %service.id,
            member_id = %member_id,
            service_type = %service.service_type,
            tbc_per_hour = service.tbc_per_hour,
            "[ledger/escrow] service offered"
        );
        Ok(service)
    }

    /// Withdraw an offer. Only its owner or an administrator may do so.
    pub fn withdraw_service(&self, id: ServiceId, caller: &Caller) -> Result<TimebankService, LedgerError> {
        let now = self.clock.now();
        let scope = LockScope::new().service(id);
        let service = self.store.atomically(&scope, |uow| {
            let mut service = load_service(uow, id)?;
            if !caller.is_admin && caller.member_id != service.member_id {
                return Err(LedgerError::forbidden(&caller.member_id, "withdraw this service"));
            }
            if !service.active {
                return Err(inactive(id, "withdraw it"));
            }
            service.active = false;
            service.updated_at = now;
            uow.put_timebank_service(service.clone())?;
            Ok(service)
        })?;

        info!(
            service_id = %id,
            withdrawn_by = %caller.member_id,
            "[ledger/escrow] service withdrawn"
        );
        Ok(service)
    }

    /// Active offers listed for `city_id` (or everywhere), newest first.
    pub fn services(&self, city_id: Option<&str>) -> Result<Vec<TimebankService>, LedgerError> {
        let mut services: Vec<TimebankService> = self
            .store
            .timebank_services()?
            .into_iter()
            .filter(|s| s.listed_in(city_id))
            .collect();
        services.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        debug!(count = services.len(), city_id, "[ledger/escrow] services listed");
        Ok(services)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn transaction(&self, id: TransactionId) -> Result<TimebankTransaction, LedgerError> {
        self.parties(id)
    }

    /// A member's transactions, newest first.
    pub fn member_transactions(
        &self,
        member_id: &MemberId,
        filter: &EscrowFilter,
    ) -> Result<Page<TimebankTransaction>, LedgerError> {
        let request = filter
            .page
            .clamp(self.history.default_page_size, self.history.max_page_size);
        let mut transactions: Vec<TimebankTransaction> = self
            .store
            .escrows_for_member(member_id)?
            .into_iter()
            .filter(|t| match filter.role {
                EscrowRole::Provider => &t.provider_id == member_id,
                EscrowRole::Receiver => &t.receiver_id == member_id,
                EscrowRole::Any => true,
            })
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        debug!(
            member_id = %member_id,
            matched = transactions.len(),
            "[ledger/escrow] member transactions query"
        );
        Ok(Page::from_ordered(transactions, request))
    }

    fn parties(&self, id: TransactionId) -> Result<TimebankTransaction, LedgerError> {
        self.store
            .escrow(id)?
            .ok_or_else(|| LedgerError::not_found(EntityKind::Transaction, id))
    }
}

fn load(uow: &dyn UnitOfWork, id: TransactionId) -> Result<TimebankTransaction, LedgerError> {
    uow.escrow(id)?
        .ok_or_else(|| LedgerError::not_found(EntityKind::Transaction, id))
}

fn load_service(uow: &dyn UnitOfWork, id: ServiceId) -> Result<TimebankService, LedgerError> {
    uow.timebank_service(id)?
        .ok_or_else(|| LedgerError::not_found(EntityKind::Service, id))
}

fn inactive(id: ServiceId, attempted: &str) -> LedgerError {
    LedgerError::InvalidState {
        entity: EntityKind::Service,
        id: id.to_string(),
        current: "inactive".to_string(),
        attempted: attempted.to_string(),
    }
}

fn escrow_metadata(transaction: &TimebankTransaction) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("transactionId".to_string(), json!(transaction.id.to_string()));
    metadata.insert("providerId".to_string(), json!(transaction.provider_id.as_str()));
    metadata.insert("receiverId".to_string(), json!(transaction.receiver_id.as_str()));
    if let Some(service_id) = transaction.service_id {
        metadata.insert("serviceId".to_string(), json!(service_id.to_string()));
    }
    metadata
}
