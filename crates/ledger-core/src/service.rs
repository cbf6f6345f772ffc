//! # Ledger Service
//!
//! The main service implementing [`LedgerApi`].
//!
//! ## Architecture
//!
//! This service:
//! 1. Owns one instance of each engine, all sharing the same store and clock
//! 2. Receives its configuration, store, clock and fiscal standing lookup
//!    explicitly; there is no global state
//! 3. Records an outcome metric and a duration for every operation
//! 4. Logs rejections with their error kind

use async_trait::async_trait;
use ledger_telemetry::{log_ledger_event, record_operation, record_points, record_rp_burn, OperationTimer};
use shared_types::{
    AllocationTarget, Caller, Currency, EventId, MemberId, Metadata, Page, ServiceId,
    TransactionId,
};
use std::sync::Arc;

use crate::domain::{
    Balance, BalanceView, ConversionReceipt, ConversionRecord, ConversionStatus, DisputeOutcome,
    ErrorKind, EscrowFilter, EventStatus, EventStatusView, HistoryFilter, LedgerConfig,
    LedgerError, NewIssuanceEvent, NewTimebankService, PurchaseReceipt, ServiceRequest,
    ShPurchaseEvent, ShPurchaseTransaction, SpAllocation, TargetAllocations, TimebankService,
    TimebankTransaction, TransactionLogEntry,
};
use crate::engines::{
    AllocationEngine, BalanceStore, ConversionEngine, EscrowEngine, IssuanceEngine,
    TransactionLog,
};
use crate::ports::inbound::LedgerApi;
use crate::ports::outbound::{AssumeRegular, FiscalStanding, LedgerStore, TimeSource};

/// The points ledger.
///
/// Generic over its storage, clock and fiscal standing lookup so tests can
/// inject in-memory and mock implementations.
pub struct LedgerService<S, T, F = AssumeRegular> {
    store: Arc<S>,
    config: LedgerConfig,
    balances: BalanceStore<S, T>,
    log: TransactionLog<S>,
    conversion: ConversionEngine<S, T>,
    allocation: AllocationEngine<S, T>,
    escrow: EscrowEngine<S, T>,
    issuance: IssuanceEngine<S, T, F>,
}

impl<S: LedgerStore, T: TimeSource> LedgerService<S, T, AssumeRegular> {
    /// Build a ledger that treats every member as fiscally regular.
    ///
    /// `config` is used as given; load it through
    /// [`TomlConfigProvider`](crate::adapters::TomlConfigProvider) or call
    /// [`LedgerConfig::validate`] first.
    pub fn new(store: Arc<S>, clock: Arc<T>, config: LedgerConfig) -> Self {
        Self::with_fiscal_standing(store, clock, Arc::new(AssumeRegular), config)
    }
}

impl<S: LedgerStore, T: TimeSource, F: FiscalStanding> LedgerService<S, T, F> {
    pub fn with_fiscal_standing(
        store: Arc<S>,
        clock: Arc<T>,
        fiscal: Arc<F>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            balances: BalanceStore::new(store.clone(), clock.clone(), config.rewards.clone()),
            log: TransactionLog::new(store.clone(), config.history.clone()),
            conversion: ConversionEngine::new(store.clone(), clock.clone(), config.conversion.clone()),
            allocation: AllocationEngine::new(
                store.clone(),
                clock.clone(),
                config.allocation.clone(),
                config.rewards.clone(),
            ),
            escrow: EscrowEngine::new(store.clone(), clock.clone(), config.history.clone()),
            issuance: IssuanceEngine::new(store.clone(), clock, fiscal, config.issuance.clone()),
            store,
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn transaction_log(&self) -> &TransactionLog<S> {
        &self.log
    }
}

/// Record the outcome of `operation` and log rejections.
fn observe<R>(operation: &'static str, result: Result<R, LedgerError>) -> Result<R, LedgerError> {
    match &result {
        Ok(_) => record_operation(operation, "ok"),
        Err(err) => {
            let kind = err.kind();
            record_operation(operation, kind.as_str());
            if kind == ErrorKind::Internal {
                log_ledger_event!(error, "ledger", "operation failed", operation, error = %err);
            } else {
                log_ledger_event!(debug, "ledger", "operation rejected", operation, kind = kind.as_str(), error = %err);
            }
        }
    }
    result
}

#[async_trait]
impl<S, T, F> LedgerApi for LedgerService<S, T, F>
where
    S: LedgerStore + 'static,
    T: TimeSource + 'static,
    F: FiscalStanding + 'static,
{
    // =========================================================================
    // BALANCES & LOG
    // =========================================================================

    async fn get_balance(&self, member_id: &MemberId, currency: Currency) -> Result<BalanceView, LedgerError> {
        observe(
            "get_balance",
            self.balances.get_balance(member_id, currency).map(|b| b.view()),
        )
    }

    async fn get_transaction_history(
        &self,
        member_id: &MemberId,
        filter: HistoryFilter,
    ) -> Result<Page<TransactionLogEntry>, LedgerError> {
        observe("get_transaction_history", self.log.history(member_id, &filter))
    }

    async fn earn_reward_points(
        &self,
        member_id: &MemberId,
        amount: u64,
        source: &str,
        metadata: Metadata,
    ) -> Result<BalanceView, LedgerError> {
        let _timer = OperationTimer::start("earn_reward_points");
        let result = self
            .balances
            .earn_reward_points(member_id, amount, source, metadata);
        if result.is_ok() {
            record_points(Currency::Rp.code(), true, amount);
        }
        observe("earn_reward_points", result.map(|b| b.view()))
    }

    async fn award_contribution(
        &self,
        member_id: &MemberId,
        event_type: &str,
        source: &str,
    ) -> Result<BalanceView, LedgerError> {
        let _timer = OperationTimer::start("award_contribution");
        let result = self.balances.award_contribution(member_id, event_type, source);
        if result.is_ok() {
            let amount = self.config.rewards.rp_earnings.get(event_type).copied().unwrap_or_default();
            record_points(Currency::Rp.code(), true, amount);
        }
        observe("award_contribution", result.map(|b| b.view()))
    }

    async fn reconcile_balance(&self, member_id: &MemberId, currency: Currency) -> Result<Balance, LedgerError> {
        observe("reconcile_balance", self.balances.reconcile(member_id, currency))
    }

    // =========================================================================
    // CONVERSION
    // =========================================================================

    async fn convert(&self, member_id: &MemberId, rp_amount: u64) -> Result<ConversionReceipt, LedgerError> {
        let _timer = OperationTimer::start("convert");
        let result = self.conversion.convert(member_id, rp_amount);
        if let Ok(receipt) = &result {
            record_rp_burn("tbc", receipt.record.rp_spent);
            record_points(Currency::Rp.code(), false, receipt.record.rp_spent);
            record_points(Currency::Tbc.code(), true, receipt.record.tbc_received);
        }
        observe("convert", result)
    }

    async fn get_conversion_status(&self, member_id: &MemberId) -> Result<ConversionStatus, LedgerError> {
        observe("get_conversion_status", self.conversion.status(member_id))
    }

    async fn get_conversions(&self, member_id: &MemberId) -> Result<Vec<ConversionRecord>, LedgerError> {
        observe("get_conversions", self.conversion.conversions(member_id))
    }

    // =========================================================================
    // ALLOCATION
    // =========================================================================

    async fn allocate(
        &self,
        member_id: &MemberId,
        target: &AllocationTarget,
        amount: u64,
    ) -> Result<SpAllocation, LedgerError> {
        let _timer = OperationTimer::start("allocate");
        observe("allocate", self.allocation.allocate(member_id, target, amount))
    }

    async fn reclaim(&self, member_id: &MemberId, target: &AllocationTarget) -> Result<SpAllocation, LedgerError> {
        let _timer = OperationTimer::start("reclaim");
        observe("reclaim", self.allocation.reclaim(member_id, target))
    }

    async fn get_allocations(&self, member_id: &MemberId) -> Result<Vec<SpAllocation>, LedgerError> {
        observe("get_allocations", self.allocation.allocations(member_id))
    }

    async fn get_target_allocations(&self, target: &AllocationTarget) -> Result<TargetAllocations, LedgerError> {
        observe("get_target_allocations", self.allocation.target_allocations(target))
    }

    async fn initialize_member(&self, member_id: &MemberId) -> Result<BalanceView, LedgerError> {
        observe(
            "initialize_member",
            self.allocation.initialize_member(member_id).map(|b| b.view()),
        )
    }

    async fn award_support_points(
        &self,
        member_id: &MemberId,
        amount: u64,
        reason: &str,
    ) -> Result<BalanceView, LedgerError> {
        let result = self.allocation.award_support_points(member_id, amount, reason);
        if result.is_ok() {
            record_points(Currency::Sp.code(), true, amount);
        }
        observe("award_support_points", result.map(|b| b.view()))
    }

    async fn award_for_activity(&self, member_id: &MemberId, activity: &str) -> Result<BalanceView, LedgerError> {
        observe(
            "award_for_activity",
            self.allocation.award_for_activity(member_id, activity).map(|b| b.view()),
        )
    }

    // =========================================================================
    // ESCROW
    // =========================================================================

    async fn request_service(
        &self,
        receiver_id: &MemberId,
        provider_id: &MemberId,
        request: ServiceRequest,
    ) -> Result<TimebankTransaction, LedgerError> {
        let _timer = OperationTimer::start("request_service");
        let result = self.escrow.request_service(receiver_id, provider_id, request);
        if let Ok(tx) = &result {
            record_points(Currency::Tbc.code(), false, tx.tbc_cost);
        }
        observe("request_service", result)
    }

    async fn confirm_transaction(
        &self,
        transaction_id: TransactionId,
        caller: &Caller,
    ) -> Result<TimebankTransaction, LedgerError> {
        let _timer = OperationTimer::start("confirm_transaction");
        let result = self.escrow.confirm(transaction_id, caller);
        if let Ok(tx) = &result {
            record_points(Currency::Tbc.code(), true, tx.tbc_cost);
        }
        observe("confirm_transaction", result)
    }

    async fn dispute_transaction(
        &self,
        transaction_id: TransactionId,
        caller: &Caller,
        reason: &str,
    ) -> Result<TimebankTransaction, LedgerError> {
        observe(
            "dispute_transaction",
            self.escrow.dispute(transaction_id, caller, reason),
        )
    }

    async fn resolve_dispute(
        &self,
        transaction_id: TransactionId,
        caller: &Caller,
        outcome: DisputeOutcome,
        note: Option<String>,
    ) -> Result<TimebankTransaction, LedgerError> {
        let _timer = OperationTimer::start("resolve_dispute");
        let result = self.escrow.resolve(transaction_id, caller, outcome, note);
        if let Ok(tx) = &result {
            record_points(Currency::Tbc.code(), true, tx.tbc_cost);
        }
        observe("resolve_dispute", result)
    }

    async fn get_transaction(&self, transaction_id: TransactionId) -> Result<TimebankTransaction, LedgerError> {
        observe("get_transaction", self.escrow.transaction(transaction_id))
    }

    async fn get_member_transactions(
        &self,
        member_id: &MemberId,
        filter: EscrowFilter,
    ) -> Result<Page<TimebankTransaction>, LedgerError> {
        observe(
            "get_member_transactions",
            self.escrow.member_transactions(member_id, &filter),
        )
    }

    async fn offer_timebank_service(
        &self,
        member_id: &MemberId,
        offer: NewTimebankService,
    ) -> Result<TimebankService, LedgerError> {
        observe("offer_timebank_service", self.escrow.offer_service(member_id, offer))
    }

    async fn withdraw_timebank_service(
        &self,
        service_id: ServiceId,
        caller: &Caller,
    ) -> Result<TimebankService, LedgerError> {
        observe("withdraw_timebank_service", self.escrow.withdraw_service(service_id, caller))
    }

    async fn get_timebank_services(&self, city_id: Option<&str>) -> Result<Vec<TimebankService>, LedgerError> {
        observe("get_timebank_services", self.escrow.services(city_id))
    }

    // =========================================================================
    // ISSUANCE
    // =========================================================================

    async fn create_issuance_event(
        &self,
        caller: &Caller,
        request: NewIssuanceEvent,
    ) -> Result<ShPurchaseEvent, LedgerError> {
        observe("create_issuance_event", self.issuance.create_event(caller, request))
    }

    async fn update_issuance_event_status(
        &self,
        caller: &Caller,
        event_id: EventId,
        status: EventStatus,
    ) -> Result<ShPurchaseEvent, LedgerError> {
        observe(
            "update_issuance_event_status",
            self.issuance.update_status(caller, event_id, status),
        )
    }

    async fn clear_status_override(&self, caller: &Caller, event_id: EventId) -> Result<ShPurchaseEvent, LedgerError> {
        observe(
            "clear_status_override",
            self.issuance.clear_status_override(caller, event_id),
        )
    }

    async fn purchase(
        &self,
        member_id: &MemberId,
        event_id: EventId,
        sh_amount: u64,
    ) -> Result<PurchaseReceipt, LedgerError> {
        let _timer = OperationTimer::start("purchase");
        let result = self.issuance.purchase(member_id, event_id, sh_amount);
        if let Ok(receipt) = &result {
            record_rp_burn("sh", receipt.rp_spent);
            record_points(Currency::Rp.code(), false, receipt.rp_spent);
            record_points(Currency::Sh.code(), true, sh_amount);
        }
        observe("purchase", result)
    }

    async fn get_event_status(
        &self,
        event_id: EventId,
        member_id: Option<&MemberId>,
    ) -> Result<EventStatusView, LedgerError> {
        observe("get_event_status", self.issuance.event_status(event_id, member_id))
    }

    async fn list_issuance_events(&self, active_only: bool) -> Result<Vec<ShPurchaseEvent>, LedgerError> {
        observe("list_issuance_events", self.issuance.events(active_only))
    }

    async fn get_member_purchases(&self, member_id: &MemberId) -> Result<Vec<ShPurchaseTransaction>, LedgerError> {
        observe("get_member_purchases", self.issuance.member_purchases(member_id))
    }
}
