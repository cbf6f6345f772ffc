//! # Inbound Port - LedgerApi
//!
//! Primary driving port exposing the points ledger.
//!
//! ## Authorization
//!
//! | Method | Allowed caller |
//! |--------|----------------|
//! | `confirm_transaction` | Provider of the transaction |
//! | `withdraw_timebank_service` | Owner of the offer, or an admin |
//! | `dispute_transaction` | Provider or receiver |
//! | `resolve_dispute` | Admin |
//! | `create_issuance_event`, `update_issuance_event_status`, `clear_status_override` | Admin |
//!
//! Every other method acts on the member it is given; authenticating that
//! member happens before the call reaches the ledger.

use async_trait::async_trait;
use shared_types::{
    AllocationTarget, Caller, Currency, EventId, MemberId, Metadata, Page, ServiceId,
    TransactionId,
};

use crate::domain::{
    Balance, BalanceView, ConversionReceipt, ConversionRecord, ConversionStatus, DisputeOutcome,
    EscrowFilter, EventStatus, EventStatusView, HistoryFilter, LedgerError, NewIssuanceEvent,
    NewTimebankService, PurchaseReceipt, ServiceRequest, ShPurchaseEvent, ShPurchaseTransaction,
    SpAllocation, TargetAllocations, TimebankService, TimebankTransaction, TransactionLogEntry,
};

/// Primary API of the points ledger.
///
/// All mutations are atomic: on `Err` no balance, log entry or record has
/// changed.
///
/// # Example
///
/// ```rust,ignore
/// use ledger_core::ports::LedgerApi;
///
/// async fn example(ledger: &impl LedgerApi, member: &MemberId) -> Result<(), LedgerError> {
///     ledger.earn_reward_points(member, 250, "contribution", Metadata::new()).await?;
///     let receipt = ledger.convert(member, 100).await?;
///     assert_eq!(receipt.record.tbc_received, 1);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait LedgerApi: Send + Sync {
    // =========================================================================
    // BALANCES & LOG
    // =========================================================================

    /// Current balance; zero if the member never held the currency.
    async fn get_balance(&self, member_id: &MemberId, currency: Currency)
        -> Result<BalanceView, LedgerError>;

    /// Paginated log entries, newest first.
    async fn get_transaction_history(
        &self,
        member_id: &MemberId,
        filter: HistoryFilter,
    ) -> Result<Page<TransactionLogEntry>, LedgerError>;

    /// Credit RP. The only way RP is created.
    async fn earn_reward_points(
        &self,
        member_id: &MemberId,
        amount: u64,
        source: &str,
        metadata: Metadata,
    ) -> Result<BalanceView, LedgerError>;

    /// Credit RP from the configured earning table.
    async fn award_contribution(
        &self,
        member_id: &MemberId,
        event_type: &str,
        source: &str,
    ) -> Result<BalanceView, LedgerError>;

    /// Check the stored balance against a replay of the log.
    ///
    /// # Errors
    /// - `Inconsistent`: stored and replayed balances differ
    async fn reconcile_balance(
        &self,
        member_id: &MemberId,
        currency: Currency,
    ) -> Result<Balance, LedgerError>;

    // =========================================================================
    // CONVERSION
    // =========================================================================

    /// Burn RP for TBC.
    ///
    /// # Errors
    /// - `InvalidAmount`: zero amount
    /// - `BelowMinimumUnit`: not a whole multiple of the rate
    /// - `LimitExceeded`: monthly cap; carries the remaining allowance
    /// - `InsufficientBalance`: carries the shortfall
    async fn convert(&self, member_id: &MemberId, rp_amount: u64)
        -> Result<ConversionReceipt, LedgerError>;

    async fn get_conversion_status(&self, member_id: &MemberId)
        -> Result<ConversionStatus, LedgerError>;

    async fn get_conversions(&self, member_id: &MemberId)
        -> Result<Vec<ConversionRecord>, LedgerError>;

    // =========================================================================
    // ALLOCATION
    // =========================================================================

    /// Pledge SP to a target.
    ///
    /// # Errors
    /// - `InvalidAmount`: outside the configured range
    /// - `DuplicateAllocation`: an active allocation already exists
    /// - `LimitExceeded`: too many active allocations
    /// - `InsufficientBalance`: not enough available SP
    async fn allocate(
        &self,
        member_id: &MemberId,
        target: &AllocationTarget,
        amount: u64,
    ) -> Result<SpAllocation, LedgerError>;

    /// Return an active allocation's SP.
    ///
    /// # Errors
    /// - `NotFound`: no active allocation on the target
    async fn reclaim(
        &self,
        member_id: &MemberId,
        target: &AllocationTarget,
    ) -> Result<SpAllocation, LedgerError>;

    /// Active allocations, newest first.
    async fn get_allocations(&self, member_id: &MemberId) -> Result<Vec<SpAllocation>, LedgerError>;

    async fn get_target_allocations(
        &self,
        target: &AllocationTarget,
    ) -> Result<TargetAllocations, LedgerError>;

    /// One-time SP grant for a new member.
    async fn initialize_member(&self, member_id: &MemberId) -> Result<BalanceView, LedgerError>;

    async fn award_support_points(
        &self,
        member_id: &MemberId,
        amount: u64,
        reason: &str,
    ) -> Result<BalanceView, LedgerError>;

    /// Credit SP from the configured activity weights.
    async fn award_for_activity(
        &self,
        member_id: &MemberId,
        activity: &str,
    ) -> Result<BalanceView, LedgerError>;

    // =========================================================================
    // ESCROW
    // =========================================================================

    /// Reserve the receiver's TBC and open a pending transaction.
    ///
    /// # Errors
    /// - `Validation`: same party, zero cost, blank description, or a named
    ///   service offered by someone other than the provider
    /// - `NotFound`: named service does not exist
    /// - `InvalidState`: named service was withdrawn
    /// - `InsufficientBalance`: receiver cannot cover the cost
    async fn request_service(
        &self,
        receiver_id: &MemberId,
        provider_id: &MemberId,
        request: ServiceRequest,
    ) -> Result<TimebankTransaction, LedgerError>;

    /// Pay the provider.
    ///
    /// # Errors
    /// - `Forbidden`: caller is not the provider
    /// - `AlreadyConfirmed`: confirmed earlier
    /// - `InvalidState`: disputed or resolved
    async fn confirm_transaction(
        &self,
        transaction_id: TransactionId,
        caller: &Caller,
    ) -> Result<TimebankTransaction, LedgerError>;

    async fn dispute_transaction(
        &self,
        transaction_id: TransactionId,
        caller: &Caller,
        reason: &str,
    ) -> Result<TimebankTransaction, LedgerError>;

    /// Settle a dispute with an explicit outcome.
    async fn resolve_dispute(
        &self,
        transaction_id: TransactionId,
        caller: &Caller,
        outcome: DisputeOutcome,
        note: Option<String>,
    ) -> Result<TimebankTransaction, LedgerError>;

    async fn get_transaction(&self, transaction_id: TransactionId)
        -> Result<TimebankTransaction, LedgerError>;

    async fn get_member_transactions(
        &self,
        member_id: &MemberId,
        filter: EscrowFilter,
    ) -> Result<Page<TimebankTransaction>, LedgerError>;

    /// List a standing service offer by `member_id`.
    async fn offer_timebank_service(
        &self,
        member_id: &MemberId,
        offer: NewTimebankService,
    ) -> Result<TimebankService, LedgerError>;

    async fn withdraw_timebank_service(
        &self,
        service_id: ServiceId,
        caller: &Caller,
    ) -> Result<TimebankService, LedgerError>;

    /// Active offers for a city (offers without a city match every city).
    async fn get_timebank_services(&self, city_id: Option<&str>)
        -> Result<Vec<TimebankService>, LedgerError>;

    // =========================================================================
    // ISSUANCE
    // =========================================================================

    async fn create_issuance_event(
        &self,
        caller: &Caller,
        request: NewIssuanceEvent,
    ) -> Result<ShPurchaseEvent, LedgerError>;

    async fn update_issuance_event_status(
        &self,
        caller: &Caller,
        event_id: EventId,
        status: EventStatus,
    ) -> Result<ShPurchaseEvent, LedgerError>;

    async fn clear_status_override(
        &self,
        caller: &Caller,
        event_id: EventId,
    ) -> Result<ShPurchaseEvent, LedgerError>;

    /// Burn RP for SH.
    ///
    /// # Errors
    /// - `EventNotActive`: outside the window or closed by override
    /// - `UnsupportedPricing`: event has no RP price
    /// - `Forbidden`: fiscal regularity required and not met
    /// - `LimitExceeded`: per-person or global cap
    /// - `InsufficientBalance`: not enough RP
    async fn purchase(
        &self,
        member_id: &MemberId,
        event_id: EventId,
        sh_amount: u64,
    ) -> Result<PurchaseReceipt, LedgerError>;

    async fn get_event_status(
        &self,
        event_id: EventId,
        member_id: Option<&MemberId>,
    ) -> Result<EventStatusView, LedgerError>;

    async fn list_issuance_events(&self, active_only: bool)
        -> Result<Vec<ShPurchaseEvent>, LedgerError>;

    async fn get_member_purchases(
        &self,
        member_id: &MemberId,
    ) -> Result<Vec<ShPurchaseTransaction>, LedgerError>;
}
