//! Domain entities for the ledger core.

use serde::{Deserialize, Serialize};
use shared_types::{
    AllocationId, AllocationTarget, ConversionId, Currency, EntryId, EventId, MemberId, Metadata,
    MonthKey, PurchaseId, ServiceId, Timestamp, TransactionId,
};

use super::balance::Movement;
use super::errors::{EntityKind, LedgerError};
use super::value_objects::{
    AllocationStatus, DisputeOutcome, EntryType, EscrowStatus, EventStatus, LocationPreference,
};

// =============================================================================
// TRANSACTION LOG
// =============================================================================

/// Immutable record of one balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    pub id: EntryId,
    /// Commit order; assigned by the store, zero until committed.
    pub sequence: u64,
    pub member_id: MemberId,
    pub currency: Currency,
    pub entry_type: EntryType,
    /// Signed change to `available`.
    pub amount: i64,
    /// Provenance tag (`conversion`, `sh_event_<id>`, `contribution`, ...).
    pub source: String,
    pub metadata: Metadata,
    pub created_at: Timestamp,
}

impl TransactionLogEntry {
    /// Build the entry recording `movement` for `member_id`.
    pub fn for_movement(
        member_id: &MemberId,
        movement: &Movement,
        source: &str,
        metadata: Metadata,
        now: Timestamp,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            id: EntryId::new(),
            sequence: 0,
            member_id: member_id.clone(),
            currency: movement.currency(),
            entry_type: movement.entry_type(),
            amount: movement.signed_amount()?,
            source: source.to_string(),
            metadata,
            created_at: now,
        })
    }

    /// Movement this entry was written for.
    pub fn movement(&self) -> Option<Movement> {
        Movement::from_logged(self.currency, self.entry_type, self.amount, &self.source)
    }

    /// Unsigned magnitude.
    pub fn magnitude(&self) -> u64 {
        self.amount.unsigned_abs()
    }
}

// =============================================================================
// SUPPORT POINTS
// =============================================================================

/// Support points pledged by a member to a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpAllocation {
    pub id: AllocationId,
    pub member_id: MemberId,
    pub target: AllocationTarget,
    pub amount: u64,
    pub status: AllocationStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub reclaimed_at: Option<Timestamp>,
}

impl SpAllocation {
    pub fn new(member_id: MemberId, target: AllocationTarget, amount: u64, now: Timestamp) -> Self {
        Self {
            id: AllocationId::new(),
            member_id,
            target,
            amount,
            status: AllocationStatus::Active,
            created_at: now,
            updated_at: now,
            reclaimed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AllocationStatus::Active
    }

    /// Mark reclaimed. Fails if already reclaimed.
    pub fn reclaim(&mut self, now: Timestamp) -> Result<(), LedgerError> {
        if !self.is_active() {
            return Err(LedgerError::not_found(EntityKind::Allocation, &self.target));
        }
        self.status = AllocationStatus::Reclaimed;
        self.reclaimed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

/// One RP to TBC conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub id: ConversionId,
    pub member_id: MemberId,
    pub rp_spent: u64,
    pub tbc_received: u64,
    pub conversion_month: MonthKey,
    /// RP per TBC at the time of conversion.
    pub rate_used: u64,
    pub created_at: Timestamp,
}

// =============================================================================
// ESCROW
// =============================================================================

/// TBC-denominated service exchange between a receiver and a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimebankTransaction {
    pub id: TransactionId,
    pub provider_id: MemberId,
    pub receiver_id: MemberId,
    pub service_id: Option<ServiceId>,
    pub description: String,
    pub tbc_cost: u64,
    pub hourly_rate: Option<u64>,
    pub hours_provided: Option<u32>,
    pub status: EscrowStatus,
    pub outcome: Option<DisputeOutcome>,
    pub dispute_reason: Option<String>,
    pub resolution_note: Option<String>,
    pub metadata: Metadata,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub confirmed_at: Option<Timestamp>,
    pub disputed_at: Option<Timestamp>,
    pub resolved_at: Option<Timestamp>,
}

impl TimebankTransaction {
    /// Whether `member_id` is the provider or the receiver.
    pub fn is_party(&self, member_id: &MemberId) -> bool {
        &self.provider_id == member_id || &self.receiver_id == member_id
    }

    /// Transition to a new status, stamping the matching timestamp.
    pub fn transition_to(&mut self, next: EscrowStatus, now: Timestamp) -> Result<(), LedgerError> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::InvalidState {
                entity: EntityKind::Transaction,
                id: self.id.to_string(),
                current: self.status.to_string(),
                attempted: format!("move to {next}"),
            });
        }
        self.status = next;
        self.updated_at = now;
        match next {
            EscrowStatus::Confirmed => self.confirmed_at = Some(now),
            EscrowStatus::Disputed => self.disputed_at = Some(now),
            EscrowStatus::Resolved => self.resolved_at = Some(now),
            EscrowStatus::Pending => {}
        }
        Ok(())
    }
}

/// Input for a new escrowed service request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub tbc_cost: u64,
    pub description: String,
    pub service_id: Option<ServiceId>,
    pub hourly_rate: Option<u64>,
    pub hours_provided: Option<u32>,
    pub metadata: Metadata,
}

impl ServiceRequest {
    pub fn new(tbc_cost: u64, description: impl Into<String>) -> Self {
        Self {
            tbc_cost,
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_service(mut self, service_id: ServiceId) -> Self {
        self.service_id = Some(service_id);
        self
    }

    pub fn with_hours(mut self, hourly_rate: u64, hours_provided: u32) -> Self {
        self.hourly_rate = Some(hourly_rate);
        self.hours_provided = Some(hours_provided);
        self
    }
}

/// A member's standing offer to provide a service for TBC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimebankService {
    pub id: ServiceId,
    pub member_id: MemberId,
    /// Free-form category (`tutoring`, `repair`, ...).
    pub service_type: String,
    pub title: String,
    pub description: Option<String>,
    pub tbc_per_hour: u64,
    pub availability: Option<String>,
    pub location_preference: Option<LocationPreference>,
    /// `None` means offered everywhere.
    pub city_id: Option<String>,
    pub active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TimebankService {
    /// Whether the offer is active and listed for `city_id`.
    pub fn listed_in(&self, city_id: Option<&str>) -> bool {
        self.active
            && match (city_id, self.city_id.as_deref()) {
                (Some(wanted), Some(own)) => wanted == own,
                _ => true,
            }
    }
}

/// Input for a new timebank service offering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTimebankService {
    pub service_type: String,
    pub title: String,
    pub tbc_per_hour: u64,
    pub description: Option<String>,
    pub availability: Option<String>,
    pub location_preference: Option<LocationPreference>,
    pub city_id: Option<String>,
}

impl NewTimebankService {
    pub fn new(service_type: impl Into<String>, title: impl Into<String>, tbc_per_hour: u64) -> Self {
        Self {
            service_type: service_type.into(),
            title: title.into(),
            tbc_per_hour,
            ..Self::default()
        }
    }

    pub fn in_city(mut self, city_id: impl Into<String>) -> Self {
        self.city_id = Some(city_id.into());
        self
    }

    pub fn with_location(mut self, preference: LocationPreference) -> Self {
        self.location_preference = Some(preference);
        self
    }
}

// =============================================================================
// SOCIAL HORIZON ISSUANCE
// =============================================================================

/// Time-boxed window during which SH can be bought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShPurchaseEvent {
    pub id: EventId,
    pub event_name: String,
    pub cycle_id: Option<String>,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub rp_per_sh: Option<u64>,
    pub money_per_sh: Option<u64>,
    pub sh_cap_per_person: u64,
    pub global_sh_cap: u64,
    /// Monotonic; never exceeds `global_sh_cap`.
    pub sh_distributed: u64,
    /// Administrator override; wins over the clock when set.
    pub status_override: Option<EventStatus>,
    pub fiscal_regularity_required: bool,
    pub metadata: Metadata,
    pub created_by: MemberId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ShPurchaseEvent {
    /// Effective status at `now`.
    pub fn status_at(&self, now: Timestamp) -> EventStatus {
        self.status_override
            .unwrap_or_else(|| EventStatus::derive(now, self.start_date, self.end_date))
    }

    pub fn remaining_global(&self) -> u64 {
        self.global_sh_cap.saturating_sub(self.sh_distributed)
    }
}

/// Input for a new issuance event. Caps default from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIssuanceEvent {
    pub event_name: String,
    pub cycle_id: Option<String>,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub rp_per_sh: Option<u64>,
    pub money_per_sh: Option<u64>,
    pub sh_cap_per_person: Option<u64>,
    pub global_sh_cap: Option<u64>,
    pub fiscal_regularity_required: Option<bool>,
    pub metadata: Metadata,
}

impl NewIssuanceEvent {
    pub fn builder(name: impl Into<String>) -> NewIssuanceEventBuilder {
        NewIssuanceEventBuilder::new(name)
    }
}

/// Builder for [`NewIssuanceEvent`].
#[derive(Debug, Clone)]
pub struct NewIssuanceEventBuilder {
    event_name: String,
    cycle_id: Option<String>,
    start_date: Option<Timestamp>,
    end_date: Option<Timestamp>,
    rp_per_sh: Option<u64>,
    money_per_sh: Option<u64>,
    sh_cap_per_person: Option<u64>,
    global_sh_cap: Option<u64>,
    fiscal_regularity_required: Option<bool>,
    metadata: Metadata,
}

impl NewIssuanceEventBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            event_name: name.into(),
            cycle_id: None,
            start_date: None,
            end_date: None,
            rp_per_sh: None,
            money_per_sh: None,
            sh_cap_per_person: None,
            global_sh_cap: None,
            fiscal_regularity_required: None,
            metadata: Metadata::new(),
        }
    }

    pub fn window(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn cycle(mut self, cycle_id: impl Into<String>) -> Self {
        self.cycle_id = Some(cycle_id.into());
        self
    }

    pub fn rp_per_sh(mut self, rate: u64) -> Self {
        self.rp_per_sh = Some(rate);
        self
    }

    pub fn money_per_sh(mut self, price: u64) -> Self {
        self.money_per_sh = Some(price);
        self
    }

    pub fn caps(mut self, per_person: u64, global: u64) -> Self {
        self.sh_cap_per_person = Some(per_person);
        self.global_sh_cap = Some(global);
        self
    }

    pub fn fiscal_regularity_required(mut self, required: bool) -> Self {
        self.fiscal_regularity_required = Some(required);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Build the request. Fails if the window was not set.
    pub fn build(self) -> Result<NewIssuanceEvent, LedgerError> {
        let (start_date, end_date) = match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(LedgerError::Validation {
                    field: "window",
                    reason: "start and end dates are required".to_string(),
                })
            }
        };
        Ok(NewIssuanceEvent {
            event_name: self.event_name,
            cycle_id: self.cycle_id,
            start_date,
            end_date,
            rp_per_sh: self.rp_per_sh,
            money_per_sh: self.money_per_sh,
            sh_cap_per_person: self.sh_cap_per_person,
            global_sh_cap: self.global_sh_cap,
            fiscal_regularity_required: self.fiscal_regularity_required,
            metadata: self.metadata,
        })
    }
}

/// One member's SH purchase within an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShPurchaseTransaction {
    pub id: PurchaseId,
    pub member_id: MemberId,
    pub event_id: EventId,
    pub sh_amount: u64,
    pub rp_spent: u64,
    pub rate_used: u64,
    pub created_at: Timestamp,
}
