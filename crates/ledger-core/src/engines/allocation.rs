//! # Support Point Allocation
//!
//! Members pledge SP to targets (proposals, topics). A member holds at most
//! one active allocation per target; changing the amount means reclaiming
//! and allocating again.
//!
//! Every unit holds the member's SP row lock, which also serializes
//! allocate/reclaim races on the same target.

use serde_json::json;
use shared_types::{AllocationTarget, Currency, MemberId, Metadata};
use std::sync::Arc;
use tracing::{debug, info};

use super::balance_store::post_movement;
use crate::domain::{
    invariant_allocation_range, invariant_positive, invariant_sp_conserved, invariant_sufficient,
    invariant_within_cap, AllocationConfig, Balance, EntityKind, LedgerError, LimitKind, Movement,
    RewardsConfig, SpAllocation, SpMovement, TargetAllocations,
};
use crate::ports::outbound::{LedgerStore, LockScope, TimeSource};

/// Log source of the one-time SP grant.
pub const SOURCE_INITIAL_GRANT: &str = "initial_grant";
/// Log source of allocation movements.
pub const SOURCE_ALLOCATION: &str = "allocation";
/// Log source of SP awards; the reason goes to metadata.
pub const SOURCE_SP_AWARD: &str = "sp_award";

pub struct AllocationEngine<S, T> {
    store: Arc<S>,
    clock: Arc<T>,
    config: AllocationConfig,
    rewards: RewardsConfig,
}

impl<S: LedgerStore, T: TimeSource> AllocationEngine<S, T> {
    pub fn new(store: Arc<S>, clock: Arc<T>, config: AllocationConfig, rewards: RewardsConfig) -> Self {
        Self {
            store,
            clock,
            config,
            rewards,
        }
    }

    /// Pledge `amount` SP to `target`.
    pub fn allocate(
        &self,
        member_id: &MemberId,
        target: &AllocationTarget,
        amount: u64,
    ) -> Result<SpAllocation, LedgerError> {
        invariant_allocation_range(
            amount,
            self.config.min_per_allocation,
            self.config.max_per_allocation,
        )?;

        let now = self.clock.now();
        let scope = LockScope::new().balance(member_id, Currency::Sp);
        let allocation = self.store.atomically(&scope, |uow| {
            if uow.active_allocation(member_id, target)?.is_some() {
                return Err(LedgerError::DuplicateAllocation {
                    target: target.to_string(),
                });
            }
            if let Some(max) = self.config.max_active_allocations {
                let active = uow.active_allocation_count(member_id)?;
                invariant_within_cap(LimitKind::ActiveAllocations, active as u64, 1, max as u64)?;
            }
            let available = uow
                .balance(member_id, Currency::Sp)?
                .map_or(0, |b| b.available);
            invariant_sufficient(Currency::Sp, amount, available)?;

            let allocation = SpAllocation::new(member_id.clone(), target.clone(), amount, now);
            let balance = post_movement(
                uow,
                member_id,
                Movement::Sp(SpMovement::Allocate(amount)),
                SOURCE_ALLOCATION,
                allocation_metadata(&allocation),
                now,
            )?;
            invariant_sp_conserved(&balance)?;
            uow.put_allocation(allocation.clone())?;
            Ok(allocation)
        })?;

        info!(
            member_id = %member_id,
            target = %target,
            amount,
            "[ledger/allocation] SP allocated"
        );
        Ok(allocation)
    }

    /// Return the active allocation on `target` to the member's available SP.
    pub fn reclaim(
        &self,
        member_id: &MemberId,
        target: &AllocationTarget,
    ) -> Result<SpAllocation, LedgerError> {
        let now = self.clock.now();
        let scope = LockScope::new().balance(member_id, Currency::Sp);
        let allocation = self.store.atomically(&scope, |uow| {
            let mut allocation = uow
                .active_allocation(member_id, target)?
                .ok_or_else(|| LedgerError::not_found(EntityKind::Allocation, target))?;
            allocation.reclaim(now)?;

            let balance = post_movement(
                uow,
                member_id,
                Movement::Sp(SpMovement::Reclaim(allocation.amount)),
                SOURCE_ALLOCATION,
                allocation_metadata(&allocation),
                now,
            )?;
            invariant_sp_conserved(&balance)?;
            uow.put_allocation(allocation.clone())?;
            Ok(allocation)
        })?;

        info!(
            member_id = %member_id,
            target = %target,
            amount = allocation.amount,
            "[ledger/allocation] SP reclaimed"
        );
        Ok(allocation)
    }

    /// Active allocations of a member, newest first.
    pub fn allocations(&self, member_id: &MemberId) -> Result<Vec<SpAllocation>, LedgerError> {
        let mut active: Vec<SpAllocation> = self
            .store
            .allocations_for_member(member_id)?
            .into_iter()
            .filter(SpAllocation::is_active)
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    /// Aggregate of active allocations on a target.
    pub fn target_allocations(&self, target: &AllocationTarget) -> Result<TargetAllocations, LedgerError> {
        let mut allocations: Vec<SpAllocation> = self
            .store
            .allocations_for_target(target)?
            .into_iter()
            .filter(SpAllocation::is_active)
            .collect();
        allocations.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.created_at.cmp(&b.created_at)));
        let total = allocations.iter().map(|a| a.amount).sum();

        debug!(target = %target, total, "[ledger/allocation] target query");
        Ok(TargetAllocations {
            target: target.clone(),
            total,
            count: allocations.len(),
            allocations,
        })
    }

    /// Grant the initial SP once. Later calls return the current balance.
    pub fn initialize_member(&self, member_id: &MemberId) -> Result<Balance, LedgerError> {
        let now = self.clock.now();
        let grant = self.config.initial_grant;
        let scope = LockScope::new().balance(member_id, Currency::Sp);
        self.store.atomically(&scope, |uow| {
            if grant == 0 || uow.has_entry_with_source(member_id, Currency::Sp, SOURCE_INITIAL_GRANT)? {
                return Ok(uow
                    .balance(member_id, Currency::Sp)?
                    .unwrap_or_else(|| Balance::zero(member_id.clone(), Currency::Sp, now)));
            }
            let balance = post_movement(
                uow,
                member_id,
                Movement::Sp(SpMovement::Grant(grant)),
                SOURCE_INITIAL_GRANT,
                Metadata::new(),
                now,
            )?;
            info!(member_id = %member_id, grant, "[ledger/allocation] member initialized");
            Ok(balance)
        })
    }

    /// Credit SP to a member.
    pub fn award_support_points(
        &self,
        member_id: &MemberId,
        amount: u64,
        reason: &str,
    ) -> Result<Balance, LedgerError> {
        invariant_positive(amount)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::Validation {
                field: "reason",
                reason: "cannot be empty".to_string(),
            });
        }
        let now = self.clock.now();
        let scope = LockScope::new().balance(member_id, Currency::Sp);
        let mut metadata = Metadata::new();
        metadata.insert("reason".to_string(), json!(reason));

        let balance = self.store.atomically(&scope, |uow| {
            post_movement(
                uow,
                member_id,
                Movement::Sp(SpMovement::Grant(amount)),
                SOURCE_SP_AWARD,
                metadata,
                now,
            )
        })?;
        info!(member_id = %member_id, amount, reason, "[ledger/allocation] SP awarded");
        Ok(balance)
    }

    /// Credit SP according to the activity weight table.
    pub fn award_for_activity(&self, member_id: &MemberId, activity: &str) -> Result<Balance, LedgerError> {
        let amount = self
            .rewards
            .sp_weights
            .get(activity)
            .copied()
            .ok_or_else(|| LedgerError::Validation {
                field: "activity",
                reason: format!("no SP weight for {activity:?}"),
            })?;
        self.award_support_points(member_id, amount, activity)
    }
}

fn allocation_metadata(allocation: &SpAllocation) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("allocationId".to_string(), json!(allocation.id.to_string()));
    metadata.insert("targetType".to_string(), json!(allocation.target.target_type.as_str()));
    metadata.insert("targetId".to_string(), json!(allocation.target.target_id.as_str()));
    metadata
}
