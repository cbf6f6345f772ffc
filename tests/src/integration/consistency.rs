//! # Ledger Consistency
//!
//! Whole-ledger properties that must hold after any sequence of operations:
//!
//! - every stored balance equals the replay of its log entries
//! - rejected operations leave neither a balance change nor a log entry
//! - SP is only ever moved between `available` and `allocated`
//! - TBC minted by conversion is either held or reserved in open escrow
//! - issuance never passes the per-person or global cap

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use futures::executor::block_on;
    use ledger_core::{
        EscrowFilter, EscrowRole, EscrowStatus, LedgerApi, LedgerConfig, LedgerStore,
        ServiceRequest,
    };
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use shared_types::{AllocationTarget, Caller, Currency, MemberId, PageRequest};

    use crate::fixtures::{member, LedgerHarness};

    const CURRENCIES: [Currency; 4] = [Currency::Rp, Currency::Sp, Currency::Tbc, Currency::Sh];

    // =============================================================================
    // HELPERS
    // =============================================================================

    /// Reconcile every (member, currency) pair; returns the stored balances.
    fn reconcile_all(harness: &LedgerHarness, members: &[MemberId]) -> BTreeMap<(MemberId, Currency), u64> {
        let mut available = BTreeMap::new();
        for m in members {
            for currency in CURRENCIES {
                let balance = block_on(harness.ledger.reconcile_balance(m, currency))
                    .unwrap_or_else(|e| panic!("{m}/{currency} failed reconciliation: {e}"));
                let replayed = harness.ledger.transaction_log().replay(m, currency).unwrap();
                assert_eq!(replayed.map_or(0, |b| b.available), balance.available);
                available.insert((m.clone(), currency), balance.available);
            }
        }
        available
    }

    /// TBC still reserved by this member's open requests.
    fn reserved_tbc(harness: &LedgerHarness, receiver: &MemberId) -> u64 {
        let filter = EscrowFilter {
            role: EscrowRole::Receiver,
            status: None,
            page: PageRequest::new(100, 0),
        };
        block_on(harness.ledger.get_member_transactions(receiver, filter))
            .unwrap()
            .items
            .iter()
            .filter(|tx| matches!(tx.status, EscrowStatus::Pending | EscrowStatus::Disputed))
            .map(|tx| tx.tbc_cost)
            .sum()
    }

    // =============================================================================
    // REPLAY
    // =============================================================================

    /// Seeded random workload across every engine, then a full audit.
    #[test]
    fn test_random_workload_reconciles_and_conserves_tbc() {
        let mut config = LedgerConfig::default();
        config.conversion.max_rp_per_month = 2_000;
        let harness = LedgerHarness::with_config(config);
        let members: Vec<MemberId> = (0..4).map(|i| member(&format!("member-{i}"))).collect();
        let event = block_on(harness.open_event(20, 60, 5)).unwrap();
        let mut rng = StdRng::seed_from_u64(0x1ed6e4);
        let mut open_escrows = Vec::new();

        for m in &members {
            block_on(harness.ledger.initialize_member(m)).unwrap();
        }

        for _ in 0..300 {
            let actor = &members[rng.gen_range(0..members.len())];
            let other = &members[rng.gen_range(0..members.len())];
            let target = AllocationTarget::proposal(format!("p{}", rng.gen_range(0..3)).as_str());
            // rejections are expected; only committed state is audited
            let _ = match rng.gen_range(0..8) {
                0 => block_on(harness.fund_rp(actor, rng.gen_range(1..300))).map(|_| ()),
                1 => block_on(harness.ledger.convert(actor, rng.gen_range(1..4) * 100)).map(|_| ()),
                2 => block_on(harness.ledger.purchase(actor, event.id, rng.gen_range(1..6))).map(|_| ()),
                3 => block_on(harness.ledger.allocate(actor, &target, rng.gen_range(1..11))).map(|_| ()),
                4 => block_on(harness.ledger.reclaim(actor, &target)).map(|_| ()),
                5 => block_on(harness.ledger.request_service(
                    actor,
                    other,
                    ServiceRequest::new(rng.gen_range(1..3), "Odd job"),
                ))
                .map(|tx| open_escrows.push(tx.id)),
                6 if !open_escrows.is_empty() => {
                    let id = open_escrows.swap_remove(rng.gen_range(0..open_escrows.len()));
                    let tx = block_on(harness.ledger.get_transaction(id)).unwrap();
                    let provider = Caller::member(tx.provider_id.clone());
                    block_on(harness.ledger.confirm_transaction(id, &provider)).map(|_| ())
                }
                _ if !open_escrows.is_empty() => {
                    let id = open_escrows[rng.gen_range(0..open_escrows.len())];
                    let tx = block_on(harness.ledger.get_transaction(id)).unwrap();
                    block_on(harness.ledger.dispute_transaction(
                        id,
                        &Caller::member(tx.receiver_id.clone()),
                        "late",
                    ))
                    .map(|_| ())
                }
                _ => Ok(()),
            };
        }

        let available = reconcile_all(&harness, &members);

        let minted: u64 = members
            .iter()
            .flat_map(|m| block_on(harness.ledger.get_conversions(m)).unwrap())
            .map(|c| c.tbc_received)
            .sum();
        let held: u64 = members.iter().map(|m| available[&(m.clone(), Currency::Tbc)]).sum();
        let reserved: u64 = members.iter().map(|m| reserved_tbc(&harness, m)).sum();
        assert_eq!(minted, held + reserved);

        let sold: u64 = members.iter().map(|m| available[&(m.clone(), Currency::Sh)]).sum();
        let view = block_on(harness.ledger.get_event_status(event.id, None)).unwrap();
        assert_eq!(sold, view.distributed);
        assert!(view.distributed <= 60);
    }

    #[tokio::test]
    async fn test_rejections_write_nothing() {
        let harness = LedgerHarness::with_conversion_cap(100);
        let alice = member("alice");
        let bob = member("bob");
        harness.fund_rp(&alice, 150).await.unwrap();
        harness.grant_sp(&alice, 5).await.unwrap();
        let event = harness.open_event(2, 10, 10).await.unwrap();
        let before = harness.store.entry_count();

        assert!(harness.ledger.convert(&alice, 150).await.is_err());
        assert!(harness.ledger.convert(&alice, 200).await.is_err());
        assert!(harness.ledger.convert(&bob, 100).await.is_err());
        assert!(harness.ledger.purchase(&alice, event.id, 3).await.is_err());
        assert!(harness.ledger.purchase(&bob, event.id, 1).await.is_err());
        assert!(harness
            .ledger
            .allocate(&alice, &AllocationTarget::proposal("p1"), 6)
            .await
            .is_err());
        assert!(harness
            .ledger
            .request_service(&alice, &bob, ServiceRequest::new(1, "Dog walking"))
            .await
            .is_err());

        assert_eq!(harness.store.entry_count(), before);
        assert_eq!(harness.available(&alice, Currency::Rp).await.unwrap(), 150);
        assert_eq!(harness.available(&bob, Currency::Rp).await.unwrap(), 0);
        let view = harness.ledger.get_event_status(event.id, None).await.unwrap();
        assert_eq!(view.distributed, 0);
    }

    #[tokio::test]
    async fn test_log_sequences_increase_in_commit_order() {
        let harness = LedgerHarness::with_conversion_cap(1000);
        let alice = member("alice");
        harness.fund_rp(&alice, 300).await.unwrap();
        harness.ledger.convert(&alice, 200).await.unwrap();
        harness.grant_sp(&alice, 5).await.unwrap();

        let entries = harness.store.entries(&alice, None).unwrap();
        assert_eq!(entries.len(), 4);
        assert!(entries.windows(2).all(|w| w[0].sequence < w[1].sequence));
        // the RP burn commits before the TBC credit of the same conversion
        assert_eq!(entries[1].currency, Currency::Rp);
        assert_eq!(entries[2].currency, Currency::Tbc);
        assert_eq!(entries[1].sequence + 1, entries[2].sequence);
    }

    // =============================================================================
    // PROPERTIES
    // =============================================================================

    #[derive(Debug, Clone)]
    enum SpOp {
        Allocate { target: u8, amount: u64 },
        Reclaim { target: u8 },
    }

    fn sp_op() -> impl Strategy<Value = SpOp> {
        prop_oneof![
            (0u8..4, 1u64..12).prop_map(|(target, amount)| SpOp::Allocate { target, amount }),
            (0u8..4).prop_map(|target| SpOp::Reclaim { target }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_sp_available_plus_allocated_is_granted(ops in prop::collection::vec(sp_op(), 1..40)) {
            let harness = LedgerHarness::new();
            let alice = member("alice");
            block_on(harness.grant_sp(&alice, 30)).unwrap();

            for op in ops {
                let _ = match op {
                    SpOp::Allocate { target, amount } => block_on(harness.ledger.allocate(
                        &alice,
                        &AllocationTarget::proposal(format!("p{target}").as_str()),
                        amount,
                    ))
                    .map(|_| ()),
                    SpOp::Reclaim { target } => block_on(
                        harness
                            .ledger
                            .reclaim(&alice, &AllocationTarget::proposal(format!("p{target}").as_str())),
                    )
                    .map(|_| ()),
                };

                let sp = block_on(harness.ledger.get_balance(&alice, Currency::Sp)).unwrap();
                let allocated = sp.allocated.unwrap_or_default();
                prop_assert_eq!(sp.available + allocated, 30);

                let active: u64 = block_on(harness.ledger.get_allocations(&alice))
                    .unwrap()
                    .iter()
                    .map(|a| a.amount)
                    .sum();
                prop_assert_eq!(active, allocated);
            }
            prop_assert!(block_on(harness.ledger.reconcile_balance(&alice, Currency::Sp)).is_ok());
        }

        #[test]
        fn prop_issuance_respects_both_caps(
            purchases in prop::collection::vec((0usize..6, 1u64..7), 1..40)
        ) {
            let harness = LedgerHarness::new();
            let buyers: Vec<MemberId> = (0..6).map(|i| member(&format!("buyer-{i}"))).collect();
            for buyer in &buyers {
                block_on(harness.fund_rp(buyer, 100)).unwrap();
            }
            let event = block_on(harness.open_event(8, 20, 1)).unwrap();

            let mut bought = vec![0u64; buyers.len()];
            for (idx, amount) in purchases {
                if block_on(harness.ledger.purchase(&buyers[idx], event.id, amount)).is_ok() {
                    bought[idx] += amount;
                }
            }

            let view = block_on(harness.ledger.get_event_status(event.id, None)).unwrap();
            prop_assert!(view.distributed <= 20);
            prop_assert_eq!(view.distributed, bought.iter().sum::<u64>());
            for (buyer, total) in buyers.iter().zip(&bought) {
                prop_assert!(*total <= 8);
                prop_assert_eq!(block_on(harness.available(buyer, Currency::Sh)).unwrap(), *total);
                prop_assert_eq!(block_on(harness.available(buyer, Currency::Rp)).unwrap(), 100 - total);
            }
        }

        #[test]
        fn prop_conversions_stay_within_cap_and_units(amounts in prop::collection::vec(0u64..450, 1..20)) {
            let harness = LedgerHarness::with_conversion_cap(500);
            let alice = member("alice");
            block_on(harness.fund_rp(&alice, 1_000)).unwrap();

            let mut converted = 0u64;
            for amount in amounts {
                let accepted = block_on(harness.ledger.convert(&alice, amount)).is_ok();
                let expected = amount > 0 && amount % 100 == 0 && converted + amount <= 500;
                prop_assert_eq!(accepted, expected);
                if accepted {
                    converted += amount;
                }
            }

            let status = block_on(harness.ledger.get_conversion_status(&alice)).unwrap();
            prop_assert_eq!(status.already_converted_this_month, converted);
            prop_assert_eq!(block_on(harness.available(&alice, Currency::Tbc)).unwrap(), converted / 100);
            prop_assert_eq!(block_on(harness.available(&alice, Currency::Rp)).unwrap(), 1_000 - converted);
        }
    }
}
