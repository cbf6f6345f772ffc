//! # Member Journeys
//!
//! End-to-end flows through every engine:
//!
//! 1. **Earn and convert**: RP earned from contributions, burned into TBC
//!    under the monthly cap
//! 2. **Issuance**: RP burned into SH during an event window
//! 3. **Allocation**: SP pledged to a proposal and reclaimed
//! 4. **Escrow**: TBC reserved at request time, paid out on confirmation,
//!    or settled by an administrator after a dispute
//! 5. **Catalog**: standing offers listed by city, booked, then withdrawn

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use ledger_core::{
        DisputeOutcome, EntryType, EscrowFilter, EscrowRole, EscrowStatus, EventStatus,
        HistoryFilter, LedgerApi, LedgerError, LimitKind, LocationPreference, NewIssuanceEvent,
        NewTimebankService, ServiceRequest,
    };
    use ledger_core::engines::SOURCE_CONVERSION;
    use shared_types::{AllocationTarget, Caller, Currency, PageRequest};

    use crate::fixtures::{admin, member, LedgerHarness};

    // =============================================================================
    // EARN AND CONVERT
    // =============================================================================

    /// 250 RP, cap 200: two conversions of 100 succeed, the third hits the cap.
    #[tokio::test]
    async fn test_two_conversions_then_monthly_cap() {
        let harness = LedgerHarness::with_conversion_cap(200);
        let alice = member("alice");
        harness.fund_rp(&alice, 250).await.unwrap();

        for _ in 0..2 {
            let receipt = harness.ledger.convert(&alice, 100).await.unwrap();
            assert_eq!(receipt.record.tbc_received, 1);
        }

        let err = harness.ledger.convert(&alice, 100).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::LimitExceeded {
                limit: LimitKind::MonthlyConversion,
                ..
            }
        ));
        assert_eq!(err.remaining_allowance(), Some(0));

        let rp = harness.ledger.get_balance(&alice, Currency::Rp).await.unwrap();
        assert_eq!(rp.available, 50);
        assert_eq!(rp.spent_on_tbc, Some(200));
        assert_eq!(harness.available(&alice, Currency::Tbc).await.unwrap(), 2);

        let status = harness.ledger.get_conversion_status(&alice).await.unwrap();
        assert_eq!(status.already_converted_this_month, 200);
        assert_eq!(status.remaining_allowance, 0);
        assert_eq!(status.max_convertible_now, 0);
    }

    #[tokio::test]
    async fn test_conversion_cap_resets_next_month() {
        let harness = LedgerHarness::with_conversion_cap(200);
        let alice = member("alice");
        harness.fund_rp(&alice, 400).await.unwrap();
        harness.ledger.convert(&alice, 200).await.unwrap();
        assert!(harness.ledger.convert(&alice, 100).await.is_err());

        // 2024-03-10 + 25 days lands in April
        harness.clock.advance(Duration::days(25));
        harness.ledger.convert(&alice, 200).await.unwrap();

        let conversions = harness.ledger.get_conversions(&alice).await.unwrap();
        assert_eq!(conversions.len(), 2);
        assert!(conversions[0].created_at > conversions[1].created_at);
        assert_ne!(conversions[0].conversion_month, conversions[1].conversion_month);
    }

    #[tokio::test]
    async fn test_contribution_awards_flow_into_history() {
        let harness = LedgerHarness::with_conversion_cap(1000);
        let alice = member("alice");
        harness.ledger.award_contribution(&alice, "bug_fix", "github").await.unwrap();
        harness
            .ledger
            .award_contribution(&alice, "pr_merged_large", "github")
            .await
            .unwrap();
        harness.ledger.convert(&alice, 100).await.unwrap();

        let history = harness
            .ledger
            .get_transaction_history(&alice, HistoryFilter::currency(Currency::Rp))
            .await
            .unwrap();
        assert_eq!(history.total, 3);
        assert_eq!(history.items[0].entry_type, EntryType::SpendTbc);
        assert_eq!(history.items[0].amount, -100);
        assert_eq!(history.items[0].source, SOURCE_CONVERSION);
        assert_eq!(history.items[1].amount, 100);
        assert_eq!(history.items[2].amount, 30);

        let earns_only = harness
            .ledger
            .get_transaction_history(
                &alice,
                HistoryFilter {
                    entry_type: Some(EntryType::Earn),
                    page: PageRequest::new(1, 0),
                    ..HistoryFilter::default()
                },
            )
            .await
            .unwrap();
        // two RP earns plus the TBC credit from the conversion
        assert_eq!(earns_only.total, 3);
        assert_eq!(earns_only.items.len(), 1);
        assert!(earns_only.has_more());
    }

    // =============================================================================
    // ISSUANCE
    // =============================================================================

    #[tokio::test]
    async fn test_purchase_burns_rp_and_mints_sh() {
        let harness = LedgerHarness::new();
        let alice = member("alice");
        harness.fund_rp(&alice, 100).await.unwrap();
        let event = harness.open_event(5, 50, 10).await.unwrap();

        let receipt = harness.ledger.purchase(&alice, event.id, 3).await.unwrap();
        assert_eq!(receipt.rp_spent, 30);
        assert_eq!(receipt.total_distributed, 3);
        assert_eq!(receipt.member_total, 3);
        assert_eq!(receipt.member_remaining, 2);

        let rp = harness.ledger.get_balance(&alice, Currency::Rp).await.unwrap();
        assert_eq!(rp.available, 70);
        assert_eq!(rp.spent_on_sh, Some(30));
        assert_eq!(harness.available(&alice, Currency::Sh).await.unwrap(), 3);

        let err = harness.ledger.purchase(&alice, event.id, 3).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::LimitExceeded {
                limit: LimitKind::PerPersonIssuance,
                remaining: 2,
                ..
            }
        ));

        let view = harness
            .ledger
            .get_event_status(event.id, Some(&alice))
            .await
            .unwrap();
        assert_eq!(view.status, EventStatus::Active);
        assert_eq!(view.distributed, 3);
        assert_eq!(view.purchased_by_member, Some(3));
        assert_eq!(view.remaining_for_member, Some(2));
    }

    #[tokio::test]
    async fn test_purchase_outside_window_and_after_override() {
        let harness = LedgerHarness::new();
        let alice = member("alice");
        harness.fund_rp(&alice, 100).await.unwrap();
        let event = harness.open_event(5, 50, 10).await.unwrap();

        harness
            .ledger
            .update_issuance_event_status(&admin(), event.id, EventStatus::Closed)
            .await
            .unwrap();
        let err = harness.ledger.purchase(&alice, event.id, 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::EventNotActive { status: EventStatus::Closed, .. }));

        harness.ledger.clear_status_override(&admin(), event.id).await.unwrap();
        harness.ledger.purchase(&alice, event.id, 1).await.unwrap();

        harness.clock.advance(Duration::days(8));
        let err = harness.ledger.purchase(&alice, event.id, 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::EventNotActive { .. }));
        assert!(harness.ledger.list_issuance_events(true).await.unwrap().is_empty());
        assert_eq!(harness.ledger.list_issuance_events(false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_purchase_requires_fiscal_regularity() {
        let harness = LedgerHarness::new();
        let alice = member("alice");
        harness.fund_rp(&alice, 100).await.unwrap();
        let event = harness.open_event(5, 50, 10).await.unwrap();

        harness.fiscal.mark_irregular(&alice);
        let err = harness.ledger.purchase(&alice, event.id, 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden { .. }));
        assert_eq!(harness.available(&alice, Currency::Rp).await.unwrap(), 100);

        harness.fiscal.mark_regular(&alice);
        harness.ledger.purchase(&alice, event.id, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_money_priced_event_rejects_rp_purchase() {
        let harness = LedgerHarness::new();
        let alice = member("alice");
        harness.fund_rp(&alice, 100).await.unwrap();
        let now = harness.now();
        let request = NewIssuanceEvent::builder("Dues-funded issuance")
            .window(now - Duration::hours(1), now + Duration::days(1))
            .money_per_sh(500)
            .build()
            .unwrap();
        let event = harness
            .ledger
            .create_issuance_event(&admin(), request)
            .await
            .unwrap();

        let err = harness.ledger.purchase(&alice, event.id, 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::UnsupportedPricing { .. }));
    }

    #[tokio::test]
    async fn test_only_admins_manage_events() {
        let harness = LedgerHarness::new();
        let now = harness.now();
        let request = NewIssuanceEvent::builder("Rogue issuance")
            .window(now, now + Duration::days(1))
            .rp_per_sh(1)
            .build()
            .unwrap();
        let err = harness
            .ledger
            .create_issuance_event(&Caller::member("alice"), request)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden { .. }));
    }

    // =============================================================================
    // ALLOCATION
    // =============================================================================

    /// Allocate all 10 available SP to a proposal, then reclaim them.
    #[tokio::test]
    async fn test_allocate_then_reclaim_restores_balance() {
        let harness = LedgerHarness::new();
        let alice = member("alice");
        harness.grant_sp(&alice, 10).await.unwrap();
        let target = AllocationTarget::proposal("p1");

        harness.ledger.allocate(&alice, &target, 10).await.unwrap();
        let sp = harness.ledger.get_balance(&alice, Currency::Sp).await.unwrap();
        assert_eq!(sp.available, 0);
        assert_eq!(sp.allocated, Some(10));

        let aggregate = harness.ledger.get_target_allocations(&target).await.unwrap();
        assert_eq!(aggregate.total, 10);
        assert_eq!(aggregate.count, 1);

        harness.ledger.reclaim(&alice, &target).await.unwrap();
        let sp = harness.ledger.get_balance(&alice, Currency::Sp).await.unwrap();
        assert_eq!(sp.available, 10);
        assert_eq!(sp.allocated, Some(0));
        assert!(harness.ledger.get_allocations(&alice).await.unwrap().is_empty());

        // a reclaimed target can be pledged to again
        harness.ledger.allocate(&alice, &target, 4).await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_member_grants_once() {
        let harness = LedgerHarness::new();
        let alice = member("alice");
        let first = harness.ledger.initialize_member(&alice).await.unwrap();
        let second = harness.ledger.initialize_member(&alice).await.unwrap();
        assert_eq!(first.available, 100);
        assert_eq!(second.available, 100);
        assert_eq!(second.total_earned, 100);

        harness
            .ledger
            .award_for_activity(&alice, "meeting_attended")
            .await
            .unwrap();
        assert_eq!(harness.available(&alice, Currency::Sp).await.unwrap(), 105);
    }

    // =============================================================================
    // ESCROW
    // =============================================================================

    /// Receiver's 5 TBC leave at request time; the provider is paid on confirm.
    #[tokio::test]
    async fn test_escrow_reserves_then_pays_on_confirm() {
        let harness = LedgerHarness::with_conversion_cap(1000);
        let (receiver, provider) = (member("receiver"), member("provider"));
        harness.fund_tbc(&receiver, 5).await.unwrap();

        let tx = harness
            .ledger
            .request_service(&receiver, &provider, ServiceRequest::new(5, "Garden help"))
            .await
            .unwrap();
        assert_eq!(tx.status, EscrowStatus::Pending);
        assert_eq!(harness.available(&receiver, Currency::Tbc).await.unwrap(), 0);
        assert_eq!(harness.available(&provider, Currency::Tbc).await.unwrap(), 0);

        let confirmed = harness
            .ledger
            .confirm_transaction(tx.id, &Caller::member(provider.clone()))
            .await
            .unwrap();
        assert_eq!(confirmed.status, EscrowStatus::Confirmed);
        assert!(confirmed.confirmed_at.is_some());

        let provider_tbc = harness.ledger.get_balance(&provider, Currency::Tbc).await.unwrap();
        assert_eq!(provider_tbc.available, 5);
        assert_eq!(provider_tbc.total_earned, 5);

        let err = harness
            .ledger
            .confirm_transaction(tx.id, &Caller::member(provider.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyConfirmed { .. }));
        assert_eq!(harness.available(&provider, Currency::Tbc).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_receiver_cannot_confirm_own_request() {
        let harness = LedgerHarness::with_conversion_cap(1000);
        let (receiver, provider) = (member("receiver"), member("provider"));
        harness.fund_tbc(&receiver, 3).await.unwrap();
        let tx = harness
            .ledger
            .request_service(&receiver, &provider, ServiceRequest::new(3, "Tutoring"))
            .await
            .unwrap();

        let err = harness
            .ledger
            .confirm_transaction(tx.id, &Caller::member(receiver.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden { .. }));

        // administrators act only through dispute resolution
        let err = harness.ledger.confirm_transaction(tx.id, &admin()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden { .. }));
        assert_eq!(harness.available(&provider, Currency::Tbc).await.unwrap(), 0);

        harness
            .ledger
            .confirm_transaction(tx.id, &Caller::member(provider.clone()))
            .await
            .unwrap();
        assert_eq!(harness.available(&provider, Currency::Tbc).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_dispute_resolved_with_refund() {
        let harness = LedgerHarness::with_conversion_cap(1000);
        let (receiver, provider) = (member("receiver"), member("provider"));
        harness.fund_tbc(&receiver, 4).await.unwrap();
        let tx = harness
            .ledger
            .request_service(&receiver, &provider, ServiceRequest::new(4, "Bike repair"))
            .await
            .unwrap();

        let disputed = harness
            .ledger
            .dispute_transaction(tx.id, &Caller::member(receiver.clone()), "never showed up")
            .await
            .unwrap();
        assert_eq!(disputed.status, EscrowStatus::Disputed);

        let err = harness
            .ledger
            .confirm_transaction(tx.id, &Caller::member(provider.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState { .. }));

        let err = harness
            .ledger
            .resolve_dispute(tx.id, &Caller::member(receiver.clone()), DisputeOutcome::RefundReceiver, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden { .. }));

        let resolved = harness
            .ledger
            .resolve_dispute(
                tx.id,
                &admin(),
                DisputeOutcome::RefundReceiver,
                Some("provider confirmed absence".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, EscrowStatus::Resolved);
        assert_eq!(resolved.outcome, Some(DisputeOutcome::RefundReceiver));
        assert_eq!(harness.available(&receiver, Currency::Tbc).await.unwrap(), 4);
        assert_eq!(harness.available(&provider, Currency::Tbc).await.unwrap(), 0);

        let err = harness
            .ledger
            .resolve_dispute(tx.id, &admin(), DisputeOutcome::PayProvider, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_dispute_resolved_in_providers_favor() {
        let harness = LedgerHarness::with_conversion_cap(1000);
        let (receiver, provider) = (member("receiver"), member("provider"));
        harness.fund_tbc(&receiver, 2).await.unwrap();
        let tx = harness
            .ledger
            .request_service(&receiver, &provider, ServiceRequest::new(2, "Moving boxes"))
            .await
            .unwrap();
        harness
            .ledger
            .dispute_transaction(tx.id, &Caller::member(provider.clone()), "receiver unresponsive")
            .await
            .unwrap();
        harness
            .ledger
            .resolve_dispute(tx.id, &admin(), DisputeOutcome::PayProvider, None)
            .await
            .unwrap();

        assert_eq!(harness.available(&receiver, Currency::Tbc).await.unwrap(), 0);
        assert_eq!(harness.available(&provider, Currency::Tbc).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_member_transactions_filter_by_role() {
        let harness = LedgerHarness::with_conversion_cap(1000);
        let (alice, bob) = (member("alice"), member("bob"));
        harness.fund_tbc(&alice, 5).await.unwrap();
        harness.fund_tbc(&bob, 5).await.unwrap();

        harness
            .ledger
            .request_service(&alice, &bob, ServiceRequest::new(1, "Cooking"))
            .await
            .unwrap();
        harness.clock.advance(Duration::minutes(1));
        harness
            .ledger
            .request_service(&bob, &alice, ServiceRequest::new(2, "Painting"))
            .await
            .unwrap();

        let all = harness
            .ledger
            .get_member_transactions(&alice, EscrowFilter::default())
            .await
            .unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.items[0].description, "Painting");

        let as_provider = harness
            .ledger
            .get_member_transactions(
                &alice,
                EscrowFilter {
                    role: EscrowRole::Provider,
                    ..EscrowFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(as_provider.total, 1);
        assert_eq!(as_provider.items[0].provider_id, alice);
    }

    /// A listed offer can be booked until its owner withdraws it.
    #[tokio::test]
    async fn test_service_catalog_lifecycle() {
        let harness = LedgerHarness::with_conversion_cap(1000);
        let (receiver, provider) = (member("receiver"), member("provider"));
        harness.fund_tbc(&receiver, 4).await.unwrap();

        let offer = harness
            .ledger
            .offer_timebank_service(
                &provider,
                NewTimebankService::new("gardening", "Weeding", 2)
                    .in_city("lisbon")
                    .with_location(LocationPreference::InPerson),
            )
            .await
            .unwrap();
        harness
            .ledger
            .offer_timebank_service(&provider, NewTimebankService::new("tutoring", "Maths", 1).in_city("porto"))
            .await
            .unwrap();

        let lisbon = harness.ledger.get_timebank_services(Some("lisbon")).await.unwrap();
        assert_eq!(lisbon.len(), 1);
        assert_eq!(lisbon[0].id, offer.id);

        let tx = harness
            .ledger
            .request_service(&receiver, &provider, ServiceRequest::new(2, "Weeding").with_service(offer.id))
            .await
            .unwrap();
        assert_eq!(tx.service_id, Some(offer.id));

        let err = harness
            .ledger
            .withdraw_timebank_service(offer.id, &Caller::member(receiver.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden { .. }));
        harness
            .ledger
            .withdraw_timebank_service(offer.id, &Caller::member(provider.clone()))
            .await
            .unwrap();
        assert!(harness.ledger.get_timebank_services(Some("lisbon")).await.unwrap().is_empty());

        let err = harness
            .ledger
            .request_service(&receiver, &provider, ServiceRequest::new(2, "Again").with_service(offer.id))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState { .. }));
        assert_eq!(harness.available(&receiver, Currency::Tbc).await.unwrap(), 2);
    }
}
