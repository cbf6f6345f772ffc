//! # Test Fixtures
//!
//! A fully wired ledger over the in-memory store, a settable clock and a
//! mutable fiscal standing roster. Shared by the integration tests and the
//! benchmarks.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use ledger_core::{
    BalanceView, FiscalStanding, InMemoryLedgerStore, LedgerApi, LedgerConfig, LedgerError,
    LedgerService, MockTimeSource, NewIssuanceEvent, ShPurchaseEvent, TimeSource,
};
use parking_lot::RwLock;
use shared_types::{Caller, Currency, MemberId, Metadata, Timestamp};

/// Ledger type used throughout the suite.
pub type TestLedger = LedgerService<InMemoryLedgerStore, MockTimeSource, RosterFiscalStanding>;

/// Fiscal standing backed by a set of irregular members.
///
/// Everyone is regular until marked otherwise.
#[derive(Debug, Default)]
pub struct RosterFiscalStanding {
    irregular: RwLock<HashSet<MemberId>>,
}

impl RosterFiscalStanding {
    pub fn mark_irregular(&self, member_id: &MemberId) {
        self.irregular.write().insert(member_id.clone());
    }

    pub fn mark_regular(&self, member_id: &MemberId) {
        self.irregular.write().remove(member_id);
    }
}

impl FiscalStanding for RosterFiscalStanding {
    fn is_regular(&self, member_id: &MemberId) -> bool {
        !self.irregular.read().contains(member_id)
    }
}

/// 2024-03-10 12:00 UTC.
pub fn fixture_time() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
}

pub fn member(name: &str) -> MemberId {
    MemberId::new(name)
}

pub fn admin() -> Caller {
    Caller::admin("admin")
}

/// Wired ledger plus handles on its collaborators.
pub struct LedgerHarness {
    pub ledger: Arc<TestLedger>,
    pub store: Arc<InMemoryLedgerStore>,
    pub clock: Arc<MockTimeSource>,
    pub fiscal: Arc<RosterFiscalStanding>,
}

impl LedgerHarness {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        let clock = Arc::new(MockTimeSource::new(fixture_time()));
        let fiscal = Arc::new(RosterFiscalStanding::default());
        let ledger = Arc::new(LedgerService::with_fiscal_standing(
            store.clone(),
            clock.clone(),
            fiscal.clone(),
            config,
        ));
        Self {
            ledger,
            store,
            clock,
            fiscal,
        }
    }

    /// Default config with a different monthly conversion cap.
    pub fn with_conversion_cap(max_rp_per_month: u64) -> Self {
        let mut config = LedgerConfig::default();
        config.conversion.max_rp_per_month = max_rp_per_month;
        Self::with_config(config)
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub async fn fund_rp(&self, member_id: &MemberId, amount: u64) -> Result<BalanceView, LedgerError> {
        self.ledger
            .earn_reward_points(member_id, amount, "contribution", Metadata::new())
            .await
    }

    /// Give `member_id` TBC the only way TBC is minted: earn RP, then convert it.
    ///
    /// The monthly conversion cap must leave room for `tbc * rp_per_tbc` RP.
    pub async fn fund_tbc(&self, member_id: &MemberId, tbc: u64) -> Result<BalanceView, LedgerError> {
        let rp = tbc * self.ledger.config().conversion.rp_per_tbc;
        self.fund_rp(member_id, rp).await?;
        let receipt = self.ledger.convert(member_id, rp).await?;
        Ok(receipt.tbc_balance)
    }

    pub async fn grant_sp(&self, member_id: &MemberId, amount: u64) -> Result<BalanceView, LedgerError> {
        self.ledger
            .award_support_points(member_id, amount, "test_grant")
            .await
    }

    /// Open an RP-priced event whose window contains the current clock.
    pub async fn open_event(
        &self,
        per_person: u64,
        global: u64,
        rp_per_sh: u64,
    ) -> Result<ShPurchaseEvent, LedgerError> {
        let now = self.now();
        let request = NewIssuanceEvent::builder("Spring issuance")
            .window(now - Duration::days(1), now + Duration::days(7))
            .rp_per_sh(rp_per_sh)
            .caps(per_person, global)
            .build()?;
        self.ledger.create_issuance_event(&admin(), request).await
    }

    pub async fn available(&self, member_id: &MemberId, currency: Currency) -> Result<u64, LedgerError> {
        Ok(self.ledger.get_balance(member_id, currency).await?.available)
    }
}

impl Default for LedgerHarness {
    fn default() -> Self {
        Self::new()
    }
}
