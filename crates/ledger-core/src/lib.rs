//! # Points Ledger Core
//!
//! Balances, transaction log and engines for the four member currencies:
//!
//! | Currency | Earned by | Spent by |
//! |----------|-----------|----------|
//! | RP (Reward Points) | contribution (`earn_reward_points`) | burning into TBC or SH |
//! | SP (Support Points) | grants and governance activity | allocation to targets (reclaimable) |
//! | TBC (Timebank Credits) | RP conversion, service payouts | escrowed service requests |
//! | SH (Social Horizon) | purchase during an issuance event | - |
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | No balance goes negative | `domain/balance.rs` - `Balance::apply()` checked arithmetic |
//! | Every balance write has exactly one log entry | `ports/outbound.rs` - `UnitOfWork::record()` |
//! | SP `available + allocated == total` | `domain/invariants.rs` - `invariant_sp_conserved()` |
//! | Monthly RP conversion cap | `engines/conversion.rs` - checked under the RP row lock |
//! | `sh_distributed <= global_sh_cap` | `UnitOfWork::increment_distributed()` conditional increment |
//! | One active allocation per target | `engines/allocation.rs` - `allocate()` |
//! | Escrowed TBC leaves the receiver at request time | `engines/escrow.rs` - `request_service()` |
//!
//! ## Escrow State Machine
//!
//! ```text
//! [pending] ──confirm──→ [confirmed]
//!     │
//!     └──dispute──→ [disputed] ──resolve(outcome)──→ [resolved]
//! ```
//!
//! ## Concurrency
//!
//! Every mutation runs inside [`LedgerStore::atomically`] holding row locks
//! keyed by `(member, currency)`, escrow id or event id. Keys are always
//! acquired in [`LockKey`] order, so units that share rows serialize and
//! never deadlock. A unit's writes become visible together or not at all.
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  service.rs  - LedgerService (implements LedgerApi)            │
//! │  adapters/   - InMemoryLedgerStore, TomlConfigProvider         │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ports/inbound.rs  - LedgerApi                                 │
//! │  ports/outbound.rs - LedgerStore, UnitOfWork, TimeSource,      │
//! │                      FiscalStanding                            │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  engines/  - balance store, log, conversion, allocation,       │
//! │              escrow, issuance                                  │
//! │  domain/   - Balance, Movement, entities, invariants, errors   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`LedgerStore::atomically`]: ports::outbound::LedgerStore::atomically
//! [`LockKey`]: ports::outbound::LockKey

pub mod adapters;
pub mod domain;
pub mod engines;
pub mod ports;
pub mod service;

pub use adapters::{InMemoryLedgerStore, TomlConfigProvider};
pub use domain::*;
pub use ports::*;
pub use service::LedgerService;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
