//! Ports layer for the ledger core.
//!
//! - Inbound (Driving) port: `LedgerApi`, the surface exposed to callers
//! - Outbound (Driven) ports: storage, clock and fiscal standing

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
