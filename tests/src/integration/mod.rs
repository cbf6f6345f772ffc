//! # Integration Tests
//!
//! Cross-engine flows driven through `LedgerApi`, the same surface the
//! platform's routes call.

mod consistency;
mod scenarios;
