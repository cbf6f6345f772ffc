//! # Shared Types Crate
//!
//! Types shared by every ledger crate: member and record identifiers, the
//! closed `Currency` tag, calendar-month keys and pagination.
//!
//! ## Design Principles
//!
//! - **Closed currency set**: `Currency` is an enum, never a free string.
//! - **Typed identifiers**: each record kind has its own id newtype so an
//!   escrow id can never be passed where an event id is expected.
//! - **UTC months**: throttling windows are UTC calendar months.

pub mod entities;
pub mod errors;
pub mod paging;
pub mod time;

pub use entities::*;
pub use errors::*;
pub use paging::*;
pub use time::*;
