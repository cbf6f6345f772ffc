//! Domain layer for the points ledger.

pub mod balance;
pub mod config;
pub mod entities;
pub mod errors;
pub mod invariants;
pub mod value_objects;
pub mod views;

pub use balance::*;
pub use config::*;
pub use entities::*;
pub use errors::*;
pub use invariants::*;
pub use value_objects::*;
pub use views::*;
