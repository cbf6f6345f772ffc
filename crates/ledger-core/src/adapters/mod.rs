//! Adapters implementing the outbound ports.

pub mod memory_store;
pub mod toml_config;

pub use memory_store::InMemoryLedgerStore;
pub use toml_config::TomlConfigProvider;
