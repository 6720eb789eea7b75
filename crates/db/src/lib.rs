pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoCatalog, SeedResult, VariantSeedInfo, VerificationResult};

#[cfg(test)]
pub(crate) mod test_support;
