//! W4RDEN - real-time bundler-wallet blacklisting engine
//!
//! Ingests the live transaction feed for freshly launched tokens, builds a
//! per-token graph of who funded whom, and promotes wallets funded by three
//! or more distinct key accounts to a persisted blacklist while tracking
//! subscriptions come and go on TTL and migration boundaries.

pub mod blacklist;
pub mod config;
pub mod correlation;
pub mod feed;
pub mod gates;
pub mod launch;
pub mod migration;
pub mod pipeline;
pub mod registry;
pub mod registry_store;
pub mod types;
pub mod utils;

// Re-export the main types for convenience
pub use blacklist::{BlacklistEntry, BlacklistStore};
pub use config::{Config, FeedConfig};
pub use correlation::{OccurrenceRecord, RelationEngine};
pub use gates::GateChecker;
pub use migration::MigrationDetector;
pub use pipeline::{spawn_token_pipeline, PipelineDeps};
pub use registry::{PipelineSpawner, TokenRegistry};
pub use registry_store::WalletRegistryStore;
pub use types::{Direction, TransferEvent};
