pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{memory::InMemoryConfigStore, rest::RestConfigStore, token::StaticTokenProvider};
pub use config::{ReconcilerConfig, StoreKind};
pub use crate::core::driver::{DriverOptions, ReconciliationDriver};
pub use crate::core::reconciler::{EmptyValuePolicy, ReconcilePolicy, WriteMode};
pub use domain::model::{PassReport, RealmId, ReconcileOutcome, Trigger};
pub use utils::error::{ReconcileError, Result};
