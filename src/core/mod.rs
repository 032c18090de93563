pub mod driver;
pub mod locator;
pub mod realms;
pub mod reconciler;
pub mod resilience;

pub use crate::domain::model::{PassReport, RealmId, ReconcileOutcome, SubConfigHandle, Trigger};
pub use crate::domain::ports::{AdminToken, AdminTokenProvider, ConfigStore};
pub use crate::utils::error::Result;
