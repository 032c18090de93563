use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Ordered set of string values held by one sub-configuration attribute.
pub type AttributeValues = BTreeSet<String>;

pub const ROOT_REALM: &str = "/";

/// Hierarchical realm path, e.g. "/" or "/sales/emea".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RealmId(String);

impl RealmId {
    pub fn root() -> Self {
        Self(ROOT_REALM.to_string())
    }

    /// Normalises to a leading slash and no trailing slash.
    pub fn new(path: impl AsRef<str>) -> Self {
        let trimmed = path.as_ref().trim().trim_matches('/');
        if trimmed.is_empty() {
            Self::root()
        } else {
            Self(format!("/{}", trimmed))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_REALM
    }
}

impl fmt::Display for RealmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A realm's organization-level configuration of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationConfig {
    pub realm: RealmId,
    pub service_id: String,
}

/// One named sub-configuration (directory connector) of a realm's service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubConfigHandle {
    pub realm: RealmId,
    pub service_id: String,
    pub name: String,
    pub type_id: String,
}

impl fmt::Display for SubConfigHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.realm, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Unchanged,
    ObjectClassUpdated,
    AttributesUpdated,
    BothUpdated,
}

impl ReconcileOutcome {
    pub fn from_flags(object_class: bool, attributes: bool) -> Self {
        match (object_class, attributes) {
            (false, false) => Self::Unchanged,
            (true, false) => Self::ObjectClassUpdated,
            (false, true) => Self::AttributesUpdated,
            (true, true) => Self::BothUpdated,
        }
    }

    pub fn is_changed(self) -> bool {
        self != Self::Unchanged
    }
}

/// Outcome of reconciling one sub-configuration, with the values written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubConfigReport {
    pub sub_config: SubConfigHandle,
    pub outcome: ReconcileOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_classes_written: Option<AttributeValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes_written: Option<AttributeValues>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassError {
    pub realm: RealmId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_config: Option<String>,
    pub category: crate::utils::error::ErrorCategory,
    pub message: String,
}

/// Host lifecycle point that requested a pass. Every trigger runs the same pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Install,
    Startup,
    Upgrade { from_version: String },
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Install => f.write_str("install"),
            Trigger::Startup => f.write_str("startup"),
            Trigger::Upgrade { from_version } => write!(f, "upgrade from {}", from_version),
            Trigger::Manual => f.write_str("manual"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub trigger: Trigger,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub realms_processed: usize,
    pub sub_configs_examined: usize,
    pub sub_configs_updated: usize,
    pub outcomes: Vec<SubConfigReport>,
    pub errors: Vec<PassError>,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
