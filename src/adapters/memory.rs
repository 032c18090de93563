use crate::core::locator::Pattern;
use crate::domain::model::{AttributeValues, OrganizationConfig, RealmId, SubConfigHandle, ROOT_REALM};
use crate::domain::ports::{AdminToken, ConfigStore};
use crate::utils::error::{ReconcileError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubConfigEntry {
    #[serde(rename = "type")]
    pub type_id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValues>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmEntry {
    #[serde(default)]
    pub sub_configs: BTreeMap<String, SubConfigEntry>,
}

/// Serialisable image of a configuration store, keyed by realm path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub realms: BTreeMap<String, RealmEntry>,
}

/// One `add_attribute` call that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub realm: RealmId,
    pub sub_config: String,
    pub attribute: String,
    pub values: AttributeValues,
}

#[derive(Debug, Default)]
struct Faults {
    realm_listing: bool,
    realms: HashSet<RealmId>,
    unopenable: HashSet<(RealmId, String)>,
    failed_reads: HashSet<(RealmId, String)>,
    rejected_writes: HashSet<(RealmId, String)>,
}

/// Configuration store held in memory, loadable from a JSON snapshot.
///
/// Every successful write is journalled so callers can inspect exactly what
/// a pass changed. Faults can be injected per realm or per sub-configuration.
#[derive(Debug)]
pub struct InMemoryConfigStore {
    state: RwLock<StoreSnapshot>,
    writes: RwLock<Vec<WriteRecord>>,
    faults: RwLock<Faults>,
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::from_snapshot(StoreSnapshot::default())
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut normalised = StoreSnapshot::default();
        normalised
            .realms
            .insert(ROOT_REALM.to_string(), RealmEntry::default());
        for (path, entry) in snapshot.realms {
            normalised
                .realms
                .insert(RealmId::new(&path).as_str().to_string(), entry);
        }

        Self {
            state: RwLock::new(normalised),
            writes: RwLock::new(Vec::new()),
            faults: RwLock::new(Faults::default()),
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.state.read().await.clone()
    }

    pub async fn write_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let snapshot = self.snapshot().await;
        let content = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub async fn add_realm(&self, path: &str) {
        let realm = RealmId::new(path);
        self.state
            .write()
            .await
            .realms
            .entry(realm.as_str().to_string())
            .or_default();
    }

    /// Adds the realm too if it does not exist yet.
    pub async fn add_sub_config(&self, realm: &str, name: &str, type_id: &str) {
        let realm = RealmId::new(realm);
        self.state
            .write()
            .await
            .realms
            .entry(realm.as_str().to_string())
            .or_default()
            .sub_configs
            .insert(
                name.to_string(),
                SubConfigEntry {
                    type_id: type_id.to_string(),
                    attributes: BTreeMap::new(),
                },
            );
    }

    pub async fn set_values(&self, realm: &str, name: &str, attribute: &str, values: &[&str]) {
        let realm = RealmId::new(realm);
        let mut state = self.state.write().await;
        if let Some(entry) = state
            .realms
            .get_mut(realm.as_str())
            .and_then(|r| r.sub_configs.get_mut(name))
        {
            entry.attributes.insert(
                attribute.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            );
        }
    }

    pub async fn values(&self, realm: &str, name: &str, attribute: &str) -> AttributeValues {
        let realm = RealmId::new(realm);
        self.state
            .read()
            .await
            .realms
            .get(realm.as_str())
            .and_then(|r| r.sub_configs.get(name))
            .and_then(|s| s.attributes.get(attribute))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.writes.read().await.clone()
    }

    pub async fn fail_realm_listing(&self, fail: bool) {
        self.faults.write().await.realm_listing = fail;
    }

    /// Every read touching `realm` fails with a config access error.
    pub async fn fail_realm(&self, realm: &str) {
        self.faults.write().await.realms.insert(RealmId::new(realm));
    }

    /// `sub_config` fails for this one connector; it is still listed.
    pub async fn fail_sub_config_open(&self, realm: &str, name: &str) {
        self.faults
            .write()
            .await
            .unopenable
            .insert((RealmId::new(realm), name.to_string()));
    }

    /// `attribute_value` fails for this one connector.
    pub async fn fail_sub_config_reads(&self, realm: &str, name: &str) {
        self.faults
            .write()
            .await
            .failed_reads
            .insert((RealmId::new(realm), name.to_string()));
    }

    pub async fn reject_writes(&self, realm: &str, name: &str) {
        self.faults
            .write()
            .await
            .rejected_writes
            .insert((RealmId::new(realm), name.to_string()));
    }

    async fn check_realm(&self, realm: &RealmId) -> Result<()> {
        if self.faults.read().await.realms.contains(realm) {
            return Err(ReconcileError::access(
                Some(realm.as_str()),
                "injected store failure",
            ));
        }
        Ok(())
    }
}

fn realm_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn sub_organization_names(
        &self,
        _token: &AdminToken,
        pattern: &str,
        recursive: bool,
    ) -> Result<Vec<String>> {
        if self.faults.read().await.realm_listing {
            return Err(ReconcileError::access(None, "realm listing unavailable"));
        }

        let pattern = Pattern::new(pattern)?;
        let state = self.state.read().await;
        Ok(state
            .realms
            .keys()
            .filter(|path| path.as_str() != ROOT_REALM)
            .filter(|path| recursive || path.matches('/').count() == 1)
            .filter(|path| pattern.matches(realm_name(path)))
            .cloned()
            .collect())
    }

    async fn organization_config(
        &self,
        _token: &AdminToken,
        realm: &RealmId,
        service_id: &str,
    ) -> Result<OrganizationConfig> {
        self.check_realm(realm).await?;
        if !self.state.read().await.realms.contains_key(realm.as_str()) {
            return Err(ReconcileError::access(Some(realm.as_str()), "no such realm"));
        }

        Ok(OrganizationConfig {
            realm: realm.clone(),
            service_id: service_id.to_string(),
        })
    }

    async fn sub_config_names(
        &self,
        _token: &AdminToken,
        config: &OrganizationConfig,
        name_pattern: &str,
        type_pattern: &str,
    ) -> Result<Vec<String>> {
        self.check_realm(&config.realm).await?;
        let name_pattern = Pattern::new(name_pattern)?;
        let type_pattern = Pattern::new(type_pattern)?;

        let state = self.state.read().await;
        let realm = state
            .realms
            .get(config.realm.as_str())
            .ok_or_else(|| ReconcileError::access(Some(config.realm.as_str()), "no such realm"))?;

        Ok(realm
            .sub_configs
            .iter()
            .filter(|(name, entry)| name_pattern.matches(name) && type_pattern.matches(&entry.type_id))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn sub_config(
        &self,
        _token: &AdminToken,
        config: &OrganizationConfig,
        name: &str,
    ) -> Result<SubConfigHandle> {
        self.check_realm(&config.realm).await?;
        let unopenable = self
            .faults
            .read()
            .await
            .unopenable
            .contains(&(config.realm.clone(), name.to_string()));
        if unopenable {
            return Err(ReconcileError::access(
                Some(config.realm.as_str()),
                format!("injected failure opening {}", name),
            ));
        }

        let state = self.state.read().await;
        let entry = state
            .realms
            .get(config.realm.as_str())
            .and_then(|r| r.sub_configs.get(name))
            .ok_or_else(|| {
                ReconcileError::access(
                    Some(config.realm.as_str()),
                    format!("sub-configuration {} not found", name),
                )
            })?;

        Ok(SubConfigHandle {
            realm: config.realm.clone(),
            service_id: config.service_id.clone(),
            name: name.to_string(),
            type_id: entry.type_id.clone(),
        })
    }

    async fn attribute_value(
        &self,
        _token: &AdminToken,
        sub_config: &SubConfigHandle,
        attribute: &str,
    ) -> Result<AttributeValues> {
        self.check_realm(&sub_config.realm).await?;
        let failing = self
            .faults
            .read()
            .await
            .failed_reads
            .contains(&(sub_config.realm.clone(), sub_config.name.clone()));
        if failing {
            return Err(ReconcileError::access(
                Some(sub_config.realm.as_str()),
                format!("injected read failure on {}", sub_config.name),
            ));
        }

        let state = self.state.read().await;
        let entry = state
            .realms
            .get(sub_config.realm.as_str())
            .and_then(|r| r.sub_configs.get(&sub_config.name))
            .ok_or_else(|| {
                ReconcileError::access(
                    Some(sub_config.realm.as_str()),
                    format!("sub-configuration {} not found", sub_config.name),
                )
            })?;

        Ok(entry.attributes.get(attribute).cloned().unwrap_or_default())
    }

    async fn add_attribute(
        &self,
        _token: &AdminToken,
        sub_config: &SubConfigHandle,
        attribute: &str,
        values: AttributeValues,
    ) -> Result<()> {
        let rejected = self
            .faults
            .read()
            .await
            .rejected_writes
            .contains(&(sub_config.realm.clone(), sub_config.name.clone()));
        if rejected {
            return Err(ReconcileError::write(
                sub_config.realm.as_str(),
                &sub_config.name,
                attribute,
                "injected write rejection",
            ));
        }

        let mut state = self.state.write().await;
        let entry = state
            .realms
            .get_mut(sub_config.realm.as_str())
            .and_then(|r| r.sub_configs.get_mut(&sub_config.name))
            .ok_or_else(|| {
                ReconcileError::write(
                    sub_config.realm.as_str(),
                    &sub_config.name,
                    attribute,
                    "sub-configuration no longer exists",
                )
            })?;
        entry.attributes.insert(attribute.to_string(), values.clone());

        self.writes.write().await.push(WriteRecord {
            realm: sub_config.realm.clone(),
            sub_config: sub_config.name.clone(),
            attribute: attribute.to_string(),
            values,
        });
        Ok(())
    }
}
