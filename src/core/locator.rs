use crate::core::resilience::StoreCallGuard;
use crate::domain::model::{RealmId, SubConfigHandle};
use crate::domain::ports::{AdminToken, ConfigStore};
use crate::utils::error::{ReconcileError, Result};
use regex::Regex;

/// Shell-style wildcard: `*` matches any run of characters, `?` exactly one.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| ReconcileError::InvalidConfigValueError {
            field: "pattern".to_string(),
            value: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// A matching sub-configuration, opened or not.
#[derive(Debug)]
pub struct LocatedSubConfig {
    pub name: String,
    pub handle: Result<SubConfigHandle>,
}

/// Finds the directory connectors configured in a realm.
pub struct SubConfigLocator<'a, S: ConfigStore + ?Sized> {
    store: &'a S,
    guard: &'a StoreCallGuard,
    service_id: &'a str,
}

impl<'a, S: ConfigStore + ?Sized> SubConfigLocator<'a, S> {
    pub fn new(store: &'a S, guard: &'a StoreCallGuard, service_id: &'a str) -> Self {
        Self {
            store,
            guard,
            service_id,
        }
    }

    /// An empty result is valid: the realm simply has no matching connectors.
    ///
    /// Errors only when the realm's connectors cannot be listed. A connector
    /// that cannot be opened comes back with an `Err` handle, sorted by name
    /// among the others.
    pub async fn find_sub_configurations(
        &self,
        token: &AdminToken,
        realm: &RealmId,
        name_pattern: &str,
        type_pattern: &str,
    ) -> Result<Vec<LocatedSubConfig>> {
        let org_config = self
            .guard
            .read("organization_config", || {
                self.store.organization_config(token, realm, self.service_id)
            })
            .await?;

        let mut opened = self
            .guard
            .read("sub_configs", || {
                self.store
                    .sub_configs(token, &org_config, name_pattern, type_pattern)
            })
            .await?;
        opened.sort_by(|a, b| a.0.cmp(&b.0));
        opened.dedup_by(|a, b| a.0 == b.0);

        let mut located = Vec::with_capacity(opened.len());
        for (name, handle) in opened {
            let handle = match handle {
                Err(e) if e.is_retryable() => {
                    tracing::debug!(realm = %realm, sub_config = %name, error = %e, "Reopening sub-configuration");
                    self.guard
                        .read("sub_config", || self.store.sub_config(token, &org_config, &name))
                        .await
                }
                other => other,
            };
            located.push(LocatedSubConfig { name, handle });
        }

        tracing::debug!(
            realm = %realm,
            count = located.len(),
            unopened = located.iter().filter(|l| l.handle.is_err()).count(),
            "Located directory sub-configurations"
        );
        Ok(located)
    }
}
