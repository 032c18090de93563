use crate::domain::model::{AttributeValues, OrganizationConfig, RealmId, SubConfigHandle};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Opaque administrative session token.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminToken(String);

impl AdminToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminToken(***)")
    }
}

#[async_trait]
pub trait AdminTokenProvider: Send + Sync {
    async fn admin_token(&self) -> Result<AdminToken>;
}

/// The directory-service configuration store.
///
/// Every call reads or writes the store directly; implementations must not
/// cache between calls. `add_attribute` has upsert semantics: the stored
/// value set is replaced by `values`.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Names of sub-realms below "/" matching `pattern`, as full paths.
    async fn sub_organization_names(
        &self,
        token: &AdminToken,
        pattern: &str,
        recursive: bool,
    ) -> Result<Vec<String>>;

    async fn organization_config(
        &self,
        token: &AdminToken,
        realm: &RealmId,
        service_id: &str,
    ) -> Result<OrganizationConfig>;

    async fn sub_config_names(
        &self,
        token: &AdminToken,
        config: &OrganizationConfig,
        name_pattern: &str,
        type_pattern: &str,
    ) -> Result<Vec<String>>;

    async fn sub_config(
        &self,
        token: &AdminToken,
        config: &OrganizationConfig,
        name: &str,
    ) -> Result<SubConfigHandle>;

    /// Lists the matching sub-configurations and opens each one.
    ///
    /// Only a failure to list is an `Err`; a handle that fails to open is
    /// returned next to its name so siblings are still usable. Stores that
    /// learn each connector's type from the listing itself should override
    /// this to avoid one extra round trip per name.
    async fn sub_configs(
        &self,
        token: &AdminToken,
        config: &OrganizationConfig,
        name_pattern: &str,
        type_pattern: &str,
    ) -> Result<Vec<(String, Result<SubConfigHandle>)>> {
        let names = self
            .sub_config_names(token, config, name_pattern, type_pattern)
            .await?;
        let mut opened = Vec::with_capacity(names.len());
        for name in names {
            let handle = self.sub_config(token, config, &name).await;
            opened.push((name, handle));
        }
        Ok(opened)
    }

    async fn attribute_value(
        &self,
        token: &AdminToken,
        sub_config: &SubConfigHandle,
        attribute: &str,
    ) -> Result<AttributeValues>;

    async fn add_attribute(
        &self,
        token: &AdminToken,
        sub_config: &SubConfigHandle,
        attribute: &str,
        values: AttributeValues,
    ) -> Result<()>;
}
