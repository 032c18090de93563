use crate::core::resilience::StoreCallGuard;
use crate::domain::model::{AttributeValues, ReconcileOutcome, SubConfigHandle, SubConfigReport};
use crate::domain::ports::{AdminToken, ConfigStore};
use crate::utils::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};

pub const USER_OBJECTCLASS_ATTRIBUTE: &str = "sun-idrepo-ldapv3-config-user-objectclass";
pub const USER_ATTRIBUTES_ATTRIBUTE: &str = "sun-idrepo-ldapv3-config-user-attributes";
pub const DEVICE_ATTRIBUTE_CONTAINER: &str = "deviceAttributeContainer";
pub const DEVICE_ATTRIBUTES: &str = "deviceAttributes";
pub const IDENTITY_REPOSITORY_SERVICE: &str = "sunIdentityRepositoryService";

/// How a missing required value is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Existing values are kept and the required ones added.
    #[default]
    Union,
    /// The attribute is overwritten with only the required values.
    Replace,
}

/// What to do when the attribute currently holds no values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyValuePolicy {
    /// Leave the connector alone.
    #[default]
    Skip,
    /// Treat the attribute as missing and write the required values.
    Populate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilePolicy {
    pub service_id: String,
    pub sub_config_name_pattern: String,
    pub sub_config_type_pattern: String,
    pub object_class_attribute: String,
    pub user_attributes_attribute: String,
    pub required_object_class: String,
    pub required_attributes: AttributeValues,
    pub write_mode: WriteMode,
    pub empty_values: EmptyValuePolicy,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            service_id: IDENTITY_REPOSITORY_SERVICE.to_string(),
            sub_config_name_pattern: "*".to_string(),
            sub_config_type_pattern: "LDAPv3*".to_string(),
            object_class_attribute: USER_OBJECTCLASS_ATTRIBUTE.to_string(),
            user_attributes_attribute: USER_ATTRIBUTES_ATTRIBUTE.to_string(),
            required_object_class: DEVICE_ATTRIBUTE_CONTAINER.to_string(),
            required_attributes: [DEVICE_ATTRIBUTES.to_string()].into_iter().collect(),
            write_mode: WriteMode::Union,
            empty_values: EmptyValuePolicy::Skip,
        }
    }
}

impl ReconcilePolicy {
    /// Values to write, or `None` when `current` already complies or must be left alone.
    pub fn plan(&self, current: &AttributeValues, required: &AttributeValues) -> Option<AttributeValues> {
        if current.is_empty() && self.empty_values == EmptyValuePolicy::Skip {
            return None;
        }
        if required.is_subset(current) {
            return None;
        }

        Some(match self.write_mode {
            WriteMode::Union => current.union(required).cloned().collect(),
            WriteMode::Replace => required.clone(),
        })
    }

    fn required_object_classes(&self) -> AttributeValues {
        [self.required_object_class.clone()].into_iter().collect()
    }
}

pub struct AttributeReconciler<'a, S: ConfigStore + ?Sized> {
    store: &'a S,
    guard: &'a StoreCallGuard,
    policy: &'a ReconcilePolicy,
    dry_run: bool,
}

impl<'a, S: ConfigStore + ?Sized> AttributeReconciler<'a, S> {
    pub fn new(
        store: &'a S,
        guard: &'a StoreCallGuard,
        policy: &'a ReconcilePolicy,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            guard,
            policy,
            dry_run,
        }
    }

    pub async fn reconcile(
        &self,
        token: &AdminToken,
        sub_config: &SubConfigHandle,
    ) -> Result<SubConfigReport> {
        let object_classes_written = self
            .reconcile_attribute(
                token,
                sub_config,
                &self.policy.object_class_attribute,
                &self.policy.required_object_classes(),
            )
            .await?;

        let attributes_written = self
            .reconcile_attribute(
                token,
                sub_config,
                &self.policy.user_attributes_attribute,
                &self.policy.required_attributes,
            )
            .await?;

        let outcome = ReconcileOutcome::from_flags(
            object_classes_written.is_some(),
            attributes_written.is_some(),
        );

        Ok(SubConfigReport {
            sub_config: sub_config.clone(),
            outcome,
            object_classes_written,
            attributes_written,
        })
    }

    async fn reconcile_attribute(
        &self,
        token: &AdminToken,
        sub_config: &SubConfigHandle,
        attribute: &str,
        required: &AttributeValues,
    ) -> Result<Option<AttributeValues>> {
        let current = self
            .guard
            .read("attribute_value", || {
                self.store.attribute_value(token, sub_config, attribute)
            })
            .await?;

        let Some(updated) = self.policy.plan(&current, required) else {
            return Ok(None);
        };

        if self.dry_run {
            tracing::info!(
                sub_config = %sub_config,
                attribute,
                values = ?updated,
                "Dry run: would update attribute"
            );
            return Ok(Some(updated));
        }

        self.guard
            .once(
                "add_attribute",
                self.store
                    .add_attribute(token, sub_config, attribute, updated.clone()),
            )
            .await
            .map_err(|e| match e {
                e @ ReconcileError::ConfigWrite { .. } => e,
                other => ReconcileError::write(
                    sub_config.realm.as_str(),
                    &sub_config.name,
                    attribute,
                    other.to_string(),
                ),
            })?;

        tracing::info!(
            sub_config = %sub_config,
            attribute,
            values = ?updated,
            "Updated directory sub-configuration attribute"
        );
        Ok(Some(updated))
    }
}
