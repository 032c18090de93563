//! `ConfigStore` backed by the identity platform's JSON configuration API.

use crate::core::locator::Pattern;
use crate::domain::model::{AttributeValues, OrganizationConfig, RealmId, SubConfigHandle};
use crate::domain::ports::{AdminToken, ConfigStore};
use crate::utils::error::{ReconcileError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

const API_VERSION_HEADER: &str = "Accept-API-Version";
const API_VERSION: &str = "protocol=2.0,resource=1.0";
pub const DEFAULT_TOKEN_HEADER: &str = "iPlanetDirectoryPro";

#[derive(Debug, Deserialize)]
struct QueryResult<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RealmResource {
    name: String,
    #[serde(rename = "parentPath")]
    parent_path: Option<String>,
}

impl RealmResource {
    fn full_path(&self) -> String {
        match self.parent_path.as_deref() {
            None => self.name.clone(),
            Some(parent) => format!("{}/{}", parent.trim_end_matches('/'), self.name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TypeRef {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct DescendentResource {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_type")]
    resource_type: TypeRef,
}

#[derive(Debug, Clone)]
pub struct RestConfigStore {
    client: Client,
    base_url: Url,
    token_header: String,
}

impl RestConfigStore {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| ReconcileError::InvalidConfigValueError {
            field: "store.base_url".to_string(),
            value: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ReconcileError::InvalidConfigValueError {
                field: "store.base_url".to_string(),
                value: base_url.to_string(),
                reason: "must be a hierarchical http(s) URL".to_string(),
            });
        }

        Ok(Self {
            client,
            base_url,
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
        })
    }

    pub fn with_token_header(mut self, header: impl Into<String>) -> Self {
        self.token_header = header.into();
        self
    }

    /// Appends each segment percent-encoded, so realm and connector names
    /// may contain any character.
    fn endpoint<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// "/sales/emea" becomes ".../json/realms/root/realms/sales/realms/emea".
    fn realm_segments(realm: &RealmId) -> Vec<&str> {
        let mut segments = vec!["json", "realms", "root"];
        for segment in realm.as_str().split('/').filter(|s| !s.is_empty()) {
            segments.push("realms");
            segments.push(segment);
        }
        segments
    }

    fn id_repositories_url(&self, realm: &RealmId) -> Url {
        let mut segments = Self::realm_segments(realm);
        segments.extend(["realm-config", "services", "id-repositories"]);
        self.endpoint(segments)
    }

    fn sub_config_url(&self, handle: &SubConfigHandle) -> Url {
        let mut segments = Self::realm_segments(&handle.realm);
        segments.extend([
            "realm-config",
            "services",
            "id-repositories",
            handle.type_id.as_str(),
            handle.name.as_str(),
        ]);
        self.endpoint(segments)
    }

    fn authorised(&self, request: RequestBuilder, token: &AdminToken) -> RequestBuilder {
        request
            .header(self.token_header.as_str(), token.expose())
            .header(API_VERSION_HEADER, API_VERSION)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
        realm: Option<&RealmId>,
    ) -> Result<T> {
        let response = request.send().await?;
        let response = ensure_read_success(response, realm).await?;
        Ok(response.json::<T>().await?)
    }

    async fn descendents(&self, token: &AdminToken, realm: &RealmId) -> Result<Vec<DescendentResource>> {
        let mut url = self.id_repositories_url(realm);
        url.query_pairs_mut().append_pair("_action", "nextdescendents");
        tracing::debug!("Listing id-repositories at {}", url);
        let request = self.authorised(self.client.post(url), token);
        let listing: QueryResult<DescendentResource> = self.read_json(request, Some(realm)).await?;
        Ok(listing.result)
    }

    async fn fetch_document(&self, token: &AdminToken, handle: &SubConfigHandle) -> Result<Value> {
        let request = self.authorised(self.client.get(self.sub_config_url(handle)), token);
        self.read_json(request, Some(&handle.realm)).await
    }
}

async fn ensure_read_success(response: Response, realm: Option<&RealmId>) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let realm = realm.map(RealmId::as_str);
    if status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
    {
        return Err(ReconcileError::rejected(realm, status.as_u16(), body));
    }
    Err(ReconcileError::access(realm, format!("HTTP {}: {}", status, body)))
}

/// Attributes sit at the top level or inside one of the top-level sections.
fn find_attribute<'v>(document: &'v Value, attribute: &str) -> Option<&'v Value> {
    let object = document.as_object()?;
    if let Some(value) = object.get(attribute) {
        return Some(value);
    }
    object
        .values()
        .filter_map(Value::as_object)
        .find_map(|section| section.get(attribute))
}

fn set_attribute(document: &mut Value, attribute: &str, values: &AttributeValues) {
    let replacement = Value::Array(values.iter().cloned().map(Value::String).collect());
    let Some(object) = document.as_object_mut() else {
        return;
    };
    if object.contains_key(attribute) {
        object.insert(attribute.to_string(), replacement);
        return;
    }
    for section in object.values_mut().filter_map(Value::as_object_mut) {
        if section.contains_key(attribute) {
            section.insert(attribute.to_string(), replacement);
            return;
        }
    }
    object.insert(attribute.to_string(), replacement);
}

fn to_values(value: Option<&Value>) -> AttributeValues {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(single)) if !single.is_empty() => [single.clone()].into_iter().collect(),
        _ => AttributeValues::new(),
    }
}

#[async_trait]
impl ConfigStore for RestConfigStore {
    async fn sub_organization_names(
        &self,
        token: &AdminToken,
        pattern: &str,
        recursive: bool,
    ) -> Result<Vec<String>> {
        let pattern = Pattern::new(pattern)?;
        let mut url = self.endpoint(["json", "global-config", "realms"]);
        url.query_pairs_mut().append_pair("_queryFilter", "true");
        let request = self.authorised(self.client.get(url), token);
        let listing: QueryResult<RealmResource> = self.read_json(request, None).await?;

        Ok(listing
            .result
            .iter()
            .filter(|realm| realm.parent_path.is_some())
            .filter(|realm| recursive || realm.parent_path.as_deref() == Some("/"))
            .filter(|realm| pattern.matches(&realm.name))
            .map(RealmResource::full_path)
            .collect())
    }

    async fn organization_config(
        &self,
        _token: &AdminToken,
        realm: &RealmId,
        service_id: &str,
    ) -> Result<OrganizationConfig> {
        Ok(OrganizationConfig {
            realm: realm.clone(),
            service_id: service_id.to_string(),
        })
    }

    async fn sub_config_names(
        &self,
        token: &AdminToken,
        config: &OrganizationConfig,
        name_pattern: &str,
        type_pattern: &str,
    ) -> Result<Vec<String>> {
        let name_pattern = Pattern::new(name_pattern)?;
        let type_pattern = Pattern::new(type_pattern)?;

        Ok(self
            .descendents(token, &config.realm)
            .await?
            .into_iter()
            .filter(|d| name_pattern.matches(&d.id) && type_pattern.matches(&d.resource_type.id))
            .map(|d| d.id)
            .collect())
    }

    async fn sub_config(
        &self,
        token: &AdminToken,
        config: &OrganizationConfig,
        name: &str,
    ) -> Result<SubConfigHandle> {
        let descendent = self
            .descendents(token, &config.realm)
            .await?
            .into_iter()
            .find(|d| d.id == name)
            .ok_or_else(|| {
                ReconcileError::access(
                    Some(config.realm.as_str()),
                    format!("sub-configuration {} not found", name),
                )
            })?;

        Ok(SubConfigHandle {
            realm: config.realm.clone(),
            service_id: config.service_id.clone(),
            name: descendent.id,
            type_id: descendent.resource_type.id,
        })
    }

    /// One `nextdescendents` listing yields every handle's type.
    async fn sub_configs(
        &self,
        token: &AdminToken,
        config: &OrganizationConfig,
        name_pattern: &str,
        type_pattern: &str,
    ) -> Result<Vec<(String, Result<SubConfigHandle>)>> {
        let name_pattern = Pattern::new(name_pattern)?;
        let type_pattern = Pattern::new(type_pattern)?;

        Ok(self
            .descendents(token, &config.realm)
            .await?
            .into_iter()
            .filter(|d| name_pattern.matches(&d.id) && type_pattern.matches(&d.resource_type.id))
            .map(|d| {
                let handle = SubConfigHandle {
                    realm: config.realm.clone(),
                    service_id: config.service_id.clone(),
                    name: d.id.clone(),
                    type_id: d.resource_type.id,
                };
                (d.id, Ok(handle))
            })
            .collect())
    }

    async fn attribute_value(
        &self,
        token: &AdminToken,
        sub_config: &SubConfigHandle,
        attribute: &str,
    ) -> Result<AttributeValues> {
        let document = self.fetch_document(token, sub_config).await?;
        Ok(to_values(find_attribute(&document, attribute)))
    }

    async fn add_attribute(
        &self,
        token: &AdminToken,
        sub_config: &SubConfigHandle,
        attribute: &str,
        values: AttributeValues,
    ) -> Result<()> {
        let write_error = |message: String| {
            ReconcileError::write(sub_config.realm.as_str(), &sub_config.name, attribute, message)
        };

        let mut document = self
            .fetch_document(token, sub_config)
            .await
            .map_err(|e| write_error(e.to_string()))?;
        if let Some(object) = document.as_object_mut() {
            object.remove("_rev");
        }
        set_attribute(&mut document, attribute, &values);

        let request = self
            .authorised(self.client.put(self.sub_config_url(sub_config)), token)
            .json(&document);
        let response = request
            .send()
            .await
            .map_err(|e| write_error(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(write_error(format!("HTTP {}: {}", status, body)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_repositories_url_for_nested_realm() {
        let store = RestConfigStore::new("https://am.example.com/am/").unwrap();
        assert_eq!(
            store.id_repositories_url(&RealmId::root()).as_str(),
            "https://am.example.com/am/json/realms/root/realm-config/services/id-repositories"
        );
        assert_eq!(
            store.id_repositories_url(&RealmId::new("/sales/emea")).as_str(),
            "https://am.example.com/am/json/realms/root/realms/sales/realms/emea/realm-config/services/id-repositories"
        );
    }

    #[test]
    fn test_names_are_percent_encoded_in_paths() {
        let store = RestConfigStore::new("https://am.example.com/am").unwrap();
        assert_eq!(
            store.id_repositories_url(&RealmId::new("/r&d #1?")).as_str(),
            "https://am.example.com/am/json/realms/root/realms/r&d%20%231%3F/realm-config/services/id-repositories"
        );

        let handle = SubConfigHandle {
            realm: RealmId::new("/100%"),
            service_id: "sunIdentityRepositoryService".to_string(),
            name: "ldap?primary".to_string(),
            type_id: "LDAPv3ForAD".to_string(),
        };
        assert_eq!(
            store.sub_config_url(&handle).as_str(),
            "https://am.example.com/am/json/realms/root/realms/100%25/realm-config/services/id-repositories/LDAPv3ForAD/ldap%3Fprimary"
        );
    }

    #[test]
    fn test_base_url_without_path() {
        let store = RestConfigStore::new("http://localhost:8080").unwrap();
        assert_eq!(
            store.endpoint(["json", "global-config", "realms"]).as_str(),
            "http://localhost:8080/json/global-config/realms"
        );
        assert!(RestConfigStore::new("not a url").is_err());
    }

    #[test]
    fn test_listing_without_result_is_empty() {
        let listing: QueryResult<DescendentResource> = serde_json::from_value(json!({})).unwrap();
        assert!(listing.result.is_empty());

        let listing: QueryResult<RealmResource> =
            serde_json::from_value(json!({"result": [{"name": "sales", "parentPath": "/"}]})).unwrap();
        assert_eq!(listing.result[0].full_path(), "/sales");
    }

    #[test]
    fn test_full_path_from_parent() {
        let child = RealmResource {
            name: "emea".to_string(),
            parent_path: Some("/sales".to_string()),
        };
        assert_eq!(child.full_path(), "/sales/emea");

        let top = RealmResource {
            name: "sales".to_string(),
            parent_path: Some("/".to_string()),
        };
        assert_eq!(top.full_path(), "/sales");
    }

    #[test]
    fn test_find_attribute_in_section() {
        let document = json!({
            "_id": "ldap1",
            "userconfig": {
                "sun-idrepo-ldapv3-config-user-objectclass": ["top", "person"]
            }
        });
        let values = to_values(find_attribute(
            &document,
            "sun-idrepo-ldapv3-config-user-objectclass",
        ));
        assert_eq!(values.len(), 2);
        assert!(values.contains("person"));
        assert!(to_values(find_attribute(&document, "missing")).is_empty());
    }

    #[test]
    fn test_set_attribute_updates_in_place() {
        let mut document = json!({
            "userconfig": { "objectclass": ["top"] },
            "ldapsettings": { "host": "ldap.example.com" }
        });
        let values: AttributeValues = ["top".to_string(), "deviceAttributeContainer".to_string()]
            .into_iter()
            .collect();
        set_attribute(&mut document, "objectclass", &values);

        assert_eq!(
            document["userconfig"]["objectclass"],
            json!(["deviceAttributeContainer", "top"])
        );
        assert!(document.get("objectclass").is_none());
    }
}
