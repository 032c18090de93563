use crate::core::resilience::StoreCallGuard;
use crate::domain::model::RealmId;
use crate::domain::ports::{AdminToken, ConfigStore};
use crate::utils::error::Result;
use std::collections::HashSet;

/// Lists every realm, root first, each exactly once.
pub async fn list_realms<S: ConfigStore + ?Sized>(
    store: &S,
    guard: &StoreCallGuard,
    token: &AdminToken,
) -> Result<Vec<RealmId>> {
    let names = guard
        .read("sub_organization_names", || {
            store.sub_organization_names(token, "*", true)
        })
        .await?;

    let mut seen = HashSet::with_capacity(names.len());
    let mut realms = Vec::with_capacity(names.len() + 1);
    realms.push(RealmId::root());

    for name in names {
        let realm = RealmId::new(&name);
        if realm.is_root() {
            tracing::debug!(name = %name, "Ignoring root realm in sub-realm listing");
            continue;
        }
        if seen.insert(realm.clone()) {
            realms.push(realm);
        }
    }

    tracing::info!(count = realms.len(), "Enumerated realms");
    Ok(realms)
}
