use crate::core::locator::{LocatedSubConfig, SubConfigLocator};
use crate::core::realms::list_realms;
use crate::core::reconciler::{AttributeReconciler, ReconcilePolicy};
use crate::core::resilience::StoreCallGuard;
use crate::domain::model::{PassError, PassReport, RealmId, SubConfigReport, Trigger};
use crate::domain::ports::{AdminToken, AdminTokenProvider, ConfigStore};
use crate::utils::error::{ReconcileError, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Realms reconciled at the same time. 1 processes realms strictly in order.
    pub max_concurrent_realms: usize,
    pub dry_run: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_concurrent_realms: 1,
            dry_run: false,
        }
    }
}

#[derive(Debug, Default)]
struct RealmResult {
    outcomes: Vec<SubConfigReport>,
    errors: Vec<PassError>,
}

/// Runs reconciliation passes over every realm of the deployment.
///
/// A pass is stateless: it re-reads the store from scratch, so the host may
/// call [`ReconciliationDriver::run_pass`] from any lifecycle point, as often
/// as it likes.
pub struct ReconciliationDriver<S: ConfigStore + 'static> {
    store: Arc<S>,
    tokens: Arc<dyn AdminTokenProvider>,
    policy: Arc<ReconcilePolicy>,
    guard: Arc<StoreCallGuard>,
    options: DriverOptions,
}

impl<S: ConfigStore + 'static> ReconciliationDriver<S> {
    pub fn new(store: Arc<S>, tokens: Arc<dyn AdminTokenProvider>, policy: ReconcilePolicy) -> Self {
        Self {
            store,
            tokens,
            policy: Arc::new(policy),
            guard: Arc::new(StoreCallGuard::default()),
            options: DriverOptions::default(),
        }
    }

    pub fn with_guard(mut self, guard: StoreCallGuard) -> Self {
        self.guard = Arc::new(guard);
        self
    }

    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Fails only when no realm list could be obtained; everything after that
    /// is recorded in the report.
    pub async fn run_pass(&self, trigger: Trigger) -> Result<PassReport> {
        let started_at = Utc::now();
        tracing::info!(
            trigger = %trigger,
            dry_run = self.options.dry_run,
            "Starting directory schema reconciliation pass"
        );

        let (token, realms) = match self.enumerate().await {
            Ok(enumerated) => enumerated,
            Err(e) => {
                tracing::error!(error = %e, "Realm enumeration failed, aborting pass");
                return Err(ReconcileError::RealmEnumeration {
                    source: Box::new(e),
                });
            }
        };

        let results = if self.options.max_concurrent_realms <= 1 {
            let mut results = Vec::with_capacity(realms.len());
            for realm in &realms {
                results.push(
                    process_realm(
                        self.store.as_ref(),
                        &self.guard,
                        &self.policy,
                        self.options.dry_run,
                        &token,
                        realm,
                    )
                    .await,
                );
            }
            results
        } else {
            self.process_concurrently(&realms, &token).await
        };

        let mut report = PassReport {
            trigger,
            dry_run: self.options.dry_run,
            started_at,
            finished_at: started_at,
            realms_processed: realms.len(),
            sub_configs_examined: 0,
            sub_configs_updated: 0,
            outcomes: Vec::new(),
            errors: Vec::new(),
        };
        for result in results {
            report.sub_configs_examined += result.outcomes.len();
            report.sub_configs_updated += result
                .outcomes
                .iter()
                .filter(|o| o.outcome.is_changed())
                .count();
            report.outcomes.extend(result.outcomes);
            report.errors.extend(result.errors);
        }
        report.finished_at = Utc::now();

        tracing::info!(
            realms = report.realms_processed,
            examined = report.sub_configs_examined,
            updated = report.sub_configs_updated,
            errors = report.errors.len(),
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    /// The token fetched here is shared read-only by every realm worker.
    async fn enumerate(&self) -> Result<(AdminToken, Vec<RealmId>)> {
        let token = self.tokens.admin_token().await?;
        let realms = list_realms(self.store.as_ref(), &self.guard, &token).await?;
        Ok((token, realms))
    }

    async fn process_concurrently(&self, realms: &[RealmId], token: &AdminToken) -> Vec<RealmResult> {
        let permits = Arc::new(Semaphore::new(
            self.options
                .max_concurrent_realms
                .min(Semaphore::MAX_PERMITS),
        ));
        let mut handles = Vec::with_capacity(realms.len());

        for realm in realms {
            let store = Arc::clone(&self.store);
            let guard = Arc::clone(&self.guard);
            let policy = Arc::clone(&self.policy);
            let permits = Arc::clone(&permits);
            let token = token.clone();
            let realm = realm.clone();
            let dry_run = self.options.dry_run;

            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                process_realm(store.as_ref(), &guard, &policy, dry_run, &token, &realm).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (handle, realm) in handles.into_iter().zip(realms) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::warn!(realm = %realm, error = %e, "Realm worker did not complete");
                    results.push(RealmResult {
                        outcomes: Vec::new(),
                        errors: vec![PassError {
                            realm: realm.clone(),
                            sub_config: None,
                            category: crate::utils::error::ErrorCategory::Internal,
                            message: e.to_string(),
                        }],
                    });
                }
            }
        }
        results
    }
}

async fn process_realm<S: ConfigStore + ?Sized>(
    store: &S,
    guard: &StoreCallGuard,
    policy: &ReconcilePolicy,
    dry_run: bool,
    token: &AdminToken,
    realm: &RealmId,
) -> RealmResult {
    let mut result = RealmResult::default();

    let locator = SubConfigLocator::new(store, guard, &policy.service_id);
    let located = match locator
        .find_sub_configurations(
            token,
            realm,
            &policy.sub_config_name_pattern,
            &policy.sub_config_type_pattern,
        )
        .await
    {
        Ok(located) => located,
        Err(e) => {
            tracing::warn!(realm = %realm, error = %e, "Skipping realm, sub-configurations unavailable");
            result.errors.push(PassError {
                realm: realm.clone(),
                sub_config: None,
                category: e.category(),
                message: e.to_string(),
            });
            return result;
        }
    };

    let reconciler = AttributeReconciler::new(store, guard, policy, dry_run);
    for LocatedSubConfig { name, handle } in located {
        let reconciled = match handle {
            Ok(sub_config) => reconciler.reconcile(token, &sub_config).await,
            Err(e) => Err(e),
        };
        match reconciled {
            Ok(report) => {
                if !report.outcome.is_changed() {
                    tracing::debug!(sub_config = %report.sub_config, "Sub-configuration already compliant");
                }
                result.outcomes.push(report);
            }
            Err(e) => {
                tracing::warn!(realm = %realm, sub_config = %name, error = %e, "Failed to reconcile sub-configuration");
                result.errors.push(PassError {
                    realm: realm.clone(),
                    sub_config: Some(name),
                    category: e.category(),
                    message: e.to_string(),
                });
            }
        }
    }

    result
}
