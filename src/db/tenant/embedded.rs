use async_trait::async_trait;

use super::provision::{TenantProvisioner, TenantReconciler};
use super::{ProvisionReport, TenantError, TenantId, TenantOutcome};

/// Provisioning for the single-file backend. There are no namespaces to
/// create, so every call reports an empty success once the name is valid.
pub struct EmbeddedTenants;

impl EmbeddedTenants {
    fn noop(raw: &str) -> Result<ProvisionReport, TenantError> {
        let tenant = TenantId::parse(raw)?;
        tracing::debug!(tenant = %tenant, "Embedded backend: no tenant schema to manage");
        Ok(ProvisionReport::new(&tenant))
    }
}

#[async_trait]
impl TenantProvisioner for EmbeddedTenants {
    async fn provision(&self, tenant: &str) -> Result<ProvisionReport, TenantError> {
        Self::noop(tenant)
    }
}

#[async_trait]
impl TenantReconciler for EmbeddedTenants {
    async fn reconcile(&self, tenant: &str) -> Result<ProvisionReport, TenantError> {
        Self::noop(tenant)
    }

    async fn reconcile_all(&self) -> Result<Vec<TenantOutcome>, TenantError> {
        Ok(Vec::new())
    }
}
