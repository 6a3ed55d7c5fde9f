//! Services the orchestrator needs from its host environment.

use async_trait::async_trait;

use crate::error::SearchError;
use crate::resource::ResourceId;
use crate::types::QueryKind;

/// Resource-level checks backed by the host's filesystem layer.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    /// Whether `resource` currently exists. Missing folder roots are dropped from a query.
    async fn exists(&self, resource: &ResourceId) -> bool;

    /// Whether any resource provider can read `scheme`. Must not block.
    fn has_provider(&self, scheme: &str) -> bool;
}

/// Readiness hook awaited before providers are looked up.
///
/// Hosts that install providers lazily use this to make the providers for
/// `schemes` available. Errors are diagnostic only; the search goes on.
#[async_trait]
pub trait ProviderActivation: Send + Sync {
    async fn activate(&self, kind: QueryKind, schemes: &[String]) -> Result<(), SearchError>;
}

/// Activation for hosts whose providers are registered up front.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoActivation;

#[async_trait]
impl ProviderActivation for NoActivation {
    async fn activate(&self, _kind: QueryKind, _schemes: &[String]) -> Result<(), SearchError> {
        Ok(())
    }
}
