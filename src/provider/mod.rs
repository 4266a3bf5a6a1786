//! Provider integration for the Stackwright provisioning system.
//!
//! The provider is the external system that actually creates, updates, and
//! deletes resources. The [`Provider`] trait is the seam the executor works
//! against; [`HttpProvider`] is the REST implementation.

// The generated mock carries no docs.
#![cfg_attr(test, allow(missing_docs))]

mod http;
mod types;

use async_trait::async_trait;

use crate::error::Result;
use crate::graph::ResourceKind;

pub use http::HttpProvider;
pub use types::{
    ApiErrorResponse, KindCapability, Outputs, PRIMARY_ID_OUTPUT, ResolvedAttrs,
    ResourceRequest, ResourceResponse, capability,
};

/// Operations a provider must support for each resource kind.
///
/// Every operation is idempotent per the provider's own contract and fails
/// with the transient/fatal classification in
/// [`ProviderError`](crate::error::ProviderError).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Creates a resource and returns its provider-assigned outputs.
    async fn create(&self, kind: ResourceKind, attributes: &ResolvedAttrs) -> Result<Outputs>;

    /// Updates a resource in place and returns its refreshed outputs.
    async fn update(
        &self,
        kind: ResourceKind,
        outputs: &Outputs,
        attributes: &ResolvedAttrs,
    ) -> Result<Outputs>;

    /// Deletes a resource.
    async fn delete(&self, kind: ResourceKind, outputs: &Outputs) -> Result<()>;
}
