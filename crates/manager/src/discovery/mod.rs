//! Discovery adapters: normalize heterogeneous sources into the uniform
//! [`DiscoveredPlugin`]/[`PluginGroup`] records the aggregator and resolver
//! operate on (spec.md §4.1).
//!
//! `Discovery` and `GroupDiscovery` are capability sets, not a class
//! hierarchy: a concrete source implements whichever it actually supports.
//! Dispatch on source kind happens exactly once, at construction, via
//! [`DiscoverySource::build`] — callers never match on kind again.

pub mod kubernetes;
pub mod local;
pub mod oci;
pub mod rest;

use crate::config::DiscoverySourceConfig;
use crate::model::{DiscoveredPlugin, PluginGroup};
use async_trait::async_trait;

/// Optional filters pushed down to sources that support it; sources that
/// don't filter server-side return everything and rely on the caller (or
/// the aggregator) to filter client-side.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryCriteria {
    pub name: Option<String>,
    pub target: Option<crate::identity::Target>,
    pub version: Option<String>,
    pub os: Option<String>,
    pub arch: Option<String>,
}

/// A source of plugin metadata.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// List plugins matching `criteria`, or everything if `criteria` is
    /// `None`.
    async fn list(&self, criteria: Option<&DiscoveryCriteria>) -> anyhow::Result<Vec<DiscoveredPlugin>>;

    /// Human-readable identifier for error messages and provenance.
    fn name(&self) -> String;
}

/// A source that additionally carries a group catalog. Sources without
/// groups simply don't implement this trait; `DiscoverySource::groups`
/// returns empty for them.
#[async_trait]
pub trait GroupDiscovery: Send + Sync {
    async fn groups(&self, criteria: Option<&DiscoveryCriteria>) -> anyhow::Result<Vec<PluginGroup>>;
}

/// Tagged variant wrapping a concrete discovery implementation. The kind
/// is fixed at construction; everything downstream only ever calls the
/// `Discovery`/`GroupDiscovery` trait methods.
pub enum DiscoverySource {
    Oci(oci::OciDiscovery),
    Rest(rest::RestDiscovery),
    Local(local::LocalDiscovery),
    KubernetesPath(kubernetes::KubernetesDiscovery),
    KubernetesBytes(kubernetes::KubernetesDiscovery),
}

impl DiscoverySource {
    /// Builds the concrete discovery object for a configured source
    /// record. This is the one place source kind is dispatched on.
    pub fn build(config: &DiscoverySourceConfig, is_test_environment: bool) -> anyhow::Result<Self> {
        match config {
            DiscoverySourceConfig::Oci { image } => {
                Ok(DiscoverySource::Oci(oci::OciDiscovery::new(image.clone())))
            }
            DiscoverySourceConfig::Rest { base_url } => Ok(DiscoverySource::Rest(
                rest::RestDiscovery::new(normalize_endpoint(base_url, is_test_environment)?),
            )),
            DiscoverySourceConfig::Local { root } => {
                Ok(DiscoverySource::Local(local::LocalDiscovery::new(root.clone())))
            }
            DiscoverySourceConfig::KubernetesPath {
                kubeconfig_path,
                context_name,
            } => Ok(DiscoverySource::KubernetesPath(
                kubernetes::KubernetesDiscovery::from_path(kubeconfig_path.clone(), context_name.clone()),
            )),
            DiscoverySourceConfig::KubernetesBytes {
                kubeconfig_bytes,
                context_name,
            } => Ok(DiscoverySource::KubernetesBytes(
                kubernetes::KubernetesDiscovery::from_bytes(kubeconfig_bytes.clone(), context_name.clone()),
            )),
        }
    }

    pub fn as_discovery(&self) -> &dyn Discovery {
        match self {
            DiscoverySource::Oci(d) => d,
            DiscoverySource::Rest(d) => d,
            DiscoverySource::Local(d) => d,
            DiscoverySource::KubernetesPath(d) => d,
            DiscoverySource::KubernetesBytes(d) => d,
        }
    }

    pub fn as_group_discovery(&self) -> Option<&dyn GroupDiscovery> {
        match self {
            DiscoverySource::Oci(d) => Some(d),
            _ => None,
        }
    }
}

/// Endpoint scheme normalization for REST discoveries (spec.md §6): no
/// scheme becomes `https://`, an existing `http(s)://` is left alone, and
/// the test-environment flag disables rewriting entirely.
pub fn normalize_endpoint(raw: &str, is_test_environment: bool) -> anyhow::Result<String> {
    if is_test_environment {
        return Ok(raw.to_owned());
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        Ok(raw.to_owned())
    } else {
        Ok(format!("https://{raw}"))
    }
}
