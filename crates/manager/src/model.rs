//! Data model shared by discovery, aggregation, the catalog, and the
//! resolver: [`DiscoveredPlugin`], [`PluginGroup`], [`InstalledPluginInfo`],
//! and the [`Distribution`] capability a discovered plugin carries for
//! fetching its bytes.

use crate::identity::{PluginIdentifier, Target};
use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a plugin was scoped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    Standalone,
    Context,
}

/// The kind of source a `DiscoveredPlugin` came from. Cleared to `Mixed`
/// when a merge combines entries of different kinds (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryType {
    Oci,
    Rest,
    Local,
    Kubernetes,
    Mixed,
}

/// View-time installation status of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginStatus {
    NotInstalled,
    Installed,
    UpdateAvailable,
}

/// Describes one OS/arch-specific artifact for a specific version: either
/// an OCI image reference or a plain URI, plus its expected digest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub image: Option<String>,
    pub uri: Option<String>,
    pub digest: Option<String>,
}

/// The fetch capability a `DiscoveredPlugin` carries. Each discovery
/// implementation constructs the concrete distribution appropriate to its
/// kind (OCI image pull, HTTP GET, local file copy, in-cluster fetch).
#[async_trait]
pub trait Distribution: Send + Sync {
    /// Describe the artifact for `(version, os, arch)` without fetching it.
    async fn describe(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<ArtifactDescriptor>;

    /// Fetch the plugin binary bytes for `(version, os, arch)`.
    async fn fetch(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<bytes::Bytes>;

    /// Fetch the expected digest separately from the descriptor, when the
    /// source publishes it out of band (§4.3 post-download check).
    async fn fetch_digest(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<Option<String>>;

    /// Fetch a test-binary variant, used by sources that publish a
    /// separate artifact for pre-release validation.
    async fn fetch_test_binary(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<bytes::Bytes> {
        self.fetch(version, os, arch).await
    }
}

/// Sentinel OS/arch used by sources that publish one artifact per version
/// rather than distinguishing by OS/architecture (REST, Kubernetes). Such
/// an entry matches any `(os, arch)` lookup.
pub const ANY_OS: &str = "any";
pub const ANY_ARCH: &str = "any";

pub fn any_os() -> String {
    ANY_OS.to_owned()
}

pub fn any_arch() -> String {
    ANY_ARCH.to_owned()
}

/// Key identifying one artifact: a version plus the specific OS/arch it was
/// built for (spec.md §3: a distribution "given `(version, os, arch)` can
/// describe an artifact"). Sources that don't differentiate by arch key
/// their entries with [`ANY_OS`]/[`ANY_ARCH`].
pub type ArtifactKey = (Version, String, String);

/// Per-(version, os, arch) map of artifacts a distribution exposes, used
/// for merging (spec.md I5: first-seen wins on collision).
pub type VersionArtifacts = BTreeMap<ArtifactKey, ArtifactDescriptor>;

/// Looks up the artifact for an exact `(version, os, arch)` match, falling
/// back to a wildcard (`ANY_OS`/`ANY_ARCH`) entry for the version if no
/// exact match exists. Returns `None` when neither is present, which is the
/// signal the ARM64 fallback (§4.4 step 3) needs to distinguish "no
/// artifact for this arch" from "has one."
pub fn lookup_artifact(artifacts: &VersionArtifacts, version: &Version, os: &str, arch: &str) -> Option<ArtifactDescriptor> {
    artifacts
        .get(&(version.clone(), os.to_owned(), arch.to_owned()))
        .or_else(|| artifacts.get(&(version.clone(), ANY_OS.to_owned(), ANY_ARCH.to_owned())))
        .cloned()
}

/// The distinct versions an artifact map carries, independent of how many
/// OS/arch variants each has. `artifacts`'s keys are already sorted by
/// version first, so consecutive duplicates collapse under `dedup`.
pub fn distinct_versions(artifacts: &VersionArtifacts) -> Vec<Version> {
    let mut versions: Vec<Version> = artifacts.keys().map(|(v, _, _)| v.clone()).collect();
    versions.dedup();
    versions
}

/// A plugin discovered from one or more sources, already carrying a fetch
/// capability. This is the unit the aggregator merges and the resolver
/// filters.
pub struct DiscoveredPlugin {
    pub name: String,
    pub target: Target,
    pub recommended_version: Option<Version>,
    pub supported_versions: Vec<Version>,
    pub scope: Scope,
    pub context_name: String,
    pub discovery_type: Option<DiscoveryType>,
    pub source: String,
    pub status: PluginStatus,
    pub installed_version: Option<String>,
    pub optional: bool,
    pub distribution: std::sync::Arc<dyn Distribution>,
    /// Materialized per-version artifact map, used during merge; kept
    /// alongside `distribution` because merge must union across sources
    /// without re-querying them.
    pub version_artifacts: VersionArtifacts,
}

impl DiscoveredPlugin {
    pub fn identity_key(&self) -> (String, Target) {
        (self.name.clone(), self.target.normalized())
    }
}

/// A mandatory-or-optional member of a plugin group version.
#[derive(Debug, Clone)]
pub struct PluginGroupPluginEntry {
    pub identifier: PluginIdentifier,
    pub mandatory: bool,
}

/// A named, versioned bundle of plugin identifiers.
#[derive(Debug, Clone)]
pub struct PluginGroup {
    pub vendor: String,
    pub publisher: String,
    pub name: String,
    pub recommended_version: Version,
    pub description: String,
    /// Entries for each concrete group version this source knows about.
    pub versions: BTreeMap<Version, Vec<PluginGroupPluginEntry>>,
}

impl PluginGroup {
    pub fn key(&self) -> (String, String, String) {
        (self.vendor.clone(), self.publisher.clone(), self.name.clone())
    }
}

/// The authoritative record of one installed plugin, persisted in the
/// catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledPluginInfo {
    pub name: String,
    pub target: Target,
    pub version: String,
    pub installation_path: std::path::PathBuf,
    pub digest: String,
    #[serde(default)]
    pub discovered_recommended_version: Option<String>,
    pub scope: Scope,
    pub status: PluginStatus,
    #[serde(default)]
    pub discovery: String,
    #[serde(default)]
    pub default_feature_flags: BTreeMap<String, String>,
}

/// JSON payload a plugin binary's `info` subcommand must print to stdout,
/// per the plugin binary contract (spec.md §6). Unknown fields are kept so
/// that future plugin fields are preserved end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSelfDescription {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub default_feature_flags: BTreeMap<String, String>,
    #[serde(default)]
    pub completion_type: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}
