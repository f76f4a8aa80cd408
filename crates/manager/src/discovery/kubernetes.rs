//! Kubernetes discovery: lists a `CLIPlugin` custom resource in a cluster
//! reached either via a kubeconfig file path or raw kubeconfig bytes
//! (spec.md §4.1, "kubernetes" — two concrete variants sharing one listing
//! implementation).
//!
//! Grounded on `n-takatsu-mcp-rs`'s `kube`/`k8s-openapi`/`schemars`
//! `CustomResource` derive pattern (`operator/crd.rs`) and its `Api::all`
//! cluster-wide listing (`operator/mcpserver.rs`).

use crate::discovery::{Discovery, DiscoveryCriteria};
use crate::identity::Target;
use crate::model::{ArtifactDescriptor, DiscoveredPlugin, DiscoveryType, PluginStatus, Scope, VersionArtifacts};
use async_trait::async_trait;
use kube::{Api, Client, CustomResource};
use schemars::JsonSchema;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The `cliplugins.plugins.example.com/v1alpha1` custom resource a cluster
/// publishes to advertise installable plugins.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "plugins.example.com",
    version = "v1alpha1",
    kind = "CLIPlugin",
    plural = "cliplugins",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct CLIPluginSpec {
    pub target: String,
    pub versions: Vec<CLIPluginVersion>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CLIPluginVersion {
    pub version: String,
    #[serde(default = "crate::model::any_os")]
    pub os: String,
    #[serde(default = "crate::model::any_arch")]
    pub arch: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
}

enum Source {
    Path { kubeconfig_path: String },
    Bytes { kubeconfig_bytes: Vec<u8> },
}

pub struct KubernetesDiscovery {
    source: Source,
    context_name: String,
}

impl KubernetesDiscovery {
    pub fn from_path(kubeconfig_path: String, context_name: String) -> Self {
        Self {
            source: Source::Path { kubeconfig_path },
            context_name,
        }
    }

    pub fn from_bytes(kubeconfig_bytes: Vec<u8>, context_name: String) -> Self {
        Self {
            source: Source::Bytes { kubeconfig_bytes },
            context_name,
        }
    }

    async fn client(&self) -> anyhow::Result<Client> {
        let kubeconfig = match &self.source {
            Source::Path { kubeconfig_path } => {
                kube::config::Kubeconfig::read_from(kubeconfig_path)?
            }
            Source::Bytes { kubeconfig_bytes } => {
                let raw = std::str::from_utf8(kubeconfig_bytes)?;
                serde_yaml::from_str(raw)?
            }
        };
        let options = kube::config::KubeConfigOptions {
            context: Some(self.context_name.clone()),
            ..Default::default()
        };
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?;
        Ok(Client::try_from(config)?)
    }
}

#[async_trait]
impl Discovery for KubernetesDiscovery {
    async fn list(&self, criteria: Option<&DiscoveryCriteria>) -> anyhow::Result<Vec<DiscoveredPlugin>> {
        let client = self.client().await?;
        let api: Api<CLIPlugin> = Api::all(client);
        let list = api.list(&Default::default()).await?;

        let name_filter = criteria.and_then(|c| c.name.as_deref());
        let mut plugins = Vec::new();
        for item in list.items {
            let name = item
                .metadata
                .name
                .clone()
                .ok_or_else(|| anyhow::anyhow!("CLIPlugin resource is missing a name"))?;
            if let Some(filter) = name_filter {
                if name != filter {
                    continue;
                }
            }
            let target = Target::parse(&item.spec.target).unwrap_or(Target::Unknown);

            let mut version_artifacts: VersionArtifacts = Default::default();
            for v in item.spec.versions {
                let version = Version::parse(v.version.trim_start_matches('v'))?;
                version_artifacts.insert(
                    (version, v.os, v.arch),
                    ArtifactDescriptor {
                        image: v.image,
                        uri: v.uri,
                        digest: v.digest,
                    },
                );
            }
            let supported_versions = crate::model::distinct_versions(&version_artifacts);
            let recommended_version = supported_versions.iter().max().cloned();

            plugins.push(DiscoveredPlugin {
                name,
                target,
                recommended_version,
                supported_versions,
                scope: Scope::Context,
                context_name: self.context_name.clone(),
                discovery_type: Some(DiscoveryType::Kubernetes),
                source: self.context_name.clone(),
                status: PluginStatus::NotInstalled,
                installed_version: None,
                optional: false,
                distribution: Arc::new(KubernetesDistribution {
                    artifacts: version_artifacts.clone(),
                }),
                version_artifacts,
            });
        }
        Ok(plugins)
    }

    fn name(&self) -> String {
        format!("kubernetes:{}", self.context_name)
    }
}

struct KubernetesDistribution {
    artifacts: VersionArtifacts,
}

impl KubernetesDistribution {
    fn descriptor(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<ArtifactDescriptor> {
        let v = Version::parse(version.trim_start_matches('v'))?;
        crate::model::lookup_artifact(&self.artifacts, &v, os, arch)
            .ok_or_else(|| anyhow::anyhow!("no artifact for version {version} on {os}/{arch}"))
    }
}

#[async_trait]
impl crate::model::Distribution for KubernetesDistribution {
    async fn describe(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<ArtifactDescriptor> {
        self.descriptor(version, os, arch)
    }

    async fn fetch(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<bytes::Bytes> {
        let descriptor = self.describe(version, os, arch).await?;
        let uri = descriptor
            .uri
            .ok_or_else(|| anyhow::anyhow!("artifact for {version} has no uri"))?;
        let response = reqwest::get(&uri).await?.error_for_status()?;
        Ok(response.bytes().await?)
    }

    async fn fetch_digest(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<Option<String>> {
        Ok(self.describe(version, os, arch).await?.digest)
    }
}
