//! Generic REST discovery: queries an HTTP(S) endpoint for a JSON plugin
//! inventory document and fetches binaries over plain HTTP GET (spec.md
//! §4.1, "rest"; §6 endpoint scheme normalization happens one layer up, in
//! [`super::normalize_endpoint`]).

use crate::discovery::{Discovery, DiscoveryCriteria};
use crate::identity::Target;
use crate::model::{ArtifactDescriptor, DiscoveredPlugin, DiscoveryType, PluginStatus, Scope, VersionArtifacts};
use async_trait::async_trait;
use semver::Version;
use serde::Deserialize;
use std::sync::Arc;

/// One plugin entry as served by a REST discovery endpoint.
#[derive(Debug, Deserialize)]
struct RestPluginEntry {
    name: String,
    target: String,
    versions: Vec<RestVersionEntry>,
}

#[derive(Debug, Deserialize)]
struct RestVersionEntry {
    version: String,
    #[serde(default = "crate::model::any_os")]
    os: String,
    #[serde(default = "crate::model::any_arch")]
    arch: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    digest: Option<String>,
}

pub struct RestDiscovery {
    base_url: String,
    client: reqwest::Client,
}

impl RestDiscovery {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Discovery for RestDiscovery {
    async fn list(&self, criteria: Option<&DiscoveryCriteria>) -> anyhow::Result<Vec<DiscoveredPlugin>> {
        let url = format!("{}/plugins", self.base_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let entries: Vec<RestPluginEntry> = response.json().await?;

        let name_filter = criteria.and_then(|c| c.name.as_deref());

        let mut plugins = Vec::new();
        for entry in entries {
            if let Some(filter) = name_filter {
                if entry.name != filter {
                    continue;
                }
            }
            let target = Target::parse(&entry.target).unwrap_or(Target::Unknown);
            let mut version_artifacts: VersionArtifacts = Default::default();
            for v in entry.versions {
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
                name: entry.name,
                target,
                recommended_version,
                supported_versions,
                scope: Scope::Standalone,
                context_name: String::new(),
                discovery_type: Some(DiscoveryType::Rest),
                source: self.base_url.clone(),
                status: PluginStatus::NotInstalled,
                installed_version: None,
                optional: false,
                distribution: Arc::new(RestDistribution {
                    client: self.client.clone(),
                    artifacts: version_artifacts.clone(),
                }),
                version_artifacts,
            });
        }
        Ok(plugins)
    }

    fn name(&self) -> String {
        format!("rest:{}", self.base_url)
    }
}

struct RestDistribution {
    client: reqwest::Client,
    artifacts: VersionArtifacts,
}

impl RestDistribution {
    fn descriptor(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<ArtifactDescriptor> {
        let v = Version::parse(version.trim_start_matches('v'))?;
        crate::model::lookup_artifact(&self.artifacts, &v, os, arch)
            .ok_or_else(|| anyhow::anyhow!("no artifact for version {version} on {os}/{arch}"))
    }
}

#[async_trait]
impl crate::model::Distribution for RestDistribution {
    async fn describe(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<ArtifactDescriptor> {
        self.descriptor(version, os, arch)
    }

    async fn fetch(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<bytes::Bytes> {
        let descriptor = self.describe(version, os, arch).await?;
        let uri = descriptor
            .uri
            .ok_or_else(|| anyhow::anyhow!("artifact for {version} has no uri"))?;
        let response = self.client.get(&uri).send().await?.error_for_status()?;
        Ok(response.bytes().await?)
    }

    async fn fetch_digest(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<Option<String>> {
        Ok(self.describe(version, os, arch).await?.digest)
    }
}
