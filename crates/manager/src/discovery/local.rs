//! Local filesystem discovery (spec.md §4.1, "local"), supporting both
//! layouts the spec calls out:
//!
//! - manifest-based: `<root>/manifest.yaml` (or `plugin_manifest.yaml`)
//!   listing plugins, each with its own per-plugin `plugin.yaml` describing
//!   versions, and binaries at
//!   `<root>/<target>/<name>/<version>/tanzu-<name>-<os>_<arch>[.exe]`.
//! - discovery-subdirectory: `<root>/discovery/<child>`, each `<child>` an
//!   independent local discovery root evaluated the same way.
//!
//! Grounded on the teacher's own manifest schema shape (`manifest.rs`:
//! per-package os/arch/url/sha256 entries) adapted to a filesystem rather
//! than a downloaded document.

use crate::discovery::{Discovery, DiscoveryCriteria};
use crate::identity::Target;
use crate::model::{ArtifactDescriptor, DiscoveredPlugin, DiscoveryType, PluginStatus, Scope, VersionArtifacts};
use async_trait::async_trait;
use plugin_common::sha256::hex_digest_from_file;
use semver::Version;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MANIFEST_NAMES: &[&str] = &["manifest.yaml", "plugin_manifest.yaml"];

#[derive(Debug, Deserialize)]
struct RootManifest {
    plugins: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PerPluginManifest {
    name: String,
    target: String,
    versions: Vec<String>,
}

pub struct LocalDiscovery {
    root: PathBuf,
}

impl LocalDiscovery {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn find_root_manifest(&self) -> Option<PathBuf> {
        MANIFEST_NAMES
            .iter()
            .map(|name| self.root.join(name))
            .find(|path| path.exists())
    }

    async fn list_manifest_layout(&self, manifest_path: PathBuf) -> anyhow::Result<Vec<DiscoveredPlugin>> {
        let raw = tokio::fs::read_to_string(&manifest_path).await?;
        let root_manifest: RootManifest = serde_yaml::from_str(&raw)?;

        let mut plugins = Vec::new();
        for plugin_name in root_manifest.plugins {
            let per_plugin_path = self.root.join(&plugin_name).join("plugin.yaml");
            let Ok(raw) = tokio::fs::read_to_string(&per_plugin_path).await else {
                continue;
            };
            let manifest: PerPluginManifest = serde_yaml::from_str(&raw)?;
            let target = Target::parse(&manifest.target).unwrap_or(Target::Unknown);

            let mut version_artifacts: VersionArtifacts = Default::default();
            for raw_version in &manifest.versions {
                let version = Version::parse(raw_version.trim_start_matches('v'))?;
                let binary_path = binary_path(&self.root, &target, &manifest.name, raw_version);
                if !binary_path.exists() {
                    continue;
                }
                let digest = hex_digest_from_file(&binary_path).ok();
                version_artifacts.insert(
                    (version, std::env::consts::OS.to_owned(), std::env::consts::ARCH.to_owned()),
                    ArtifactDescriptor {
                        image: None,
                        uri: Some(format!("file://{}", binary_path.display())),
                        digest,
                    },
                );
            }
            if version_artifacts.is_empty() {
                continue;
            }
            let supported_versions = crate::model::distinct_versions(&version_artifacts);
            let recommended_version = supported_versions.iter().max().cloned();

            plugins.push(DiscoveredPlugin {
                name: manifest.name,
                target,
                recommended_version,
                supported_versions,
                scope: Scope::Standalone,
                context_name: String::new(),
                discovery_type: Some(DiscoveryType::Local),
                source: self.root.display().to_string(),
                status: PluginStatus::NotInstalled,
                installed_version: None,
                optional: false,
                distribution: Arc::new(LocalDistribution {
                    artifacts: version_artifacts.clone(),
                }),
                version_artifacts,
            });
        }
        Ok(plugins)
    }

    async fn list_discovery_subdirectory_layout(&self) -> anyhow::Result<Vec<DiscoveredPlugin>> {
        let discovery_dir = self.root.join("discovery");
        let mut entries = tokio::fs::read_dir(&discovery_dir).await?;
        let mut plugins = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let child = LocalDiscovery::new(entry.path());
            plugins.extend(child.list(None).await?);
        }
        Ok(plugins)
    }
}

fn binary_path(root: &Path, target: &Target, name: &str, version: &str) -> PathBuf {
    let (os, arch) = (std::env::consts::OS, std::env::consts::ARCH);
    let suffix = if os == "windows" { ".exe" } else { "" };
    root.join(target.to_string())
        .join(name)
        .join(version)
        .join(format!("tanzu-{name}-{os}_{arch}{suffix}"))
}

#[async_trait]
impl Discovery for LocalDiscovery {
    async fn list(&self, criteria: Option<&DiscoveryCriteria>) -> anyhow::Result<Vec<DiscoveredPlugin>> {
        let mut plugins = if let Some(manifest_path) = self.find_root_manifest() {
            self.list_manifest_layout(manifest_path).await?
        } else if self.root.join("discovery").is_dir() {
            self.list_discovery_subdirectory_layout().await?
        } else {
            Vec::new()
        };

        if let Some(name) = criteria.and_then(|c| c.name.as_deref()) {
            plugins.retain(|p| p.name == name);
        }
        Ok(plugins)
    }

    fn name(&self) -> String {
        format!("local:{}", self.root.display())
    }
}

struct LocalDistribution {
    artifacts: VersionArtifacts,
}

impl LocalDistribution {
    fn descriptor(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<ArtifactDescriptor> {
        let v = Version::parse(version.trim_start_matches('v'))?;
        crate::model::lookup_artifact(&self.artifacts, &v, os, arch)
            .ok_or_else(|| anyhow::anyhow!("no artifact for version {version} on {os}/{arch}"))
    }
}

#[async_trait]
impl crate::model::Distribution for LocalDistribution {
    async fn describe(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<ArtifactDescriptor> {
        self.descriptor(version, os, arch)
    }

    async fn fetch(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<bytes::Bytes> {
        let descriptor = self.describe(version, os, arch).await?;
        let uri = descriptor
            .uri
            .ok_or_else(|| anyhow::anyhow!("artifact for {version} has no uri"))?;
        let path = uri
            .strip_prefix("file://")
            .ok_or_else(|| anyhow::anyhow!("local artifact uri {uri} is not a file:// uri"))?;
        let bytes = tokio::fs::read(path).await?;
        Ok(bytes::Bytes::from(bytes))
    }

    async fn fetch_digest(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<Option<String>> {
        Ok(self.describe(version, os, arch).await?.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_path_uses_current_os_arch() {
        let path = binary_path(Path::new("/root"), &Target::Kubernetes, "login", "v1.0.0");
        let expected_suffix = if std::env::consts::OS == "windows" { ".exe" } else { "" };
        assert_eq!(
            path,
            PathBuf::from(format!(
                "/root/kubernetes/login/v1.0.0/tanzu-login-{}_{}{}",
                std::env::consts::OS,
                std::env::consts::ARCH,
                expected_suffix
            ))
        );
    }
}
