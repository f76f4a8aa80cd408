//! OCI inventory discovery: pulls a small artifact containing a SQLite
//! inventory database from a registry image, caches it locally, and answers
//! `list`/`groups` by querying the cached database (spec.md §4.1, "oci").
//!
//! Grounded on the teacher's own `spin-oci` client (`oci_distribution::Client`
//! construction and config) and its `spin-sqlite-inproc` crate's use of
//! `rusqlite` with the `bundled` feature for an in-process database.

use crate::discovery::{Discovery, DiscoveryCriteria, GroupDiscovery};
use crate::identity::{PluginGroupIdentifier, PluginIdentifier, Target};
use crate::model::{
    ArtifactDescriptor, DiscoveredPlugin, DiscoveryType, PluginGroup, PluginGroupPluginEntry, PluginStatus,
    Scope, VersionArtifacts,
};
use async_trait::async_trait;
use oci_distribution::{client::ClientConfig, secrets::RegistryAuth, Client, Reference};
use plugin_common::cache_dir::cache_dir;
use rusqlite::Connection;
use semver::Version;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Discovers plugins and groups from an OCI-hosted inventory image.
pub struct OciDiscovery {
    image: String,
}

impl OciDiscovery {
    pub fn new(image: String) -> Self {
        Self { image }
    }

    fn cache_path(&self) -> anyhow::Result<PathBuf> {
        let digest_name = plugin_common::sha256::hex_digest_from_bytes(self.image.as_bytes());
        Ok(cache_dir()?.join("oci-inventory").join(format!("{digest_name}.db")))
    }

    /// Pulls the inventory artifact if not already cached, returning the
    /// local path to the SQLite database.
    async fn ensure_cached(&self) -> anyhow::Result<PathBuf> {
        let path = self.cache_path()?;
        if path.exists() {
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let reference: Reference = self.image.parse()?;
        let mut client = Client::new(ClientConfig {
            protocol: oci_distribution::client::ClientProtocol::Https,
            ..Default::default()
        });
        let auth = RegistryAuth::Anonymous;
        let image_data = client
            .pull(&reference, &auth, vec!["application/octet-stream"])
            .await?;
        let layer = image_data
            .layers
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("inventory image {} has no layers", self.image))?;

        tokio::fs::write(&path, layer.data).await?;
        Ok(path)
    }

    fn open(path: &PathBuf) -> anyhow::Result<Connection> {
        Ok(Connection::open(path)?)
    }
}

#[async_trait]
impl Discovery for OciDiscovery {
    async fn list(&self, criteria: Option<&DiscoveryCriteria>) -> anyhow::Result<Vec<DiscoveredPlugin>> {
        let path = self.ensure_cached().await?;
        let image = self.image.clone();
        let name_filter = criteria.and_then(|c| c.name.clone());

        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<DiscoveredPlugin>> {
            let conn = Self::open(&path)?;
            let mut stmt = conn.prepare(
                "SELECT name, target, version, os, arch, image, uri, digest FROM plugin_versions \
                 WHERE (?1 IS NULL OR name = ?1)",
            )?;
            let mut rows = stmt.query(rusqlite::params![name_filter])?;

            let mut by_identity: BTreeMap<(String, Target), VersionArtifacts> = BTreeMap::new();
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                let target_raw: String = row.get(1)?;
                let version_raw: String = row.get(2)?;
                let os: String = row.get(3)?;
                let arch: String = row.get(4)?;
                let image_ref: Option<String> = row.get(5)?;
                let uri: Option<String> = row.get(6)?;
                let digest: Option<String> = row.get(7)?;

                let target = Target::parse(&target_raw).unwrap_or(Target::Unknown);
                let version = Version::parse(version_raw.trim_start_matches('v'))?;
                by_identity.entry((name, target)).or_default().insert(
                    (version, os, arch),
                    ArtifactDescriptor {
                        image: image_ref,
                        uri,
                        digest,
                    },
                );
            }

            let mut plugins = Vec::new();
            for ((name, target), version_artifacts) in by_identity {
                let supported_versions = crate::model::distinct_versions(&version_artifacts);
                let recommended_version = supported_versions.iter().max().cloned();

                plugins.push(DiscoveredPlugin {
                    name,
                    target,
                    recommended_version,
                    supported_versions,
                    scope: Scope::Standalone,
                    context_name: String::new(),
                    discovery_type: Some(DiscoveryType::Oci),
                    source: image.clone(),
                    status: PluginStatus::NotInstalled,
                    installed_version: None,
                    optional: false,
                    distribution: Arc::new(OciDistribution {
                        artifacts: version_artifacts.clone(),
                    }),
                    version_artifacts,
                });
            }
            Ok(plugins)
        })
        .await?
    }

    fn name(&self) -> String {
        format!("oci:{}", self.image)
    }
}

#[async_trait]
impl GroupDiscovery for OciDiscovery {
    async fn groups(&self, _criteria: Option<&DiscoveryCriteria>) -> anyhow::Result<Vec<PluginGroup>> {
        let path = self.ensure_cached().await?;
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<PluginGroup>> {
            let conn = Self::open(&path)?;
            let mut stmt = conn.prepare(
                "SELECT group_id, version, plugin_name, plugin_target, mandatory, description \
                 FROM plugin_group_members",
            )?;
            let mut rows = stmt.query([])?;

            let mut groups: BTreeMap<(String, String, String), PluginGroup> = BTreeMap::new();
            while let Some(row) = rows.next()? {
                let group_id: String = row.get(0)?;
                let version_raw: String = row.get(1)?;
                let plugin_name: String = row.get(2)?;
                let plugin_target_raw: String = row.get(3)?;
                let mandatory: bool = row.get(4)?;
                let description: String = row.get(5)?;

                let gid = PluginGroupIdentifier::from_id(&group_id)?;
                let version = Version::parse(version_raw.trim_start_matches('v'))?;
                let target = Target::parse(&plugin_target_raw).unwrap_or(Target::Unknown);

                let key = (gid.vendor.clone(), gid.publisher.clone(), gid.name.clone());
                let group = groups.entry(key).or_insert_with(|| PluginGroup {
                    vendor: gid.vendor.clone(),
                    publisher: gid.publisher.clone(),
                    name: gid.name.clone(),
                    recommended_version: version.clone(),
                    description: description.clone(),
                    versions: BTreeMap::new(),
                });
                if version > group.recommended_version {
                    group.recommended_version = version.clone();
                }
                group.versions.entry(version).or_default().push(PluginGroupPluginEntry {
                    identifier: PluginIdentifier::new(plugin_name, target, ""),
                    mandatory,
                });
            }
            Ok(groups.into_values().collect())
        })
        .await?
    }
}

struct OciDistribution {
    artifacts: VersionArtifacts,
}

#[async_trait]
impl crate::model::Distribution for OciDistribution {
    async fn describe(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<ArtifactDescriptor> {
        let v = Version::parse(version.trim_start_matches('v'))?;
        crate::model::lookup_artifact(&self.artifacts, &v, os, arch)
            .ok_or_else(|| anyhow::anyhow!("no artifact for version {version} on {os}/{arch}"))
    }

    async fn fetch(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<bytes::Bytes> {
        let descriptor = self.describe(version, os, arch).await?;
        let image = descriptor
            .image
            .ok_or_else(|| anyhow::anyhow!("artifact for {version} has no image reference"))?;
        let reference: Reference = image.parse()?;
        let mut client = Client::new(ClientConfig::default());
        let image_data = client
            .pull(&reference, &RegistryAuth::Anonymous, vec!["application/octet-stream"])
            .await?;
        let layer = image_data
            .layers
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("plugin image {image} has no layers"))?;
        Ok(bytes::Bytes::from(layer.data))
    }

    async fn fetch_digest(&self, version: &str, os: &str, arch: &str) -> anyhow::Result<Option<String>> {
        Ok(self.describe(version, os, arch).await?.digest)
    }
}
