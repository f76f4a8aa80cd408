//! Group Installer (spec.md §4.5): resolves a plugin-group identifier to a
//! concrete group version, installs its mandatory members via the
//! resolver, and reports an aggregated outcome.

use crate::aggregate::merge_duplicate_groups;
use crate::discovery::DiscoverySource;
use crate::error::{Error, Result};
use crate::identity::{PluginGroupIdentifier, PluginIdentifier, VersionRequest};
use crate::resolver::Resolver;
use semver::Version;

pub struct GroupInstaller<'a> {
    sources: &'a [DiscoverySource],
    resolver: &'a Resolver,
}

impl<'a> GroupInstaller<'a> {
    pub fn new(sources: &'a [DiscoverySource], resolver: &'a Resolver) -> Self {
        Self { sources, resolver }
    }

    /// The resolver backing this installer, for callers (the Essentials
    /// Orchestrator) that need to inspect catalog state before deciding
    /// whether to install.
    pub fn resolver(&self) -> &Resolver {
        self.resolver
    }

    async fn all_groups(&self) -> Vec<crate::model::PluginGroup> {
        let mut groups = Vec::new();
        for source in self.sources {
            if let Some(group_discovery) = source.as_group_discovery() {
                match group_discovery.groups(None).await {
                    Ok(mut found) => groups.append(&mut found),
                    Err(e) => tracing::warn!(error = %e, "group discovery source failed"),
                }
            }
        }
        merge_duplicate_groups(groups)
    }

    /// Resolves `group_id` to a concrete group version and the mandatory
    /// members of `requested_name` ("all" for every mandatory member) within
    /// it, without installing anything. Returns the fully-qualified group ID
    /// actually used alongside the mandatory entries.
    ///
    /// Shared by [`Self::install_from_group`] and the Essentials
    /// Orchestrator, which needs the same member list to decide whether an
    /// install is even necessary before running one (spec.md §4.8).
    pub async fn mandatory_members(
        &self,
        requested_name: &str,
        group_id: &str,
    ) -> Result<(String, Vec<crate::model::PluginGroupPluginEntry>)> {
        let parsed = PluginGroupIdentifier::from_id(group_id).map_err(|_| Error::GroupNotFound(group_id.to_owned()))?;

        let groups = self.all_groups().await;
        let group = groups
            .into_iter()
            .find(|g| g.vendor == parsed.vendor && g.publisher == parsed.publisher && g.name == parsed.name)
            .ok_or_else(|| Error::GroupNotFound(group_id.to_owned()))?;

        let version_req = match &parsed.version {
            Some(v) => VersionRequest::parse(v).map_err(|_| Error::GroupNotFound(group_id.to_owned()))?,
            None => VersionRequest::Latest,
        };

        let available_versions: Vec<Version> = group.versions.keys().cloned().collect();
        let concrete_version = if version_req.is_latest() {
            group.recommended_version.clone()
        } else {
            version_req
                .resolve(&available_versions)
                .cloned()
                .ok_or_else(|| Error::GroupNotFound(group_id.to_owned()))?
        };

        let entries = group
            .versions
            .get(&concrete_version)
            .cloned()
            .ok_or_else(|| Error::GroupNotFound(group_id.to_owned()))?;

        let selected: Vec<_> = entries
            .into_iter()
            .filter(|e| requested_name == "all" || e.identifier.name == requested_name)
            .collect();

        if selected.is_empty() {
            return Err(Error::PluginNotInGroup {
                name: requested_name.to_owned(),
                group: group_id.to_owned(),
            });
        }

        let mandatory: Vec<_> = selected.into_iter().filter(|e| e.mandatory).collect();
        if mandatory.is_empty() {
            return Err(Error::NoMandatoryPluginsInGroup(group_id.to_owned()));
        }

        let resolved_id = PluginGroupIdentifier {
            vendor: parsed.vendor,
            publisher: parsed.publisher,
            name: parsed.name,
            version: Some(concrete_version.to_string()),
        };
        Ok((resolved_id.to_string(), mandatory))
    }

    /// Installs the mandatory entries of `requested_name` ("all" for every
    /// mandatory member) out of the group named by `group_id`. Returns the
    /// fully-qualified group ID actually used and the identifiers of the
    /// plugins that were successfully installed.
    pub async fn install_from_group(
        &self,
        requested_name: &str,
        group_id: &str,
    ) -> Result<(String, Vec<PluginIdentifier>)> {
        let (resolved_id, mandatory) = self.mandatory_members(requested_name, group_id).await?;

        let total = mandatory.len();
        let mut installed = Vec::new();
        let mut failed = 0;
        for entry in mandatory {
            let plugin_version_req = VersionRequest::parse(&entry.identifier.version).unwrap_or(VersionRequest::Latest);
            match self
                .resolver
                .install_standalone(&entry.identifier.name, &plugin_version_req, Some(entry.identifier.target))
                .await
            {
                Ok(identifier) => installed.push(identifier),
                Err(e) => {
                    tracing::warn!(plugin = %entry.identifier.name, error = %e, "group member install failed");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(Error::PartialGroupFailure {
                failed,
                total,
                group: group_id.to_owned(),
            });
        }

        Ok((resolved_id, installed))
    }
}
