//! Merges discovery output from multiple sources into one entry per
//! `(name, normalized target)`, per spec.md §4.2.
//!
//! Merge rules (I5 in spec.md §7 invariants):
//! - version artifact maps are unioned; on a version collision, the
//!   first-seen source wins
//! - `supported_versions` is recomputed from the unioned artifact map
//! - `recommended_version` is recomputed as the semver-max of
//!   `supported_versions`
//! - `discovery_type` becomes `Mixed` once two differently-typed entries
//!   merge
//! - `source` becomes `"a/b"` when the merged entries came from different
//!   sources
//! - `status` becomes `installed` if any merged entry reports `installed`
//! - `target` adopts the other entry's target when the kept entry's target
//!   is still `unknown`
//!
//! These functions are pure and must be deterministic and idempotent:
//! running the merge twice on its own output reproduces the same result.

use crate::identity::Target;
use crate::model::{DiscoveredPlugin, DiscoveryType, PluginGroup, PluginStatus};
use std::collections::BTreeMap;

/// Folds `plugins` down to one entry per `(name, normalized target)`.
/// Input order determines which source wins a version collision: earlier
/// entries in `plugins` take precedence.
pub fn merge_duplicate_plugins(plugins: Vec<DiscoveredPlugin>) -> Vec<DiscoveredPlugin> {
    let mut merged: BTreeMap<(String, Target), DiscoveredPlugin> = BTreeMap::new();

    for plugin in plugins {
        let key = plugin.identity_key();
        match merged.remove(&key) {
            None => {
                merged.insert(key, plugin);
            }
            Some(mut existing) => {
                for (key, descriptor) in plugin.version_artifacts {
                    existing.version_artifacts.entry(key).or_insert(descriptor);
                }
                existing.supported_versions = crate::model::distinct_versions(&existing.version_artifacts);
                existing.recommended_version = existing.supported_versions.iter().max().cloned();

                if existing.discovery_type != plugin.discovery_type {
                    existing.discovery_type = Some(DiscoveryType::Mixed);
                }
                if existing.installed_version.is_none() {
                    existing.installed_version = plugin.installed_version;
                }
                existing.optional = existing.optional && plugin.optional;

                if existing.source != plugin.source {
                    existing.source = format!("{}/{}", existing.source, plugin.source);
                }
                if plugin.status == PluginStatus::Installed {
                    existing.status = PluginStatus::Installed;
                }
                if existing.target == Target::Unknown {
                    existing.target = plugin.target;
                }

                merged.insert(key, existing);
            }
        }
    }

    merged.into_values().collect()
}

/// Folds `groups` down to one entry per `(vendor, publisher, name)`,
/// unioning each group's per-version member lists.
pub fn merge_duplicate_groups(groups: Vec<PluginGroup>) -> Vec<PluginGroup> {
    let mut merged: BTreeMap<(String, String, String), PluginGroup> = BTreeMap::new();

    for group in groups {
        let key = group.key();
        match merged.remove(&key) {
            None => {
                merged.insert(key, group);
            }
            Some(mut existing) => {
                for (version, entries) in group.versions {
                    existing.versions.entry(version).or_insert(entries);
                }
                if group.recommended_version > existing.recommended_version {
                    existing.recommended_version = group.recommended_version;
                }
                merged.insert(key, existing);
            }
        }
    }

    merged.into_values().collect()
}

/// Removes discovered entries superseded by an already-installed plugin of
/// the same identity and an equal-or-newer version, leaving context sync
/// (spec.md §4.4/§5) free to skip plugins that are already current. A
/// discovered entry with no installed counterpart, or with a newer
/// recommended version than what's installed, is kept.
pub fn remove_old_plugins_when_duplicates(plugins: Vec<DiscoveredPlugin>) -> Vec<DiscoveredPlugin> {
    plugins
        .into_iter()
        .filter(|plugin| {
            let (Some(installed), Some(recommended)) =
                (plugin.installed_version.as_deref(), plugin.recommended_version.as_ref())
            else {
                return true;
            };
            match semver::Version::parse(installed.trim_start_matches('v')) {
                Ok(installed_version) => recommended > &installed_version,
                Err(_) => true,
            }
        })
        .collect()
}
