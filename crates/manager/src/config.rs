//! The persistent user configuration store is an external collaborator
//! (spec.md §1, §6): a read-mostly key/value service owning active
//! contexts, the discovery source list, the trusted-registry list, and
//! feature flags. This module defines the trait the core consumes and an
//! in-memory implementation used by tests and as a reference.

use std::collections::BTreeMap;

/// The kind of backend a context targets, mirroring `Target` but scoped to
/// configuration (a context has no `unknown`/`global` variant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Kubernetes,
    MissionControl,
    Tanzu,
}

/// One configured active context.
#[derive(Debug, Clone)]
pub struct ActiveContext {
    pub name: String,
    pub kind: ContextKind,
    /// Kubeconfig path, for `Kubernetes`/`Tanzu` contexts.
    pub kubeconfig_path: Option<String>,
    /// Endpoint host (no scheme required), for `MissionControl` contexts.
    pub endpoint: Option<String>,
    /// Extra discovery sources declared directly on the context.
    pub discovery_sources: Vec<DiscoverySourceConfig>,
}

/// One configured discovery source, as read from configuration.
#[derive(Debug, Clone)]
pub enum DiscoverySourceConfig {
    Oci { image: String },
    Rest { base_url: String },
    Local { root: std::path::PathBuf },
    KubernetesPath { kubeconfig_path: String, context_name: String },
    KubernetesBytes { kubeconfig_bytes: Vec<u8>, context_name: String },
}

/// Read-only accessors for the configuration service, plus the single
/// write path the core needs (default feature flag reconciliation).
pub trait ConfigurationService: Send + Sync {
    /// Names of currently active contexts, in caller-controlled order
    /// (spec.md §5 ordering guarantee: sync processes contexts in this
    /// order without re-sorting).
    fn active_context_names(&self) -> Vec<String>;

    /// Look up one active context by name.
    fn active_context(&self, name: &str) -> Option<ActiveContext>;

    /// CLI-wide discovery source list, independent of any context.
    fn discovery_sources(&self) -> Vec<DiscoverySourceConfig>;

    /// Registry image prefixes trusted for pre-download verification.
    fn trusted_registries(&self) -> Vec<String>;

    /// Non-registry URI prefixes trusted for pre-download verification.
    fn trusted_uri_prefixes(&self) -> Vec<String>;

    /// Whether a named feature flag is enabled.
    fn feature_flag(&self, name: &str) -> bool;

    /// Essentials plugin group name/version env overrides.
    fn essentials_group(&self) -> (String, String);

    /// True when running under the test-environment flag (disables https
    /// scheme enforcement for REST discovery endpoints).
    fn is_test_environment(&self) -> bool;

    /// Optional custom image repository override, substituted into OCI
    /// discovery image references when set.
    fn custom_image_repository(&self) -> Option<String>;

    /// Comma-separated, whitespace-tolerant list of additional
    /// test-discovery images.
    fn additional_test_discovery_images(&self) -> Vec<String>;

    /// Reconcile default feature flags for a newly installed plugin,
    /// skipping keys that already exist.
    fn reconcile_default_feature_flags(&self, plugin_name: &str, flags: &BTreeMap<String, String>);
}

/// In-memory implementation for tests and as a drop-in default.
#[derive(Default)]
pub struct InMemoryConfigurationService {
    pub contexts: Vec<ActiveContext>,
    pub sources: Vec<DiscoverySourceConfig>,
    pub trusted_registries: Vec<String>,
    pub trusted_uri_prefixes: Vec<String>,
    pub feature_flags: BTreeMap<String, bool>,
    pub essentials_name: String,
    pub essentials_version: String,
    pub test_environment: bool,
    pub custom_image_repository: Option<String>,
    pub additional_test_discovery_images: Vec<String>,
    pub reconciled_flags: std::sync::Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

impl ConfigurationService for InMemoryConfigurationService {
    fn active_context_names(&self) -> Vec<String> {
        self.contexts.iter().map(|c| c.name.clone()).collect()
    }

    fn active_context(&self, name: &str) -> Option<ActiveContext> {
        self.contexts.iter().find(|c| c.name == name).cloned()
    }

    fn discovery_sources(&self) -> Vec<DiscoverySourceConfig> {
        self.sources.clone()
    }

    fn trusted_registries(&self) -> Vec<String> {
        self.trusted_registries.clone()
    }

    fn trusted_uri_prefixes(&self) -> Vec<String> {
        self.trusted_uri_prefixes.clone()
    }

    fn feature_flag(&self, name: &str) -> bool {
        self.feature_flags.get(name).copied().unwrap_or(false)
    }

    fn essentials_group(&self) -> (String, String) {
        (self.essentials_name.clone(), self.essentials_version.clone())
    }

    fn is_test_environment(&self) -> bool {
        self.test_environment
    }

    fn custom_image_repository(&self) -> Option<String> {
        self.custom_image_repository.clone()
    }

    fn additional_test_discovery_images(&self) -> Vec<String> {
        self.additional_test_discovery_images.clone()
    }

    fn reconcile_default_feature_flags(&self, plugin_name: &str, flags: &BTreeMap<String, String>) {
        let mut reconciled = self.reconciled_flags.lock().unwrap();
        let entry = reconciled.entry(plugin_name.to_owned()).or_default();
        for (k, v) in flags {
            entry.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

/// Parses a comma-separated, whitespace-tolerant env value into a list of
/// non-empty entries. Shared by `additional_test_discovery_images`-style
/// configuration reads.
pub fn parse_comma_separated(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_separated_is_whitespace_tolerant() {
        let parsed = parse_comma_separated(" a , b ,,c");
        assert_eq!(parsed, vec!["a", "b", "c"]);
    }

    #[test]
    fn reconcile_skips_existing_keys() {
        let svc = InMemoryConfigurationService::default();
        let mut flags = BTreeMap::new();
        flags.insert("beta".to_owned(), "true".to_owned());
        svc.reconcile_default_feature_flags("login", &flags);

        let mut flags2 = BTreeMap::new();
        flags2.insert("beta".to_owned(), "false".to_owned());
        svc.reconcile_default_feature_flags("login", &flags2);

        let reconciled = svc.reconciled_flags.lock().unwrap();
        assert_eq!(reconciled["login"]["beta"], "true");
    }
}
