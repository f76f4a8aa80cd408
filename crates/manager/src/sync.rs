//! Context Reconciler (`SyncPlugins`, spec.md §4.7): walks every active
//! context, discovers the plugins it recommends, and drives the resolver
//! to converge installed state with that recommendation.
//!
//! Context iteration order follows `ConfigurationService::active_context_names`
//! verbatim (spec.md §5 ordering guarantee; the "two contexts install the
//! same plugin" ambiguity in §9's open questions is resolved by this
//! ordering — see the decision recorded in SPEC_FULL.md §12).

use crate::aggregate::remove_old_plugins_when_duplicates;
use crate::config::{ActiveContext, ConfigurationService, ContextKind, DiscoverySourceConfig};
use crate::discovery::{normalize_endpoint, DiscoveryCriteria, DiscoverySource};
use crate::identity::{Target, VersionRequest};
use crate::model::{DiscoveryType, Scope};
use crate::resolver::Resolver;
use std::sync::Arc;

const TANZU_KUBECONFIG_FLAG: &str = "tanzu-context-kubeconfig";

pub struct ContextReconciler {
    config: Arc<dyn ConfigurationService>,
    resolver: Resolver,
}

impl ContextReconciler {
    pub fn new(config: Arc<dyn ConfigurationService>, resolver: Resolver) -> Self {
        Self { config, resolver }
    }

    /// The resolver backing this reconciler, for callers that need to
    /// describe or delete plugins after a sync without constructing their
    /// own.
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Builds the effective discovery source list for one context:
    /// context-declared sources unioned with the type-derived default.
    fn effective_sources(&self, context: &ActiveContext) -> Vec<DiscoverySourceConfig> {
        let mut sources = context.discovery_sources.clone();
        match context.kind {
            ContextKind::Kubernetes => {
                if let Some(path) = &context.kubeconfig_path {
                    sources.push(DiscoverySourceConfig::KubernetesPath {
                        kubeconfig_path: path.clone(),
                        context_name: context.name.clone(),
                    });
                }
            }
            ContextKind::MissionControl => {
                if let Some(endpoint) = &context.endpoint {
                    let base_url = format!("{endpoint}/v1alpha1/system/binaries/plugins");
                    sources.push(DiscoverySourceConfig::Rest { base_url });
                }
            }
            ContextKind::Tanzu => {
                if self.config.feature_flag(TANZU_KUBECONFIG_FLAG) {
                    if let Some(path) = &context.kubeconfig_path {
                        sources.push(DiscoverySourceConfig::KubernetesBytes {
                            kubeconfig_bytes: std::fs::read(path).unwrap_or_default(),
                            context_name: context.name.clone(),
                        });
                    }
                }
            }
        }
        sources
    }

    fn target_for(&self, kind: ContextKind) -> Target {
        match kind {
            ContextKind::Kubernetes => Target::Kubernetes,
            ContextKind::MissionControl => Target::MissionControl,
            ContextKind::Tanzu => Target::Kubernetes,
        }
    }

    /// Walks every active context in configured order and reconciles
    /// installed state to match each context's recommendations. Per-plugin
    /// failures don't stop the loop; they're aggregated into one error.
    pub async fn sync_plugins(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        for context_name in self.config.active_context_names() {
            let Some(context) = self.config.active_context(&context_name) else {
                continue;
            };
            let is_test_environment = self.config.is_test_environment();
            let configs = self.effective_sources(&context);

            let mut plugins = Vec::new();
            for config in &configs {
                let config = normalize_source(config, is_test_environment);
                let source = match DiscoverySource::build(&config, is_test_environment) {
                    Ok(source) => source,
                    Err(e) => {
                        errors.push(format!("context {context_name}: {e}"));
                        continue;
                    }
                };
                let criteria = DiscoveryCriteria::default();
                match source.as_discovery().list(Some(&criteria)).await {
                    Ok(mut found) => {
                        for plugin in &mut found {
                            plugin.scope = Scope::Context;
                            plugin.context_name = context_name.clone();
                            if plugin.discovery_type.is_none() {
                                plugin.discovery_type = Some(discovery_type_for(&config));
                            }
                        }
                        plugins.extend(found);
                    }
                    Err(e) => errors.push(format!("context {context_name}: {e}")),
                }
            }

            let target = self.target_for(context.kind);
            let deduped = remove_old_plugins_when_duplicates(plugins);

            for plugin in deduped {
                let Some(version) = plugin.recommended_version.clone() else {
                    continue;
                };
                let version_req = VersionRequest::Full(version);
                if let Err(e) = self
                    .resolver
                    .install_from_context(&plugin.name, &version_req, Some(target), &context_name)
                    .await
                {
                    errors.push(format!("{}@{}: {e}", plugin.name, context_name));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("sync failed for {} plugin(s): {}", errors.len(), errors.join("; ")))
        }
    }
}

fn normalize_source(config: &DiscoverySourceConfig, is_test_environment: bool) -> DiscoverySourceConfig {
    match config {
        DiscoverySourceConfig::Rest { base_url } => DiscoverySourceConfig::Rest {
            base_url: normalize_endpoint(base_url, is_test_environment).unwrap_or_else(|_| base_url.clone()),
        },
        other => other.clone(),
    }
}

fn discovery_type_for(config: &DiscoverySourceConfig) -> DiscoveryType {
    match config {
        DiscoverySourceConfig::Oci { .. } => DiscoveryType::Oci,
        DiscoverySourceConfig::Rest { .. } => DiscoveryType::Rest,
        DiscoverySourceConfig::Local { .. } => DiscoveryType::Local,
        DiscoverySourceConfig::KubernetesPath { .. } | DiscoverySourceConfig::KubernetesBytes { .. } => {
            DiscoveryType::Kubernetes
        }
    }
}
