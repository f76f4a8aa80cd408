//! Resolver & Installer (spec.md §4.4): turns a `(name, target, version)`
//! request into one chosen [`DiscoveredPlugin`], verifies and fetches its
//! bytes, writes a content-addressed binary, and records the result in the
//! catalog.
//!
//! Grounded on the teacher's own `PluginInstaller`/`PluginManager`
//! (`install.rs`, `manager.rs`): content-addressed storage under a
//! per-plugin subdirectory, locking only across the catalog upsert, and a
//! tolerant post-install step.

use crate::aggregate::merge_duplicate_plugins;
use crate::arch_fallback;
use crate::catalog::Catalog;
use crate::config::ConfigurationService;
use crate::discovery::{DiscoveryCriteria, DiscoverySource};
use crate::error::{Error, NotFoundError, Result};
use crate::identity::{PluginIdentifier, Target, VersionRequest};
use crate::model::{lookup_artifact, DiscoveredPlugin, InstalledPluginInfo, PluginSelfDescription, PluginStatus, Scope};
use crate::progress::ProgressSink;
use crate::telemetry::TelemetryHook;
use crate::trust::TrustVerifier;
use plugin_common::ui::quoted_path;
use semver::Version;
use std::path::PathBuf;
use std::sync::Arc;

/// Roots the content-addressed plugin-binary store at `<cache_dir>/plugins/`.
pub struct BinaryStore {
    root: PathBuf,
}

impl BinaryStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// `<root>/<name>/{version}_{digest}_{target}[.exe]`, per I3.
    pub fn path_for(&self, name: &str, version: &Version, digest: &str, target: Target) -> PathBuf {
        let suffix = if cfg!(target_os = "windows") { ".exe" } else { "" };
        self.root
            .join(name)
            .join(format!("{version}_{digest}_{target}{suffix}"))
    }

    pub async fn write(&self, path: &PathBuf, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(path).await?.permissions();
            perms.set_mode(0o755);
            tokio::fs::set_permissions(path, perms).await?;
        }
        Ok(())
    }
}

/// Ties together discovery, aggregation, trust, storage, and the catalog to
/// implement the public install/describe/delete operations.
pub struct Resolver {
    sources: Vec<DiscoverySource>,
    trust: TrustVerifier,
    catalog: Catalog,
    store: BinaryStore,
    config: Arc<dyn ConfigurationService>,
    telemetry: Arc<dyn TelemetryHook>,
    progress: Arc<dyn ProgressSink>,
}

impl Resolver {
    pub fn new(
        sources: Vec<DiscoverySource>,
        trust: TrustVerifier,
        catalog: Catalog,
        store: BinaryStore,
        config: Arc<dyn ConfigurationService>,
        telemetry: Arc<dyn TelemetryHook>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            sources,
            trust,
            catalog,
            store,
            config,
            telemetry,
            progress,
        }
    }

    async fn query_all(&self, criteria: &DiscoveryCriteria) -> Result<Vec<DiscoveredPlugin>> {
        let mut all = Vec::new();
        for source in &self.sources {
            match source.as_discovery().list(Some(criteria)).await {
                Ok(mut found) => all.append(&mut found),
                Err(e) => {
                    tracing::warn!(source = %source.as_discovery().name(), error = %e, "discovery source failed");
                }
            }
        }
        Ok(all)
    }

    /// Steps 1-7 of the resolution algorithm. The returned `bool` is whether
    /// the amd64 arch override (§4.4 step 3) must stay active through the
    /// fetch/install that follows: true iff this host is an ARM64 fallback
    /// candidate and the chosen plugin has no native-arch artifact for the
    /// resolved version.
    async fn resolve(
        &self,
        name: &str,
        target: Option<Target>,
        version_req: &VersionRequest,
    ) -> Result<(DiscoveredPlugin, Version, bool)> {
        if self.sources.is_empty() {
            return Err(Error::NoDiscoverySources);
        }

        let os = arch_fallback::current_os().to_owned();
        let criteria = DiscoveryCriteria {
            name: Some(name.to_owned()),
            target,
            version: None,
            os: Some(os.clone()),
            arch: Some(arch_fallback::effective_arch()),
        };

        let found = self.query_all(&criteria).await?;
        if found.is_empty() {
            return Err(NotFoundError::new(
                name.to_owned(),
                version_req_display(version_req),
                target,
            ));
        }

        let merged = merge_duplicate_plugins(found);
        let mut matching: Vec<DiscoveredPlugin> = merged
            .into_iter()
            .filter(|p| p.name == name)
            .filter(|p| target.map(|t| p.target.normalized() == t.normalized()).unwrap_or(true))
            .collect();

        if matching.is_empty() {
            return Err(NotFoundError::new(
                name.to_owned(),
                version_req_display(version_req),
                target,
            ));
        }

        if target.is_none() {
            let distinct_targets: std::collections::BTreeSet<Target> =
                matching.iter().map(|p| p.target.normalized()).collect();
            if distinct_targets.len() > 1 {
                return Err(Error::AmbiguousTarget(name.to_owned()));
            }
        }

        let chosen = matching.remove(0);
        let resolved_version = if version_req.is_latest() {
            chosen
                .recommended_version
                .clone()
                .ok_or_else(|| NotFoundError::new(name.to_owned(), None, target))?
        } else {
            version_req
                .resolve(&chosen.supported_versions)
                .cloned()
                .ok_or_else(|| NotFoundError::new(name.to_owned(), version_req_display(version_req), target))?
        };

        let native_arch = arch_fallback::effective_arch();
        let has_native_artifact =
            lookup_artifact(&chosen.version_artifacts, &resolved_version, &os, &native_arch).is_some();
        let needs_amd64_override = !has_native_artifact
            && arch_fallback::is_arm64_fallback_host()
            && lookup_artifact(&chosen.version_artifacts, &resolved_version, &os, "x86_64").is_some();

        if !has_native_artifact && !needs_amd64_override {
            return Err(NotFoundError::new(
                name.to_owned(),
                version_req_display(version_req),
                target,
            ));
        }

        Ok((chosen, resolved_version, needs_amd64_override))
    }

    /// Installs into the standalone (context-less) catalog.
    pub async fn install_standalone(
        &self,
        name: &str,
        version_req: &VersionRequest,
        target: Option<Target>,
    ) -> Result<PluginIdentifier> {
        self.install_impl(name, version_req, target, Scope::Standalone, "").await
    }

    /// Installs and tags the catalog entry with `context_name`.
    pub async fn install_from_context(
        &self,
        name: &str,
        version_req: &VersionRequest,
        target: Option<Target>,
        context_name: &str,
    ) -> Result<PluginIdentifier> {
        self.install_impl(name, version_req, target, Scope::Context, context_name)
            .await
    }

    /// Alias of [`Resolver::install_standalone`] (spec.md §4.4).
    pub async fn upgrade_plugin(
        &self,
        name: &str,
        version_req: &VersionRequest,
        target: Option<Target>,
    ) -> Result<PluginIdentifier> {
        self.install_standalone(name, version_req, target).await
    }

    async fn install_impl(
        &self,
        name: &str,
        version_req: &VersionRequest,
        target: Option<Target>,
        scope: Scope,
        context_name: &str,
    ) -> Result<PluginIdentifier> {
        let (entry, version, needs_amd64_override) = self.resolve(name, target, version_req).await?;
        if needs_amd64_override {
            arch_fallback::with_amd64_override(|| self.install_resolved(name, scope, context_name, entry, version))
                .await
        } else {
            self.install_resolved(name, scope, context_name, entry, version).await
        }
    }

    /// Runs the fetch/trust/store/catalog pipeline (§4.4 steps 4-8) for an
    /// already-resolved plugin and version. Reads `arch_fallback::effective_arch()`
    /// at call time, so when `install_impl` wraps this in
    /// [`arch_fallback::with_amd64_override`] the describe/fetch calls below
    /// observe amd64 the same way the initial resolution did.
    async fn install_resolved(
        &self,
        name: &str,
        scope: Scope,
        context_name: &str,
        entry: DiscoveredPlugin,
        version: Version,
    ) -> Result<PluginIdentifier> {
        let resolved_target = entry.target.normalized();

        let descriptor = entry
            .distribution
            .describe(&version.to_string(), arch_fallback::current_os(), &arch_fallback::effective_arch())
            .await
            .map_err(|e| Error::TransientFetch {
                name: name.to_owned(),
                stage: "pre-download verification failed",
                source: e,
            })?;
        self.trust.check_pre_download(name, &descriptor)?;

        // Step 8: skip the pipeline if the catalog already has this exact
        // (name, target, version, digest) and the binary is still on disk.
        if let Some(existing) = self.catalog.get(context_name, name, resolved_target).await? {
            if existing.version == version.to_string() {
                if let Some(digest) = &descriptor.digest {
                    let path = self.store.path_for(name, &version, digest, resolved_target);
                    if &existing.digest == digest && path.exists() {
                        return Ok(PluginIdentifier::new(name, resolved_target, version.to_string()));
                    }
                }
            }
        }

        let sloth_guard = plugin_common::sloth::warn_if_slothful(
            5_000,
            format!("still downloading {name} {version}, this is taking longer than expected"),
        );
        let bytes = entry
            .distribution
            .fetch(&version.to_string(), arch_fallback::current_os(), &arch_fallback::effective_arch())
            .await
            .map_err(|e| Error::TransientFetch {
                name: name.to_owned(),
                stage: "unable to fetch metadata",
                source: e,
            })?;
        drop(sloth_guard);
        self.trust.check_post_download(name, &descriptor, &bytes)?;

        let digest = plugin_common::sha256::hex_digest_from_bytes(&bytes);
        let path = self.store.path_for(name, &version, &digest, resolved_target);
        self.store
            .write(&path, &bytes)
            .await
            .map_err(|e| Error::Other(e.into()))?;

        let self_description = self.describe_binary(&path).await?;
        let status = if self_description.version == version.to_string() {
            PluginStatus::Installed
        } else {
            PluginStatus::UpdateAvailable
        };

        let info = InstalledPluginInfo {
            name: name.to_owned(),
            target: resolved_target,
            version: version.to_string(),
            installation_path: path.clone(),
            digest,
            discovered_recommended_version: entry.recommended_version.as_ref().map(|v| v.to_string()),
            scope,
            status,
            discovery: entry.source.clone(),
            default_feature_flags: self_description.default_feature_flags.clone(),
        };

        self.catalog.upsert(context_name, info).await?;

        self.run_post_install(&path).await;
        self.config
            .reconcile_default_feature_flags(name, &self_description.default_feature_flags);

        let identifier = PluginIdentifier::new(name, resolved_target, version.to_string());
        self.telemetry.on_plugin_installed(&identifier);
        self.progress.message(&format!("installed {name} {version}"));
        Ok(identifier)
    }

    async fn describe_binary(&self, path: &PathBuf) -> Result<PluginSelfDescription> {
        let output = tokio::process::Command::new(path)
            .arg("info")
            .output()
            .await
            .map_err(|e| Error::DescribeFailed(format!("{e}")))?;
        if !output.status.success() {
            return Err(Error::DescribeFailed(quoted_path(path).to_string()));
        }
        serde_json::from_slice(&output.stdout).map_err(|e| Error::DescribeFailed(e.to_string()))
    }

    /// Spawns `post-install`; an "unknown command" failure is equivalent to
    /// the plugin not supporting the hook at all. Every other failure is
    /// logged, never surfaced (spec.md §7: local recovery for post-install).
    async fn run_post_install(&self, path: &PathBuf) {
        match tokio::process::Command::new(path).arg("post-install").output().await {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.contains("unknown command") {
                    tracing::warn!(plugin = %path.display(), %stderr, "post-install hook failed");
                }
            }
            Err(e) => {
                tracing::warn!(plugin = %path.display(), error = %e, "failed to spawn post-install hook");
            }
        }
    }

    /// Looks up one installed plugin across every catalog (standalone plus
    /// every active context), erroring on ambiguity when `target` is
    /// unspecified.
    pub async fn describe(&self, name: &str, target: Option<Target>) -> Result<InstalledPluginInfo> {
        let mut found = Vec::new();
        for context_name in self.all_context_names() {
            if let Some(entry) = self.catalog.list(&context_name).await?.into_iter().find(|e| {
                e.name == name && target.map(|t| e.target.normalized() == t.normalized()).unwrap_or(true)
            }) {
                found.push(entry);
            }
        }

        if found.is_empty() {
            return Err(NotFoundError::new(name.to_owned(), None, target));
        }
        if target.is_none() {
            let distinct: std::collections::BTreeSet<Target> = found.iter().map(|e| e.target.normalized()).collect();
            if distinct.len() > 1 {
                return Err(Error::AmbiguousTarget(name.to_owned()));
            }
        }
        Ok(found.remove(0))
    }

    /// Removes `name` from every catalog it's found in. `name == "all"`
    /// removes every entry, optionally filtered by `target`, and requires
    /// `force` (spec.md §4.4: "deleted by explicit delete or a force-delete
    /// wildcard"); deleting a single named plugin never requires it.
    pub async fn delete_plugin(&self, name: &str, target: Option<Target>, force: bool) -> Result<()> {
        if name == "all" && !force {
            return Err(Error::ForceRequired);
        }

        let mut removed_any = false;
        let mut errors = Vec::new();

        for context_name in self.all_context_names() {
            let entries = self.catalog.list(&context_name).await?;
            for entry in entries {
                let name_matches = name == "all" || entry.name == name;
                let target_matches = target.map(|t| entry.target.normalized() == t.normalized()).unwrap_or(true);
                if !name_matches || !target_matches {
                    continue;
                }
                match self.catalog.delete(&context_name, &entry.name, entry.target).await {
                    Ok(()) => {
                        removed_any = true;
                        self.telemetry.on_plugin_deleted(&PluginIdentifier::new(
                            entry.name.clone(),
                            entry.target,
                            entry.version.clone(),
                        ));
                    }
                    Err(e) => errors.push(e),
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors.into_iter().next().unwrap());
        }
        if !removed_any {
            return Err(Error::NoInstalledPluginsMatch);
        }
        Ok(())
    }

    fn all_context_names(&self) -> Vec<String> {
        let mut names = vec![String::new()];
        names.extend(self.config.active_context_names());
        names
    }
}

fn version_req_display(req: &VersionRequest) -> Option<String> {
    if req.is_latest() {
        None
    } else {
        Some(req.to_string())
    }
}
