//! Essentials Orchestrator (spec.md §4.8): makes sure the CLI's "essentials"
//! plugin group is installed and current at startup, with logs suppressed
//! unless something actually needs to happen.

use crate::config::ConfigurationService;
use crate::group::GroupInstaller;
use crate::model::PluginStatus;
use crate::progress::ProgressSink;
use std::sync::Arc;

pub struct EssentialsOrchestrator<'a> {
    config: Arc<dyn ConfigurationService>,
    group_installer: GroupInstaller<'a>,
    progress: Arc<dyn ProgressSink>,
}

impl<'a> EssentialsOrchestrator<'a> {
    pub fn new(
        config: Arc<dyn ConfigurationService>,
        group_installer: GroupInstaller<'a>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            group_installer,
            progress,
        }
    }

    /// Ensures the essentials group is installed, upgrading it in place if
    /// an update is recommended. `(allInstalled, updateAvailable)` is
    /// computed against the catalog first; if the group is already fully
    /// installed and current, this is a silent no-op — no progress message,
    /// no install call. Otherwise exactly one pre-action message is emitted
    /// before the install runs.
    pub async fn ensure_essentials_installed(&self) -> anyhow::Result<()> {
        let (name, version) = self.config.essentials_group();
        let group_id = if version.is_empty() {
            name.clone()
        } else {
            format!("{name}:{version}")
        };

        let (resolved_id, mandatory) = self.group_installer.mandatory_members("all", &group_id).await?;

        let mut all_installed = true;
        let mut update_available = false;
        for entry in &mandatory {
            match self
                .group_installer
                .resolver()
                .describe(&entry.identifier.name, Some(entry.identifier.target))
                .await
            {
                Ok(info) if info.status == PluginStatus::UpdateAvailable => update_available = true,
                Ok(_) => {}
                Err(_) => all_installed = false,
            }
        }

        if all_installed && !update_available {
            return Ok(());
        }

        let verb = if all_installed { "upgrading" } else { "installing" };
        self.progress.message(&format!("{verb} essentials group {resolved_id}"));

        self.group_installer.install_from_group("all", &resolved_id).await?;
        Ok(())
    }
}
