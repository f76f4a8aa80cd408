//! Scoped ARM64-on-AMD64 fallback (spec.md §4.4 step 3, §9 Design Notes).
//!
//! On macOS-arm64 and Windows-arm64 hosts, if a plugin has no native arm64
//! artifact, the resolver retries discovery against amd64. The override is
//! process-wide (discovery criteria elsewhere read "the current arch"
//! through [`effective_arch`]) but scoped: [`ArchOverrideGuard`] restores
//! the prior value on drop, covering every exit path including an early
//! `?` return, mirroring the teacher's instruction (§9) to never leave a
//! temporary rewrite of shared state unrestored.

use std::sync::Mutex;

static ARCH_OVERRIDE: Mutex<Option<String>> = Mutex::new(None);

/// The architecture discovery criteria should filter on: the process
/// override if one is active, otherwise the compiled-in `std::env::consts`
/// value.
pub fn effective_arch() -> String {
    ARCH_OVERRIDE
        .lock()
        .unwrap()
        .clone()
        .unwrap_or_else(|| std::env::consts::ARCH.to_owned())
}

pub fn current_os() -> &'static str {
    std::env::consts::OS
}

/// True for the two hosts the fallback applies to.
pub fn is_arm64_fallback_host() -> bool {
    let os = current_os();
    let arch = effective_arch();
    arch == "aarch64" && (os == "macos" || os == "windows")
}

/// Installs `arch` as the process-wide override for the lifetime of the
/// guard; dropping restores whatever was active before.
struct ArchOverrideGuard {
    previous: Option<String>,
}

impl ArchOverrideGuard {
    fn install(arch: &str) -> Self {
        let mut slot = ARCH_OVERRIDE.lock().unwrap();
        let previous = slot.clone();
        *slot = Some(arch.to_owned());
        Self { previous }
    }
}

impl Drop for ArchOverrideGuard {
    fn drop(&mut self) {
        let mut slot = ARCH_OVERRIDE.lock().unwrap();
        *slot = self.previous.take();
    }
}

/// Runs `query` with the arch override set to `amd64`, guaranteeing
/// restoration afterward regardless of whether `query` returns `Ok`, `Err`,
/// or panics during unwind.
pub async fn with_amd64_override<F, Fut, T>(query: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let _guard = ArchOverrideGuard::install("x86_64");
    query().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn override_is_restored_after_success() {
        let before = effective_arch();
        let seen = with_amd64_override(|| async { effective_arch() }).await;
        assert_eq!(seen, "x86_64");
        assert_eq!(effective_arch(), before);
    }

    #[tokio::test]
    async fn override_is_restored_after_error_path() {
        let before = effective_arch();
        let result: Result<(), &str> = with_amd64_override(|| async { Err("boom") }).await;
        assert!(result.is_err());
        assert_eq!(effective_arch(), before);
    }
}
