//! Telemetry and the command-tree cache are external collaborators the
//! core only pokes as a best-effort side effect (spec.md §4.4 step 8); a
//! failure here is logged, never surfaced to the caller.

use crate::identity::PluginIdentifier;

/// Hook invoked after a successful install, upgrade, or delete. Failures
/// are the implementor's problem to log; the trait itself returns nothing.
pub trait TelemetryHook: Send + Sync {
    fn on_plugin_installed(&self, _identifier: &PluginIdentifier) {}
    fn on_plugin_deleted(&self, _identifier: &PluginIdentifier) {}
}

/// Default no-op implementation, used when the host CLI hasn't wired a
/// real telemetry sink.
pub struct NoopTelemetry;

impl TelemetryHook for NoopTelemetry {}
