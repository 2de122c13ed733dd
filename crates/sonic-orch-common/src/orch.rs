//! Base Orch trait for deferred-work dataplane managers.

/// Base trait for dataplane managers driven by a single dispatch loop.
///
/// A manager splits its work in two phases:
///
/// 1. `on_update()` absorbs one control-plane message into in-memory state.
///    It must be cheap and must never touch the dataplane.
/// 2. `complete_deferred_work()` reconciles the dataplane with that state.
///    It is the only place that performs dataplane I/O.
///
/// # Threading
///
/// Managers are owned by exactly one task. Neither method is ever called
/// concurrently with the other or with itself, so implementations need no
/// internal locking. Hosts that run on a multi-threaded runtime must keep
/// the manager behind a single owner (or a mutex covering both phases).
pub trait Orch {
    /// The inbound message type.
    type Update;

    /// Error returned when the dataplane cannot be brought to a trusted state.
    ///
    /// Recoverable failures must be absorbed by the manager and retried on a
    /// later pass; only conditions the process cannot recover from belong here.
    type Error: std::error::Error;

    /// Per-pass summary returned on success.
    type Summary;

    /// Returns the name of this manager (for logging and debugging).
    fn name(&self) -> &str;

    /// Applies one inbound message to the in-memory state.
    fn on_update(&mut self, update: Self::Update);

    /// Runs one reconciliation pass against the dataplane.
    ///
    /// Must be idempotent: calling it back-to-back with no intervening
    /// updates performs no dataplane writes on the second call.
    fn complete_deferred_work(&mut self) -> Result<Self::Summary, Self::Error>;

    /// Returns true if the next `complete_deferred_work()` has work to do.
    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// Dumps pending tasks for debugging.
    ///
    /// Returns a list of human-readable strings describing pending work.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }
}
