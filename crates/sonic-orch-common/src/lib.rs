//! Common orchestration abstractions for SONiC dataplane managers.
//!
//! This crate provides the core traits and types shared by managers that keep
//! a dataplane resource in sync with control-plane intent:
//!
//! - [`Orch`]: two-phase manager contract (absorb updates, then reconcile)
//! - [`DirtySet`]: keys whose dataplane entry may be stale
//! - [`RetryTracker`]: per-key consecutive failure counts
//!
//! # Architecture
//!
//! Managers follow a level-triggered model:
//!
//! 1. The dispatch loop feeds control-plane messages to `Orch::on_update`
//! 2. Handlers update desired state and mark affected keys dirty
//! 3. On its own cadence the loop calls `Orch::complete_deferred_work`
//! 4. The manager applies every dirty key and clears the ones that succeeded
//!
//! # Example
//!
//! ```ignore
//! use sonic_orch_common::{DirtySet, Orch};
//!
//! struct MyMgr {
//!     dirty: DirtySet<Key>,
//!     // ... desired state, dataplane handle
//! }
//!
//! impl Orch for MyMgr {
//!     type Update = Msg;
//!     type Error = FatalError;
//!     type Summary = usize;
//!
//!     fn name(&self) -> &str { "MyMgr" }
//!
//!     fn on_update(&mut self, msg: Msg) {
//!         self.dirty.mark(msg.key());
//!     }
//!
//!     fn complete_deferred_work(&mut self) -> Result<usize, FatalError> {
//!         Ok(self.dirty.resolve_with(|key| self.dataplane.apply(key).is_ok()))
//!     }
//! }
//! ```

mod dirty_set;
mod orch;
mod retry;

pub use dirty_set::DirtySet;
pub use orch::Orch;
pub use retry::RetryTracker;
