//! Callbacks fired while the engine walks resources.
//!
//! Hooks are called from apply threads, so implementations must be
//! `Send + Sync`. Every method has an empty default.

use std::time::Duration;

use mantle_common::types::ResourceAddr;
use mantle_state::State;

use crate::plan::Action;

/// Observer of engine progress.
pub trait Hook: Send + Sync {
    /// A resource change is about to be applied.
    fn pre_apply(&self, _addr: &ResourceAddr, _action: Action) {}

    /// A resource change finished. `error` is set when it failed.
    fn post_apply(&self, _addr: &ResourceAddr, _action: Action, _elapsed: Duration, _error: Option<&str>) {}

    /// A resource is about to be refreshed.
    fn pre_refresh(&self, _addr: &ResourceAddr, _id: Option<&str>) {}

    /// A resource was refreshed.
    fn post_refresh(&self, _addr: &ResourceAddr) {}

    /// State changed during apply and should be persisted.
    fn post_state_update(&self, _state: &State) {}

    /// An interrupt was received; no further changes will be started.
    fn stopping(&self) {}
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::RecordingHook;

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    use mantle_common::types::ResourceAddr;
    use mantle_state::State;

    use super::Hook;
    use crate::plan::Action;

    /// Hook that records events as strings, for tests.
    #[derive(Debug, Default)]
    pub struct RecordingHook {
        events: Mutex<Vec<String>>,
        states: Mutex<Vec<State>>,
    }

    impl RecordingHook {
        /// Events so far, e.g. `pre_apply null_resource.a create`.
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        /// Number of `post_state_update` calls.
        pub fn state_updates(&self) -> usize {
            self.states.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
        }
    }

    impl Hook for RecordingHook {
        fn pre_apply(&self, addr: &ResourceAddr, action: Action) {
            self.push(format!("pre_apply {addr} {action}"));
        }

        fn post_apply(&self, addr: &ResourceAddr, action: Action, _elapsed: Duration, error: Option<&str>) {
            let outcome = if error.is_some() { "failed" } else { "ok" };
            self.push(format!("post_apply {addr} {action} {outcome}"));
        }

        fn pre_refresh(&self, addr: &ResourceAddr, _id: Option<&str>) {
            self.push(format!("pre_refresh {addr}"));
        }

        fn post_state_update(&self, state: &State) {
            self.states.lock().unwrap_or_else(PoisonError::into_inner).push(state.clone());
        }

        fn stopping(&self) {
            self.push("stopping".into());
        }
    }
}
