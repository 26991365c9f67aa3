//! State verification helpers.
//!
//! Store notifications reach the event actor through listener tasks, so
//! tests that write to the store must wait for the engine to catch up.

use stage_controller::actors::EventActorHandle;
use stage_controller::engine::EventState;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const POLL_ATTEMPTS: usize = 200;

/// Poll the actor until `predicate` holds and return that state.
///
/// # Panics
///
/// Panics if the condition does not hold within two seconds.
pub async fn wait_for_state(
    handle: &EventActorHandle,
    predicate: impl Fn(&EventState) -> bool,
) -> EventState {
    for _ in 0..POLL_ATTEMPTS {
        let state = handle.get_state().await.expect("event actor is running");
        if predicate(&state) {
            return state;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    let state = handle.get_state().await.expect("event actor is running");
    assert!(predicate(&state), "condition not reached, last state: {state:?}");
    state
}

/// Let queued store notifications drain into the actor.
pub async fn settle() {
    for _ in 0..5 {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
