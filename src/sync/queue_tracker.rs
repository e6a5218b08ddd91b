//! The queue-level resource state tracker.
//!
//! One [`QueueTracker`] exists per queue and holds the last known post-submit
//! state of every resource ever submitted on it. At the start of a recording
//! it seeds the command buffer tracker's expected states; at submit time it
//! validates those expectations against reality and absorbs the command
//! buffer's final states.
//!
//! Validation is detection only: execution ordering between command buffers
//! must still be supplied by the caller through sequential submission or
//! semaphores.

use std::collections::hash_map::Entry;

use ash::vk;

use crate::sync::state::{BufferState, ResourceId, ResourceState, StateMap, SubresourceState};
use crate::sync::tracker::CmdBufferTracker;

/// Last-known post-submit states of all resources on one queue.
#[derive(Debug, Default)]
pub struct QueueTracker {
    current_states: StateMap,
}

fn stages_accesses_compatible(
    actual_stages: vk::PipelineStageFlags2,
    actual_accesses: vk::AccessFlags2,
    expected_stages: vk::PipelineStageFlags2,
    expected_accesses: vk::AccessFlags2,
) -> bool {
    // ALL_COMMANDS and MEMORY_READ|MEMORY_WRITE act as wildcards: a barrier
    // that made a resource available to everything satisfies any expectation.
    let mut stages_compatible = expected_stages.contains(vk::PipelineStageFlags2::ALL_COMMANDS);
    let mut accesses_compatible =
        expected_accesses.intersects(vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE);
    if expected_stages.contains(actual_stages) {
        stages_compatible = true;
    }
    if expected_accesses.contains(actual_accesses) {
        accesses_compatible = true;
    }
    stages_compatible && accesses_compatible
}

fn buffer_compatible(actual: &BufferState, expected: &BufferState) -> bool {
    stages_accesses_compatible(actual.stages, actual.accesses, expected.stages, expected.accesses)
}

fn subresource_compatible(actual: &SubresourceState, expected: &SubresourceState) -> bool {
    if actual.layout != expected.layout && expected.layout != vk::ImageLayout::UNDEFINED {
        return false;
    }
    stages_accesses_compatible(actual.stages, actual.accesses, expected.stages, expected.accesses)
}

impl QueueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all stage and access bits while keeping image layouts. Call after
    /// a full device or queue wait-idle.
    pub fn on_wait(&mut self) {
        for state in self.current_states.values_mut() {
            state.forget_activity();
        }
    }

    /// Seed a command buffer tracker's expected states with the queue's
    /// current states. Called at the start of a new recording.
    pub fn set_expected(&self, tracker: &mut CmdBufferTracker) {
        tracker.init_expected(self.current_states.clone());
    }

    /// Absorb a finished command buffer into the queue state.
    ///
    /// The tracker's expectations are first pruned of untouched subresources,
    /// then every expectation that overlaps a known queue state is checked for
    /// compatibility; a mismatch means the command buffer was recorded against
    /// stale assumptions and is a fatal programmer error. Finally the
    /// tracker's current states are merged in and the tracker is cleared for
    /// reuse.
    pub fn on_submit(&mut self, tracker: &mut CmdBufferTracker) {
        tracker.remove_unused();

        for (id, expected) in tracker.expected() {
            let Some(actual) = self.current_states.get(id) else {
                // Resource was never submitted on this queue before.
                continue;
            };

            match (actual, expected) {
                (ResourceState::Image(actual), ResourceState::Image(expected)) => {
                    for (actual_cell, expected_cell) in actual.states.iter().zip(&expected.states) {
                        if let (Some(actual_cell), Some(expected_cell)) = (actual_cell, expected_cell) {
                            assert!(
                                subresource_compatible(actual_cell, expected_cell),
                                "expected resource state is incompatible with actual resource state"
                            );
                        }
                    }
                }
                (ResourceState::Buffer(actual), ResourceState::Buffer(expected)) => {
                    assert!(
                        buffer_compatible(actual, expected),
                        "expected resource state is incompatible with actual resource state"
                    );
                }
                _ => panic!("resource {id:?} changed kind between image and buffer"),
            }
        }

        for (id, state) in tracker.take_current() {
            match self.current_states.entry(id) {
                Entry::Vacant(entry) => {
                    entry.insert(state);
                }
                Entry::Occupied(mut entry) => match (entry.get_mut(), state) {
                    (ResourceState::Image(merged), ResourceState::Image(incoming)) => {
                        for (index, cell) in incoming.states.into_iter().enumerate() {
                            if cell.is_some() {
                                merged.states[index] = cell;
                            }
                        }
                    }
                    (ResourceState::Buffer(merged), ResourceState::Buffer(incoming)) => {
                        *merged = incoming;
                    }
                    _ => panic!("resource {id:?} changed kind between image and buffer"),
                },
            }
        }

        tracker.clear_all();
    }

    /// Forget a resource. Must be called before the underlying object is
    /// destroyed, otherwise the map retains dangling metadata for it.
    pub fn on_resource_deletion(&mut self, id: ResourceId) {
        self.current_states.remove(&id);
    }

    /// The last known post-submit states.
    pub fn current_states(&self) -> &StateMap {
        &self.current_states
    }
}
