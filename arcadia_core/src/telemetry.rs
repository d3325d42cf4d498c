use serde::{Deserialize, Serialize};

/// Emitted once per collection step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionEvent {
    pub cycle: u64,
    pub purge: bool,
    pub marked: usize,
    pub destroyed: u64,
    pub live: usize,
}
