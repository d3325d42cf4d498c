use serde::{Deserialize, Serialize};

use crate::error::{ArcadiaError, ArcadiaResult};
use crate::value::Value;

/// Bucket heads of the atom table are one word each.
const ATOM_BUCKET_SIZE: usize = std::mem::size_of::<usize>();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtomTableConfig {
    pub initial_capacity: usize,
    pub maximum_capacity: usize,
    /// Ticks since last use within which an atom is kept warm by the pre-mark hook.
    pub retention_threshold: u64,
}

impl Default for AtomTableConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 8,
            maximum_capacity: usize::MAX / ATOM_BUCKET_SIZE,
            retention_threshold: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub initial_capacity: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self { initial_capacity: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueStackConfig {
    pub additional_capacity: usize,
    pub maximum_capacity: usize,
}

impl Default for ValueStackConfig {
    fn default() -> Self {
        Self {
            additional_capacity: 64,
            maximum_capacity: usize::MAX / std::mem::size_of::<Value>(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    /// Maximum number of live heap objects. `None` means unbounded.
    pub object_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub atoms: AtomTableConfig,
    pub maps: MapConfig,
    pub value_stack: ValueStackConfig,
    pub heap: HeapConfig,
}

impl RuntimeConfig {
    pub fn validate(&self) -> ArcadiaResult<()> {
        if self.atoms.initial_capacity == 0 {
            return Err(ArcadiaError::argument_value_invalid("atom table initial capacity must be non-zero"));
        }
        if self.atoms.initial_capacity > self.atoms.maximum_capacity {
            return Err(ArcadiaError::argument_value_invalid(format!(
                "atom table initial capacity {} exceeds maximum {}",
                self.atoms.initial_capacity, self.atoms.maximum_capacity
            )));
        }
        if self.maps.initial_capacity == 0 {
            return Err(ArcadiaError::argument_value_invalid("map initial capacity must be non-zero"));
        }
        if self.value_stack.additional_capacity == 0 {
            return Err(ArcadiaError::argument_value_invalid("value stack increment must be non-zero"));
        }
        if self.value_stack.maximum_capacity == 0 {
            return Err(ArcadiaError::argument_value_invalid("value stack maximum must be non-zero"));
        }
        Ok(())
    }
}
