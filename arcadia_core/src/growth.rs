// arcadia_core/src/growth.rs

//! Capacity growth policies shared by every growable buffer in the runtime
//! (atom buckets, map buckets, lists, the value stack).

use crate::error::{ArcadiaError, ArcadiaResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GrowthStrategy {
    /// New capacity is the old capacity plus the request.
    Exact,
    /// Old capacity times the smallest power of two covering the request.
    Doubling,
    /// Jump straight to the maximum.
    Saturate,
    /// Doubling, falling back to saturation.
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Growth {
    maximum: usize,
}

impl Growth {
    /// Growth bounded by the largest element count addressable for `T`.
    pub fn for_elements<T>() -> Self {
        let element_size = std::mem::size_of::<T>().max(1);
        Growth {
            maximum: usize::MAX / element_size,
        }
    }

    pub fn with_element_size(element_size: usize) -> ArcadiaResult<Self> {
        if element_size == 0 {
            return Err(ArcadiaError::argument_value_invalid("element size must be non-zero"));
        }
        Ok(Growth {
            maximum: usize::MAX / element_size,
        })
    }

    /// Growth bounded by an explicit element count.
    pub fn with_maximum(maximum: usize) -> Self {
        Growth { maximum }
    }

    pub fn maximum(&self) -> usize {
        self.maximum
    }

    /// Computes the capacity that holds `additional` more elements than
    /// `capacity` under `strategy`.
    pub fn grow(&self, capacity: usize, additional: usize, strategy: GrowthStrategy) -> ArcadiaResult<usize> {
        if capacity > self.maximum {
            return Err(ArcadiaError::argument_value_invalid(format!(
                "capacity {} exceeds maximum {}",
                capacity, self.maximum
            )));
        }
        if additional == 0 {
            return Ok(capacity);
        }
        match strategy {
            GrowthStrategy::Exact => self.grow_exact(capacity, additional),
            GrowthStrategy::Doubling => self.grow_doubling(capacity, additional),
            GrowthStrategy::Saturate => self.grow_saturate(capacity, additional),
            GrowthStrategy::Composite => self
                .grow_doubling(capacity, additional)
                .or_else(|_| self.grow_saturate(capacity, additional)),
        }
    }

    /// Grows only by the shortfall between `required` and the free capacity
    /// `capacity - size`. Returns the capacity unchanged if it already fits.
    pub fn ensure_free_capacity(
        &self,
        size: usize,
        capacity: usize,
        required: usize,
        strategy: GrowthStrategy,
    ) -> ArcadiaResult<usize> {
        if size > capacity {
            return Err(ArcadiaError::argument_value_invalid(format!(
                "size {} exceeds capacity {}",
                size, capacity
            )));
        }
        let available = capacity - size;
        if available >= required {
            return Ok(capacity);
        }
        self.grow(capacity, required - available, strategy)
    }

    fn requested(&self, capacity: usize, additional: usize) -> ArcadiaResult<usize> {
        match capacity.checked_add(additional) {
            Some(requested) if requested <= self.maximum => Ok(requested),
            _ => Err(ArcadiaError::not_exists(format!(
                "no capacity of at most {} holds {} more elements",
                self.maximum, additional
            ))),
        }
    }

    fn grow_exact(&self, capacity: usize, additional: usize) -> ArcadiaResult<usize> {
        self.requested(capacity, additional)
    }

    fn grow_doubling(&self, capacity: usize, additional: usize) -> ArcadiaResult<usize> {
        let requested = self.requested(capacity, additional)?;
        let mut new_capacity = capacity.max(1);
        while new_capacity < requested {
            new_capacity = match new_capacity.checked_mul(2) {
                Some(doubled) if doubled <= self.maximum => doubled,
                _ => {
                    return Err(ArcadiaError::not_exists(format!(
                        "doubling {} does not reach {} below {}",
                        capacity, requested, self.maximum
                    )))
                }
            };
        }
        Ok(new_capacity)
    }

    fn grow_saturate(&self, capacity: usize, additional: usize) -> ArcadiaResult<usize> {
        self.requested(capacity, additional)?;
        Ok(self.maximum)
    }
}

/// Makes room for `required` more elements in `elements`, whose logical
/// capacity is tracked in `capacity`.
pub fn ensure_free_capacity_in<T>(
    elements: &mut Vec<T>,
    capacity: &mut usize,
    growth: &Growth,
    required: usize,
    strategy: GrowthStrategy,
) -> ArcadiaResult<()> {
    let new_capacity = growth.ensure_free_capacity(elements.len(), *capacity, required, strategy)?;
    if new_capacity > *capacity {
        elements
            .try_reserve_exact(new_capacity - elements.len())
            .map_err(|e| ArcadiaError::allocation_failed(e.to_string()))?;
        *capacity = new_capacity;
    }
    Ok(())
}
