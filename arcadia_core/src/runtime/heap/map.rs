// arcadia_core/src/runtime/heap/map.rs

use crate::error::{ArcadiaError, ArcadiaResult};
use crate::growth::{Growth, GrowthStrategy};
use crate::runtime::{ArcadiaVM, Heap, List, Marker, ObjectData, ObjectRef};
use crate::value::Value;

pub const MAP_TYPE_NAME: &str = "Arcadia.Map";

#[derive(Debug, Clone, Copy)]
struct MapNode {
    hash: u64,
    key: Value,
    value: Value,
}

/// Bucketed hash table from values to values. Keys must not be void.
#[derive(Debug)]
pub struct Map {
    buckets: Vec<Vec<MapNode>>,
    size: usize,
    growth: Growth,
}

impl Default for Map {
    fn default() -> Self {
        Map::new()
    }
}

impl Map {
    pub fn new() -> Self {
        Map {
            buckets: vec![Vec::new(); 8],
            size: 0,
            growth: Growth::for_elements::<Vec<MapNode>>(),
        }
    }

    /// Map with `capacity` buckets (at least one).
    pub fn with_capacity(capacity: usize) -> ArcadiaResult<Self> {
        Map::with_growth(capacity, Growth::for_elements::<Vec<MapNode>>())
    }

    pub fn with_growth(capacity: usize, growth: Growth) -> ArcadiaResult<Self> {
        Ok(Map {
            buckets: empty_buckets(capacity.max(1))?,
            size: 0,
            growth,
        })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_of(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    /// Inserts or overwrites the entry for `key`.
    pub fn set(&mut self, heap: &Heap, key: Value, value: Value) -> ArcadiaResult<()> {
        check_key(&key)?;
        let hash = key.hash_value(heap);
        let bucket = self.bucket_of(hash);
        if let Some(node) = self.buckets[bucket]
            .iter_mut()
            .find(|node| node.hash == hash && node.key.is_equal_to(&key, heap))
        {
            node.value = value;
            return Ok(());
        }
        self.buckets[bucket].insert(0, MapNode { hash, key, value });
        self.size += 1;
        if self.size > self.buckets.len() {
            self.resize()?;
        }
        Ok(())
    }

    /// Value stored under `key`, or void.
    pub fn get(&self, heap: &Heap, key: &Value) -> ArcadiaResult<Value> {
        Ok(self.find(heap, key)?.map(|node| node.value).unwrap_or(Value::Void))
    }

    pub fn contains_key(&self, heap: &Heap, key: &Value) -> ArcadiaResult<bool> {
        Ok(self.find(heap, key)?.is_some())
    }

    /// Removes the entry for `key`, returning its value or void.
    pub fn remove(&mut self, heap: &Heap, key: &Value) -> ArcadiaResult<Value> {
        check_key(key)?;
        let hash = key.hash_value(heap);
        let bucket = self.bucket_of(hash);
        let chain = &mut self.buckets[bucket];
        match chain
            .iter()
            .position(|node| node.hash == hash && node.key.is_equal_to(key, heap))
        {
            Some(position) => {
                self.size -= 1;
                Ok(chain.remove(position).value)
            }
            None => Ok(Value::Void),
        }
    }

    pub fn get_keys(&self) -> ArcadiaResult<List> {
        List::from_values(self.nodes().map(|node| node.key))
    }

    pub fn get_values(&self) -> ArcadiaResult<List> {
        List::from_values(self.nodes().map(|node| node.value))
    }

    pub fn entries(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.nodes().map(|node| (node.key, node.value))
    }

    pub fn clear(&mut self) {
        for chain in &mut self.buckets {
            chain.clear();
        }
        self.size = 0;
    }

    fn nodes(&self) -> impl Iterator<Item = &MapNode> {
        self.buckets.iter().flatten()
    }

    fn find(&self, heap: &Heap, key: &Value) -> ArcadiaResult<Option<&MapNode>> {
        check_key(key)?;
        let hash = key.hash_value(heap);
        Ok(self.buckets[self.bucket_of(hash)]
            .iter()
            .find(|node| node.hash == hash && node.key.is_equal_to(key, heap)))
    }

    /// Rehashes into a doubled bucket array, built completely before it
    /// replaces the old one. A saturated map keeps its buckets and lets
    /// chains grow.
    fn resize(&mut self) -> ArcadiaResult<()> {
        if self.buckets.len() >= self.growth.maximum() {
            return Ok(());
        }
        let new_capacity = self.growth.grow(self.buckets.len(), 1, GrowthStrategy::Composite)?;
        let mut buckets = empty_buckets(new_capacity)?;
        for node in self.buckets.drain(..).flatten() {
            let bucket = (node.hash % new_capacity as u64) as usize;
            buckets[bucket].insert(0, node);
        }
        self.buckets = buckets;
        Ok(())
    }
}

fn empty_buckets(capacity: usize) -> ArcadiaResult<Vec<Vec<MapNode>>> {
    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(capacity)
        .map_err(|e| ArcadiaError::allocation_failed(e.to_string()))?;
    buckets.resize_with(capacity, Vec::new);
    Ok(buckets)
}

fn check_key(key: &Value) -> ArcadiaResult<()> {
    if key.is_void() {
        return Err(ArcadiaError::argument_type_invalid("map keys must not be void"));
    }
    Ok(())
}

impl ObjectData for Map {}

pub(crate) fn visit_map(object: &dyn ObjectData, marker: &mut Marker) {
    if let Some(map) = object.downcast_ref::<Map>() {
        for node in map.nodes() {
            node.key.visit(marker);
            node.value.visit(marker);
        }
    }
}

impl ArcadiaVM {
    pub fn allocate_map(&mut self) -> ArcadiaResult<ObjectRef> {
        let map = Map::with_capacity(self.config.maps.initial_capacity)?;
        self.allocate_typed(self.builtin.map, Box::new(map))
    }

    pub fn with_map<R>(&self, map: ObjectRef, f: impl FnOnce(&Map, &Heap) -> R) -> ArcadiaResult<R> {
        self.with_object(map, f)
    }

    pub fn with_map_mut<R>(
        &mut self,
        map: ObjectRef,
        f: impl FnOnce(&mut Map, &Heap) -> ArcadiaResult<R>,
    ) -> ArcadiaResult<R> {
        self.with_object_mut(map, f)
    }

    pub fn map_set(&mut self, map: ObjectRef, key: Value, value: Value) -> ArcadiaResult<()> {
        self.with_map_mut(map, |map, heap| map.set(heap, key, value))
    }

    pub fn map_get(&self, map: ObjectRef, key: &Value) -> ArcadiaResult<Value> {
        self.with_map(map, |map, heap| map.get(heap, key))?
    }
}
