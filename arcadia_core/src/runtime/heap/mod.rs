mod list;
mod map;

pub use list::*;
pub use map::*;

use std::fmt;

use downcast_rs::{impl_downcast, Downcast};
use generational_arena::{Arena, Index};

use crate::error::{ArcadiaError, ArcadiaResult};
use crate::runtime::{ArcadiaVM, TypeHandle};

/// Non-owning reference to a collector-managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(Index);

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, generation) = self.0.into_raw_parts();
        write!(f, "object#{}.{}", slot, generation)
    }
}

/// Payload of a heap object. Equality and hashing default to identity.
pub trait ObjectData: Downcast + fmt::Debug {
    /// Compares two distinct objects. Only called when the references differ.
    fn equal_to(&self, _other: &dyn ObjectData, _heap: &Heap) -> bool {
        false
    }

    /// Content hash, or `None` to hash by identity.
    fn hash_code(&self, _heap: &Heap) -> Option<u64> {
        None
    }
}
impl_downcast!(ObjectData);

/// Zero-initialized byte block, the payload of [`ArcadiaVM::allocate_block`].
#[derive(Debug, Default)]
pub struct Block {
    pub bytes: Vec<u8>,
}

impl ObjectData for Block {}

/// Stands in for a payload that is temporarily checked out.
#[derive(Debug)]
struct Vacant;

impl ObjectData for Vacant {}

#[derive(Debug)]
pub(crate) struct HeapObject {
    pub(crate) type_handle: TypeHandle,
    pub(crate) marked: bool,
    pub(crate) locks: u32,
    pub(crate) payload: Box<dyn ObjectData>,
}

#[derive(Debug)]
pub struct Heap {
    objects: Arena<HeapObject>,
    object_limit: Option<usize>,
}

impl Heap {
    pub(crate) fn new(object_limit: Option<usize>) -> Self {
        Heap {
            objects: Arena::new(),
            object_limit,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, object: ObjectRef) -> bool {
        self.objects.contains(object.0)
    }

    pub fn get(&self, object: ObjectRef) -> Option<&dyn ObjectData> {
        self.objects.get(object.0).map(|o| o.payload.as_ref())
    }

    pub fn type_of(&self, object: ObjectRef) -> Option<TypeHandle> {
        self.objects.get(object.0).map(|o| o.type_handle)
    }

    pub fn lock_count(&self, object: ObjectRef) -> Option<u32> {
        self.objects.get(object.0).map(|o| o.locks)
    }

    pub fn downcast<T: ObjectData>(&self, object: ObjectRef) -> ArcadiaResult<&T> {
        let data = self.get(object).ok_or_else(|| dead_reference(object))?;
        data.downcast_ref::<T>().ok_or_else(|| wrong_type::<T>(object))
    }

    pub fn downcast_mut<T: ObjectData>(&mut self, object: ObjectRef) -> ArcadiaResult<&mut T> {
        let entry = self.objects.get_mut(object.0).ok_or_else(|| dead_reference(object))?;
        entry.payload.downcast_mut::<T>().ok_or_else(|| wrong_type::<T>(object))
    }

    pub(crate) fn insert(&mut self, type_handle: TypeHandle, payload: Box<dyn ObjectData>) -> ArcadiaResult<ObjectRef> {
        if let Some(limit) = self.object_limit {
            if self.objects.len() >= limit {
                return Err(ArcadiaError::allocation_failed(format!("heap object limit {} reached", limit)));
            }
        }
        let index = self.objects.insert(HeapObject {
            type_handle,
            marked: false,
            locks: 0,
            payload,
        });
        Ok(ObjectRef(index))
    }

    pub(crate) fn remove(&mut self, object: ObjectRef) -> Option<HeapObject> {
        self.objects.remove(object.0)
    }

    pub(crate) fn entry_mut(&mut self, object: ObjectRef) -> Option<&mut HeapObject> {
        self.objects.get_mut(object.0)
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = (ObjectRef, &mut HeapObject)> {
        self.objects.iter_mut().map(|(index, object)| (ObjectRef(index), object))
    }

    pub fn objects(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.objects.iter().map(|(index, _)| ObjectRef(index))
    }

    pub(crate) fn pinned(&self) -> Vec<ObjectRef> {
        self.objects
            .iter()
            .filter(|(_, object)| object.locks > 0)
            .map(|(index, _)| ObjectRef(index))
            .collect()
    }
}

fn dead_reference(object: ObjectRef) -> ArcadiaError {
    ArcadiaError::not_exists(format!("{} has been reclaimed", object))
}

fn wrong_type<T>(object: ObjectRef) -> ArcadiaError {
    ArcadiaError::argument_type_invalid(format!(
        "{} is not a {}",
        object,
        std::any::type_name::<T>().rsplit("::").next().unwrap_or("value")
    ))
}

impl ArcadiaVM {
    // === ALLOCATION ===

    /// Allocates `payload` as an instance of the registered type `name`.
    pub fn allocate(&mut self, name: &str, payload: Box<dyn ObjectData>) -> ArcadiaResult<ObjectRef> {
        if name.is_empty() {
            return Err(ArcadiaError::argument_value_invalid("type name must not be empty"));
        }
        let type_handle = self.types.lookup(name)?;
        self.allocate_typed(type_handle, payload)
    }

    pub fn allocate_typed(&mut self, type_handle: TypeHandle, payload: Box<dyn ObjectData>) -> ArcadiaResult<ObjectRef> {
        let record = self
            .types
            .get_mut(type_handle)
            .ok_or_else(|| ArcadiaError::type_not_exists("<removed>"))?;
        let object = self.heap.insert(type_handle, payload)?;
        record.instances += 1;
        tracing::trace!(%object, type_name = %record.name, "allocated");
        Ok(object)
    }

    /// Allocates a zeroed block of `size` bytes tagged with type `name`.
    pub fn allocate_block(&mut self, name: &str, size: usize) -> ArcadiaResult<ObjectRef> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|e| ArcadiaError::allocation_failed(e.to_string()))?;
        bytes.resize(size, 0);
        self.allocate(name, Box::new(Block { bytes }))
    }

    // === PINNING ===

    /// Pins `object` against reclamation. Pins nest.
    pub fn lock(&mut self, object: ObjectRef) -> ArcadiaResult<()> {
        let entry = self.heap.entry_mut(object).ok_or_else(|| dead_reference(object))?;
        entry.locks = entry
            .locks
            .checked_add(1)
            .ok_or_else(|| ArcadiaError::operation_invalid(format!("{} lock count overflow", object)))?;
        Ok(())
    }

    pub fn unlock(&mut self, object: ObjectRef) -> ArcadiaResult<()> {
        let entry = self.heap.entry_mut(object).ok_or_else(|| dead_reference(object))?;
        if entry.locks == 0 {
            return Err(ArcadiaError::operation_invalid(format!("{} is not locked", object)));
        }
        entry.locks -= 1;
        Ok(())
    }

    // === ACCESS ===

    pub fn with_object<T: ObjectData, R>(&self, object: ObjectRef, f: impl FnOnce(&T, &Heap) -> R) -> ArcadiaResult<R> {
        let data = self.heap.downcast::<T>(object)?;
        Ok(f(data, &self.heap))
    }

    /// Runs `f` with the payload checked out of the heap so that it can be
    /// mutated while the rest of the heap is read (for hashing keys, say).
    pub fn with_object_mut<T: ObjectData, R>(
        &mut self,
        object: ObjectRef,
        f: impl FnOnce(&mut T, &Heap) -> ArcadiaResult<R>,
    ) -> ArcadiaResult<R> {
        self.heap.downcast::<T>(object)?;
        let entry = self.heap.entry_mut(object).ok_or_else(|| dead_reference(object))?;
        let mut payload = std::mem::replace(&mut entry.payload, Box::new(Vacant));
        let result = match payload.downcast_mut::<T>() {
            Some(data) => f(data, &self.heap),
            None => Err(wrong_type::<T>(object)),
        };
        if let Some(entry) = self.heap.entry_mut(object) {
            entry.payload = payload;
        }
        result
    }
}
