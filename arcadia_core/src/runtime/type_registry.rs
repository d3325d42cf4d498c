use std::collections::HashMap;
use std::fmt;

use generational_arena::{Arena, Index};

use crate::error::{ArcadiaError, ArcadiaResult};
use crate::runtime::{validate_qualified_name, ArcadiaVM, Marker, ObjectData, ObjectRef};

/// Invoked when a type is unregistered.
pub type TypeRemovedFn = fn(&mut ArcadiaVM, TypeHandle);
/// Invoked per live instance during a mark pass to visit its children.
pub type VisitFn = fn(&dyn ObjectData, &mut Marker);
/// Invoked per instance being reclaimed. The object is already detached from the heap.
pub type FinalizeFn = fn(&mut ArcadiaVM, ObjectRef, &mut dyn ObjectData);

#[derive(Debug, Clone, Copy, Default)]
pub struct TypeHooks {
    pub type_removed: Option<TypeRemovedFn>,
    pub visit: Option<VisitFn>,
    pub finalize: Option<FinalizeFn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle(Index);

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, generation) = self.0.into_raw_parts();
        write!(f, "type#{}.{}", slot, generation)
    }
}

#[derive(Debug)]
pub struct TypeRecord {
    pub name: String,
    pub hooks: TypeHooks,
    pub instances: usize,
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Arena<TypeRecord>,
    by_name: HashMap<String, TypeHandle>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn register(&mut self, name: &str, hooks: TypeHooks) -> ArcadiaResult<TypeHandle> {
        validate_qualified_name(name.as_bytes())?;
        if self.by_name.contains_key(name) {
            return Err(ArcadiaError::type_exists(name));
        }
        let handle = TypeHandle(self.types.insert(TypeRecord {
            name: name.to_string(),
            hooks,
            instances: 0,
        }));
        self.by_name.insert(name.to_string(), handle);
        Ok(handle)
    }

    pub fn lookup(&self, name: &str) -> ArcadiaResult<TypeHandle> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ArcadiaError::type_not_exists(name))
    }

    pub fn get(&self, handle: TypeHandle) -> Option<&TypeRecord> {
        self.types.get(handle.0)
    }

    pub(crate) fn get_mut(&mut self, handle: TypeHandle) -> Option<&mut TypeRecord> {
        self.types.get_mut(handle.0)
    }

    pub(crate) fn remove(&mut self, handle: TypeHandle) -> Option<TypeRecord> {
        let record = self.types.remove(handle.0)?;
        self.by_name.remove(&record.name);
        Some(record)
    }

    pub fn handles(&self) -> Vec<TypeHandle> {
        self.types.iter().map(|(index, _)| TypeHandle(index)).collect()
    }
}

impl ArcadiaVM {
    /// Registers a type under a qualified name.
    pub fn register_type(&mut self, name: &str, hooks: TypeHooks) -> ArcadiaResult<TypeHandle> {
        let handle = self.types.register(name, hooks)?;
        tracing::debug!(name, %handle, "type registered");
        Ok(handle)
    }

    /// Unregisters a type that has no live instances and runs its
    /// `type_removed` hook.
    pub fn unregister_type(&mut self, name: &str) -> ArcadiaResult<()> {
        let handle = self.types.lookup(name)?;
        let instances = self.types.get(handle).map(|record| record.instances).unwrap_or(0);
        if instances > 0 {
            return Err(ArcadiaError::operation_invalid(format!(
                "type '{}' still has {} live instances",
                name, instances
            )));
        }
        self.remove_type(handle);
        Ok(())
    }

    pub(crate) fn remove_type(&mut self, handle: TypeHandle) {
        if let Some(record) = self.types.remove(handle) {
            tracing::debug!(name = %record.name, "type removed");
            if let Some(type_removed) = record.hooks.type_removed {
                type_removed(self, handle);
            }
        }
    }

    pub fn type_handle(&self, name: &str) -> ArcadiaResult<TypeHandle> {
        self.types.lookup(name)
    }

    pub fn type_name(&self, handle: TypeHandle) -> ArcadiaResult<&str> {
        self.types
            .get(handle)
            .map(|record| record.name.as_str())
            .ok_or_else(|| ArcadiaError::type_not_exists(&handle.to_string()))
    }

    pub fn type_of(&self, object: ObjectRef) -> ArcadiaResult<TypeHandle> {
        self.heap
            .type_of(object)
            .ok_or_else(|| ArcadiaError::not_exists(format!("{} has been reclaimed", object)))
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }
}
