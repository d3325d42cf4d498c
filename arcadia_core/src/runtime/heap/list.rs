// arcadia_core/src/runtime/heap/list.rs

use crate::error::{ArcadiaError, ArcadiaResult, Status};
use crate::growth::{ensure_free_capacity_in, Growth, GrowthStrategy};
use crate::runtime::{ArcadiaVM, Marker, ObjectData, ObjectRef};
use crate::value::Value;

pub const LIST_TYPE_NAME: &str = "Arcadia.List";

/// Growable array of values.
#[derive(Debug)]
pub struct List {
    elements: Vec<Value>,
    capacity: usize,
    growth: Growth,
}

impl Default for List {
    fn default() -> Self {
        List::new()
    }
}

impl List {
    pub fn new() -> Self {
        List {
            elements: Vec::new(),
            capacity: 0,
            growth: Growth::for_elements::<Value>(),
        }
    }

    pub fn with_growth(growth: Growth) -> Self {
        List {
            elements: Vec::new(),
            capacity: 0,
            growth,
        }
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> ArcadiaResult<Self> {
        let mut list = List::new();
        for value in values {
            list.append(value)?;
        }
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.elements.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.elements
    }

    pub fn append(&mut self, value: Value) -> ArcadiaResult<()> {
        self.insert_at(self.elements.len(), value)
    }

    pub fn prepend(&mut self, value: Value) -> ArcadiaResult<()> {
        self.insert_at(0, value)
    }

    /// Inserts before `index`; `index == len()` appends.
    pub fn insert_at(&mut self, index: usize, value: Value) -> ArcadiaResult<()> {
        if index > self.elements.len() {
            return Err(out_of_range(index, self.elements.len()));
        }
        ensure_free_capacity_in(
            &mut self.elements,
            &mut self.capacity,
            &self.growth,
            1,
            GrowthStrategy::Composite,
        )
        .map_err(exhausted)?;
        self.elements.insert(index, value);
        Ok(())
    }

    pub fn get_at(&self, index: usize) -> ArcadiaResult<Value> {
        self.elements
            .get(index)
            .copied()
            .ok_or_else(|| out_of_range(index, self.elements.len()))
    }

    pub fn set_at(&mut self, index: usize, value: Value) -> ArcadiaResult<()> {
        let len = self.elements.len();
        let slot = self.elements.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
        *slot = value;
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> ArcadiaResult<Value> {
        if index >= self.elements.len() {
            return Err(out_of_range(index, self.elements.len()));
        }
        Ok(self.elements.remove(index))
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }
}

fn out_of_range(index: usize, len: usize) -> ArcadiaError {
    ArcadiaError::argument_value_invalid(format!("index {} out of range for list of length {}", index, len))
}

fn exhausted(error: ArcadiaError) -> ArcadiaError {
    match error.status {
        Status::NotExists => ArcadiaError::allocation_failed(error.message),
        _ => error,
    }
}

impl ObjectData for List {}

pub(crate) fn visit_list(object: &dyn ObjectData, marker: &mut Marker) {
    if let Some(list) = object.downcast_ref::<List>() {
        for value in list.iter() {
            value.visit(marker);
        }
    }
}

impl ArcadiaVM {
    pub fn allocate_list(&mut self) -> ArcadiaResult<ObjectRef> {
        self.allocate_typed(self.builtin.list, Box::new(List::new()))
    }

    pub fn allocate_list_from(&mut self, values: impl IntoIterator<Item = Value>) -> ArcadiaResult<ObjectRef> {
        let list = List::from_values(values)?;
        self.allocate_typed(self.builtin.list, Box::new(list))
    }

    pub fn with_list<R>(&self, list: ObjectRef, f: impl FnOnce(&List) -> R) -> ArcadiaResult<R> {
        self.with_object(list, |list: &List, _| f(list))
    }

    pub fn with_list_mut<R>(&mut self, list: ObjectRef, f: impl FnOnce(&mut List) -> ArcadiaResult<R>) -> ArcadiaResult<R> {
        self.with_object_mut(list, |list: &mut List, _| f(list))
    }
}
