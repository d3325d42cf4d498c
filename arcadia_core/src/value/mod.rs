mod foreign;

pub use foreign::*;

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::error::{ArcadiaError, ArcadiaResult};
use crate::runtime::{Atom, Heap, Marker, ObjectRef, TypeHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, enum_map::Enum, serde::Serialize, serde::Deserialize)]
pub enum ValueTag {
    Void,
    Boolean,
    Integer8,
    Integer16,
    Integer32,
    Integer64,
    Natural8,
    Natural16,
    Natural32,
    Natural64,
    Size,
    ObjectReference,
    Atom,
    Type,
    ForeignProcedure,
}

impl ValueTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueTag::Void => "void",
            ValueTag::Boolean => "boolean",
            ValueTag::Integer8 => "integer8",
            ValueTag::Integer16 => "integer16",
            ValueTag::Integer32 => "integer32",
            ValueTag::Integer64 => "integer64",
            ValueTag::Natural8 => "natural8",
            ValueTag::Natural16 => "natural16",
            ValueTag::Natural32 => "natural32",
            ValueTag::Natural64 => "natural64",
            ValueTag::Size => "size",
            ValueTag::ObjectReference => "object-reference",
            ValueTag::Atom => "atom",
            ValueTag::Type => "type",
            ValueTag::ForeignProcedure => "foreign-procedure",
        }
    }

    /// Qualified name of the built-in type describing values with this tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueTag::Void => "Arcadia.Void",
            ValueTag::Boolean => "Arcadia.Boolean",
            ValueTag::Integer8 => "Arcadia.Integer8",
            ValueTag::Integer16 => "Arcadia.Integer16",
            ValueTag::Integer32 => "Arcadia.Integer32",
            ValueTag::Integer64 => "Arcadia.Integer64",
            ValueTag::Natural8 => "Arcadia.Natural8",
            ValueTag::Natural16 => "Arcadia.Natural16",
            ValueTag::Natural32 => "Arcadia.Natural32",
            ValueTag::Natural64 => "Arcadia.Natural64",
            ValueTag::Size => "Arcadia.Size",
            ValueTag::ObjectReference => "Arcadia.Object",
            ValueTag::Atom => "Arcadia.Atom",
            ValueTag::Type => "Arcadia.Type",
            ValueTag::ForeignProcedure => "Arcadia.ForeignProcedure",
        }
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged value. Object references and atoms do not own their referents;
/// the collector does.
#[derive(Debug, Clone, Copy, Default)]
pub enum Value {
    #[default]
    Void,
    Boolean(bool),
    Integer8(i8),
    Integer16(i16),
    Integer32(i32),
    Integer64(i64),
    Natural8(u8),
    Natural16(u16),
    Natural32(u32),
    Natural64(u64),
    Size(usize),
    ObjectReference(ObjectRef),
    Atom(Atom),
    Type(TypeHandle),
    ForeignProcedure(ForeignProcedure),
}

macro_rules! value_accessors {
    ($($variant:ident($ty:ty) => $is:ident, $get:ident, $set:ident;)*) => {
        impl Value {
            $(
                pub fn $is(&self) -> bool {
                    matches!(self, Value::$variant(_))
                }

                pub fn $get(&self) -> ArcadiaResult<$ty> {
                    match self {
                        Value::$variant(value) => Ok(*value),
                        other => Err(ArcadiaError::argument_type_invalid(format!(
                            "expected {} value, got {}",
                            ValueTag::$variant,
                            other.tag()
                        ))),
                    }
                }

                pub fn $set(&mut self, value: $ty) {
                    *self = Value::$variant(value);
                }
            )*
        }

        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

value_accessors! {
    Boolean(bool) => is_boolean, get_boolean, set_boolean;
    Integer8(i8) => is_integer8, get_integer8, set_integer8;
    Integer16(i16) => is_integer16, get_integer16, set_integer16;
    Integer32(i32) => is_integer32, get_integer32, set_integer32;
    Integer64(i64) => is_integer64, get_integer64, set_integer64;
    Natural8(u8) => is_natural8, get_natural8, set_natural8;
    Natural16(u16) => is_natural16, get_natural16, set_natural16;
    Natural32(u32) => is_natural32, get_natural32, set_natural32;
    Natural64(u64) => is_natural64, get_natural64, set_natural64;
    Size(usize) => is_size, get_size, set_size;
    ObjectReference(ObjectRef) => is_object_reference, get_object_reference, set_object_reference;
    Atom(Atom) => is_atom, get_atom, set_atom;
    Type(TypeHandle) => is_type, get_type, set_type;
    ForeignProcedure(ForeignProcedure) => is_foreign_procedure, get_foreign_procedure, set_foreign_procedure;
}

impl Value {
    pub fn tag(&self) -> ValueTag {
        match self {
            Value::Void => ValueTag::Void,
            Value::Boolean(_) => ValueTag::Boolean,
            Value::Integer8(_) => ValueTag::Integer8,
            Value::Integer16(_) => ValueTag::Integer16,
            Value::Integer32(_) => ValueTag::Integer32,
            Value::Integer64(_) => ValueTag::Integer64,
            Value::Natural8(_) => ValueTag::Natural8,
            Value::Natural16(_) => ValueTag::Natural16,
            Value::Natural32(_) => ValueTag::Natural32,
            Value::Natural64(_) => ValueTag::Natural64,
            Value::Size(_) => ValueTag::Size,
            Value::ObjectReference(_) => ValueTag::ObjectReference,
            Value::Atom(_) => ValueTag::Atom,
            Value::Type(_) => ValueTag::Type,
            Value::ForeignProcedure(_) => ValueTag::ForeignProcedure,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    pub fn set_void(&mut self) {
        *self = Value::Void;
    }

    /// Polymorphic equality. Values of different tags are never equal;
    /// distinct objects defer to their type's `equal_to`.
    pub fn is_equal_to(&self, other: &Value, heap: &Heap) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer8(a), Value::Integer8(b)) => a == b,
            (Value::Integer16(a), Value::Integer16(b)) => a == b,
            (Value::Integer32(a), Value::Integer32(b)) => a == b,
            (Value::Integer64(a), Value::Integer64(b)) => a == b,
            (Value::Natural8(a), Value::Natural8(b)) => a == b,
            (Value::Natural16(a), Value::Natural16(b)) => a == b,
            (Value::Natural32(a), Value::Natural32(b)) => a == b,
            (Value::Natural64(a), Value::Natural64(b)) => a == b,
            (Value::Size(a), Value::Size(b)) => a == b,
            // Atoms are hash-consed.
            (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::ForeignProcedure(a), Value::ForeignProcedure(b)) => a == b,
            (Value::ObjectReference(a), Value::ObjectReference(b)) => {
                if a == b {
                    return true;
                }
                match (heap.get(*a), heap.get(*b)) {
                    (Some(left), Some(right)) => left.equal_to(right, heap),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Polymorphic hash, consistent with [`Value::is_equal_to`].
    pub fn hash_value(&self, heap: &Heap) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tag().hash(&mut hasher);
        match self {
            Value::Void => {}
            Value::Boolean(v) => v.hash(&mut hasher),
            Value::Integer8(v) => v.hash(&mut hasher),
            Value::Integer16(v) => v.hash(&mut hasher),
            Value::Integer32(v) => v.hash(&mut hasher),
            Value::Integer64(v) => v.hash(&mut hasher),
            Value::Natural8(v) => v.hash(&mut hasher),
            Value::Natural16(v) => v.hash(&mut hasher),
            Value::Natural32(v) => v.hash(&mut hasher),
            Value::Natural64(v) => v.hash(&mut hasher),
            Value::Size(v) => v.hash(&mut hasher),
            Value::Atom(atom) => match heap.get(atom.object()).and_then(|data| data.hash_code(heap)) {
                Some(hash) => hash.hash(&mut hasher),
                None => atom.hash(&mut hasher),
            },
            Value::Type(handle) => handle.hash(&mut hasher),
            Value::ForeignProcedure(procedure) => procedure.hash(&mut hasher),
            Value::ObjectReference(object) => match heap.get(*object).and_then(|data| data.hash_code(heap)) {
                Some(hash) => hash.hash(&mut hasher),
                None => object.hash(&mut hasher),
            },
        }
        hasher.finish()
    }

    /// Hands any referent to the marker. Primitives have nothing to visit.
    pub fn visit(&self, marker: &mut Marker) {
        match self {
            Value::ObjectReference(object) => marker.visit_object(*object),
            Value::Atom(atom) => marker.visit_atom(*atom),
            _ => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer8(v) => write!(f, "{}i8", v),
            Value::Integer16(v) => write!(f, "{}i16", v),
            Value::Integer32(v) => write!(f, "{}i32", v),
            Value::Integer64(v) => write!(f, "{}i64", v),
            Value::Natural8(v) => write!(f, "{}n8", v),
            Value::Natural16(v) => write!(f, "{}n16", v),
            Value::Natural32(v) => write!(f, "{}n32", v),
            Value::Natural64(v) => write!(f, "{}n64", v),
            Value::Size(v) => write!(f, "{}sz", v),
            Value::ObjectReference(object) => write!(f, "{}", object),
            Value::Atom(atom) => write!(f, "{}", atom),
            Value::Type(handle) => write!(f, "{}", handle),
            Value::ForeignProcedure(procedure) => write!(f, "{:?}", procedure),
        }
    }
}
