use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::ArcadiaResult;
use crate::runtime::ArcadiaVM;
use crate::value::Value;

/// Native procedure callable through [`ArcadiaVM::call`]. Arguments are read
/// from the current call frame on the value stack.
pub type ForeignFn = fn(&mut ArcadiaVM) -> ArcadiaResult<Value>;

#[derive(Clone, Copy)]
pub struct ForeignProcedure {
    name: &'static str,
    function: ForeignFn,
}

impl ForeignProcedure {
    pub const fn new(name: &'static str, function: ForeignFn) -> Self {
        Self { name, function }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn function(&self) -> ForeignFn {
        self.function
    }

    fn address(&self) -> usize {
        self.function as usize
    }
}

impl PartialEq for ForeignProcedure {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for ForeignProcedure {}

impl Hash for ForeignProcedure {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl fmt::Debug for ForeignProcedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "foreign-procedure-{}", self.name)
    }
}
