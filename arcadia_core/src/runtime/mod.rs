mod arcadia_vm;
mod atom_table;
mod clock;
mod gc;
mod heap;
mod name;
mod process;
mod thread;
mod type_registry;

pub use arcadia_vm::*;
pub use atom_table::*;
pub use clock::*;
pub use gc::*;
pub use heap::*;
pub use name::*;
pub use process::*;
pub use thread::*;
pub use type_registry::*;
