pub mod config;
pub mod error;
pub mod growth;
pub mod runtime;
pub mod telemetry;
pub mod value;

pub use config::RuntimeConfig;
pub use error::{ArcadiaError, ArcadiaResult, Status};
pub use runtime::{ArcadiaVM, Atom, AtomKind, List, Map, ObjectRef, Process, ProcessGuard};
pub use value::{ForeignProcedure, Value, ValueTag};
