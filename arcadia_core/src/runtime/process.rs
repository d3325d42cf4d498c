// arcadia_core/src/runtime/process.rs

//! Reference-counted process singleton. The runtime is single-threaded, so
//! each OS thread has at most one process.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config::RuntimeConfig;
use crate::error::{ArcadiaError, ArcadiaResult, Status};
use crate::runtime::ArcadiaVM;

thread_local! {
    static PROCESS: RefCell<Option<Process>> = const { RefCell::new(None) };
}

#[derive(Debug)]
struct ProcessShared {
    reference_count: Cell<usize>,
    runtime: RefCell<ArcadiaVM>,
}

#[derive(Debug, Clone)]
pub struct Process {
    shared: Rc<ProcessShared>,
}

impl Process {
    /// Returns the process, creating it with the default configuration on
    /// first use. Each call takes one reference.
    pub fn get() -> ArcadiaResult<Process> {
        Self::get_with_config(RuntimeConfig::default())
    }

    /// Like [`Process::get`]; `config` only applies when the process is created.
    pub fn get_with_config(config: RuntimeConfig) -> ArcadiaResult<Process> {
        if let Some(process) = PROCESS.with(|slot| slot.borrow().clone()) {
            process.acquire()?;
            return Ok(process);
        }

        let mut runtime = ArcadiaVM::with_config(config)?;
        runtime.atoms_startup()?;
        let process = Process {
            shared: Rc::new(ProcessShared {
                reference_count: Cell::new(1),
                runtime: RefCell::new(runtime),
            }),
        };
        PROCESS.with(|slot| *slot.borrow_mut() = Some(process.clone()));
        tracing::debug!("process started");
        Ok(process)
    }

    pub fn is_running() -> bool {
        PROCESS.with(|slot| slot.borrow().is_some())
    }

    pub fn reference_count(&self) -> usize {
        self.shared.reference_count.get()
    }

    pub fn acquire(&self) -> ArcadiaResult<()> {
        let count = self.reference_count();
        if count == 0 {
            return Err(ArcadiaError::operation_invalid("process has been shut down"));
        }
        let count = count
            .checked_add(1)
            .ok_or_else(|| ArcadiaError::operation_invalid("process reference count overflow"))?;
        self.shared.reference_count.set(count);
        Ok(())
    }

    /// Drops one reference. The last one tears the runtime down and clears
    /// the singleton.
    pub fn relinquish(&self) -> ArcadiaResult<()> {
        match self.reference_count() {
            0 => Err(ArcadiaError::operation_invalid("process reference count underflow")),
            1 => {
                let mut runtime = self
                    .shared
                    .runtime
                    .try_borrow_mut()
                    .map_err(|_| ArcadiaError::operation_invalid("process is in use"))?;
                self.shared.reference_count.set(0);
                PROCESS.with(|slot| {
                    let mut slot = slot.borrow_mut();
                    if slot.as_ref().is_some_and(|current| Rc::ptr_eq(&current.shared, &self.shared)) {
                        *slot = None;
                    }
                });
                let result = runtime.teardown();
                tracing::debug!("process shut down");
                result
            }
            count => {
                self.shared.reference_count.set(count - 1);
                Ok(())
            }
        }
    }

    pub fn with_runtime<R>(&self, f: impl FnOnce(&mut ArcadiaVM) -> R) -> ArcadiaResult<R> {
        if self.reference_count() == 0 {
            return Err(ArcadiaError::operation_invalid("process has been shut down"));
        }
        let mut runtime = self
            .shared
            .runtime
            .try_borrow_mut()
            .map_err(|_| ArcadiaError::operation_invalid("process runtime is already borrowed"))?;
        Ok(f(&mut runtime))
    }

    /// Exit status for the thread's current status code.
    pub fn exit_code(&self) -> i32 {
        match self.shared.runtime.try_borrow() {
            Ok(runtime) => runtime.status().exit_code(),
            Err(_) => Status::OperationInvalid.exit_code(),
        }
    }
}

/// Holds one process reference for the lifetime of a scope.
#[derive(Debug)]
pub struct ProcessGuard {
    process: Process,
}

impl ProcessGuard {
    pub fn new() -> ArcadiaResult<Self> {
        Ok(ProcessGuard { process: Process::get()? })
    }

    pub fn with_config(config: RuntimeConfig) -> ArcadiaResult<Self> {
        Ok(ProcessGuard {
            process: Process::get_with_config(config)?,
        })
    }

    pub fn process(&self) -> &Process {
        &self.process
    }
}

impl std::ops::Deref for ProcessGuard {
    type Target = Process;

    fn deref(&self) -> &Process {
        &self.process
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Err(error) = self.process.relinquish() {
            tracing::warn!(%error, "process relinquish failed");
        }
    }
}
