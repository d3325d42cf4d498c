use crate::config::RuntimeConfig;
use crate::error::ArcadiaResult;
use crate::runtime::{
    visit_list, visit_map, Atoms, Clock, Collector, Heap, Thread, TypeHandle, TypeHooks, TypeRegistry, LIST_TYPE_NAME,
    MAP_TYPE_NAME,
};
use crate::telemetry::CollectionEvent;

#[derive(Debug, Clone, Copy)]
pub(crate) struct BuiltinTypes {
    pub(crate) list: TypeHandle,
    pub(crate) map: TypeHandle,
}

pub type TelemetrySink = Box<dyn FnMut(&CollectionEvent)>;

/// The runtime context. Every subsystem (heap, type registry, collector,
/// atom table, executing thread) lives here and is reached through it.
pub struct ArcadiaVM {
    pub(crate) config: RuntimeConfig,
    pub(crate) clock: Clock,
    pub(crate) heap: Heap,
    pub(crate) types: TypeRegistry,
    pub(crate) collector: Collector,
    pub(crate) atoms: Atoms,
    pub(crate) thread: Thread,
    pub(crate) builtin: BuiltinTypes,
    pub(crate) telemetry_sink: Option<TelemetrySink>,
}

impl std::fmt::Debug for ArcadiaVM {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcadiaVM")
            .field("live_objects", &self.heap.len())
            .field("types", &self.types.len())
            .field("atoms_active", &self.atoms.is_active())
            .field("collections", &self.collector.cycles())
            .field("status", &self.thread.status())
            .finish()
    }
}

impl ArcadiaVM {
    pub fn new() -> ArcadiaResult<Self> {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> ArcadiaResult<Self> {
        config.validate()?;

        let mut types = TypeRegistry::new();
        let list = types.register(
            LIST_TYPE_NAME,
            TypeHooks {
                visit: Some(visit_list),
                ..TypeHooks::default()
            },
        )?;
        let map = types.register(
            MAP_TYPE_NAME,
            TypeHooks {
                visit: Some(visit_map),
                ..TypeHooks::default()
            },
        )?;

        tracing::debug!(?config, "runtime created");
        Ok(ArcadiaVM {
            heap: Heap::new(config.heap.object_limit),
            thread: Thread::new(&config.value_stack),
            config,
            clock: Clock::default(),
            types,
            collector: Collector::default(),
            atoms: Atoms::default(),
            builtin: BuiltinTypes { list, map },
            telemetry_sink: None,
        })
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    // === CLOCK ===

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    pub fn advance_clock(&mut self, ticks: u64) -> ArcadiaResult<()> {
        self.clock.advance(ticks)
    }

    pub fn set_telemetry_sink(&mut self, sink: TelemetrySink) {
        self.telemetry_sink = Some(sink);
    }

    pub fn clear_telemetry_sink(&mut self) {
        self.telemetry_sink = None;
    }

    /// Releases everything the runtime holds: the thread state, the atom
    /// table, every pin, every reclaimable object and finally every type.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn teardown(&mut self) -> ArcadiaResult<()> {
        self.thread.reset();
        while self.atoms.reference_count() > 0 {
            self.atoms_shutdown()?;
        }

        let mut pinned = 0;
        for (_, entry) in self.heap.entries_mut() {
            if entry.locks > 0 {
                pinned += 1;
                entry.locks = 0;
            }
        }
        if pinned > 0 {
            tracing::warn!(pinned, "objects still pinned at teardown");
        }
        self.run_arms(true)?;

        for handle in self.types.handles() {
            self.remove_type(handle);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;
    use crate::value::Value;

    #[test]
    fn builtin_containers_are_registered() {
        let vm = ArcadiaVM::new().unwrap();
        assert!(vm.type_handle(LIST_TYPE_NAME).is_ok());
        assert!(vm.type_handle(MAP_TYPE_NAME).is_ok());
        assert_eq!(vm.status(), Status::Success);
        assert!(vm.heap().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = RuntimeConfig::default();
        config.atoms.initial_capacity = 0;
        assert_eq!(ArcadiaVM::with_config(config).unwrap_err().status, Status::ArgumentValueInvalid);
    }

    #[test]
    fn monotonic_clock_cannot_be_advanced() {
        let mut vm = ArcadiaVM::new().unwrap();
        assert_eq!(vm.advance_clock(1).unwrap_err().status, Status::OperationInvalid);
        vm.set_clock(Clock::manual(5));
        vm.advance_clock(10).unwrap();
        assert_eq!(vm.now(), 15);
    }

    #[test]
    fn teardown_releases_everything() {
        let mut vm = ArcadiaVM::new().unwrap();
        vm.atoms_startup().unwrap();
        vm.atoms_startup().unwrap();
        let list = vm.allocate_list().unwrap();
        let atom = vm.get_or_create_atom_str("kept").unwrap();
        vm.with_list_mut(list, |list| list.append(Value::from(atom))).unwrap();
        vm.lock(list).unwrap();
        vm.thread_mut().stack.push(Value::from(list)).unwrap();

        vm.teardown().unwrap();
        assert!(vm.heap().is_empty());
        assert!(!vm.atoms().is_active());
        assert!(vm.types().is_empty());
        assert!(vm.thread().stack.is_empty());
    }
}
