// arcadia_core/src/runtime/gc.rs

//! Mark-and-sweep collection. A cycle runs Idle -> Marking -> Finalizing ->
//! Idle; callers only see the statistics it reports.

use crate::error::{ArcadiaError, ArcadiaResult};
use crate::runtime::{ArcadiaVM, Atom, ObjectRef};
use crate::telemetry::CollectionEvent;
use crate::value::Value;

/// Gray set of the mark phase.
#[derive(Debug, Default)]
pub struct Marker {
    gray: Vec<ObjectRef>,
}

impl Marker {
    pub fn visit_object(&mut self, object: ObjectRef) {
        self.gray.push(object);
    }

    pub fn visit_atom(&mut self, atom: Atom) {
        self.gray.push(atom.object());
    }

    pub fn visit_value(&mut self, value: &Value) {
        value.visit(self);
    }
}

/// Called once per cycle before tracing. The flag is true when a purge was requested.
pub type PreMarkFn = fn(&mut ArcadiaVM, &mut Marker, bool);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreMarkHookId(u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CollectorStats {
    pub destroyed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Marking,
    Finalizing,
}

#[derive(Debug)]
pub struct Collector {
    pre_mark: Vec<(PreMarkHookId, PreMarkFn)>,
    next_hook: u64,
    cycles: u64,
    phase: Phase,
}

impl Default for Collector {
    fn default() -> Self {
        Collector {
            pre_mark: Vec::new(),
            next_hook: 0,
            cycles: 0,
            phase: Phase::Idle,
        }
    }
}

impl Collector {
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn is_collecting(&self) -> bool {
        self.phase != Phase::Idle
    }
}

impl ArcadiaVM {
    pub fn add_pre_mark_hook(&mut self, hook: PreMarkFn) -> PreMarkHookId {
        let id = PreMarkHookId(self.collector.next_hook);
        self.collector.next_hook += 1;
        self.collector.pre_mark.push((id, hook));
        id
    }

    pub fn remove_pre_mark_hook(&mut self, id: PreMarkHookId) -> ArcadiaResult<()> {
        let position = self
            .collector
            .pre_mark
            .iter()
            .position(|(hook_id, _)| *hook_id == id)
            .ok_or_else(|| ArcadiaError::not_found("pre-mark hook is not registered"))?;
        self.collector.pre_mark.remove(position);
        Ok(())
    }

    /// Runs a single collection cycle.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn step_arms(&mut self, purge: bool) -> ArcadiaResult<CollectorStats> {
        if self.collector.is_collecting() {
            return Err(ArcadiaError::operation_invalid("collection is already in progress"));
        }
        self.collector.phase = Phase::Marking;
        let marked = self.mark(purge);
        self.collector.phase = Phase::Finalizing;
        let destroyed = self.sweep();
        self.collector.phase = Phase::Idle;
        self.collector.cycles += 1;

        let event = CollectionEvent {
            cycle: self.collector.cycles,
            purge,
            marked,
            destroyed,
            live: self.heap.len(),
        };
        tracing::debug!(marked, destroyed, live = event.live, "collection step finished");
        if let Some(sink) = self.telemetry_sink.as_mut() {
            sink(&event);
        }
        Ok(CollectorStats { destroyed })
    }

    /// Steps until a cycle destroys nothing, returning the total.
    pub fn run_arms(&mut self, purge: bool) -> ArcadiaResult<CollectorStats> {
        let mut total = CollectorStats::default();
        loop {
            let stats = self.step_arms(purge)?;
            if stats.destroyed == 0 {
                return Ok(total);
            }
            total.destroyed += stats.destroyed;
        }
    }

    fn mark(&mut self, purge: bool) -> usize {
        let mut marker = Marker::default();

        for object in self.heap.pinned() {
            marker.visit_object(object);
        }
        for value in self.thread.stack.iter() {
            value.visit(&mut marker);
        }
        let hooks: Vec<PreMarkFn> = self.collector.pre_mark.iter().map(|(_, hook)| *hook).collect();
        for hook in hooks {
            hook(self, &mut marker, purge);
        }

        let mut marked = 0;
        while let Some(object) = marker.gray.pop() {
            let entry = match self.heap.entry_mut(object) {
                Some(entry) if !entry.marked => entry,
                _ => continue,
            };
            entry.marked = true;
            marked += 1;
            if let Some(visit) = self.types.get(entry.type_handle).and_then(|record| record.hooks.visit) {
                visit(entry.payload.as_ref(), &mut marker);
            }
        }
        marked
    }

    fn sweep(&mut self) -> u64 {
        let mut unreachable = Vec::new();
        for (object, entry) in self.heap.entries_mut() {
            if entry.marked {
                entry.marked = false;
            } else {
                unreachable.push(object);
            }
        }

        let mut destroyed = 0;
        for object in unreachable {
            let Some(mut entry) = self.heap.remove(object) else {
                continue;
            };
            let finalize = match self.types.get_mut(entry.type_handle) {
                Some(record) => {
                    record.instances = record.instances.saturating_sub(1);
                    record.hooks.finalize
                }
                None => None,
            };
            if let Some(finalize) = finalize {
                finalize(self, object, entry.payload.as_mut());
            }
            destroyed += 1;
        }
        destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;
    use crate::runtime::{ObjectData, TypeHooks};
    use std::cell::RefCell;
    use std::collections::HashMap;

    thread_local! {
        static FINALIZED: RefCell<HashMap<ObjectRef, usize>> = RefCell::new(HashMap::new());
    }

    fn record_finalize(_: &mut ArcadiaVM, object: ObjectRef, _: &mut dyn ObjectData) {
        FINALIZED.with(|f| *f.borrow_mut().entry(object).or_default() += 1);
    }

    fn tracked_vm() -> ArcadiaVM {
        let mut vm = ArcadiaVM::new().unwrap();
        let hooks = TypeHooks {
            finalize: Some(record_finalize),
            ..TypeHooks::default()
        };
        vm.register_type("Test.Tracked", hooks).unwrap();
        vm
    }

    #[test]
    fn unreachable_objects_reach_a_fixed_point() {
        let mut vm = tracked_vm();
        let mut objects = Vec::new();
        for _ in 0..10 {
            objects.push(vm.allocate_block("Test.Tracked", 8).unwrap());
        }

        let mut steps = 0;
        loop {
            let stats = vm.step_arms(false).unwrap();
            steps += 1;
            if stats.destroyed == 0 {
                break;
            }
            assert!(steps < 10, "collector did not converge");
        }

        assert_eq!(vm.heap().len(), 0);
        FINALIZED.with(|f| {
            let f = f.borrow();
            for object in &objects {
                assert_eq!(f.get(object), Some(&1), "{} finalized once", object);
            }
        });
    }

    #[test]
    fn lists_keep_their_elements_alive() {
        let mut vm = tracked_vm();
        let list = vm.allocate_list().unwrap();
        let kept = vm.allocate_block("Test.Tracked", 1).unwrap();
        let dropped = vm.allocate_block("Test.Tracked", 1).unwrap();
        vm.with_list_mut(list, |list| list.append(Value::from(kept))).unwrap();
        vm.lock(list).unwrap();

        let stats = vm.run_arms(false).unwrap();
        assert_eq!(stats.destroyed, 1);
        assert!(vm.heap().contains(kept));
        assert!(!vm.heap().contains(dropped));

        vm.unlock(list).unwrap();
        assert_eq!(vm.run_arms(false).unwrap().destroyed, 2);
    }

    #[test]
    fn cycles_are_collected() {
        let mut vm = ArcadiaVM::new().unwrap();
        let a = vm.allocate_map().unwrap();
        let b = vm.allocate_map().unwrap();
        vm.map_set(a, Value::from(1i32), Value::from(b)).unwrap();
        vm.map_set(b, Value::from(1i32), Value::from(a)).unwrap();
        assert_eq!(vm.run_arms(false).unwrap().destroyed, 2);
    }

    #[test]
    fn value_stack_is_a_root() {
        let mut vm = ArcadiaVM::new().unwrap();
        let list = vm.allocate_list().unwrap();
        vm.thread_mut().stack.push(Value::from(list)).unwrap();
        assert_eq!(vm.run_arms(false).unwrap().destroyed, 0);
        vm.thread_mut().stack.pop().unwrap();
        assert_eq!(vm.run_arms(false).unwrap().destroyed, 1);
    }

    fn reentrant_finalize(vm: &mut ArcadiaVM, _: ObjectRef, _: &mut dyn ObjectData) {
        let error = vm.step_arms(false).unwrap_err();
        assert_eq!(error.status, Status::OperationInvalid);
    }

    #[test]
    fn finalizers_cannot_start_a_nested_cycle() {
        let mut vm = ArcadiaVM::new().unwrap();
        let hooks = TypeHooks {
            finalize: Some(reentrant_finalize),
            ..TypeHooks::default()
        };
        vm.register_type("Test.Reentrant", hooks).unwrap();
        vm.allocate_block("Test.Reentrant", 0).unwrap();
        assert_eq!(vm.step_arms(false).unwrap().destroyed, 1);
    }

    fn pin_everything(vm: &mut ArcadiaVM, marker: &mut Marker, _purge: bool) {
        for object in vm.heap().objects() {
            marker.visit_object(object);
        }
    }

    #[test]
    fn pre_mark_hooks_add_roots_until_removed() {
        let mut vm = ArcadiaVM::new().unwrap();
        vm.allocate_list().unwrap();
        let hook = vm.add_pre_mark_hook(pin_everything);
        assert_eq!(vm.run_arms(false).unwrap().destroyed, 0);
        vm.remove_pre_mark_hook(hook).unwrap();
        assert_eq!(vm.remove_pre_mark_hook(hook).unwrap_err().status, Status::NotFound);
        assert_eq!(vm.run_arms(false).unwrap().destroyed, 1);
    }

    #[test]
    fn telemetry_sink_sees_every_step() {
        let mut vm = ArcadiaVM::new().unwrap();
        let events = std::rc::Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        vm.set_telemetry_sink(Box::new(move |event: &CollectionEvent| sink.borrow_mut().push(*event)));
        vm.allocate_list().unwrap();
        vm.run_arms(true).unwrap();
        let events = events.borrow();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].destroyed, 1);
        assert!(events[0].purge);
        assert_eq!(events[1].destroyed, 0);
    }
}
