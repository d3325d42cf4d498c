// arcadia_core/src/runtime/atom_table.rs

//! Interned immutable byte sequences. Equal byte sequences share one heap
//! object for as long as it lives. The table itself holds its atoms weakly:
//! reachability decides their fate, the pre-mark hook only keeps recently
//! used atoms warm.

use std::fmt;

use enum_map::EnumMap;

use crate::config::AtomTableConfig;
use crate::error::{ArcadiaError, ArcadiaResult};
use crate::growth::{Growth, GrowthStrategy};
use crate::runtime::{
    validate_qualified_name, ArcadiaVM, Heap, Marker, ObjectData, ObjectRef, PreMarkHookId, TypeHandle, TypeHooks,
};
use crate::value::{Value, ValueTag};

pub const ATOM_TYPE_NAME: &str = "Arcadia.Atom";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomKind {
    /// Any byte sequence.
    Bytes,
    /// A qualified dotted identifier, validated before interning.
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom(ObjectRef);

impl Atom {
    pub fn object(&self) -> ObjectRef {
        self.0
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "atom@{}", self.0)
    }
}

#[derive(Debug)]
pub struct AtomData {
    hash: u64,
    bytes: Box<[u8]>,
    last_visited: u64,
}

impl AtomData {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn last_visited(&self) -> u64 {
        self.last_visited
    }
}

impl ObjectData for AtomData {
    fn hash_code(&self, _heap: &Heap) -> Option<u64> {
        Some(self.hash)
    }
}

/// Seeded with the length, folding each byte as `hash * 37 + byte`.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(bytes.len() as u64, |hash, &byte| hash.wrapping_mul(37).wrapping_add(u64::from(byte)))
}

#[derive(Debug, Clone, Copy)]
struct AtomEntry {
    hash: u64,
    atom: Atom,
}

#[derive(Debug)]
struct AtomTable {
    buckets: Vec<Vec<AtomEntry>>,
    size: usize,
    minimum_capacity: usize,
    maximum_capacity: usize,
    retention_threshold: u64,
}

impl AtomTable {
    fn new(config: &AtomTableConfig) -> ArcadiaResult<Self> {
        let buckets = empty_buckets(config.initial_capacity)?;
        Ok(AtomTable {
            buckets,
            size: 0,
            minimum_capacity: config.initial_capacity,
            maximum_capacity: config.maximum_capacity,
            retention_threshold: config.retention_threshold,
        })
    }

    fn capacity(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_of(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    fn find(&self, heap: &Heap, hash: u64, bytes: &[u8]) -> Option<Atom> {
        self.buckets[self.bucket_of(hash)]
            .iter()
            .filter(|entry| entry.hash == hash)
            .find(|entry| match heap.downcast::<AtomData>(entry.atom.0) {
                Ok(data) => data.bytes.len() == bytes.len() && *data.bytes == *bytes,
                Err(_) => false,
            })
            .map(|entry| entry.atom)
    }

    fn insert(&mut self, entry: AtomEntry) {
        let bucket = self.bucket_of(entry.hash);
        self.buckets[bucket].insert(0, entry);
        self.size += 1;
    }

    fn remove(&mut self, hash: u64, atom: Atom) -> bool {
        let bucket = self.bucket_of(hash);
        let chain = &mut self.buckets[bucket];
        match chain.iter().position(|entry| entry.atom == atom) {
            Some(position) => {
                chain.remove(position);
                self.size -= 1;
                true
            }
            None => false,
        }
    }

    /// Doubles the bucket array, saturating at the maximum. The new array is
    /// built completely before it replaces the old one.
    fn resize(&mut self) -> ArcadiaResult<()> {
        if self.capacity() >= self.maximum_capacity {
            return Ok(());
        }
        let growth = Growth::with_maximum(self.maximum_capacity);
        let new_capacity = growth.grow(self.capacity(), 1, GrowthStrategy::Composite)?;
        let mut buckets = empty_buckets(new_capacity)?;
        for entry in self.buckets.iter().flatten() {
            let bucket = (entry.hash % new_capacity as u64) as usize;
            buckets[bucket].insert(0, *entry);
        }
        tracing::debug!(from = self.capacity(), to = new_capacity, "atom table resized");
        self.buckets = buckets;
        Ok(())
    }

    fn entries(&self) -> impl Iterator<Item = &AtomEntry> {
        self.buckets.iter().flatten()
    }
}

fn empty_buckets(capacity: usize) -> ArcadiaResult<Vec<Vec<AtomEntry>>> {
    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(capacity)
        .map_err(|e| ArcadiaError::allocation_failed(e.to_string()))?;
    buckets.resize_with(capacity, Vec::new);
    Ok(buckets)
}

/// Reference-counted atom subsystem state.
#[derive(Debug, Default)]
pub struct Atoms {
    table: Option<AtomTable>,
    reference_count: usize,
    /// Latch for the atom type registration; cleared when the type is removed.
    type_registered: bool,
    pre_mark_hook: Option<PreMarkHookId>,
    tag_names: EnumMap<ValueTag, Option<Atom>>,
}

impl Atoms {
    pub fn is_active(&self) -> bool {
        self.table.is_some()
    }

    pub fn reference_count(&self) -> usize {
        self.reference_count
    }
}

fn atom_type_removed(vm: &mut ArcadiaVM, _: TypeHandle) {
    vm.atoms.type_registered = false;
}

fn atom_finalize(vm: &mut ArcadiaVM, object: ObjectRef, data: &mut dyn ObjectData) {
    let Some(data) = data.downcast_ref::<AtomData>() else {
        return;
    };
    if let Some(table) = vm.atoms.table.as_mut() {
        table.remove(data.hash, Atom(object));
    }
}

fn atom_pre_mark(vm: &mut ArcadiaVM, marker: &mut Marker, purge: bool) {
    if purge {
        return;
    }
    let Some(table) = vm.atoms.table.as_ref() else {
        return;
    };
    let now = vm.clock.now();
    for entry in table.entries() {
        if let Ok(data) = vm.heap.downcast::<AtomData>(entry.atom.0) {
            if now.saturating_sub(data.last_visited) <= table.retention_threshold {
                marker.visit_atom(entry.atom);
            }
        }
    }
}

impl ArcadiaVM {
    // === LIFECYCLE ===

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn atoms_startup(&mut self) -> ArcadiaResult<()> {
        if self.atoms.reference_count > 0 {
            self.atoms.reference_count = self
                .atoms
                .reference_count
                .checked_add(1)
                .ok_or_else(|| ArcadiaError::operation_invalid("atom table reference count overflow"))?;
            return Ok(());
        }

        if !self.atoms.type_registered {
            let hooks = TypeHooks {
                type_removed: Some(atom_type_removed),
                visit: None,
                finalize: Some(atom_finalize),
            };
            self.register_type(ATOM_TYPE_NAME, hooks)?;
            self.atoms.type_registered = true;
        }
        let table = self.rebuild_atom_table()?;
        self.atoms.table = Some(table);
        self.atoms.pre_mark_hook = Some(self.add_pre_mark_hook(atom_pre_mark));
        self.atoms.reference_count = 1;
        tracing::debug!("atom table started");
        Ok(())
    }

    /// Fresh table holding every atom that outlived the previous one, so
    /// equal bytes keep mapping to the same object across restarts.
    fn rebuild_atom_table(&self) -> ArcadiaResult<AtomTable> {
        let mut table = AtomTable::new(&self.config.atoms)?;
        let atom_type = self.types.lookup(ATOM_TYPE_NAME)?;
        let survivors: Vec<AtomEntry> = self
            .heap
            .objects()
            .filter(|object| self.heap.type_of(*object) == Some(atom_type))
            .filter_map(|object| {
                let data = self.heap.downcast::<AtomData>(object).ok()?;
                Some(AtomEntry {
                    hash: data.hash,
                    atom: Atom(object),
                })
            })
            .collect();
        if !survivors.is_empty() {
            tracing::debug!(adopted = survivors.len(), "surviving atoms adopted");
        }
        for entry in survivors {
            table.insert(entry);
            if table.size >= table.capacity() {
                table.resize()?;
            }
        }
        Ok(table)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn atoms_shutdown(&mut self) -> ArcadiaResult<()> {
        match self.atoms.reference_count {
            0 => Err(ArcadiaError::operation_invalid("atom table is not active")),
            1 => {
                self.release_tag_names();
                if let Some(hook) = self.atoms.pre_mark_hook.take() {
                    self.remove_pre_mark_hook(hook)?;
                }
                if !self.collector.is_collecting() {
                    self.run_arms(true)?;
                }
                if let Some(table) = self.atoms.table.take() {
                    if table.size > 0 {
                        tracing::warn!(remaining = table.size, "atoms remain at atom table shutdown");
                    }
                }
                self.atoms.reference_count = 0;
                tracing::debug!("atom table shut down");
                Ok(())
            }
            _ => {
                self.atoms.reference_count -= 1;
                Ok(())
            }
        }
    }

    fn release_tag_names(&mut self) {
        let cached: Vec<Atom> = self.atoms.tag_names.values_mut().filter_map(Option::take).collect();
        for atom in cached {
            if let Err(error) = self.unlock(atom.0) {
                tracing::warn!(%atom, %error, "cached type name was not pinned");
            }
        }
    }

    // === INTERNING ===

    pub fn get_or_create_atom(&mut self, kind: AtomKind, bytes: &[u8]) -> ArcadiaResult<Atom> {
        let atom_type = self.types.lookup(ATOM_TYPE_NAME);
        let table = self
            .atoms
            .table
            .as_ref()
            .ok_or_else(|| ArcadiaError::operation_invalid("atom table is not active"))?;
        if kind == AtomKind::Name {
            validate_qualified_name(bytes)?;
        }

        let now = self.clock.now();
        let hash = hash_bytes(bytes);
        if let Some(atom) = table.find(&self.heap, hash, bytes) {
            if let Ok(data) = self.heap.downcast_mut::<AtomData>(atom.0) {
                data.last_visited = now;
            }
            return Ok(atom);
        }

        let mut copy = Vec::new();
        copy.try_reserve_exact(bytes.len())
            .map_err(|e| ArcadiaError::allocation_failed(e.to_string()))?;
        copy.extend_from_slice(bytes);
        let data = AtomData {
            hash,
            bytes: copy.into_boxed_slice(),
            last_visited: now,
        };
        let object = self.allocate_typed(atom_type?, Box::new(data))?;
        let atom = Atom(object);

        let table = self
            .atoms
            .table
            .as_mut()
            .ok_or_else(|| ArcadiaError::operation_invalid("atom table is not active"))?;
        table.insert(AtomEntry { hash, atom });
        if table.size >= table.capacity() {
            table.resize()?;
        }
        Ok(atom)
    }

    pub fn get_or_create_atom_str(&mut self, text: &str) -> ArcadiaResult<Atom> {
        self.get_or_create_atom(AtomKind::Bytes, text.as_bytes())
    }

    pub fn get_or_create_name(&mut self, name: &str) -> ArcadiaResult<Atom> {
        self.get_or_create_atom(AtomKind::Name, name.as_bytes())
    }

    // === ACCESS ===

    pub fn atom_bytes(&self, atom: Atom) -> ArcadiaResult<&[u8]> {
        Ok(self.heap.downcast::<AtomData>(atom.0)?.bytes())
    }

    pub fn atom_hash(&self, atom: Atom) -> ArcadiaResult<u64> {
        Ok(self.heap.downcast::<AtomData>(atom.0)?.hash())
    }

    pub fn atom_to_str(&self, atom: Atom) -> ArcadiaResult<&str> {
        std::str::from_utf8(self.atom_bytes(atom)?)
            .map_err(|e| ArcadiaError::argument_value_invalid(format!("{} is not UTF-8: {}", atom, e)))
    }

    pub fn atom_table_size(&self) -> ArcadiaResult<usize> {
        self.atom_table().map(|table| table.size)
    }

    pub fn atom_table_capacity(&self) -> ArcadiaResult<usize> {
        self.atom_table().map(AtomTable::capacity)
    }

    pub fn atom_table_minimum_capacity(&self) -> ArcadiaResult<usize> {
        self.atom_table().map(|table| table.minimum_capacity)
    }

    pub fn atoms(&self) -> &Atoms {
        &self.atoms
    }

    fn atom_table(&self) -> ArcadiaResult<&AtomTable> {
        self.atoms
            .table
            .as_ref()
            .ok_or_else(|| ArcadiaError::operation_invalid("atom table is not active"))
    }

    /// Interned name of the type of `value`. Names for primitive tags are
    /// cached and pinned while the atom table is active.
    pub fn value_type_name(&mut self, value: &Value) -> ArcadiaResult<Atom> {
        if let Value::ObjectReference(object) = value {
            let handle = self.type_of(*object)?;
            let name = self.type_name(handle)?.to_string();
            return self.get_or_create_name(&name);
        }
        let tag = value.tag();
        if let Some(atom) = self.atoms.tag_names[tag] {
            return Ok(atom);
        }
        let atom = self.get_or_create_name(tag.type_name())?;
        self.lock(atom.0)?;
        self.atoms.tag_names[tag] = Some(atom);
        Ok(atom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::error::Status;
    use crate::runtime::Clock;
    use proptest::prelude::*;

    fn started() -> ArcadiaVM {
        let mut vm = ArcadiaVM::new().unwrap();
        vm.atoms_startup().unwrap();
        vm
    }

    #[test]
    fn hash_folds_bytes_over_the_length() {
        assert_eq!(hash_bytes(b""), 0);
        assert_eq!(hash_bytes(b"a"), 37 + 97);
        assert_eq!(hash_bytes(b"ab"), (2 * 37 + 97) * 37 + 98);
    }

    #[test]
    fn equal_bytes_share_one_atom() {
        let mut vm = started();
        let a = vm.get_or_create_atom_str("Arcadia").unwrap();
        let size = vm.atom_table_size().unwrap();
        let b = vm.get_or_create_atom_str("Arcadia").unwrap();
        assert_eq!(a, b);
        assert_eq!(vm.atom_table_size().unwrap(), size);
        assert_ne!(a, vm.get_or_create_atom_str("Arcadian").unwrap());
        assert_eq!(vm.atom_to_str(a).unwrap(), "Arcadia");
    }

    #[test]
    fn empty_and_binary_atoms_are_allowed() {
        let mut vm = started();
        let empty = vm.get_or_create_atom(AtomKind::Bytes, b"").unwrap();
        assert_eq!(vm.atom_bytes(empty).unwrap(), b"");
        let binary = vm.get_or_create_atom(AtomKind::Bytes, &[0xff, 0x00]).unwrap();
        assert_eq!(vm.atom_to_str(binary).unwrap_err().status, Status::ArgumentValueInvalid);
    }

    #[test]
    fn names_are_validated_before_allocation() {
        let mut vm = started();
        assert!(vm.get_or_create_name("Foo.Bar_1").is_ok());
        let live = vm.heap().len();
        for bad in ["1Foo", ".Foo", "Foo.", "Foo Bar"] {
            let error = vm.get_or_create_name(bad).unwrap_err();
            assert_eq!(error.status, Status::ArgumentValueInvalid, "{:?}", bad);
        }
        assert_eq!(vm.heap().len(), live);
    }

    #[test]
    fn reference_counted_lifecycle() {
        let mut vm = ArcadiaVM::new().unwrap();
        vm.atoms_startup().unwrap();
        vm.atoms_startup().unwrap();
        vm.atoms_shutdown().unwrap();
        assert!(vm.atoms().is_active());
        assert_eq!(vm.atoms().reference_count(), 1);
        vm.atoms_shutdown().unwrap();
        assert!(!vm.atoms().is_active());
        assert_eq!(vm.atoms_shutdown().unwrap_err().status, Status::OperationInvalid);
        assert_eq!(vm.get_or_create_atom_str("x").unwrap_err().status, Status::OperationInvalid);
    }

    #[test]
    fn restart_after_type_removal_registers_again() {
        let mut vm = started();
        vm.atoms_shutdown().unwrap();
        vm.unregister_type(ATOM_TYPE_NAME).unwrap();
        vm.atoms_startup().unwrap();
        assert!(vm.type_handle(ATOM_TYPE_NAME).is_ok());
        assert!(vm.get_or_create_atom_str("again").is_ok());
    }

    #[test]
    fn capacity_doubles_from_the_minimum() {
        let mut vm = started();
        let minimum = vm.atom_table_minimum_capacity().unwrap();
        let mut previous = vm.atom_table_capacity().unwrap();
        assert_eq!(previous, minimum);
        for i in 0..100 {
            vm.get_or_create_atom_str(&format!("atom-{}", i)).unwrap();
            let capacity = vm.atom_table_capacity().unwrap();
            assert!(capacity >= previous);
            assert!((capacity / minimum).is_power_of_two() && capacity % minimum == 0);
            assert!(vm.atom_table_size().unwrap() <= capacity);
            previous = capacity;
        }
    }

    #[test]
    fn capacity_saturates_at_the_maximum() {
        let mut config = RuntimeConfig::default();
        config.atoms.initial_capacity = 2;
        config.atoms.maximum_capacity = 6;
        let mut vm = ArcadiaVM::with_config(config).unwrap();
        vm.atoms_startup().unwrap();
        for i in 0..20 {
            vm.get_or_create_atom_str(&i.to_string()).unwrap();
        }
        assert_eq!(vm.atom_table_capacity().unwrap(), 6);
        assert_eq!(vm.atom_table_size().unwrap(), 20);
        // Every atom is still found by content.
        let seven = vm.get_or_create_atom_str("7").unwrap();
        assert_eq!(vm.atom_table_size().unwrap(), 20);
        assert_eq!(vm.atom_to_str(seven).unwrap(), "7");
    }

    #[test]
    fn recently_used_atoms_are_kept_warm() {
        let mut vm = ArcadiaVM::new().unwrap();
        vm.set_clock(Clock::manual(0));
        vm.atoms_startup().unwrap();
        vm.get_or_create_atom_str("warm").unwrap();

        vm.advance_clock(60_000).unwrap();
        assert_eq!(vm.run_arms(false).unwrap().destroyed, 0);

        vm.advance_clock(1).unwrap();
        assert_eq!(vm.run_arms(false).unwrap().destroyed, 1);
        assert_eq!(vm.atom_table_size().unwrap(), 0);
    }

    #[test]
    fn purge_ignores_recency_but_not_reachability() {
        let mut vm = started();
        let held = vm.get_or_create_atom_str("held").unwrap();
        vm.get_or_create_atom_str("loose").unwrap();
        let list = vm.allocate_list_from([Value::from(held)]).unwrap();
        vm.lock(list).unwrap();

        assert_eq!(vm.run_arms(true).unwrap().destroyed, 1);
        assert_eq!(vm.atom_table_size().unwrap(), 1);
        assert_eq!(vm.get_or_create_atom_str("held").unwrap(), held);
    }

    #[test]
    fn lookup_refreshes_recency() {
        let mut vm = ArcadiaVM::new().unwrap();
        vm.set_clock(Clock::manual(0));
        vm.atoms_startup().unwrap();
        vm.get_or_create_atom_str("touched").unwrap();
        vm.advance_clock(50_000).unwrap();
        vm.get_or_create_atom_str("touched").unwrap();
        vm.advance_clock(50_000).unwrap();
        assert_eq!(vm.run_arms(false).unwrap().destroyed, 0);
    }

    #[test]
    fn shutdown_reports_but_tolerates_live_atoms() {
        let mut vm = started();
        let atom = vm.get_or_create_atom_str("pinned").unwrap();
        vm.lock(atom.object()).unwrap();
        assert!(vm.atoms_shutdown().is_ok());
        assert!(!vm.atoms().is_active());
        // A surviving atom is finalized quietly once released.
        vm.unlock(atom.object()).unwrap();
        assert_eq!(vm.run_arms(false).unwrap().destroyed, 1);
    }

    #[test]
    fn restart_keeps_surviving_atoms_unique() {
        let mut vm = started();
        let pinned = vm.get_or_create_atom_str("pinned").unwrap();
        vm.lock(pinned.object()).unwrap();
        vm.atoms_shutdown().unwrap();

        vm.atoms_startup().unwrap();
        assert_eq!(vm.atom_table_size().unwrap(), 1);
        assert_eq!(vm.get_or_create_atom_str("pinned").unwrap(), pinned);
        assert_eq!(vm.atom_table_size().unwrap(), 1);

        // Once released it is unlinked like any other atom.
        vm.unlock(pinned.object()).unwrap();
        assert_eq!(vm.run_arms(true).unwrap().destroyed, 1);
        assert_eq!(vm.atom_table_size().unwrap(), 0);
        assert_ne!(vm.get_or_create_atom_str("pinned").unwrap(), pinned);
    }

    #[test]
    fn type_names_of_values() {
        let mut vm = started();
        let name = vm.value_type_name(&Value::from(1i16)).unwrap();
        assert_eq!(vm.atom_to_str(name).unwrap(), "Arcadia.Integer16");
        assert_eq!(vm.value_type_name(&Value::from(2i16)).unwrap(), name);

        let map = vm.allocate_map().unwrap();
        let name = vm.value_type_name(&Value::from(map)).unwrap();
        assert_eq!(vm.atom_to_str(name).unwrap(), "Arcadia.Map");

        // Cached names survive purges and are released at shutdown.
        let void = vm.value_type_name(&Value::Void).unwrap();
        vm.run_arms(true).unwrap();
        assert!(vm.heap().contains(void.object()));
        vm.atoms_shutdown().unwrap();
        assert_eq!(vm.heap().len(), 0);
    }

    proptest! {
        #[test]
        fn interning_is_identity_on_content(words in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..12), 1..40)) {
            let mut vm = started();
            let mut seen: Vec<(Vec<u8>, Atom)> = Vec::new();
            for word in words {
                let before = vm.atom_table_size().unwrap();
                let atom = vm.get_or_create_atom(AtomKind::Bytes, &word).unwrap();
                let after = vm.atom_table_size().unwrap();
                match seen.iter().find(|(bytes, _)| *bytes == word) {
                    Some((_, existing)) => {
                        prop_assert_eq!(*existing, atom);
                        prop_assert_eq!(before, after);
                    }
                    None => {
                        prop_assert!(seen.iter().all(|(_, other)| *other != atom));
                        prop_assert_eq!(before + 1, after);
                        seen.push((word, atom));
                    }
                }
            }
        }
    }
}
