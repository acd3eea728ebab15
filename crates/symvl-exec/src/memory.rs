//! Symbolic memory
//!
//! Memory is the four-region name store (locals, globals, old, constants)
//! plus the map heap, the modified-set of the current frame, and the
//! solution the solver has committed so far. All containers are persistent
//! (`im`), so the snapshot taken before a nondeterministic goto is a cheap
//! structural share; a restored snapshot never resurrects a reclaimed ref
//! because ref counters live outside memory and are never rolled back.

use im::{HashMap as ImHashMap, OrdMap, OrdSet};
use symvl_core::ast::Thunk;
use symvl_core::value::{MapRef, Ref, Value};

/// A map instance: finite cache from evaluated argument tuples to values.
/// Concrete arguments reduce to literal thunks, so the common key is a
/// tuple of values; residual symbolic arguments key structurally. Thunk
/// identity ignores spans, so the same argument written at two source
/// positions is one key.
pub type MapInstance = ImHashMap<Vec<Thunk>, Thunk>;

/// The four name regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Locals,
    Globals,
    Old,
    Constants,
}

/// The symbolic state visible to the evaluator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Memory {
    locals: OrdMap<String, Thunk>,
    globals: OrdMap<String, Thunk>,
    old: OrdMap<String, Thunk>,
    constants: OrdMap<String, Thunk>,
    /// Map instances, arena-keyed by id; instances refer to other maps by
    /// id only, never by embedding
    heap: OrdMap<u64, MapInstance>,
    /// Globals modified since the current procedure entry
    modified: OrdSet<String>,
    /// Values the solver has committed for logical refs
    solution: OrdMap<u64, Value>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    fn region(&self, region: Region) -> &OrdMap<String, Thunk> {
        match region {
            Region::Locals => &self.locals,
            Region::Globals => &self.globals,
            Region::Old => &self.old,
            Region::Constants => &self.constants,
        }
    }

    fn region_mut(&mut self, region: Region) -> &mut OrdMap<String, Thunk> {
        match region {
            Region::Locals => &mut self.locals,
            Region::Globals => &mut self.globals,
            Region::Old => &mut self.old,
            Region::Constants => &mut self.constants,
        }
    }

    pub fn get_var(&self, region: Region, name: &str) -> Option<&Thunk> {
        self.region(region).get(name)
    }

    pub fn set_var(&mut self, region: Region, name: impl Into<String>, thunk: Thunk) {
        self.region_mut(region).insert(name.into(), thunk);
    }

    pub fn forget_var(&mut self, region: Region, name: &str) {
        self.region_mut(region).remove(name);
    }

    /// Iterate the bindings of a region
    pub fn vars(&self, region: Region) -> impl Iterator<Item = (&String, &Thunk)> {
        self.region(region).iter()
    }

    /// Names bound in a region
    pub fn names(&self, region: Region) -> Vec<String> {
        self.region(region).keys().cloned().collect()
    }

    // --- map heap ---

    /// Install a fresh (normally empty) instance under a new id. The id
    /// comes from the engine's monotonic counter.
    pub fn install_map(&mut self, id: u64, instance: MapInstance) {
        self.heap.insert(id, instance);
    }

    pub fn map_instance(&self, r: &MapRef) -> MapInstance {
        self.heap.get(&r.id).cloned().unwrap_or_default()
    }

    pub fn map_lookup(&self, r: &MapRef, args: &[Thunk]) -> Option<&Thunk> {
        self.heap.get(&r.id).and_then(|inst| inst.get(args))
    }

    pub fn set_map_value(&mut self, r: &MapRef, args: Vec<Thunk>, value: Thunk) {
        let mut inst = self.heap.get(&r.id).cloned().unwrap_or_default();
        inst.insert(args, value);
        self.heap.insert(r.id, inst);
    }

    pub fn remove_map_key(&mut self, r: &MapRef, args: &[Thunk]) {
        if let Some(inst) = self.heap.get(&r.id) {
            let mut inst = inst.clone();
            inst.remove(args);
            self.heap.insert(r.id, inst);
        }
    }

    /// The materialized points of a map
    pub fn map_points(&self, id: u64) -> Vec<Vec<Thunk>> {
        self.heap
            .get(&id)
            .map(|inst| inst.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Ids of all maps in the heap
    pub fn map_ids(&self) -> Vec<u64> {
        self.heap.keys().copied().collect()
    }

    // --- modified-set ---

    pub fn mark_modified(&mut self, name: impl Into<String>) {
        self.modified.insert(name.into());
    }

    pub fn is_modified(&self, name: &str) -> bool {
        self.modified.contains(name)
    }

    pub fn modified_set(&self) -> &OrdSet<String> {
        &self.modified
    }

    pub fn set_modified(&mut self, set: OrdSet<String>) {
        self.modified = set;
    }

    pub fn clear_modified(&mut self) {
        self.modified = OrdSet::new();
    }

    // --- logical solution ---

    pub fn solution_of(&self, r: Ref) -> Option<&Value> {
        self.solution.get(&r.0)
    }

    pub fn commit_solution(&mut self, r: Ref, value: Value) {
        self.solution.insert(r.0, value);
    }

    pub fn has_solution(&self, r: Ref) -> bool {
        self.solution.contains_key(&r.0)
    }

    // --- frame plumbing used by the procedure engine ---

    pub fn take_region(&mut self, region: Region) -> OrdMap<String, Thunk> {
        std::mem::take(self.region_mut(region))
    }

    pub fn replace_region(&mut self, region: Region, map: OrdMap<String, Thunk>) {
        *self.region_mut(region) = map;
    }

    pub fn clone_region(&self, region: Region) -> OrdMap<String, Thunk> {
        self.region(region).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symvl_core::ast::{lit, Expr};
    use symvl_core::{Span, Spanned, Type};

    fn t(v: i64) -> Thunk {
        lit(Value::int(v), Span::dummy())
    }

    fn map_ref(id: u64) -> MapRef {
        MapRef {
            id,
            ty: Type::map(vec![Type::Int], Type::Int),
        }
    }

    #[test]
    fn set_get_forget() {
        let mut mem = Memory::new();
        mem.set_var(Region::Locals, "x", t(1));
        assert_eq!(mem.get_var(Region::Locals, "x"), Some(&t(1)));
        assert_eq!(mem.get_var(Region::Globals, "x"), None);
        mem.forget_var(Region::Locals, "x");
        assert_eq!(mem.get_var(Region::Locals, "x"), None);
    }

    #[test]
    fn map_heap_points() {
        let mut mem = Memory::new();
        let r = map_ref(0);
        mem.install_map(0, MapInstance::default());
        assert!(mem.map_points(0).is_empty());

        mem.set_map_value(&r, vec![t(1)], t(10));
        mem.set_map_value(&r, vec![t(2)], t(20));
        assert_eq!(mem.map_lookup(&r, &[t(1)]), Some(&t(10)));
        assert_eq!(mem.map_lookup(&r, &[t(3)]), None);
        assert_eq!(mem.map_points(0).len(), 2);
    }

    #[test]
    fn snapshots_are_independent() {
        let mut mem = Memory::new();
        mem.set_var(Region::Globals, "g", t(1));
        let snapshot = mem.clone();
        mem.set_var(Region::Globals, "g", t(2));
        assert_eq!(snapshot.get_var(Region::Globals, "g"), Some(&t(1)));
        assert_eq!(mem.get_var(Region::Globals, "g"), Some(&t(2)));
    }

    #[test]
    fn solution_merge() {
        let mut mem = Memory::new();
        let r = Ref(3);
        assert!(!mem.has_solution(r));
        mem.commit_solution(r, Value::int(9));
        assert_eq!(mem.solution_of(r), Some(&Value::int(9)));
    }

    #[test]
    fn non_literal_keys_are_distinct() {
        let mut mem = Memory::new();
        let r = map_ref(0);
        let sym = Spanned::dummy(Expr::Logical(Type::Int, Ref(0)));
        mem.set_map_value(&r, vec![sym.clone()], t(1));
        assert_eq!(mem.map_lookup(&r, &[sym]), Some(&t(1)));
        assert_eq!(mem.map_lookup(&r, &[t(0)]), None);
    }

    #[test]
    fn map_keys_ignore_source_position() {
        use symvl_core::FileId;
        let mut mem = Memory::new();
        let r = map_ref(0);
        let first = lit(Value::int(5), Span::new(FileId(0), 10, 11));
        let second = lit(Value::int(5), Span::new(FileId(0), 90, 91));
        mem.set_map_value(&r, vec![first], t(1));
        assert_eq!(mem.map_lookup(&r, &[second]), Some(&t(1)));
    }
}
