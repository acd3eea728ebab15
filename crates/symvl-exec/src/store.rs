//! The constraint store
//!
//! Holds everything the solver will eventually see: the append-only list of
//! logical path constraints, per-name constraints (where clauses and axioms
//! waiting for their name to materialize), parametric per-map constraints,
//! and the queue of map points awaiting constraint propagation. Like
//! memory, the store is persistent so goto snapshots are cheap.

use crate::error::{ExecResult, Failure};
use im::{HashMap as ImHashMap, OrdMap, Vector};
use symvl_core::ast::{as_literal, free_vars, Thunk};
use symvl_core::ty::Type;
use symvl_core::value::Value;

/// Which name-constraint table a constraint registers in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintScope {
    Globals,
    Locals,
}

/// A parametric map constraint: `lambda formals. guards ==> body`, holding
/// for every argument tuple of the map it is attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapConstraint {
    pub formals: Vec<(String, Type)>,
    /// Conjunction of guards; empty means the constraint is unguarded
    pub guards: Vec<Thunk>,
    pub body: Thunk,
}

impl MapConstraint {
    pub fn is_guarded(&self) -> bool {
        !self.guards.is_empty()
    }
}

/// A cached map selection awaiting constraint propagation. Point identity
/// follows thunk identity, which ignores spans: one selection value is one
/// point no matter where in the source it occurs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    pub map_id: u64,
    pub args: Vec<Thunk>,
}

/// The constraint subsystem's state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintStore {
    /// Path conditions and assumed formulas, append-only within a path
    logical: Vector<Thunk>,
    name_globals: OrdMap<String, Vector<Thunk>>,
    name_locals: OrdMap<String, Vector<Thunk>>,
    /// Parametric constraints per map id
    map_constraints: OrdMap<u64, Vector<MapConstraint>>,
    /// Points whose map constraints have not been propagated yet
    point_queue: Vector<Point>,
    /// How many of a map's constraints have already been applied at a point
    applied: ImHashMap<(u64, Vec<Thunk>), usize>,
    /// True iff a logical constraint was added since the last SAT check
    changed: bool,
    /// Enablement counters per (map id, constraint index), used as
    /// tie-breakers when ordering guarded cases
    case_counts: ImHashMap<(u64, usize), u64>,
}

impl ConstraintStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- logical constraints ---

    /// Append a boolean constraint. Literal true is a no-op; literal false
    /// makes the path infeasible at the thunk's position.
    pub fn extend_logical(&mut self, thunk: Thunk) -> ExecResult<()> {
        match as_literal(&thunk) {
            Some(Value::Bool(true)) => Ok(()),
            Some(Value::Bool(false)) => Err(Failure::unreachable(thunk.span)),
            _ => {
                tracing::trace!(constraint = ?thunk.node, "assume");
                self.logical.push_back(thunk);
                self.changed = true;
                Ok(())
            }
        }
    }

    pub fn logical_constraints(&self) -> impl Iterator<Item = &Thunk> {
        self.logical.iter()
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn clear_changed(&mut self) {
        self.changed = false;
    }

    // --- name constraints ---

    /// Register a constraint under every name occurring free in it
    pub fn extend_name(&mut self, scope: ConstraintScope, thunk: Thunk) {
        for name in free_vars(&thunk) {
            self.extend_name_as(scope, &name, thunk.clone());
        }
    }

    /// Register a constraint under a specific name
    pub fn extend_name_as(&mut self, scope: ConstraintScope, name: &str, thunk: Thunk) {
        let table = match scope {
            ConstraintScope::Globals => &mut self.name_globals,
            ConstraintScope::Locals => &mut self.name_locals,
        };
        let mut entry = table.get(name).cloned().unwrap_or_default();
        entry.push_back(thunk);
        table.insert(name.to_string(), entry);
    }

    /// Constraints registered under `name` in the given table
    pub fn name_constraints(&self, scope: ConstraintScope, name: &str) -> Vec<Thunk> {
        let table = match scope {
            ConstraintScope::Globals => &self.name_globals,
            ConstraintScope::Locals => &self.name_locals,
        };
        table
            .get(name)
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Replace the locals table (procedure entry/exit)
    pub fn swap_local_names(
        &mut self,
        table: OrdMap<String, Vector<Thunk>>,
    ) -> OrdMap<String, Vector<Thunk>> {
        std::mem::replace(&mut self.name_locals, table)
    }

    // --- map constraints ---

    /// Attach a parametric constraint to a map and re-enqueue every already
    /// materialized point of that map that is not currently queued.
    /// `points` is the map's current point set (keys of its instance).
    pub fn extend_map(&mut self, map_id: u64, constraint: MapConstraint, points: Vec<Vec<Thunk>>) {
        let mut entry = self.map_constraints.get(&map_id).cloned().unwrap_or_default();
        entry.push_back(constraint);
        self.map_constraints.insert(map_id, entry);

        for args in points {
            let point = Point { map_id, args };
            if !self.point_queue.contains(&point) {
                self.point_queue.push_back(point);
            }
        }
    }

    pub fn map_constraints_of(&self, map_id: u64) -> Vec<MapConstraint> {
        self.map_constraints
            .get(&map_id)
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Iterate all (map id, constraint) pairs
    pub fn all_map_constraints(&self) -> impl Iterator<Item = (u64, &Vector<MapConstraint>)> {
        self.map_constraints.iter().map(|(id, v)| (*id, v))
    }

    /// Replace the whole map-constraint table (used when a solution is
    /// materialized back into visible state)
    pub fn set_map_constraints(&mut self, table: Vec<(u64, Vec<MapConstraint>)>) {
        let mut rewritten = OrdMap::new();
        for (id, cs) in table {
            rewritten.insert(id, cs.into_iter().collect::<Vector<_>>());
        }
        self.map_constraints = rewritten;
    }

    // --- point queue ---

    pub fn enqueue_point(&mut self, map_id: u64, args: Vec<Thunk>) {
        let point = Point { map_id, args };
        if !self.point_queue.contains(&point) {
            self.point_queue.push_back(point);
        }
    }

    pub fn dequeue_point(&mut self) -> Option<Point> {
        self.point_queue.pop_front()
    }

    pub fn has_queued_points(&self) -> bool {
        !self.point_queue.is_empty()
    }

    /// Index of the first not-yet-applied constraint at a point
    pub fn applied_at(&self, map_id: u64, args: &[Thunk]) -> usize {
        self.applied
            .get(&(map_id, args.to_vec()))
            .copied()
            .unwrap_or(0)
    }

    pub fn mark_applied(&mut self, map_id: u64, args: Vec<Thunk>, upto: usize) {
        self.applied.insert((map_id, args), upto);
    }

    // --- case counters ---

    pub fn case_count(&self, map_id: u64, index: usize) -> u64 {
        self.case_counts.get(&(map_id, index)).copied().unwrap_or(0)
    }

    pub fn bump_case_count(&mut self, map_id: u64, index: usize) {
        let n = self.case_count(map_id, index);
        self.case_counts.insert((map_id, index), n + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symvl_core::ast::{lit, Expr};
    use symvl_core::{Span, Spanned};

    fn var(name: &str) -> Thunk {
        Spanned::dummy(Expr::Var(name.to_string()))
    }

    #[test]
    fn literal_true_is_noop() {
        let mut store = ConstraintStore::new();
        store
            .extend_logical(lit(Value::Bool(true), Span::dummy()))
            .unwrap();
        assert_eq!(store.logical_constraints().count(), 0);
        assert!(!store.changed());
    }

    #[test]
    fn literal_false_is_unreachable() {
        let mut store = ConstraintStore::new();
        let err = store
            .extend_logical(lit(Value::Bool(false), Span::dummy()))
            .unwrap_err();
        assert!(err.is_unreachable());
    }

    #[test]
    fn symbolic_constraint_sets_changed() {
        let mut store = ConstraintStore::new();
        store.extend_logical(var("p")).unwrap();
        assert!(store.changed());
        assert_eq!(store.logical_constraints().count(), 1);
    }

    #[test]
    fn name_registration_covers_all_free_names() {
        let mut store = ConstraintStore::new();
        let c = Spanned::dummy(Expr::Binary(
            symvl_core::ast::BinOp::Lt,
            Box::new(var("x")),
            Box::new(var("y")),
        ));
        store.extend_name(ConstraintScope::Globals, c.clone());
        assert_eq!(store.name_constraints(ConstraintScope::Globals, "x"), vec![c.clone()]);
        assert_eq!(store.name_constraints(ConstraintScope::Globals, "y"), vec![c]);
        assert!(store.name_constraints(ConstraintScope::Locals, "x").is_empty());
    }

    #[test]
    fn extend_map_requeues_points_once() {
        let mut store = ConstraintStore::new();
        let c = MapConstraint {
            formals: vec![("i".to_string(), Type::Int)],
            guards: vec![],
            body: var("p"),
        };
        let point = vec![lit(Value::int(1), Span::dummy())];
        store.extend_map(0, c.clone(), vec![point.clone()]);
        store.extend_map(0, c, vec![point.clone()]);
        // the second extension finds the point already queued
        assert_eq!(store.dequeue_point().unwrap().args, point);
        assert!(store.dequeue_point().is_none());
    }

    #[test]
    fn case_counts_default_to_zero_and_bump() {
        let mut store = ConstraintStore::new();
        assert_eq!(store.case_count(3, 0), 0);
        store.bump_case_count(3, 0);
        store.bump_case_count(3, 0);
        assert_eq!(store.case_count(3, 0), 2);
    }
}
