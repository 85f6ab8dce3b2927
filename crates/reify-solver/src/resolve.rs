//! Resolution engine.
//!
//! Answers "which value does each parameter slot of `ancestor` hold, as seen
//! from `root`?", where the root is a bare declaration or a specialization.
//!
//! Resolution has two halves:
//!
//! - **Planning** depends only on (start declaration, ancestor). From each of
//!   the start's own parameters the forwarding edges are walked breadth-first
//!   until nodes of the ancestor are reached. Slots left uncovered are then
//!   looked for through each direct base treated as a sub-root, which picks up
//!   concrete and nested arguments written in base lists. Ambiguous
//!   provenance is detected here, so plans (and their errors) are cached per
//!   query shape.
//! - **Evaluation** turns each planned slot into a value for a particular
//!   root: a specialization's own argument wins, otherwise the originating
//!   parameter's default, otherwise (opt-in) the first bound on the path.

use crate::def::DeclarationStore;
use crate::error::{Provenance, ReifyError, ReifyResult};
use crate::param_graph::ParamGraph;
use crate::specialize::Specialization;
use crate::types::{ArgExpr, DeclId, ParamRef, ResolvedArgs, Value};
use dashmap::DashMap;
use reify_common::limits::PLAN_CACHE_CAPACITY;
use rustc_hash::{FxBuildHasher, FxHashSet};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

/// What a resolution starts from.
#[derive(Clone, Copy, Debug)]
pub enum Root<'r> {
    Declaration(DeclId),
    Specialization(&'r Specialization),
}

impl Root<'_> {
    #[inline]
    pub fn decl(&self) -> DeclId {
        match self {
            Root::Declaration(decl) => *decl,
            Root::Specialization(spec) => spec.decl(),
        }
    }
}

// =============================================================================
// Plans
// =============================================================================

/// A walk along forwarding edges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TracePath {
    /// Visited nodes, from the originating parameter to the ancestor's.
    pub nodes: SmallVec<[ParamRef; 4]>,
    /// Index into each node's `chains_to` taken at every step, so there is
    /// always one more node than edges.
    pub edges: SmallVec<[u32; 4]>,
}

impl TracePath {
    fn start(node: ParamRef) -> Self {
        let mut nodes = SmallVec::new();
        nodes.push(node);
        Self {
            nodes,
            edges: SmallVec::new(),
        }
    }

    fn step(&self, edge: u32, to: ParamRef) -> Self {
        let mut next = self.clone();
        next.edges.push(edge);
        next.nodes.push(to);
        next
    }

    pub fn origin(&self) -> ParamRef {
        self.nodes[0]
    }

    pub fn target(&self) -> ParamRef {
        self.nodes[self.nodes.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// How a planned slot obtains its value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotSource {
    /// The start declaration's own parameter at `slot`.
    Own { slot: u32 },
    /// An expression over the start declaration's parameters, found in a
    /// base list.
    Expr(ArgExpr),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotPlan {
    pub provenance: Provenance,
    pub source: SlotSource,
    /// Parameter nodes on the path, consulted in order for bounds.
    pub path: TracePath,
}

impl SlotPlan {
    /// Re-express a plan of a base as seen from `owner`, whose base
    /// `base_index` is that base applied to `base_args`.
    fn through_base(
        &self,
        owner: &ParamGraph,
        base_index: u32,
        base_args: &[ArgExpr],
    ) -> SlotPlan {
        let expr = match &self.source {
            SlotSource::Own { slot } => base_args
                .get(*slot as usize)
                .cloned()
                .unwrap_or(ArgExpr::Forward(*slot)),
            SlotSource::Expr(expr) => expr.compose(base_args),
        };
        // A plain forward extends the path by the owner's edge into the base.
        let edge = match expr {
            ArgExpr::Forward(index) => owner.node(index).and_then(|node| {
                node.chains_to
                    .iter()
                    .position(|&to| to == self.path.origin())
                    .map(|edge| (node.param, edge as u32))
            }),
            _ => None,
        };
        let path = match edge {
            Some((from, edge)) => {
                let mut nodes = SmallVec::with_capacity(self.path.nodes.len() + 1);
                nodes.push(from);
                nodes.extend_from_slice(&self.path.nodes);
                let mut edges = SmallVec::with_capacity(self.path.edges.len() + 1);
                edges.push(edge);
                edges.extend_from_slice(&self.path.edges);
                TracePath { nodes, edges }
            }
            None => self.path.clone(),
        };
        SlotPlan {
            provenance: self.provenance.through_base(base_index),
            source: SlotSource::Expr(expr),
            path,
        }
    }
}

/// Per-slot plan for resolving `ancestor` from `start`.
///
/// Plans of sub-roots may be partial; plans handed out by
/// [`ResolutionEngine::plan`] are always complete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionPlan {
    pub start: DeclId,
    pub ancestor: DeclId,
    pub slots: Box<[Option<SlotPlan>]>,
}

impl ResolutionPlan {
    pub fn found(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.found() == self.slots.len()
    }
}

/// Cache of plans keyed by (start, ancestor). Failed plans are cached too.
pub struct PlanCache {
    plans: DashMap<(DeclId, DeclId), ReifyResult<Arc<ResolutionPlan>>, FxBuildHasher>,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanCache")
            .field("len", &self.plans.len())
            .finish()
    }
}

impl PlanCache {
    pub fn new() -> Self {
        Self {
            plans: DashMap::with_capacity_and_hasher(PLAN_CACHE_CAPACITY, FxBuildHasher),
        }
    }

    fn get(&self, start: DeclId, ancestor: DeclId) -> Option<ReifyResult<Arc<ResolutionPlan>>> {
        self.plans.get(&(start, ancestor)).map(|r| r.value().clone())
    }

    fn insert(
        &self,
        start: DeclId,
        ancestor: DeclId,
        plan: ReifyResult<Arc<ResolutionPlan>>,
    ) -> ReifyResult<Arc<ResolutionPlan>> {
        self.plans
            .entry((start, ancestor))
            .or_insert(plan)
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn clear(&self) {
        self.plans.clear();
    }
}

// =============================================================================
// Engine
// =============================================================================

pub struct ResolutionEngine<'s> {
    store: &'s DeclarationStore,
    plans: &'s PlanCache,
}

impl<'s> ResolutionEngine<'s> {
    pub fn new(store: &'s DeclarationStore, plans: &'s PlanCache) -> Self {
        Self { store, plans }
    }

    /// Resolve every parameter of `ancestor` as seen from `root`.
    pub fn resolve(
        &self,
        root: Root<'_>,
        ancestor: DeclId,
        fallback_to_bound: bool,
    ) -> ReifyResult<ResolvedArgs> {
        if let Root::Specialization(spec) = root {
            if spec.decl() == ancestor {
                return Ok(spec.args().iter().cloned().map(Some).collect());
            }
        }

        let plan = self.plan(root.decl(), ancestor)?;
        let graph = self.store.graph(plan.start)?;
        let values = plan
            .slots
            .iter()
            .map(|slot| {
                slot.as_ref()
                    .and_then(|slot| self.resolve_path(slot, root, &graph, fallback_to_bound))
            })
            .collect();
        Ok(values)
    }

    /// The complete plan for (start, ancestor).
    pub fn plan(&self, start: DeclId, ancestor: DeclId) -> ReifyResult<Arc<ResolutionPlan>> {
        let plan = self.partial_plan(start, ancestor)?;
        if !plan.is_complete() {
            let error = ReifyError::UnreachableAncestor {
                root: start,
                ancestor,
                found: plan.found(),
                expected: plan.slots.len(),
            };
            debug!(%error, "resolution plan incomplete");
            return Err(error);
        }
        Ok(plan)
    }

    fn partial_plan(&self, start: DeclId, ancestor: DeclId) -> ReifyResult<Arc<ResolutionPlan>> {
        if let Some(cached) = self.plans.get(start, ancestor) {
            trace!(start = start.0, ancestor = ancestor.0, "plan cache hit");
            return cached;
        }
        let built = self.build_plan(start, ancestor).map(Arc::new);
        if let Err(error) = &built {
            debug!(start = start.0, ancestor = ancestor.0, %error, "plan failed");
        }
        self.plans.insert(start, ancestor, built)
    }

    fn build_plan(&self, start: DeclId, ancestor: DeclId) -> ReifyResult<ResolutionPlan> {
        let entry = self.store.entry(start)?;
        let ancestor_entry = self.store.entry(ancestor)?;
        let arity = ancestor_entry.arity();

        if !entry.derives_from(ancestor) {
            return Err(ReifyError::UnreachableAncestor {
                root: start,
                ancestor,
                found: 0,
                expected: arity,
            });
        }

        let mut slots = self.find_paths(start, ancestor, arity)?;
        let start_graph = entry.graph();

        // Sub-roots: each direct base, bound by its argument expressions.
        if slots.iter().any(Option::is_none) {
            for (base_index, base) in entry.info.bases.iter().enumerate() {
                if !self.store.is_derived_from(base.decl, ancestor) {
                    continue;
                }
                let sub = self.partial_plan(base.decl, ancestor)?;
                for (index, sub_slot) in sub.slots.iter().enumerate() {
                    let Some(sub_slot) = sub_slot else {
                        continue;
                    };
                    let lifted = sub_slot.through_base(start_graph, base_index as u32, &base.args);
                    if slots[index].is_none() {
                        slots[index] = Some(lifted);
                        continue;
                    }
                    // Own parameters take precedence; equal expressions agree.
                    if let Some(existing) = &slots[index] {
                        if !existing.provenance.is_own() && existing.source != lifted.source {
                            return Err(ReifyError::AmbiguousProvenance {
                                root: start,
                                ancestor,
                                index: index as u32,
                                first: existing.provenance.clone(),
                                second: lifted.provenance,
                            });
                        }
                    }
                }
            }
        }

        Ok(ResolutionPlan {
            start,
            ancestor,
            slots: slots.into_boxed_slice(),
        })
    }

    /// Breadth-first traversal from every own parameter of `start`.
    ///
    /// Paths from one originating slot that meet again agree with each other
    /// and the first one found is kept. Two different originating slots
    /// reaching the same ancestor slot is ambiguous.
    pub fn find_paths(
        &self,
        start: DeclId,
        ancestor: DeclId,
        arity: usize,
    ) -> ReifyResult<Vec<Option<SlotPlan>>> {
        let graph = self.store.graph(start)?;
        let mut slots: Vec<Option<SlotPlan>> = vec![None; arity];

        for slot in 0..graph.len() as u32 {
            for path in self.trace_slot(ParamRef::new(start, slot), ancestor)? {
                let index = path.target().index as usize;
                let Some(cell) = slots.get_mut(index) else {
                    continue;
                };
                if let Some(existing) = cell.as_ref() {
                    return Err(ReifyError::AmbiguousProvenance {
                        root: start,
                        ancestor,
                        index: index as u32,
                        first: existing.provenance.clone(),
                        second: Provenance::own(slot),
                    });
                }
                *cell = Some(SlotPlan {
                    provenance: Provenance::own(slot),
                    source: SlotSource::Own { slot },
                    path,
                });
            }
        }
        Ok(slots)
    }

    /// Every ancestor node reachable from `origin`, each with the first path
    /// that reached it.
    pub fn trace_slot(
        &self,
        origin: ParamRef,
        ancestor: DeclId,
    ) -> ReifyResult<SmallVec<[TracePath; 2]>> {
        let mut hits = SmallVec::new();
        let mut visited = FxHashSet::default();
        let mut queue = VecDeque::new();
        visited.insert(origin);
        queue.push_back(TracePath::start(origin));

        while let Some(path) = queue.pop_front() {
            let node = path.target();
            if node.decl == ancestor {
                hits.push(path);
                continue;
            }
            let graph = self.store.graph(node.decl)?;
            let Some(param) = graph.node(node.index) else {
                continue;
            };
            for (edge, &next) in param.chains_to.iter().enumerate() {
                if !self.store.is_derived_from(next.decl, ancestor) {
                    continue;
                }
                if visited.insert(next) {
                    queue.push_back(path.step(edge as u32, next));
                }
            }
        }
        Ok(hits)
    }

    /// Value of one planned slot for `root`; `None` when absent.
    pub fn resolve_path(
        &self,
        slot: &SlotPlan,
        root: Root<'_>,
        start_graph: &ParamGraph,
        fallback_to_bound: bool,
    ) -> Option<Value> {
        let from_root = match root {
            Root::Specialization(spec) => match &slot.source {
                SlotSource::Own { slot } => spec
                    .args()
                    .get(*slot as usize)
                    .and_then(|v| self.settle(v.clone())),
                SlotSource::Expr(expr) => {
                    let bindings: SmallVec<[Option<Value>; 4]> = spec
                        .args()
                        .iter()
                        .map(|v| self.settle(v.clone()))
                        .collect();
                    expr.evaluate(&bindings).and_then(|v| self.settle(v))
                }
            },
            Root::Declaration(_) => None,
        };
        from_root.or_else(|| self.bare_value(slot, start_graph, fallback_to_bound))
    }

    fn bare_value(
        &self,
        slot: &SlotPlan,
        start_graph: &ParamGraph,
        fallback_to_bound: bool,
    ) -> Option<Value> {
        let from_defaults = match &slot.source {
            SlotSource::Own { slot } => start_graph
                .node(*slot)
                .and_then(|n| n.default.clone())
                .and_then(|v| self.settle(v)),
            SlotSource::Expr(expr) => {
                let defaults: SmallVec<[Option<Value>; 4]> =
                    start_graph.nodes.iter().map(|n| n.default.clone()).collect();
                expr.evaluate(&defaults)
                    .and_then(|v| self.settle(v))
                    .or_else(|| {
                        if !fallback_to_bound {
                            return None;
                        }
                        let bounded: SmallVec<[Option<Value>; 4]> = start_graph
                            .nodes
                            .iter()
                            .map(|n| n.default.clone().or_else(|| n.bound.clone()))
                            .collect();
                        expr.evaluate(&bounded).and_then(|v| self.settle(v))
                    })
            }
        };
        if from_defaults.is_some() || !fallback_to_bound {
            return from_defaults;
        }
        slot.path
            .nodes
            .iter()
            .find_map(|&node| self.store.param(node).and_then(|p| p.bound))
    }

    /// Open placeholders count as absent, except that a placeholder whose
    /// parameter has a default stands for that default.
    fn settle(&self, value: Value) -> Option<Value> {
        match value {
            Value::Param(param) => self
                .store
                .param(param)
                .and_then(|p| p.default)
                .filter(|d| !d.is_placeholder()),
            other => Some(other),
        }
    }
}

#[cfg(test)]
#[path = "../tests/resolve_tests.rs"]
mod tests;
