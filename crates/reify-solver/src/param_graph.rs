//! Parameter graph builder.
//!
//! One node per parameter of a declaration. A node chains to a base
//! parameter when that base's argument for the slot is a plain forward of the
//! node's parameter. Edges only ever point into direct bases, so the graph
//! spanning all declarations is acyclic.
//!
//! Edge order is base order, then target slot order; breadth-first traversal
//! depends on it.

use crate::def::DeclarationInfo;
use crate::types::{ArgExpr, DeclId, ParamRef, Value};
use reify_common::Atom;
use reify_common::limits::INLINE_EDGES;
use smallvec::SmallVec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamNode {
    pub param: ParamRef,
    pub name: Atom,
    pub default: Option<Value>,
    pub bound: Option<Value>,
    /// Base parameters this parameter is forwarded into.
    pub chains_to: SmallVec<[ParamRef; INLINE_EDGES]>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamGraph {
    pub decl: DeclId,
    pub nodes: Box<[ParamNode]>,
}

impl ParamGraph {
    pub fn node(&self, index: u32) -> Option<&ParamNode> {
        self.nodes.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every forwarding edge as (from, to), in traversal order.
    pub fn substitution_edges(&self) -> impl Iterator<Item = (ParamRef, ParamRef)> + '_ {
        self.nodes
            .iter()
            .flat_map(|node| node.chains_to.iter().map(move |to| (node.param, *to)))
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.chains_to.len()).sum()
    }
}

pub struct ParamGraphBuilder;

impl ParamGraphBuilder {
    /// Build the graph of a declaration from its static shape.
    pub fn build(decl: DeclId, info: &DeclarationInfo) -> ParamGraph {
        let mut nodes: Vec<ParamNode> = info
            .params
            .iter()
            .enumerate()
            .map(|(index, param)| ParamNode {
                param: ParamRef::new(decl, index as u32),
                name: param.name,
                default: param.default.clone(),
                bound: param.bound.clone(),
                chains_to: SmallVec::new(),
            })
            .collect();

        for base in &info.bases {
            for (slot, arg) in base.args.iter().enumerate() {
                if let ArgExpr::Forward(index) = arg {
                    if let Some(node) = nodes.get_mut(*index as usize) {
                        node.chains_to.push(ParamRef::new(base.decl, slot as u32));
                    }
                }
            }
        }

        ParamGraph {
            decl,
            nodes: nodes.into_boxed_slice(),
        }
    }
}

#[cfg(test)]
#[path = "../tests/param_graph_tests.rs"]
mod tests;
