//! Human-readable rendering of values, expressions, graphs and errors.

use crate::def::DeclarationStore;
use crate::error::ReifyError;
use crate::param_graph::ParamGraph;
use crate::types::{ArgExpr, DeclId, ParamRef, Value};
use reify_common::{Atom, ShardedInterner};
use std::fmt::Write;

pub struct ValueFormatter<'a> {
    interner: &'a ShardedInterner,
    store: &'a DeclarationStore,
}

impl<'a> ValueFormatter<'a> {
    pub fn new(interner: &'a ShardedInterner, store: &'a DeclarationStore) -> Self {
        Self { interner, store }
    }

    pub fn atom(&self, atom: Atom) -> String {
        self.interner.resolve(atom).to_string()
    }

    pub fn decl(&self, decl: DeclId) -> String {
        match self.store.get_name(decl) {
            Some(name) => self.atom(name),
            None => format!("#{}", decl.0),
        }
    }

    /// `Base::T`
    pub fn param(&self, param: ParamRef) -> String {
        match self.store.param(param) {
            Some(info) => format!("{}::{}", self.decl(param.decl), self.atom(info.name)),
            None => format!("{}::{}", self.decl(param.decl), param.index),
        }
    }

    pub fn value(&self, value: &Value) -> String {
        let mut out = String::new();
        self.write_value(&mut out, value);
        out
    }

    fn write_value(&self, out: &mut String, value: &Value) {
        match value {
            Value::Intrinsic(name) => out.push_str(&self.interner.resolve(*name)),
            Value::Decl(decl) => out.push_str(&self.decl(*decl)),
            Value::Param(param) => out.push_str(&self.param(*param)),
            Value::Applied { decl, args } => {
                out.push_str(&self.decl(*decl));
                out.push('[');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_value(out, arg);
                }
                out.push(']');
            }
        }
    }

    /// `(int, ?)`; absent slots print as `?`.
    pub fn resolved(&self, values: &[Option<Value>]) -> String {
        let parts: Vec<String> = values
            .iter()
            .map(|v| v.as_ref().map_or_else(|| "?".to_string(), |v| self.value(v)))
            .collect();
        if parts.len() == 1 {
            format!("({},)", parts[0])
        } else {
            format!("({})", parts.join(", "))
        }
    }

    /// Forwards print as the owner's parameter name.
    pub fn expr(&self, expr: &ArgExpr, owner: DeclId) -> String {
        match expr {
            ArgExpr::Concrete(value) => self.value(value),
            ArgExpr::Forward(index) => self
                .store
                .param(ParamRef::new(owner, *index))
                .map_or_else(|| format!("${index}"), |p| self.atom(p.name)),
            ArgExpr::Nested { decl, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(a, owner)).collect();
                format!("{}[{}]", self.decl(*decl), args.join(", "))
            }
        }
    }

    /// `Leaf -> Mid1 -> Mid2 -> Base`
    pub fn mro(&self, mro: &[DeclId]) -> String {
        mro.iter()
            .map(|&d| self.decl(d))
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Header line followed by one line per parameter and its edges:
    ///
    /// ```text
    /// Leaf[T](Mid1[T], Mid2[T])
    ///   T -> Mid1::T, Mid2::T
    /// ```
    pub fn graph(&self, graph: &ParamGraph) -> String {
        let mut out = self.signature(graph.decl);
        for node in graph.nodes.iter() {
            let _ = write!(out, "\n  {}", self.atom(node.name));
            if let Some(default) = &node.default {
                let _ = write!(out, " = {}", self.value(default));
            }
            if let Some(bound) = &node.bound {
                let _ = write!(out, " : {}", self.value(bound));
            }
            if !node.chains_to.is_empty() {
                let targets: Vec<String> = node.chains_to.iter().map(|&p| self.param(p)).collect();
                let _ = write!(out, " -> {}", targets.join(", "));
            }
        }
        out
    }

    /// `Leaf[T](Mid1[T], Mid2[T])`
    pub fn signature(&self, decl: DeclId) -> String {
        let Some(entry) = self.store.get(decl) else {
            return self.decl(decl);
        };
        let mut out = self.decl(decl);
        if entry.info.is_generic() {
            let params: Vec<String> = entry.info.params.iter().map(|p| self.atom(p.name)).collect();
            let _ = write!(out, "[{}]", params.join(", "));
        }
        if !entry.info.bases.is_empty() {
            let bases: Vec<String> = entry
                .info
                .bases
                .iter()
                .map(|b| {
                    if b.args.is_empty() {
                        self.decl(b.decl)
                    } else {
                        let args: Vec<String> = b.args.iter().map(|a| self.expr(a, decl)).collect();
                        format!("{}[{}]", self.decl(b.decl), args.join(", "))
                    }
                })
                .collect();
            let _ = write!(out, "({})", bases.join(", "));
        }
        out
    }

    /// Like `Display`, with declaration and member names instead of ids.
    pub fn describe_error(&self, error: &ReifyError) -> String {
        match error {
            ReifyError::NotGeneric { decl } => format!("{} is not generic", self.decl(*decl)),
            ReifyError::ForeignManaged { decl } => format!(
                "{} is foreign-managed and cannot be specialized",
                self.decl(*decl)
            ),
            ReifyError::AmbiguousProvenance {
                root,
                ancestor,
                index,
                first,
                second,
            } => {
                let slot = self
                    .store
                    .param(ParamRef::new(*ancestor, *index))
                    .map_or_else(|| index.to_string(), |p| self.atom(p.name));
                format!(
                    "ambiguous resolution of {}::{} from {}: reached from {first} and from {second}",
                    self.decl(*ancestor),
                    slot,
                    self.decl(*root)
                )
            }
            ReifyError::UnreachableAncestor {
                root,
                ancestor,
                found,
                expected,
            } => format!(
                "cannot resolve {} from {}: found {found} of {expected} parameter(s)",
                self.decl(*ancestor),
                self.decl(*root)
            ),
            ReifyError::MissingReceiverContext { member } => format!(
                "redirection of `{}` has no defining frame in the receiver",
                self.atom(*member)
            ),
            ReifyError::UnknownDeclaration { decl } => {
                format!("unknown declaration #{}", decl.0)
            }
            ReifyError::InvalidDeclaration { name, error } => {
                format!("invalid declaration {}: {error}", self.atom(*name))
            }
            ReifyError::ArityMismatch {
                decl,
                expected,
                found,
            } => format!(
                "{} takes {expected} argument(s) but {found} were given",
                self.decl(*decl)
            ),
            ReifyError::MemberNotFound { decl, member } => {
                format!("{} has no member `{}`", self.decl(*decl), self.atom(*member))
            }
            ReifyError::NotCallable { decl, member } => format!(
                "`{}` on {} is not callable",
                self.atom(*member),
                self.decl(*decl)
            ),
            ReifyError::DepthExceeded { .. } | ReifyError::Operation(_) => error.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "../tests/format_tests.rs"]
mod tests;
