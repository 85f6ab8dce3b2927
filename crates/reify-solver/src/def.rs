//! Declaration identifiers and storage.
//!
//! Declarations are immutable once registered. Registration validates the
//! declaration's shape, pads short base argument lists, computes the
//! member-resolution order and finally runs every registration callback, so
//! callbacks always observe a complete entry.
//!
//! Bases must be registered before the declarations that list them. This is
//! what keeps the base graph acyclic.

use crate::dispatch::Member;
use crate::error::{DeclarationError, ReifyError, ReifyResult};
use crate::install::{ApplyHook, NativeApply};
use crate::mro;
use crate::param_graph::{ParamGraph, ParamGraphBuilder};
use crate::types::{ArgExpr, BaseSpec, DeclId, ParamInfo, ParamRef, Value};
use bitflags::bitflags;
use dashmap::DashMap;
use indexmap::IndexMap;
use reify_common::Atom;
use reify_common::limits::{DECLARATION_STORE_CAPACITY, MAX_EXPR_DEPTH};
use rustc_hash::{FxBuildHasher, FxHashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use tracing::{debug, trace};

/// Global counter for assigning unique instance IDs to `DeclarationStore` instances.
static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DeclFlags: u32 {
        /// The declaration runs its own generic protocol. It is never
        /// specialized or wrapped, and neither is anything derived from it.
        const FOREIGN_MANAGED = 1 << 0;
    }
}

pub type MemberMap = IndexMap<Atom, Member, FxBuildHasher>;

// =============================================================================
// DeclarationInfo
// =============================================================================

/// Everything needed to register a declaration.
#[derive(Clone, Debug)]
pub struct DeclarationInfo {
    pub name: Atom,
    pub params: Vec<ParamInfo>,
    pub bases: Vec<BaseSpec>,
    pub members: MemberMap,
    pub flags: DeclFlags,
    /// The declaration's own "apply arguments" entry point, if it has one.
    pub native_apply: Option<NativeApply>,
}

impl DeclarationInfo {
    /// A non-generic declaration with no bases.
    pub fn new(name: Atom) -> Self {
        Self {
            name,
            params: Vec::new(),
            bases: Vec::new(),
            members: MemberMap::default(),
            flags: DeclFlags::empty(),
            native_apply: None,
        }
    }

    pub fn generic(name: Atom, params: Vec<ParamInfo>) -> Self {
        Self {
            params,
            ..Self::new(name)
        }
    }

    pub fn with_param(mut self, param: ParamInfo) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_base(mut self, base: BaseSpec) -> Self {
        self.bases.push(base);
        self
    }

    pub fn with_member(mut self, name: Atom, member: Member) -> Self {
        self.members.insert(name, member);
        self
    }

    pub fn with_flags(mut self, flags: DeclFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn foreign(self) -> Self {
        self.with_flags(DeclFlags::FOREIGN_MANAGED)
    }

    pub fn with_native_apply(mut self, apply: NativeApply) -> Self {
        self.native_apply = Some(apply);
        self
    }

    #[inline]
    pub fn is_generic(&self) -> bool {
        !self.params.is_empty()
    }

    pub fn has_alias_aware_members(&self) -> bool {
        self.members.values().any(Member::is_alias_aware)
    }
}

// =============================================================================
// DeclEntry
// =============================================================================

/// A registered declaration together with the data derived from it.
#[derive(Debug)]
pub struct DeclEntry {
    pub id: DeclId,
    pub info: DeclarationInfo,
    /// Member-resolution order, starting with `id` itself.
    pub mro: Arc<[DeclId]>,
    graph: OnceLock<Arc<ParamGraph>>,
    pub(crate) hook: OnceLock<ApplyHook>,
}

impl DeclEntry {
    fn new(id: DeclId, info: DeclarationInfo, mro: Arc<[DeclId]>) -> Self {
        Self {
            id,
            info,
            mro,
            graph: OnceLock::new(),
            hook: OnceLock::new(),
        }
    }

    /// The parameter graph, built on first use.
    pub fn graph(&self) -> &Arc<ParamGraph> {
        self.graph
            .get_or_init(|| Arc::new(ParamGraphBuilder::build(self.id, &self.info)))
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.info.params.len()
    }

    #[inline]
    pub fn name(&self) -> Atom {
        self.info.name
    }

    pub fn param(&self, index: u32) -> Option<&ParamInfo> {
        self.info.params.get(index as usize)
    }

    /// Whether the interception hook is installed.
    pub fn is_intercepted(&self) -> bool {
        self.hook.get().is_some()
    }

    pub fn derives_from(&self, ancestor: DeclId) -> bool {
        self.mro.contains(&ancestor)
    }
}

// =============================================================================
// DeclarationStore
// =============================================================================

/// Called with every newly registered entry.
pub type RegistrationHook = Arc<dyn Fn(&DeclarationStore, &Arc<DeclEntry>) + Send + Sync>;

/// Thread-safe arena of declarations.
///
/// Uses `DashMap` so declarations can be registered and looked up from
/// several threads at once.
pub struct DeclarationStore {
    /// Unique instance ID for debugging.
    instance_id: u64,

    declarations: DashMap<DeclId, Arc<DeclEntry>, FxBuildHasher>,

    /// Latest declaration registered under each name.
    by_name: DashMap<Atom, DeclId, FxBuildHasher>,

    next_id: AtomicU32,

    hooks: RwLock<Vec<RegistrationHook>>,
}

impl Default for DeclarationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeclarationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeclarationStore")
            .field("instance_id", &self.instance_id)
            .field("len", &self.declarations.len())
            .finish()
    }
}

impl DeclarationStore {
    pub fn new() -> Self {
        let instance_id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::SeqCst);
        trace!(instance_id, "DeclarationStore::new");
        Self {
            instance_id,
            declarations: DashMap::with_capacity_and_hasher(
                DECLARATION_STORE_CAPACITY,
                FxBuildHasher,
            ),
            by_name: DashMap::with_hasher(FxBuildHasher),
            next_id: AtomicU32::new(DeclId::FIRST_VALID),
            hooks: RwLock::new(Vec::new()),
        }
    }

    fn allocate(&self) -> DeclId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        trace!(
            instance_id = self.instance_id,
            allocated_decl_id = id,
            "DeclarationStore::allocate"
        );
        DeclId(id)
    }

    /// Validate and register a declaration, then run registration callbacks.
    pub fn register(&self, info: DeclarationInfo) -> ReifyResult<DeclId> {
        let name = info.name;
        let (info, mro_tail) = self.validate(info).map_err(|error| {
            debug!(instance_id = self.instance_id, %error, "rejected declaration");
            ReifyError::InvalidDeclaration { name, error }
        })?;

        let id = self.allocate();
        let mut mro = Vec::with_capacity(mro_tail.len() + 1);
        mro.push(id);
        mro.extend(mro_tail.into_iter().skip(1));

        let entry = Arc::new(DeclEntry::new(id, info, mro.into()));
        trace!(
            instance_id = self.instance_id,
            decl_id = id.0,
            arity = entry.arity(),
            bases = entry.info.bases.len(),
            "DeclarationStore::register"
        );
        self.declarations.insert(id, Arc::clone(&entry));
        self.by_name.insert(name, id);

        let hooks: Vec<RegistrationHook> = match self.hooks.read() {
            Ok(hooks) => hooks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for hook in &hooks {
            hook(self, &entry);
        }
        Ok(id)
    }

    /// Check the declaration's shape and pad short argument lists.
    ///
    /// Returns the normalized info and its resolution order, computed with a
    /// placeholder id in the first position.
    fn validate(
        &self,
        mut info: DeclarationInfo,
    ) -> Result<(DeclarationInfo, Vec<DeclId>), DeclarationError> {
        let mut seen = FxHashSet::default();
        for param in &info.params {
            if !seen.insert(param.name) {
                return Err(DeclarationError::DuplicateParameter { name: param.name });
            }
        }

        let arity = info.params.len();
        let mut base_ids = Vec::with_capacity(info.bases.len());
        let mut base_orders = Vec::with_capacity(info.bases.len());
        for (base_idx, base) in info.bases.iter_mut().enumerate() {
            let base_idx = base_idx as u32;
            let entry = self.get(base.decl).ok_or(DeclarationError::UnknownBase {
                base: base_idx,
                decl: base.decl,
            })?;
            if base_ids.contains(&base.decl) {
                return Err(DeclarationError::DuplicateBase { decl: base.decl });
            }
            base.args = self.normalize_args(base_idx, &entry, &base.args, arity, 1)?;
            base_ids.push(base.decl);
            base_orders.push(Arc::clone(&entry.mro));
        }

        let mro = mro::linearize(DeclId::INVALID, &base_ids, &base_orders)?;
        Ok((info, mro))
    }

    fn normalize_args(
        &self,
        base_idx: u32,
        target: &DeclEntry,
        args: &[ArgExpr],
        owner_arity: usize,
        depth: u32,
    ) -> Result<Arc<[ArgExpr]>, DeclarationError> {
        if depth > MAX_EXPR_DEPTH {
            return Err(DeclarationError::ExpressionTooDeep {
                base: base_idx,
                limit: MAX_EXPR_DEPTH,
            });
        }
        if args.len() > target.arity() {
            return Err(DeclarationError::BaseArity {
                base: base_idx,
                decl: target.id,
                expected: target.arity(),
                found: args.len(),
            });
        }

        let mut normalized = Vec::with_capacity(target.arity());
        for arg in args {
            let arg = match arg {
                ArgExpr::Concrete(_) => arg.clone(),
                ArgExpr::Forward(index) => {
                    if *index as usize >= owner_arity {
                        return Err(DeclarationError::ForwardOutOfRange {
                            base: base_idx,
                            index: *index,
                            arity: owner_arity,
                        });
                    }
                    arg.clone()
                }
                ArgExpr::Nested { decl, args } => {
                    let nested = self.get(*decl).ok_or(DeclarationError::UnknownBase {
                        base: base_idx,
                        decl: *decl,
                    })?;
                    ArgExpr::Nested {
                        decl: *decl,
                        args: self.normalize_args(base_idx, &nested, args, owner_arity, depth + 1)?,
                    }
                }
            };
            normalized.push(arg);
        }

        // Missing trailing arguments take the default, or stay open.
        for index in args.len()..target.arity() {
            let index = index as u32;
            let value = target
                .param(index)
                .and_then(|p| p.default.clone())
                .unwrap_or(Value::Param(ParamRef::new(target.id, index)));
            normalized.push(ArgExpr::Concrete(value));
        }
        Ok(normalized.into())
    }

    pub fn get(&self, id: DeclId) -> Option<Arc<DeclEntry>> {
        self.declarations.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Like [`get`](Self::get), but failing with `UnknownDeclaration`.
    pub fn entry(&self, id: DeclId) -> ReifyResult<Arc<DeclEntry>> {
        self.get(id)
            .ok_or(ReifyError::UnknownDeclaration { decl: id })
    }

    pub fn contains(&self, id: DeclId) -> bool {
        self.declarations.contains_key(&id)
    }

    pub fn mro(&self, id: DeclId) -> ReifyResult<Arc<[DeclId]>> {
        Ok(Arc::clone(&self.entry(id)?.mro))
    }

    pub fn graph(&self, id: DeclId) -> ReifyResult<Arc<ParamGraph>> {
        Ok(Arc::clone(self.entry(id)?.graph()))
    }

    pub fn param(&self, param: ParamRef) -> Option<ParamInfo> {
        self.declarations
            .get(&param.decl)
            .and_then(|r| r.param(param.index).cloned())
    }

    pub fn get_name(&self, id: DeclId) -> Option<Atom> {
        self.declarations.get(&id).map(|r| r.info.name)
    }

    pub fn find_by_name(&self, name: Atom) -> Option<DeclId> {
        self.by_name.get(&name).map(|r| *r)
    }

    /// Whether `ancestor` appears in `decl`'s resolution order (including
    /// `decl` itself).
    pub fn is_derived_from(&self, decl: DeclId, ancestor: DeclId) -> bool {
        self.declarations
            .get(&decl)
            .is_some_and(|r| r.derives_from(ancestor))
    }

    /// Find the first declaration in `decl`'s resolution order that defines
    /// `name`, starting after `after` when given.
    pub fn lookup_member(
        &self,
        decl: DeclId,
        name: Atom,
        after: Option<DeclId>,
    ) -> ReifyResult<Option<(DeclId, Member)>> {
        let entry = self.entry(decl)?;
        let start = match after {
            None => 0,
            Some(frame) => match entry.mro.iter().position(|&d| d == frame) {
                Some(pos) => pos + 1,
                None => return Ok(None),
            },
        };
        for &owner in &entry.mro[start..] {
            let owner_entry = self.entry(owner)?;
            if let Some(member) = owner_entry.info.members.get(&name) {
                return Ok(Some((owner, member.clone())));
            }
        }
        Ok(None)
    }

    /// Register a callback run after every later registration.
    pub fn add_registration_hook(&self, hook: RegistrationHook) {
        match self.hooks.write() {
            Ok(mut hooks) => hooks.push(hook),
            Err(poisoned) => poisoned.into_inner().push(hook),
        }
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

#[cfg(test)]
#[path = "../tests/def_tests.rs"]
mod tests;
