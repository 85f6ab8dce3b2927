//! The type system facade.
//!
//! Owns the interner, declaration store, specialization registry, plan
//! cache and interceptor, and exposes the operations callers use. It is
//! `Send + Sync`; share it by reference or behind an `Arc`.

use crate::def::{DeclEntry, DeclarationInfo, DeclarationStore};
use crate::dispatch::{BoundMember, DispatchProxy, Receiver};
use crate::error::{ReifyError, ReifyResult};
use crate::format::ValueFormatter;
use crate::install::{
    EntryPointDetector, FlagProtocol, ForeignProtocol, InstallOutcome, Interceptor, MroEntryPoints,
};
use crate::param_graph::ParamGraph;
use crate::resolve::{PlanCache, ResolutionEngine, ResolutionPlan, Root};
use crate::specialize::{Specialization, SpecializationRegistry};
use crate::types::{DeclId, ResolvedArgs, Value};
use reify_common::{Atom, ReifyOptions, ShardedInterner};
use std::sync::Arc;
use tracing::debug;

/// Result of applying arguments to a declaration.
#[derive(Debug)]
pub enum Applied<'a> {
    /// The declaration is intercepted: a proxy over the canonical
    /// specialization.
    Proxy(DispatchProxy<'a>),
    /// Not intercepted: the plain structural application.
    Plain(Value),
}

impl<'a> Applied<'a> {
    pub fn is_proxy(&self) -> bool {
        matches!(self, Applied::Proxy(_))
    }

    pub fn into_proxy(self) -> Option<DispatchProxy<'a>> {
        match self {
            Applied::Proxy(proxy) => Some(proxy),
            Applied::Plain(_) => None,
        }
    }

    pub fn value(&self) -> Value {
        match self {
            Applied::Proxy(proxy) => proxy.specialization().as_value(),
            Applied::Plain(value) => value.clone(),
        }
    }
}

pub struct TypeSystem {
    interner: ShardedInterner,
    store: DeclarationStore,
    registry: SpecializationRegistry,
    plans: PlanCache,
    interceptor: Arc<Interceptor>,
    options: ReifyOptions,
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeSystem")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .field("plans", &self.plans)
            .field("options", &self.options)
            .finish()
    }
}

impl TypeSystem {
    pub fn new() -> Self {
        Self::with_options(ReifyOptions::default())
    }

    pub fn with_options(options: ReifyOptions) -> Self {
        Self::with_collaborators(options, Arc::new(FlagProtocol), Arc::new(MroEntryPoints))
    }

    /// Build a system with custom foreign-managed and entry-point detection.
    pub fn with_collaborators(
        options: ReifyOptions,
        foreign: Arc<dyn ForeignProtocol>,
        entry_points: Arc<dyn EntryPointDetector>,
    ) -> Self {
        let interceptor = Arc::new(Interceptor::new(Arc::clone(&foreign), entry_points));
        let store = DeclarationStore::new();
        let on_register = Arc::clone(&interceptor);
        store.add_registration_hook(Arc::new(
            move |store: &DeclarationStore, entry: &Arc<DeclEntry>| {
                on_register.on_register(store, entry);
            },
        ));
        Self {
            interner: ShardedInterner::with_common_names(),
            store,
            registry: SpecializationRegistry::new(foreign),
            plans: PlanCache::new(),
            interceptor,
            options,
        }
    }

    // -- accessors --

    pub fn options(&self) -> &ReifyOptions {
        &self.options
    }

    pub fn interner(&self) -> &ShardedInterner {
        &self.interner
    }

    pub fn store(&self) -> &DeclarationStore {
        &self.store
    }

    pub fn registry(&self) -> &SpecializationRegistry {
        &self.registry
    }

    pub fn plans(&self) -> &PlanCache {
        &self.plans
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub fn formatter(&self) -> ValueFormatter<'_> {
        ValueFormatter::new(&self.interner, &self.store)
    }

    // -- names --

    pub fn intern(&self, s: &str) -> Atom {
        self.interner.intern(s)
    }

    pub fn name(&self, atom: Atom) -> Arc<str> {
        self.interner.resolve(atom)
    }

    pub fn intrinsic(&self, name: &str) -> Value {
        Value::Intrinsic(self.intern(name))
    }

    pub fn decl_by_name(&self, name: &str) -> Option<DeclId> {
        self.store.find_by_name(self.interner.get(name)?)
    }

    // -- declarations --

    pub fn declare(&self, info: DeclarationInfo) -> ReifyResult<DeclId> {
        self.store.register(info)
    }

    pub fn mro(&self, decl: DeclId) -> ReifyResult<Arc<[DeclId]>> {
        self.store.mro(decl)
    }

    pub fn graph(&self, decl: DeclId) -> ReifyResult<Arc<ParamGraph>> {
        self.store.graph(decl)
    }

    pub fn is_foreign(&self, decl: DeclId) -> bool {
        self.interceptor.is_foreign(&self.store, decl)
    }

    // -- specialization --

    pub fn specialize(&self, decl: DeclId, args: &[Value]) -> ReifyResult<Specialization> {
        self.registry.specialize(&self.store, decl, args)
    }

    /// Whether a receiver is a specialization rather than a bare declaration.
    pub fn is_specialization(&self, receiver: &Receiver) -> bool {
        receiver.is_specialization()
    }

    /// Whether a structural value is backed by a live specialization.
    pub fn is_live_specialization(&self, value: &Value) -> bool {
        self.registry.is_live(value)
    }

    // -- resolution --

    fn engine(&self) -> ResolutionEngine<'_> {
        ResolutionEngine::new(&self.store, &self.plans)
    }

    /// Resolve `ancestor`'s parameters as seen from `root`, with the
    /// configured bound fallback.
    pub fn resolve(&self, root: &Receiver, ancestor: DeclId) -> ReifyResult<ResolvedArgs> {
        self.resolve_root(root.root(), ancestor, self.options.fallback_to_bound)
    }

    /// Resolve with an explicit bound-fallback choice. Results for
    /// specialization roots are memoized on the specialization.
    pub fn resolve_root(
        &self,
        root: Root<'_>,
        ancestor: DeclId,
        fallback_to_bound: bool,
    ) -> ReifyResult<ResolvedArgs> {
        match root {
            Root::Specialization(spec) if self.options.memoize_resolutions => {
                spec.memoize(ancestor, fallback_to_bound, || {
                    self.engine().resolve(root, ancestor, fallback_to_bound)
                })
            }
            _ => self.engine().resolve(root, ancestor, fallback_to_bound),
        }
    }

    pub fn plan(&self, start: DeclId, ancestor: DeclId) -> ReifyResult<Arc<ResolutionPlan>> {
        self.engine().plan(start, ancestor)
    }

    // -- interception and dispatch --

    /// Install the interception hook on `decl` now rather than lazily.
    pub fn install(&self, decl: DeclId) -> ReifyResult<InstallOutcome> {
        let entry = self.store.entry(decl)?;
        Ok(self.interceptor.install(&self.store, &entry))
    }

    /// Apply arguments to a declaration.
    ///
    /// The native entry point runs first. An intercepted declaration then
    /// yields a proxy over the canonical specialization; anything else
    /// (including foreign-managed declarations) yields the plain value.
    pub fn apply(&self, decl: DeclId, args: &[Value]) -> ReifyResult<Applied<'_>> {
        let entry = self.store.entry(decl)?;
        if !entry.info.is_generic() {
            return Err(ReifyError::NotGeneric { decl });
        }

        let Some(hook) = self.interceptor.ensure(&self.store, &entry) else {
            let args = match self.interceptor.native_apply(&self.store, decl) {
                Some(native) => native.call(args)?,
                None => args.to_vec(),
            };
            return Ok(Applied::Plain(Value::applied(decl, args)));
        };

        let args = hook.prepare(args).inspect_err(|error| {
            debug!(decl = decl.0, %error, "native apply failed");
        })?;
        let spec = self.specialize(decl, &args)?;
        Ok(Applied::Proxy(DispatchProxy::new(self, spec)))
    }

    pub fn proxy(&self, spec: Specialization) -> DispatchProxy<'_> {
        DispatchProxy::new(self, spec)
    }

    /// Look up `name` on a receiver and bind it.
    pub fn bind(&self, receiver: Receiver, name: &str) -> ReifyResult<BoundMember<'_>> {
        BoundMember::lookup(self, receiver, self.intern(name))
    }

    pub fn invoke(&self, receiver: Receiver, name: &str, args: &[Value]) -> ReifyResult<Value> {
        self.bind(receiver, name)?.call(args)
    }
}

#[cfg(test)]
#[path = "../tests/system_tests.rs"]
mod tests;
